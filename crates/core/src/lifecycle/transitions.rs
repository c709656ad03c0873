use serde::{Deserialize, Serialize};

use crate::domain::actor::Action;
use crate::domain::listing::ListingStatus;
use crate::domain::request::RequestStatus;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    /// Whether listings that are already claimed may still receive new requests.
    pub allow_requests_on_claimed: bool,
    /// Whether approving one request rejects the other pending requests on its listing.
    pub auto_reject_siblings: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self { allow_requests_on_claimed: true, auto_reject_siblings: false }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestEvent {
    Approve,
    Reject,
    Complete,
}

impl RequestEvent {
    pub fn action(&self) -> Action {
        match self {
            Self::Approve => Action::ApproveRequest,
            Self::Reject => Action::RejectRequest,
            Self::Complete => Action::CompleteRequest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approved",
            Self::Reject => "rejected",
            Self::Complete => "completed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    ClaimListing,
    RejectSiblings,
    CompleteListing,
    RecordImpact,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub event: RequestEvent,
    pub request_from: RequestStatus,
    pub request_to: RequestStatus,
    pub listing_from: ListingStatus,
    pub listing_to: Option<ListingStatus>,
    pub actions: Vec<LifecycleAction>,
}

/// Computes the paired request/listing transition for `event`. Nothing is
/// mutated; the caller turns the outcome into one guarded store commit.
pub fn plan_transition(
    request: RequestStatus,
    listing: ListingStatus,
    event: RequestEvent,
    policy: &LifecyclePolicy,
) -> Result<TransitionOutcome, DomainError> {
    use LifecycleAction::{ClaimListing, CompleteListing, RecordImpact, RejectSiblings};

    let (request_to, listing_to, actions) = match event {
        RequestEvent::Approve => {
            require_request(request, RequestStatus::Approved)?;
            require_listing(listing, ListingStatus::Claimed)?;
            let mut actions = vec![ClaimListing];
            if policy.auto_reject_siblings {
                actions.push(RejectSiblings);
            }
            (RequestStatus::Approved, Some(ListingStatus::Claimed), actions)
        }
        RequestEvent::Reject => {
            require_request(request, RequestStatus::Rejected)?;
            (RequestStatus::Rejected, None, Vec::new())
        }
        RequestEvent::Complete => {
            require_request(request, RequestStatus::Completed)?;
            require_listing(listing, ListingStatus::Completed)?;
            (RequestStatus::Completed, Some(ListingStatus::Completed), vec![CompleteListing, RecordImpact])
        }
    };

    Ok(TransitionOutcome {
        event,
        request_from: request,
        request_to,
        listing_from: listing,
        listing_to,
        actions,
    })
}

/// Checks whether a listing in `status` may receive a new request.
pub fn check_submission(status: ListingStatus, policy: &LifecyclePolicy) -> Result<(), DomainError> {
    let open = !status.is_terminal()
        && (status == ListingStatus::Available || policy.allow_requests_on_claimed);
    if open {
        return Ok(());
    }
    Err(DomainError::InvalidState(format!(
        "listing is {}; it no longer accepts requests",
        status.as_str()
    )))
}

fn require_request(current: RequestStatus, next: RequestStatus) -> Result<(), DomainError> {
    if current.can_transition_to(next) {
        return Ok(());
    }
    Err(DomainError::InvalidRequestTransition { from: current, to: next })
}

fn require_listing(current: ListingStatus, next: ListingStatus) -> Result<(), DomainError> {
    if current.can_transition_to(next) {
        return Ok(());
    }
    Err(DomainError::InvalidListingTransition { from: current, to: next })
}
