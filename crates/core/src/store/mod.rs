//! Data store contract consumed by the lifecycle engine and report aggregator.
//!
//! Paired status changes are handed to [`DonationStore::commit`] as one
//! [`TransitionCommit`]. Every update inside it carries the status the caller
//! observed; an implementation must apply all of them or none.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::actor::UserId;
use crate::domain::impact::ImpactRecord;
use crate::domain::listing::{Listing, ListingId, ListingStatus};
use crate::domain::report::{Report, ReportId};
use crate::domain::request::{DonationRequest, RequestId, RequestStatus};

pub mod memory;

pub use memory::InMemoryDonationStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingFilter {
    pub status: Option<ListingStatus>,
    pub donor_id: Option<UserId>,
    pub expires_at_or_before: Option<DateTime<Utc>>,
    pub order: SortOrder,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub listing_id: Option<ListingId>,
    pub recipient_id: Option<UserId>,
    /// Matches requests whose listing belongs to this donor.
    pub donor_id: Option<UserId>,
    pub status: Option<RequestStatus>,
    pub order: SortOrder,
}

/// Range filter over `recorded_at`, half-open: `[recorded_from, recorded_before)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImpactFilter {
    pub recorded_from: Option<DateTime<Utc>>,
    pub recorded_before: Option<DateTime<Utc>>,
    pub donor_id: Option<UserId>,
    pub order: SortOrder,
}

impl ImpactFilter {
    pub fn matches(&self, record: &ImpactRecord) -> bool {
        self.recorded_from.map(|from| record.recorded_at >= from).unwrap_or(true)
            && self.recorded_before.map(|before| record.recorded_at < before).unwrap_or(true)
            && self.donor_id.as_ref().map(|donor| &record.donor_id == donor).unwrap_or(true)
    }
}

/// Fields written by a listing status change. `None` leaves the stored value untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingPatch {
    pub status: ListingStatus,
    pub claimed_by: Option<UserId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ListingPatch {
    pub fn status(status: ListingStatus, updated_at: DateTime<Utc>) -> Self {
        Self { status, claimed_by: None, claimed_at: None, completed_at: None, updated_at }
    }

    pub fn apply_to(&self, listing: &mut Listing) {
        listing.status = self.status;
        if let Some(claimed_by) = &self.claimed_by {
            listing.claimed_by = Some(claimed_by.clone());
        }
        if let Some(claimed_at) = self.claimed_at {
            listing.claimed_at = Some(claimed_at);
        }
        if let Some(completed_at) = self.completed_at {
            listing.completed_at = Some(completed_at);
        }
        listing.updated_at = self.updated_at;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestPatch {
    pub status: RequestStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RequestPatch {
    pub fn apply_to(&self, request: &mut DonationRequest) {
        request.status = self.status;
        if let Some(approved_at) = self.approved_at {
            request.approved_at = Some(approved_at);
        }
        request.updated_at = self.updated_at;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingUpdate {
    pub id: ListingId,
    pub expected: ListingStatus,
    pub patch: ListingPatch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestUpdate {
    pub id: RequestId,
    pub expected: RequestStatus,
    pub patch: RequestPatch,
}

/// One logical transition: guarded updates plus an optional impact record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionCommit {
    pub listing: Option<ListingUpdate>,
    pub requests: Vec<RequestUpdate>,
    pub impact_record: Option<ImpactRecord>,
}

impl TransitionCommit {
    pub fn is_empty(&self) -> bool {
        self.listing.is_none() && self.requests.is_empty() && self.impact_record.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardFailure {
    Listing { id: ListingId, expected: ListingStatus, actual: Option<ListingStatus> },
    Request { id: RequestId, expected: RequestStatus, actual: Option<RequestStatus> },
    DuplicateImpact { donation_id: ListingId },
}

impl std::fmt::Display for GuardFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Listing { id, expected, actual } => write!(
                f,
                "listing `{}` expected {} but was {}",
                id.0,
                expected.as_str(),
                actual.map(|status| status.as_str()).unwrap_or("missing")
            ),
            Self::Request { id, expected, actual } => write!(
                f,
                "request `{}` expected {} but was {}",
                id.0,
                expected.as_str(),
                actual.map(|status| status.as_str()).unwrap_or("missing")
            ),
            Self::DuplicateImpact { donation_id } => {
                write!(f, "impact already recorded for listing `{}`", donation_id.0)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    GuardFailed(GuardFailure),
}

#[async_trait]
pub trait DonationStore: Send + Sync {
    async fn insert_listing(&self, listing: Listing) -> Result<(), StoreError>;
    async fn insert_request(&self, request: DonationRequest) -> Result<(), StoreError>;
    async fn insert_report(&self, report: Report) -> Result<(), StoreError>;

    async fn find_listing(&self, id: &ListingId) -> Result<Option<Listing>, StoreError>;
    async fn find_request(&self, id: &RequestId) -> Result<Option<DonationRequest>, StoreError>;
    async fn find_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError>;

    async fn query_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, StoreError>;
    async fn query_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<DonationRequest>, StoreError>;
    async fn query_impact_records(
        &self,
        filter: &ImpactFilter,
    ) -> Result<Vec<ImpactRecord>, StoreError>;
    async fn query_reports(&self, order: SortOrder) -> Result<Vec<Report>, StoreError>;

    /// Applies every guarded update and the impact insert atomically. A failed
    /// guard is reported through [`CommitOutcome::GuardFailed`] with nothing written.
    async fn commit(&self, commit: TransitionCommit) -> Result<CommitOutcome, StoreError>;
}
