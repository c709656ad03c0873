use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::{Action, Actor, Role};
use crate::domain::impact::{ImpactRecord, ImpactRecordId};
use crate::domain::listing::{
    Listing, ListingId, ListingStatus, NewListing, Quantity, QuantityUnit,
};
use crate::domain::request::{DonationRequest, RequestId, RequestStatus};
use crate::errors::{ApplicationError, DomainError};
use crate::impact::{canonical_mass, compute_impact};
use crate::lifecycle::transitions::{
    check_submission, plan_transition, LifecycleAction, LifecyclePolicy, RequestEvent,
    TransitionOutcome,
};
use crate::store::{
    CommitOutcome, DonationStore, ListingFilter, ListingPatch, ListingUpdate, RequestFilter,
    RequestPatch, RequestUpdate, TransitionCommit,
};

/// Result of an applied request transition, with the entities as committed.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionReceipt {
    pub correlation_id: String,
    pub outcome: TransitionOutcome,
    pub request: DonationRequest,
    pub listing: Listing,
    pub impact_record: Option<ImpactRecord>,
    pub rejected_siblings: Vec<RequestId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewRequest {
    pub listing_id: ListingId,
    pub message: Option<String>,
    pub requested_quantity: Option<f64>,
}

/// Owns every status change of listings and requests. Paired changes go to the
/// store as a single guarded [`TransitionCommit`].
pub struct DonationLifecycleEngine<S, A> {
    store: Arc<S>,
    audit: A,
    policy: LifecyclePolicy,
}

impl<S, A> DonationLifecycleEngine<S, A>
where
    S: DonationStore,
    A: AuditSink,
{
    pub fn new(store: Arc<S>, audit: A, policy: LifecyclePolicy) -> Self {
        Self { store, audit, policy }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn create_listing(
        &self,
        actor: &Actor,
        input: NewListing,
    ) -> Result<Listing, ApplicationError> {
        actor.authorize(Action::CreateListing)?;

        let title = required_text("title", &input.title)?;
        let pickup_location = required_text("pickup_location", &input.pickup_location)?;
        if !input.amount.is_finite() || input.amount <= 0.0 {
            return Err(DomainError::Validation(format!(
                "quantity must be a positive number, got {}",
                input.amount
            ))
            .into());
        }
        let unit = input.unit.parse::<QuantityUnit>()?;
        let quantity = Quantity { amount: input.amount, unit };
        check_recordable(quantity)?;

        let now = Utc::now();
        let listing = Listing {
            id: ListingId(Uuid::new_v4().to_string()),
            donor_id: actor.id.clone(),
            title,
            description: optional_text(input.description),
            category: input.category,
            quantity,
            expires_at: input.expires_at,
            pickup_location,
            status: ListingStatus::Available,
            claimed_by: None,
            claimed_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_listing(listing.clone()).await?;

        let context = self.context(actor);
        info!(
            event_name = "lifecycle.listing.created",
            correlation_id = %context.correlation_id,
            listing_id = %listing.id.0,
            donor_id = %listing.donor_id.0,
            "listing created"
        );
        self.audit.emit(
            AuditEvent::new(
                &context,
                "lifecycle.listing.created",
                AuditCategory::Listing,
                AuditOutcome::Success,
            )
            .for_listing(&listing.id)
            .with_metadata("quantity", listing.quantity.amount.to_string())
            .with_metadata("unit", listing.quantity.unit.as_str()),
        );

        Ok(listing)
    }

    pub async fn submit_request(
        &self,
        actor: &Actor,
        input: NewRequest,
    ) -> Result<DonationRequest, ApplicationError> {
        actor.authorize(Action::SubmitRequest)?;

        if let Some(quantity) = input.requested_quantity {
            if !quantity.is_finite() || quantity <= 0.0 {
                return Err(DomainError::Validation(format!(
                    "requested quantity must be a positive number, got {quantity}"
                ))
                .into());
            }
        }

        let listing = self.load_listing(&input.listing_id).await?;
        check_submission(listing.status, &self.policy)?;

        let now = Utc::now();
        let request = DonationRequest {
            id: RequestId(Uuid::new_v4().to_string()),
            listing_id: listing.id.clone(),
            recipient_id: actor.id.clone(),
            status: RequestStatus::Pending,
            message: optional_text(input.message),
            requested_quantity: input.requested_quantity,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_request(request.clone()).await?;

        let context = self.context(actor);
        info!(
            event_name = "lifecycle.request.submitted",
            correlation_id = %context.correlation_id,
            listing_id = %listing.id.0,
            request_id = %request.id.0,
            "donation request submitted"
        );
        self.audit.emit(
            AuditEvent::new(
                &context,
                "lifecycle.request.submitted",
                AuditCategory::Request,
                AuditOutcome::Success,
            )
            .for_listing(&listing.id)
            .for_request(&request.id),
        );

        Ok(request)
    }

    /// Approves a pending request and claims its listing in one commit.
    pub async fn approve_request(
        &self,
        actor: &Actor,
        request_id: &RequestId,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.transition(actor, request_id, RequestEvent::Approve).await
    }

    pub async fn reject_request(
        &self,
        actor: &Actor,
        request_id: &RequestId,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.transition(actor, request_id, RequestEvent::Reject).await
    }

    /// Completes an approved request, completes its listing and writes the
    /// listing's single impact record, all in one commit.
    pub async fn complete_request(
        &self,
        actor: &Actor,
        request_id: &RequestId,
    ) -> Result<TransitionReceipt, ApplicationError> {
        self.transition(actor, request_id, RequestEvent::Complete).await
    }

    /// Moves every available listing whose expiry is at or before `now` to
    /// expired. Donors sweep only their own listings. Listings claimed by a
    /// concurrent approval are skipped.
    pub async fn expire_listings(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Vec<ListingId>, ApplicationError> {
        actor.authorize(Action::ExpireListings)?;

        let filter = ListingFilter {
            status: Some(ListingStatus::Available),
            donor_id: (actor.role == Role::FoodDonor).then(|| actor.id.clone()),
            expires_at_or_before: Some(now),
            ..ListingFilter::default()
        };
        let candidates = self.store.query_listings(&filter).await?;

        let context = self.context(actor);
        let mut expired = Vec::with_capacity(candidates.len());
        let mut first_failure = None;
        for listing in candidates
            .into_iter()
            .filter(|listing| listing.status.can_transition_to(ListingStatus::Expired))
        {
            let commit = TransitionCommit {
                listing: Some(ListingUpdate {
                    id: listing.id.clone(),
                    expected: listing.status,
                    patch: ListingPatch::status(ListingStatus::Expired, now),
                }),
                ..TransitionCommit::default()
            };
            match self.store.commit(commit).await {
                Ok(CommitOutcome::Applied) => {
                    self.audit.emit(
                        AuditEvent::new(
                            &context,
                            "lifecycle.listing.expired",
                            AuditCategory::Listing,
                            AuditOutcome::Success,
                        )
                        .for_listing(&listing.id),
                    );
                    expired.push(listing.id);
                }
                Ok(CommitOutcome::GuardFailed(failure)) => {
                    debug!(
                        correlation_id = %context.correlation_id,
                        listing_id = %listing.id.0,
                        reason = %failure,
                        "listing left unexpired"
                    );
                }
                Err(error) => {
                    warn!(
                        event_name = "lifecycle.listing.expiry_failed",
                        correlation_id = %context.correlation_id,
                        listing_id = %listing.id.0,
                        error = %error,
                        "listing expiry commit failed; continuing sweep"
                    );
                    if first_failure.is_none() {
                        first_failure = Some(error);
                    }
                }
            }
        }

        info!(
            event_name = "lifecycle.listing.expiry_sweep",
            correlation_id = %context.correlation_id,
            expired = expired.len(),
            failed = first_failure.is_some(),
            "expiry sweep finished"
        );
        // A sweep that expired nothing reports why instead of an empty success.
        match first_failure {
            Some(error) if expired.is_empty() => Err(error.into()),
            _ => Ok(expired),
        }
    }

    pub async fn list_listings(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<Listing>, ApplicationError> {
        Ok(self.store.query_listings(filter).await?)
    }

    pub async fn get_listing(&self, id: &ListingId) -> Result<Listing, ApplicationError> {
        self.load_listing(id).await
    }

    /// Requests the actor may see, newest first.
    pub async fn visible_requests(
        &self,
        actor: &Actor,
    ) -> Result<Vec<DonationRequest>, ApplicationError> {
        let filter = match actor.role {
            Role::FoodDonor => {
                RequestFilter { donor_id: Some(actor.id.clone()), ..RequestFilter::default() }
            }
            Role::RecipientOrg => {
                RequestFilter { recipient_id: Some(actor.id.clone()), ..RequestFilter::default() }
            }
            Role::Admin | Role::DataAnalyst => RequestFilter::default(),
        };
        Ok(self.store.query_requests(&filter).await?)
    }

    async fn transition(
        &self,
        actor: &Actor,
        request_id: &RequestId,
        event: RequestEvent,
    ) -> Result<TransitionReceipt, ApplicationError> {
        actor.authorize(event.action())?;

        let mut request = self.load_request(request_id).await?;
        let mut listing = self.load_listing(&request.listing_id).await?;
        let context = self.context(actor);

        let outcome = match plan_transition(request.status, listing.status, event, &self.policy) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.emit_rejected(&context, &request, event, &error.to_string());
                return Err(error.into());
            }
        };

        let now = Utc::now();
        let request_patch = RequestPatch {
            status: outcome.request_to,
            approved_at: (event == RequestEvent::Approve).then_some(now),
            updated_at: now,
        };
        let mut commit = TransitionCommit {
            requests: vec![RequestUpdate {
                id: request.id.clone(),
                expected: outcome.request_from,
                patch: request_patch.clone(),
            }],
            ..TransitionCommit::default()
        };

        let listing_patch = outcome.listing_to.map(|status| {
            let mut patch = ListingPatch::status(status, now);
            for action in &outcome.actions {
                match action {
                    LifecycleAction::ClaimListing => {
                        patch.claimed_by = Some(request.recipient_id.clone());
                        patch.claimed_at = Some(now);
                    }
                    LifecycleAction::CompleteListing => patch.completed_at = Some(now),
                    LifecycleAction::RejectSiblings | LifecycleAction::RecordImpact => {}
                }
            }
            patch
        });
        if let Some(patch) = &listing_patch {
            commit.listing = Some(ListingUpdate {
                id: listing.id.clone(),
                expected: outcome.listing_from,
                patch: patch.clone(),
            });
        }

        let mut rejected_siblings = Vec::new();
        if outcome.actions.contains(&LifecycleAction::RejectSiblings) {
            let siblings = self
                .store
                .query_requests(&RequestFilter {
                    listing_id: Some(listing.id.clone()),
                    status: Some(RequestStatus::Pending),
                    ..RequestFilter::default()
                })
                .await?;
            for sibling in siblings.into_iter().filter(|sibling| sibling.id != request.id) {
                commit.requests.push(RequestUpdate {
                    id: sibling.id.clone(),
                    expected: RequestStatus::Pending,
                    patch: RequestPatch {
                        status: RequestStatus::Rejected,
                        approved_at: None,
                        updated_at: now,
                    },
                });
                rejected_siblings.push(sibling.id);
            }
        }

        if outcome.actions.contains(&LifecycleAction::RecordImpact) {
            let figures = compute_impact(canonical_mass(listing.quantity))?;
            commit.impact_record = Some(ImpactRecord {
                id: ImpactRecordId(Uuid::new_v4().to_string()),
                donor_id: listing.donor_id.clone(),
                donation_id: listing.id.clone(),
                food_saved_lbs: figures.food_saved_lbs,
                co2_avoided_lbs: figures.co2_avoided_lbs,
                meals_provided: figures.meals_provided,
                recorded_at: now,
            });
        }

        let impact_record = commit.impact_record.clone();
        match self.store.commit(commit).await? {
            CommitOutcome::Applied => {}
            CommitOutcome::GuardFailed(failure) => {
                warn!(
                    event_name = "lifecycle.request.conflict",
                    correlation_id = %context.correlation_id,
                    request_id = %request.id.0,
                    reason = %failure,
                    "guarded commit lost a concurrent update"
                );
                self.emit_rejected(&context, &request, event, &failure.to_string());
                return Err(ApplicationError::Conflict(failure.to_string()));
            }
        }

        request_patch.apply_to(&mut request);
        if let Some(patch) = &listing_patch {
            patch.apply_to(&mut listing);
        }

        let event_name = format!("lifecycle.request.{}", event.as_str());
        info!(
            event_name = %event_name,
            correlation_id = %context.correlation_id,
            request_id = %request.id.0,
            listing_id = %listing.id.0,
            request_status = request.status.as_str(),
            listing_status = listing.status.as_str(),
            "request transition applied"
        );
        let mut audit_event =
            AuditEvent::new(&context, event_name, AuditCategory::Request, AuditOutcome::Success)
                .for_listing(&listing.id)
                .for_request(&request.id)
                .with_metadata("from", outcome.request_from.as_str())
                .with_metadata("to", outcome.request_to.as_str());
        if !rejected_siblings.is_empty() {
            audit_event =
                audit_event.with_metadata("rejected_siblings", rejected_siblings.len().to_string());
        }
        self.audit.emit(audit_event);

        if let Some(record) = &impact_record {
            self.audit.emit(
                AuditEvent::new(
                    &context,
                    "impact.recorded",
                    AuditCategory::Impact,
                    AuditOutcome::Success,
                )
                .for_listing(&listing.id)
                .with_metadata("food_saved_lbs", record.food_saved_lbs.to_string())
                .with_metadata("meals_provided", record.meals_provided.to_string()),
            );
        }

        Ok(TransitionReceipt {
            correlation_id: context.correlation_id,
            outcome,
            request,
            listing,
            impact_record,
            rejected_siblings,
        })
    }

    async fn load_listing(&self, id: &ListingId) -> Result<Listing, ApplicationError> {
        self.store
            .find_listing(id)
            .await?
            .ok_or_else(|| DomainError::NotFound { kind: "listing", id: id.0.clone() }.into())
    }

    async fn load_request(&self, id: &RequestId) -> Result<DonationRequest, ApplicationError> {
        self.store
            .find_request(id)
            .await?
            .ok_or_else(|| DomainError::NotFound { kind: "request", id: id.0.clone() }.into())
    }

    fn context(&self, actor: &Actor) -> AuditContext {
        AuditContext::new(Uuid::new_v4().to_string(), actor.id.0.clone())
    }

    fn emit_rejected(
        &self,
        context: &AuditContext,
        request: &DonationRequest,
        event: RequestEvent,
        reason: &str,
    ) {
        self.audit.emit(
            AuditEvent::new(
                context,
                "lifecycle.request.transition_rejected",
                AuditCategory::Request,
                AuditOutcome::Rejected,
            )
            .for_listing(&request.listing_id)
            .for_request(&request.id)
            .with_metadata("event", event.as_str())
            .with_metadata("error", reason),
        );
    }
}

fn required_text(field: &str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

/// Rejects quantities whose impact figures could never be recorded, so no
/// listing can be claimed and then fail every completion.
fn check_recordable(quantity: Quantity) -> Result<(), DomainError> {
    let too_large = || {
        DomainError::Validation(format!(
            "quantity {} {} is too large to record impact for",
            quantity.amount,
            quantity.unit.as_str()
        ))
    };
    let figures = compute_impact(canonical_mass(quantity)).map_err(|_| too_large())?;
    if !figures.co2_avoided_lbs.is_finite() || figures.meals_provided > i64::MAX as u64 {
        return Err(too_large());
    }
    Ok(())
}
