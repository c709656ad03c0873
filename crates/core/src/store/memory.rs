use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use crate::domain::impact::ImpactRecord;
use crate::domain::listing::{Listing, ListingId};
use crate::domain::report::{Report, ReportId};
use crate::domain::request::{DonationRequest, RequestId};

use super::{
    CommitOutcome, DonationStore, GuardFailure, ImpactFilter, ListingFilter, RequestFilter,
    SortOrder, StoreError, TransitionCommit,
};

#[derive(Default)]
struct MemoryState {
    listings: HashMap<String, Listing>,
    requests: HashMap<String, DonationRequest>,
    impact_records: Vec<ImpactRecord>,
    reports: Vec<Report>,
}

/// Process-local store. Every commit runs under one write lock, which gives the
/// all-or-nothing semantics the SQL store gets from a transaction.
#[derive(Default)]
pub struct InMemoryDonationStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl InMemoryDonationStore {
    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

fn sort_by_time<T, K: Ord>(items: &mut [T], order: SortOrder, key: impl Fn(&T) -> K) {
    items.sort_by_key(|item| key(item));
    if order == SortOrder::NewestFirst {
        items.reverse();
    }
}

#[async_trait::async_trait]
impl DonationStore for InMemoryDonationStore {
    async fn insert_listing(&self, listing: Listing) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.listings.contains_key(&listing.id.0) {
            return Err(StoreError::Conflict(format!("listing `{}` already exists", listing.id.0)));
        }
        state.listings.insert(listing.id.0.clone(), listing);
        Ok(())
    }

    async fn insert_request(&self, request: DonationRequest) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !state.listings.contains_key(&request.listing_id.0) {
            return Err(StoreError::Conflict(format!(
                "request `{}` references unknown listing `{}`",
                request.id.0, request.listing_id.0
            )));
        }
        if state.requests.contains_key(&request.id.0) {
            return Err(StoreError::Conflict(format!("request `{}` already exists", request.id.0)));
        }
        state.requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn insert_report(&self, report: Report) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.reports.iter().any(|existing| existing.id == report.id) {
            return Err(StoreError::Conflict(format!("report `{}` already exists", report.id.0)));
        }
        state.reports.push(report);
        Ok(())
    }

    async fn find_listing(&self, id: &ListingId) -> Result<Option<Listing>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.listings.get(&id.0).cloned())
    }

    async fn find_request(&self, id: &RequestId) -> Result<Option<DonationRequest>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn find_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.reports.iter().find(|report| &report.id == id).cloned())
    }

    async fn query_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut listings: Vec<Listing> = state
            .listings
            .values()
            .filter(|listing| filter.status.map(|status| listing.status == status).unwrap_or(true))
            .filter(|listing| {
                filter.donor_id.as_ref().map(|donor| &listing.donor_id == donor).unwrap_or(true)
            })
            .filter(|listing| {
                filter
                    .expires_at_or_before
                    .map(|cutoff| listing.expires_at.map(|at| at <= cutoff).unwrap_or(false))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        sort_by_time(&mut listings, filter.order, |listing| {
            (listing.created_at, listing.id.0.clone())
        });
        Ok(listings)
    }

    async fn query_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<DonationRequest>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut requests: Vec<DonationRequest> = state
            .requests
            .values()
            .filter(|request| {
                filter.listing_id.as_ref().map(|id| &request.listing_id == id).unwrap_or(true)
            })
            .filter(|request| {
                filter.recipient_id.as_ref().map(|id| &request.recipient_id == id).unwrap_or(true)
            })
            .filter(|request| filter.status.map(|status| request.status == status).unwrap_or(true))
            .filter(|request| match &filter.donor_id {
                Some(donor) => state
                    .listings
                    .get(&request.listing_id.0)
                    .map(|listing| &listing.donor_id == donor)
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();
        sort_by_time(&mut requests, filter.order, |request| {
            (request.created_at, request.id.0.clone())
        });
        Ok(requests)
    }

    async fn query_impact_records(
        &self,
        filter: &ImpactFilter,
    ) -> Result<Vec<ImpactRecord>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut records: Vec<ImpactRecord> =
            state.impact_records.iter().filter(|record| filter.matches(record)).cloned().collect();
        sort_by_time(&mut records, filter.order, |record| (record.recorded_at, record.id.0.clone()));
        Ok(records)
    }

    async fn query_reports(&self, order: SortOrder) -> Result<Vec<Report>, StoreError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut reports = state.reports.clone();
        sort_by_time(&mut reports, order, |report| (report.generated_at, report.id.0.clone()));
        Ok(reports)
    }

    async fn commit(&self, commit: TransitionCommit) -> Result<CommitOutcome, StoreError> {
        self.check_available()?;
        let mut state = self.state.write().await;

        if let Some(update) = &commit.listing {
            let actual = state.listings.get(&update.id.0).map(|listing| listing.status);
            if actual != Some(update.expected) {
                return Ok(CommitOutcome::GuardFailed(GuardFailure::Listing {
                    id: update.id.clone(),
                    expected: update.expected,
                    actual,
                }));
            }
        }
        for update in &commit.requests {
            let actual = state.requests.get(&update.id.0).map(|request| request.status);
            if actual != Some(update.expected) {
                return Ok(CommitOutcome::GuardFailed(GuardFailure::Request {
                    id: update.id.clone(),
                    expected: update.expected,
                    actual,
                }));
            }
        }
        if let Some(record) = &commit.impact_record {
            if state.impact_records.iter().any(|existing| existing.donation_id == record.donation_id)
            {
                return Ok(CommitOutcome::GuardFailed(GuardFailure::DuplicateImpact {
                    donation_id: record.donation_id.clone(),
                }));
            }
        }

        if let Some(update) = &commit.listing {
            if let Some(listing) = state.listings.get_mut(&update.id.0) {
                update.patch.apply_to(listing);
            }
        }
        for update in &commit.requests {
            if let Some(request) = state.requests.get_mut(&update.id.0) {
                update.patch.apply_to(request);
            }
        }
        if let Some(record) = commit.impact_record {
            state.impact_records.push(record);
        }

        Ok(CommitOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::InMemoryDonationStore;
    use crate::domain::actor::UserId;
    use crate::domain::impact::{ImpactRecord, ImpactRecordId};
    use crate::domain::listing::{
        FoodCategory, Listing, ListingId, ListingStatus, Quantity, QuantityUnit,
    };
    use crate::domain::request::{DonationRequest, RequestId, RequestStatus};
    use crate::store::{
        CommitOutcome, DonationStore, GuardFailure, ImpactFilter, ListingPatch, ListingUpdate,
        RequestFilter, RequestPatch, RequestUpdate, SortOrder, StoreError, TransitionCommit,
    };

    fn listing(id: &str, donor: &str) -> Listing {
        let now = Utc::now();
        Listing {
            id: ListingId(id.to_string()),
            donor_id: UserId(donor.to_string()),
            title: "Apples".to_string(),
            description: None,
            category: FoodCategory::FreshProduce,
            quantity: Quantity { amount: 12.0, unit: QuantityUnit::Pounds },
            expires_at: None,
            pickup_location: "Market Hall".to_string(),
            status: ListingStatus::Available,
            claimed_by: None,
            claimed_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(id: &str, listing_id: &str) -> DonationRequest {
        let now = Utc::now();
        DonationRequest {
            id: RequestId(id.to_string()),
            listing_id: ListingId(listing_id.to_string()),
            recipient_id: UserId("shelter-1".to_string()),
            status: RequestStatus::Pending,
            message: None,
            requested_quantity: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn approve_commit(request_id: &str, listing_id: &str) -> TransitionCommit {
        let now = Utc::now();
        TransitionCommit {
            listing: Some(ListingUpdate {
                id: ListingId(listing_id.to_string()),
                expected: ListingStatus::Available,
                patch: ListingPatch::status(ListingStatus::Claimed, now),
            }),
            requests: vec![RequestUpdate {
                id: RequestId(request_id.to_string()),
                expected: RequestStatus::Pending,
                patch: RequestPatch {
                    status: RequestStatus::Approved,
                    approved_at: Some(now),
                    updated_at: now,
                },
            }],
            impact_record: None,
        }
    }

    #[tokio::test]
    async fn failed_guard_leaves_every_record_untouched() {
        let store = InMemoryDonationStore::default();
        store.insert_listing(listing("L-1", "donor-1")).await.expect("listing");
        store.insert_request(request("R-1", "L-1")).await.expect("request 1");
        store.insert_request(request("R-2", "L-1")).await.expect("request 2");

        let mut commit = approve_commit("R-1", "L-1");
        commit.requests.push(RequestUpdate {
            id: RequestId("R-2".to_string()),
            expected: RequestStatus::Approved,
            patch: RequestPatch {
                status: RequestStatus::Completed,
                approved_at: None,
                updated_at: Utc::now(),
            },
        });

        let outcome = store.commit(commit).await.expect("commit runs");
        assert!(matches!(outcome, CommitOutcome::GuardFailed(GuardFailure::Request { .. })));

        let listing = store.find_listing(&ListingId("L-1".to_string())).await.expect("find");
        assert_eq!(listing.expect("listing exists").status, ListingStatus::Available);
        let request = store.find_request(&RequestId("R-1".to_string())).await.expect("find");
        assert_eq!(request.expect("request exists").status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn second_commit_with_same_guard_conflicts() {
        let store = InMemoryDonationStore::default();
        store.insert_listing(listing("L-1", "donor-1")).await.expect("listing");
        store.insert_request(request("R-1", "L-1")).await.expect("request");

        let first = store.commit(approve_commit("R-1", "L-1")).await.expect("first");
        let second = store.commit(approve_commit("R-1", "L-1")).await.expect("second");

        assert_eq!(first, CommitOutcome::Applied);
        assert!(matches!(
            second,
            CommitOutcome::GuardFailed(GuardFailure::Listing {
                actual: Some(ListingStatus::Claimed),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn duplicate_impact_record_is_refused() {
        let store = InMemoryDonationStore::default();
        store.insert_listing(listing("L-1", "donor-1")).await.expect("listing");
        let record = ImpactRecord {
            id: ImpactRecordId("IMP-1".to_string()),
            donor_id: UserId("donor-1".to_string()),
            donation_id: ListingId("L-1".to_string()),
            food_saved_lbs: 12.0,
            co2_avoided_lbs: 45.6,
            meals_provided: 18,
            recorded_at: Utc::now(),
        };

        let first = TransitionCommit { impact_record: Some(record.clone()), ..Default::default() };
        let mut duplicate = record;
        duplicate.id = ImpactRecordId("IMP-2".to_string());
        let second = TransitionCommit { impact_record: Some(duplicate), ..Default::default() };

        assert_eq!(store.commit(first).await.expect("first"), CommitOutcome::Applied);
        assert!(matches!(
            store.commit(second).await.expect("second"),
            CommitOutcome::GuardFailed(GuardFailure::DuplicateImpact { .. })
        ));
        let records =
            store.query_impact_records(&ImpactFilter::default()).await.expect("query records");
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn request_queries_filter_by_donor_through_listing() {
        let store = InMemoryDonationStore::default();
        store.insert_listing(listing("L-1", "donor-1")).await.expect("listing 1");
        store.insert_listing(listing("L-2", "donor-2")).await.expect("listing 2");
        store.insert_request(request("R-1", "L-1")).await.expect("request 1");
        store.insert_request(request("R-2", "L-2")).await.expect("request 2");

        let requests = store
            .query_requests(&RequestFilter {
                donor_id: Some(UserId("donor-2".to_string())),
                ..RequestFilter::default()
            })
            .await
            .expect("query");

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id.0, "R-2");
    }

    #[tokio::test]
    async fn impact_range_is_half_open_and_ordered() {
        let store = InMemoryDonationStore::default();
        let start = Utc::now();
        for (index, offset) in [0_i64, 5, 10].into_iter().enumerate() {
            let donation = format!("L-{index}");
            store.insert_listing(listing(&donation, "donor-1")).await.expect("listing");
            let record = ImpactRecord {
                id: ImpactRecordId(format!("IMP-{index}")),
                donor_id: UserId("donor-1".to_string()),
                donation_id: ListingId(donation),
                food_saved_lbs: 1.0,
                co2_avoided_lbs: 3.8,
                meals_provided: 1,
                recorded_at: start + Duration::minutes(offset),
            };
            let commit = TransitionCommit { impact_record: Some(record), ..Default::default() };
            store.commit(commit).await.expect("commit");
        }

        let records = store
            .query_impact_records(&ImpactFilter {
                recorded_from: Some(start),
                recorded_before: Some(start + Duration::minutes(10)),
                order: SortOrder::OldestFirst,
                ..ImpactFilter::default()
            })
            .await
            .expect("query");

        let ids: Vec<&str> = records.iter().map(|record| record.id.0.as_str()).collect();
        assert_eq!(ids, vec!["IMP-0", "IMP-1"]);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryDonationStore::default();
        store.set_unavailable(true);
        let error = store.insert_listing(listing("L-1", "donor-1")).await.expect_err("down");
        assert!(matches!(error, StoreError::Unavailable(_)));
    }
}
