use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::{Action, Actor};
use crate::domain::report::{Report, ReportId, ReportType, ReportWindow};
use crate::errors::{ApplicationError, DomainError};
use crate::reports::summary::{summarize, ImpactTotals};
use crate::store::{DonationStore, ImpactFilter, SortOrder};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPolicy {
    pub max_window_days: u32,
}

impl Default for ReportingPolicy {
    fn default() -> Self {
        Self { max_window_days: 366 }
    }
}

pub struct ReportAggregator<S, A> {
    store: Arc<S>,
    audit: A,
    policy: ReportingPolicy,
}

impl<S, A> ReportAggregator<S, A>
where
    S: DonationStore,
    A: AuditSink,
{
    pub fn new(store: Arc<S>, audit: A, policy: ReportingPolicy) -> Self {
        Self { store, audit, policy }
    }

    /// Sums impact records in `[start, end)` and persists the resulting report.
    pub async fn generate_report(
        &self,
        actor: &Actor,
        report_type: ReportType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Report, ApplicationError> {
        actor.authorize(Action::GenerateReport)?;
        let window = ReportWindow::new(start, end)?;
        self.generate_for_window(actor, report_type, window).await
    }

    /// Like [`Self::generate_report`], deriving the end for weekly and monthly
    /// reports when none is given.
    pub async fn generate_for_type(
        &self,
        actor: &Actor,
        report_type: ReportType,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Report, ApplicationError> {
        actor.authorize(Action::GenerateReport)?;
        let window = ReportWindow::for_type(report_type, start, end)?;
        self.generate_for_window(actor, report_type, window).await
    }

    pub async fn list_reports(&self) -> Result<Vec<Report>, ApplicationError> {
        Ok(self.store.query_reports(SortOrder::NewestFirst).await?)
    }

    pub async fn find_report(&self, id: &ReportId) -> Result<Report, ApplicationError> {
        self.store
            .find_report(id)
            .await?
            .ok_or_else(|| DomainError::NotFound { kind: "report", id: id.0.clone() }.into())
    }

    pub async fn impact_totals(&self) -> Result<ImpactTotals, ApplicationError> {
        let records = self.store.query_impact_records(&ImpactFilter::default()).await?;
        Ok(ImpactTotals::from_records(&records))
    }

    async fn generate_for_window(
        &self,
        actor: &Actor,
        report_type: ReportType,
        window: ReportWindow,
    ) -> Result<Report, ApplicationError> {
        let limit = Duration::days(i64::from(self.policy.max_window_days));
        if window.length() > limit {
            return Err(DomainError::Validation(format!(
                "report window spans {} days; the limit is {}",
                window.length().num_days(),
                self.policy.max_window_days
            ))
            .into());
        }

        let filter = ImpactFilter {
            recorded_from: Some(window.start),
            recorded_before: Some(window.end),
            order: SortOrder::OldestFirst,
            ..ImpactFilter::default()
        };
        let records = self.store.query_impact_records(&filter).await?;
        let summary = summarize(&records, &window);

        let report = Report {
            id: ReportId(Uuid::new_v4().to_string()),
            created_by: actor.id.clone(),
            report_type,
            window,
            summary,
            generated_at: Utc::now(),
        };
        self.store.insert_report(report.clone()).await?;

        let context = AuditContext::new(Uuid::new_v4().to_string(), actor.id.0.clone());
        info!(
            event_name = "reports.generated",
            correlation_id = %context.correlation_id,
            report_id = %report.id.0,
            report_type = report_type.as_str(),
            total_donations = report.summary.total_donations,
            "impact report generated"
        );
        self.audit.emit(
            AuditEvent::new(&context, "reports.generated", AuditCategory::Report, AuditOutcome::Success)
                .with_metadata("report_id", report.id.0.clone())
                .with_metadata("period", report.summary.period.clone()),
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{ReportAggregator, ReportingPolicy};
    use crate::audit::InMemoryAuditSink;
    use crate::domain::actor::{Actor, Role, UserId};
    use crate::domain::impact::{ImpactRecord, ImpactRecordId};
    use crate::domain::listing::{
        FoodCategory, Listing, ListingId, ListingStatus, Quantity, QuantityUnit,
    };
    use crate::domain::report::{ReportId, ReportType};
    use crate::errors::ApplicationError;
    use crate::store::{DonationStore, InMemoryDonationStore, TransitionCommit};

    async fn seed(store: &InMemoryDonationStore, index: usize, lbs: f64, day: u32) {
        let at = Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap();
        let listing_id = ListingId(format!("L-{index}"));
        store
            .insert_listing(Listing {
                id: listing_id.clone(),
                donor_id: UserId("donor-1".to_string()),
                title: "Produce".to_string(),
                description: None,
                category: FoodCategory::FreshProduce,
                quantity: Quantity { amount: lbs, unit: QuantityUnit::Pounds },
                expires_at: None,
                pickup_location: "Depot".to_string(),
                status: ListingStatus::Completed,
                claimed_by: None,
                claimed_at: None,
                completed_at: Some(at),
                created_at: at,
                updated_at: at,
            })
            .await
            .expect("listing");
        let record = ImpactRecord {
            id: ImpactRecordId(format!("IMP-{index}")),
            donor_id: UserId("donor-1".to_string()),
            donation_id: listing_id,
            food_saved_lbs: lbs,
            co2_avoided_lbs: lbs * 3.8,
            meals_provided: (lbs * 1.5).floor() as u64,
            recorded_at: at,
        };
        store
            .commit(TransitionCommit { impact_record: Some(record), ..TransitionCommit::default() })
            .await
            .expect("record");
    }

    fn analyst() -> Actor {
        Actor::new("analyst-1", Role::DataAnalyst)
    }

    fn aggregator(
        store: Arc<InMemoryDonationStore>,
    ) -> ReportAggregator<InMemoryDonationStore, InMemoryAuditSink> {
        ReportAggregator::new(store, InMemoryAuditSink::default(), ReportingPolicy::default())
    }

    #[tokio::test]
    async fn weekly_report_sums_the_window_and_is_persisted() {
        let store = Arc::new(InMemoryDonationStore::default());
        seed(&store, 1, 10.0, 1).await;
        seed(&store, 2, 20.0, 3).await;
        seed(&store, 3, 30.0, 5).await;
        seed(&store, 4, 99.0, 20).await;
        let aggregator = aggregator(store.clone());

        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let report = aggregator
            .generate_for_type(&analyst(), ReportType::Weekly, start, None)
            .await
            .expect("weekly report");

        assert_eq!(report.summary.total_donations, 3);
        assert!((report.summary.total_food_saved_lbs - 60.0).abs() < 1e-9);
        assert!((report.summary.average_donation_size_lbs - 20.0).abs() < 1e-9);
        assert_eq!(report.window.end, start + Duration::days(7));

        let reports = aggregator.list_reports().await.expect("list");
        assert_eq!(reports.len(), 1);
        assert_eq!(aggregator.find_report(&report.id).await.expect("find").id, report.id);
        let missing = aggregator
            .find_report(&ReportId("no-such-report".to_string()))
            .await
            .expect_err("unknown report");
        assert_eq!(missing.error_class(), "not_found");

        let totals = aggregator.impact_totals().await.expect("totals");
        assert_eq!(totals.total_donations, 4);
    }

    #[tokio::test]
    async fn empty_window_yields_zero_average() {
        let store = Arc::new(InMemoryDonationStore::default());
        let aggregator = aggregator(store);
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let report = aggregator
            .generate_report(&analyst(), ReportType::Custom, start, start + Duration::days(3))
            .await
            .expect("empty report");
        assert_eq!(report.summary.total_donations, 0);
        assert_eq!(report.summary.average_donation_size_lbs, 0.0);
    }

    #[tokio::test]
    async fn rejects_inverted_and_oversized_windows() {
        let aggregator = aggregator(Arc::new(InMemoryDonationStore::default()));
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let error = aggregator
            .generate_report(&analyst(), ReportType::Custom, start, start - Duration::days(1))
            .await
            .expect_err("inverted");
        assert_eq!(error.error_class(), "validation");

        let error = aggregator
            .generate_report(&analyst(), ReportType::Custom, start, start + Duration::days(400))
            .await
            .expect_err("too long");
        assert_eq!(error.error_class(), "validation");
    }

    #[tokio::test]
    async fn only_analysts_and_admins_generate_reports() {
        let aggregator = aggregator(Arc::new(InMemoryDonationStore::default()));
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let donor = Actor::new("donor-1", Role::FoodDonor);

        let error = aggregator
            .generate_report(&donor, ReportType::Custom, start, start + Duration::days(1))
            .await
            .expect_err("donor");
        assert!(matches!(error, ApplicationError::Domain(_)));
        assert_eq!(error.error_class(), "unauthorized");

        let admin = Actor::new("root", Role::Admin);
        aggregator
            .generate_report(&admin, ReportType::Custom, start, start + Duration::days(1))
            .await
            .expect("admin");
    }
}
