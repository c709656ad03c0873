use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use tracing::debug;

use surplus_core::domain::actor::UserId;
use surplus_core::domain::impact::{ImpactRecord, ImpactRecordId};
use surplus_core::domain::listing::{
    FoodCategory, Listing, ListingId, ListingStatus, Quantity, QuantityUnit,
};
use surplus_core::domain::report::{Report, ReportId, ReportSummary, ReportType, ReportWindow};
use surplus_core::domain::request::{DonationRequest, RequestId, RequestStatus};
use surplus_core::store::{
    CommitOutcome, DonationStore, GuardFailure, ImpactFilter, ListingFilter, ListingUpdate,
    RequestFilter, RequestUpdate, SortOrder, StoreError, TransitionCommit,
};

use super::{decode_optional_timestamp, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

const LISTING_COLUMNS: &str = "id, donor_id, title, description, category, quantity_amount,
    quantity_unit, expires_at, pickup_location, status, claimed_by, claimed_at, completed_at,
    created_at, updated_at";

const REQUEST_COLUMNS: &str = "r.id, r.listing_id, r.recipient_id, r.status, r.message,
    r.requested_quantity, r.approved_at, r.created_at, r.updated_at";

const IMPACT_COLUMNS: &str =
    "id, donor_id, donation_id, food_saved_lbs, co2_avoided_lbs, meals_provided, recorded_at";

const REPORT_COLUMNS: &str = "id, created_by, report_type, start_date, end_date, period,
    total_donations, total_food_saved_lbs, total_co2_avoided_lbs, total_meals_provided,
    average_donation_size_lbs, generated_at";

/// SQLite-backed [`DonationStore`]. Each [`TransitionCommit`] runs in one
/// transaction whose guarded updates roll back together.
#[derive(Clone)]
pub struct SqlDonationStore {
    pool: DbPool,
}

impl SqlDonationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn store_error(error: sqlx::Error) -> StoreError {
    RepositoryError::from(error).into()
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|error| RepositoryError::Decode(format!("{name}: {error}")))
}

fn order_keyword(order: SortOrder) -> &'static str {
    match order {
        SortOrder::NewestFirst => "DESC",
        SortOrder::OldestFirst => "ASC",
    }
}

fn row_to_listing(row: &SqliteRow) -> Result<Listing, RepositoryError> {
    let category: String = column(row, "category")?;
    let unit: String = column(row, "quantity_unit")?;
    let status: String = column(row, "status")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(Listing {
        id: ListingId(column(row, "id")?),
        donor_id: UserId(column(row, "donor_id")?),
        title: column(row, "title")?,
        description: column(row, "description")?,
        category: FoodCategory::parse(&category)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown category `{category}`")))?,
        quantity: Quantity {
            amount: column(row, "quantity_amount")?,
            unit: unit
                .parse::<QuantityUnit>()
                .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        },
        expires_at: decode_optional_timestamp("expires_at", column(row, "expires_at")?)?,
        pickup_location: column(row, "pickup_location")?,
        status: ListingStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown listing status `{status}`")))?,
        claimed_by: column::<Option<String>>(row, "claimed_by")?.map(UserId),
        claimed_at: decode_optional_timestamp("claimed_at", column(row, "claimed_at")?)?,
        completed_at: decode_optional_timestamp("completed_at", column(row, "completed_at")?)?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

fn row_to_request(row: &SqliteRow) -> Result<DonationRequest, RepositoryError> {
    let status: String = column(row, "status")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(DonationRequest {
        id: RequestId(column(row, "id")?),
        listing_id: ListingId(column(row, "listing_id")?),
        recipient_id: UserId(column(row, "recipient_id")?),
        status: RequestStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status}`")))?,
        message: column(row, "message")?,
        requested_quantity: column(row, "requested_quantity")?,
        approved_at: decode_optional_timestamp("approved_at", column(row, "approved_at")?)?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

fn row_to_impact(row: &SqliteRow) -> Result<ImpactRecord, RepositoryError> {
    let meals: i64 = column(row, "meals_provided")?;
    let recorded_at: String = column(row, "recorded_at")?;

    Ok(ImpactRecord {
        id: ImpactRecordId(column(row, "id")?),
        donor_id: UserId(column(row, "donor_id")?),
        donation_id: ListingId(column(row, "donation_id")?),
        food_saved_lbs: column(row, "food_saved_lbs")?,
        co2_avoided_lbs: column(row, "co2_avoided_lbs")?,
        meals_provided: u64::try_from(meals)
            .map_err(|_| RepositoryError::Decode(format!("negative meals_provided {meals}")))?,
        recorded_at: decode_timestamp("recorded_at", &recorded_at)?,
    })
}

fn row_to_report(row: &SqliteRow) -> Result<Report, RepositoryError> {
    let report_type: String = column(row, "report_type")?;
    let start: String = column(row, "start_date")?;
    let end: String = column(row, "end_date")?;
    let generated_at: String = column(row, "generated_at")?;
    let total_donations: i64 = column(row, "total_donations")?;
    let total_meals: i64 = column(row, "total_meals_provided")?;

    let window = ReportWindow::new(
        decode_timestamp("start_date", &start)?,
        decode_timestamp("end_date", &end)?,
    )
    .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Report {
        id: ReportId(column(row, "id")?),
        created_by: UserId(column(row, "created_by")?),
        report_type: ReportType::parse(&report_type).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown report type `{report_type}`"))
        })?,
        window,
        summary: ReportSummary {
            period: column(row, "period")?,
            total_donations: u64::try_from(total_donations).map_err(|_| {
                RepositoryError::Decode(format!("negative total_donations {total_donations}"))
            })?,
            total_food_saved_lbs: column(row, "total_food_saved_lbs")?,
            total_co2_avoided_lbs: column(row, "total_co2_avoided_lbs")?,
            total_meals_provided: u64::try_from(total_meals).map_err(|_| {
                RepositoryError::Decode(format!("negative total_meals_provided {total_meals}"))
            })?,
            average_donation_size_lbs: column(row, "average_donation_size_lbs")?,
        },
        generated_at: decode_timestamp("generated_at", &generated_at)?,
    })
}

fn to_i64(field: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Decode(format!("{field} {value} overflows i64")))
}

async fn apply_listing_update(
    tx: &mut Transaction<'_, Sqlite>,
    update: &ListingUpdate,
) -> Result<Option<GuardFailure>, StoreError> {
    let patch = &update.patch;
    let result = sqlx::query(
        "UPDATE listing
         SET status = ?,
             claimed_by = COALESCE(?, claimed_by),
             claimed_at = COALESCE(?, claimed_at),
             completed_at = COALESCE(?, completed_at),
             updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(patch.status.as_str())
    .bind(patch.claimed_by.as_ref().map(|id| id.0.clone()))
    .bind(patch.claimed_at.map(encode_timestamp))
    .bind(patch.completed_at.map(encode_timestamp))
    .bind(encode_timestamp(patch.updated_at))
    .bind(&update.id.0)
    .bind(update.expected.as_str())
    .execute(&mut **tx)
    .await
    .map_err(store_error)?;

    if result.rows_affected() == 1 {
        return Ok(None);
    }

    let actual: Option<String> = sqlx::query_scalar("SELECT status FROM listing WHERE id = ?")
        .bind(&update.id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(store_error)?;

    Ok(Some(GuardFailure::Listing {
        id: update.id.clone(),
        expected: update.expected,
        actual: actual.as_deref().and_then(ListingStatus::parse),
    }))
}

async fn apply_request_update(
    tx: &mut Transaction<'_, Sqlite>,
    update: &RequestUpdate,
) -> Result<Option<GuardFailure>, StoreError> {
    let patch = &update.patch;
    let result = sqlx::query(
        "UPDATE donation_request
         SET status = ?, approved_at = COALESCE(?, approved_at), updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(patch.status.as_str())
    .bind(patch.approved_at.map(encode_timestamp))
    .bind(encode_timestamp(patch.updated_at))
    .bind(&update.id.0)
    .bind(update.expected.as_str())
    .execute(&mut **tx)
    .await
    .map_err(store_error)?;

    if result.rows_affected() == 1 {
        return Ok(None);
    }

    let actual: Option<String> =
        sqlx::query_scalar("SELECT status FROM donation_request WHERE id = ?")
            .bind(&update.id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(store_error)?;

    Ok(Some(GuardFailure::Request {
        id: update.id.clone(),
        expected: update.expected,
        actual: actual.as_deref().and_then(RequestStatus::parse),
    }))
}

async fn insert_impact_record(
    tx: &mut Transaction<'_, Sqlite>,
    record: &ImpactRecord,
) -> Result<Option<GuardFailure>, StoreError> {
    let result = sqlx::query(
        "INSERT INTO impact_record (id, donor_id, donation_id, food_saved_lbs, co2_avoided_lbs,
                                    meals_provided, recorded_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(donation_id) DO NOTHING",
    )
    .bind(&record.id.0)
    .bind(&record.donor_id.0)
    .bind(&record.donation_id.0)
    .bind(record.food_saved_lbs)
    .bind(record.co2_avoided_lbs)
    .bind(to_i64("meals_provided", record.meals_provided)?)
    .bind(encode_timestamp(record.recorded_at))
    .execute(&mut **tx)
    .await
    .map_err(store_error)?;

    if result.rows_affected() == 1 {
        return Ok(None);
    }
    Ok(Some(GuardFailure::DuplicateImpact { donation_id: record.donation_id.clone() }))
}

#[async_trait]
impl DonationStore for SqlDonationStore {
    async fn insert_listing(&self, listing: Listing) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO listing (id, donor_id, title, description, category, quantity_amount,
                                  quantity_unit, expires_at, pickup_location, status, claimed_by,
                                  claimed_at, completed_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&listing.id.0)
        .bind(&listing.donor_id.0)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.category.as_str())
        .bind(listing.quantity.amount)
        .bind(listing.quantity.unit.as_str())
        .bind(listing.expires_at.map(encode_timestamp))
        .bind(&listing.pickup_location)
        .bind(listing.status.as_str())
        .bind(listing.claimed_by.as_ref().map(|id| id.0.clone()))
        .bind(listing.claimed_at.map(encode_timestamp))
        .bind(listing.completed_at.map(encode_timestamp))
        .bind(encode_timestamp(listing.created_at))
        .bind(encode_timestamp(listing.updated_at))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn insert_request(&self, request: DonationRequest) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO donation_request (id, listing_id, recipient_id, status, message,
                                           requested_quantity, approved_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.listing_id.0)
        .bind(&request.recipient_id.0)
        .bind(request.status.as_str())
        .bind(&request.message)
        .bind(request.requested_quantity)
        .bind(request.approved_at.map(encode_timestamp))
        .bind(encode_timestamp(request.created_at))
        .bind(encode_timestamp(request.updated_at))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn insert_report(&self, report: Report) -> Result<(), StoreError> {
        let summary = &report.summary;
        sqlx::query(
            "INSERT INTO impact_report (id, created_by, report_type, start_date, end_date, period,
                                        total_donations, total_food_saved_lbs,
                                        total_co2_avoided_lbs, total_meals_provided,
                                        average_donation_size_lbs, generated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&report.id.0)
        .bind(&report.created_by.0)
        .bind(report.report_type.as_str())
        .bind(encode_timestamp(report.window.start))
        .bind(encode_timestamp(report.window.end))
        .bind(&summary.period)
        .bind(to_i64("total_donations", summary.total_donations)?)
        .bind(summary.total_food_saved_lbs)
        .bind(summary.total_co2_avoided_lbs)
        .bind(to_i64("total_meals_provided", summary.total_meals_provided)?)
        .bind(summary.average_donation_size_lbs)
        .bind(encode_timestamp(report.generated_at))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn find_listing(&self, id: &ListingId) -> Result<Option<Listing>, StoreError> {
        let row = sqlx::query(&format!("SELECT {LISTING_COLUMNS} FROM listing WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        match row {
            Some(ref row) => Ok(Some(row_to_listing(row)?)),
            None => Ok(None),
        }
    }

    async fn find_request(&self, id: &RequestId) -> Result<Option<DonationRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM donation_request r WHERE r.id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn find_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError> {
        let row = sqlx::query(&format!("SELECT {REPORT_COLUMNS} FROM impact_report WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        match row {
            Some(ref row) => Ok(Some(row_to_report(row)?)),
            None => Ok(None),
        }
    }

    async fn query_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>, StoreError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {LISTING_COLUMNS} FROM listing WHERE 1 = 1"));
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(donor) = &filter.donor_id {
            builder.push(" AND donor_id = ").push_bind(donor.0.clone());
        }
        if let Some(cutoff) = filter.expires_at_or_before {
            builder
                .push(" AND expires_at IS NOT NULL AND expires_at <= ")
                .push_bind(encode_timestamp(cutoff));
        }
        let order = order_keyword(filter.order);
        builder.push(format!(" ORDER BY created_at {order}, id {order}"));

        let rows = builder.build().fetch_all(&self.pool).await.map_err(store_error)?;
        Ok(rows.iter().map(row_to_listing).collect::<Result<Vec<_>, _>>()?)
    }

    async fn query_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<DonationRequest>, StoreError> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {REQUEST_COLUMNS} FROM donation_request r
             JOIN listing l ON l.id = r.listing_id
             WHERE 1 = 1"
        ));
        if let Some(listing_id) = &filter.listing_id {
            builder.push(" AND r.listing_id = ").push_bind(listing_id.0.clone());
        }
        if let Some(recipient) = &filter.recipient_id {
            builder.push(" AND r.recipient_id = ").push_bind(recipient.0.clone());
        }
        if let Some(donor) = &filter.donor_id {
            builder.push(" AND l.donor_id = ").push_bind(donor.0.clone());
        }
        if let Some(status) = filter.status {
            builder.push(" AND r.status = ").push_bind(status.as_str());
        }
        let order = order_keyword(filter.order);
        builder.push(format!(" ORDER BY r.created_at {order}, r.id {order}"));

        let rows = builder.build().fetch_all(&self.pool).await.map_err(store_error)?;
        Ok(rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()?)
    }

    async fn query_impact_records(
        &self,
        filter: &ImpactFilter,
    ) -> Result<Vec<ImpactRecord>, StoreError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {IMPACT_COLUMNS} FROM impact_record WHERE 1 = 1"));
        if let Some(from) = filter.recorded_from {
            builder.push(" AND recorded_at >= ").push_bind(encode_timestamp(from));
        }
        if let Some(before) = filter.recorded_before {
            builder.push(" AND recorded_at < ").push_bind(encode_timestamp(before));
        }
        if let Some(donor) = &filter.donor_id {
            builder.push(" AND donor_id = ").push_bind(donor.0.clone());
        }
        let order = order_keyword(filter.order);
        builder.push(format!(" ORDER BY recorded_at {order}, id {order}"));

        let rows = builder.build().fetch_all(&self.pool).await.map_err(store_error)?;
        Ok(rows.iter().map(row_to_impact).collect::<Result<Vec<_>, _>>()?)
    }

    async fn query_reports(&self, order: SortOrder) -> Result<Vec<Report>, StoreError> {
        let order = order_keyword(order);
        let rows = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM impact_report ORDER BY generated_at {order}, id {order}"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.iter().map(row_to_report).collect::<Result<Vec<_>, _>>()?)
    }

    async fn commit(&self, commit: TransitionCommit) -> Result<CommitOutcome, StoreError> {
        if commit.is_empty() {
            return Ok(CommitOutcome::Applied);
        }

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let mut failure = None;
        if let Some(update) = &commit.listing {
            failure = apply_listing_update(&mut tx, update).await?;
        }
        for update in &commit.requests {
            if failure.is_some() {
                break;
            }
            failure = apply_request_update(&mut tx, update).await?;
        }
        if let (None, Some(record)) = (&failure, &commit.impact_record) {
            failure = insert_impact_record(&mut tx, record).await?;
        }

        if let Some(failure) = failure {
            tx.rollback().await.map_err(store_error)?;
            debug!(reason = %failure, "transition commit rolled back");
            return Ok(CommitOutcome::GuardFailed(failure));
        }

        tx.commit().await.map_err(store_error)?;
        Ok(CommitOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use surplus_core::audit::InMemoryAuditSink;
    use surplus_core::domain::actor::{Actor, Role};
    use surplus_core::domain::listing::{FoodCategory, ListingStatus, NewListing};
    use surplus_core::domain::report::{ReportId, ReportType};
    use surplus_core::domain::request::RequestStatus;
    use surplus_core::errors::ApplicationError;
    use surplus_core::lifecycle::{DonationLifecycleEngine, LifecyclePolicy, NewRequest};
    use surplus_core::reports::{ReportAggregator, ReportingPolicy};
    use surplus_core::store::{DonationStore, ImpactFilter, ListingFilter, SortOrder, StoreError};

    use super::SqlDonationStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> Arc<SqlDonationStore> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        Arc::new(SqlDonationStore::new(pool))
    }

    fn engine(
        store: Arc<SqlDonationStore>,
    ) -> DonationLifecycleEngine<SqlDonationStore, InMemoryAuditSink> {
        DonationLifecycleEngine::new(store, InMemoryAuditSink::default(), LifecyclePolicy::default())
    }

    fn donor() -> Actor {
        Actor::new("donor-1", Role::FoodDonor)
    }

    fn recipient() -> Actor {
        Actor::new("pantry-1", Role::RecipientOrg)
    }

    fn new_listing(amount: f64, unit: &str) -> NewListing {
        NewListing {
            title: "Catering trays".to_string(),
            description: None,
            category: FoodCategory::Prepared,
            amount,
            unit: unit.to_string(),
            expires_at: Some(Utc::now() + Duration::hours(4)),
            pickup_location: "Hall B loading bay".to_string(),
        }
    }

    fn request_for(listing: &surplus_core::domain::listing::Listing) -> NewRequest {
        NewRequest {
            listing_id: listing.id.clone(),
            message: Some("Can collect at 5pm".to_string()),
            requested_quantity: None,
        }
    }

    #[tokio::test]
    async fn listing_round_trips_through_sqlite() {
        let store = setup().await;
        let engine = engine(store.clone());
        let created = engine.create_listing(&donor(), new_listing(6.5, "servings")).await.expect("create");

        let loaded = store.find_listing(&created.id).await.expect("find").expect("exists");
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.quantity, created.quantity);
        assert_eq!(loaded.category, FoodCategory::Prepared);
        assert_eq!(loaded.status, ListingStatus::Available);
        assert!(loaded.expires_at.is_some());
    }

    #[tokio::test]
    async fn full_lifecycle_persists_paired_transitions() {
        let store = setup().await;
        let engine = engine(store.clone());
        let listing = engine.create_listing(&donor(), new_listing(10.0, "kg")).await.expect("create");
        let request =
            engine.submit_request(&recipient(), request_for(&listing)).await.expect("submit");

        engine.approve_request(&donor(), &request.id).await.expect("approve");
        let claimed = store.find_listing(&listing.id).await.expect("find").expect("exists");
        assert_eq!(claimed.status, ListingStatus::Claimed);
        assert_eq!(claimed.claimed_by.map(|id| id.0), Some("pantry-1".to_string()));
        let approved = store.find_request(&request.id).await.expect("find").expect("exists");
        assert_eq!(approved.status, RequestStatus::Approved);
        assert!(approved.approved_at.is_some());

        engine.complete_request(&recipient(), &request.id).await.expect("complete");
        let completed = store.find_listing(&listing.id).await.expect("find").expect("exists");
        assert_eq!(completed.status, ListingStatus::Completed);
        assert!(completed.completed_at.is_some());

        let records = store.query_impact_records(&ImpactFilter::default()).await.expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].meals_provided, 33);
        assert!((records[0].food_saved_lbs - 22.0462).abs() < 1e-9);
    }

    #[tokio::test]
    async fn second_approval_on_claimed_listing_is_rejected() {
        let store = setup().await;
        let engine = engine(store.clone());
        let listing = engine.create_listing(&donor(), new_listing(3.0, "lbs")).await.expect("create");
        let first = engine.submit_request(&recipient(), request_for(&listing)).await.expect("first");
        let other = Actor::new("pantry-2", Role::RecipientOrg);
        let second = engine.submit_request(&other, request_for(&listing)).await.expect("second");

        engine.approve_request(&donor(), &first.id).await.expect("approve first");
        let error = engine.approve_request(&donor(), &second.id).await.expect_err("second");
        assert!(matches!(error, ApplicationError::Domain(ref domain) if domain.is_invalid_state()));

        let untouched = store.find_request(&second.id).await.expect("find").expect("exists");
        assert_eq!(untouched.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn concurrent_completions_write_one_impact_record() {
        let store = setup().await;
        let engine = Arc::new(engine(store.clone()));
        let listing = engine.create_listing(&donor(), new_listing(2.0, "items")).await.expect("create");
        let request =
            engine.submit_request(&recipient(), request_for(&listing)).await.expect("submit");
        engine.approve_request(&donor(), &request.id).await.expect("approve");

        let mut handles = Vec::new();
        for _ in 0..6 {
            let engine = engine.clone();
            let request_id = request.id.clone();
            handles.push(tokio::spawn(async move {
                engine.complete_request(&Actor::new("pantry-1", Role::RecipientOrg), &request_id).await
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.expect("join").is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        let records = store.query_impact_records(&ImpactFilter::default()).await.expect("records");
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn unknown_listing_reference_is_a_conflict() {
        let store = setup().await;
        let now = Utc::now();
        let error = store
            .insert_request(surplus_core::domain::request::DonationRequest {
                id: surplus_core::domain::request::RequestId("REQ-orphan".to_string()),
                listing_id: surplus_core::domain::listing::ListingId("missing".to_string()),
                recipient_id: surplus_core::domain::actor::UserId("pantry-1".to_string()),
                status: RequestStatus::Pending,
                message: None,
                requested_quantity: None,
                approved_at: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect_err("foreign key");
        assert!(matches!(error, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn expiry_sweep_and_listing_filters() {
        let store = setup().await;
        let engine = engine(store.clone());
        let mut stale = new_listing(1.0, "kg");
        stale.expires_at = Some(Utc::now() - Duration::minutes(30));
        let stale = engine.create_listing(&donor(), stale).await.expect("stale");
        engine.create_listing(&donor(), new_listing(1.0, "kg")).await.expect("fresh");

        let expired = engine.expire_listings(&donor(), Utc::now()).await.expect("sweep");
        assert_eq!(expired, vec![stale.id.clone()]);

        let available = store
            .query_listings(&ListingFilter {
                status: Some(ListingStatus::Available),
                ..ListingFilter::default()
            })
            .await
            .expect("available");
        assert_eq!(available.len(), 1);

        let newest_first = store.query_listings(&ListingFilter::default()).await.expect("all");
        assert_eq!(newest_first.len(), 2);
        assert!(newest_first[0].created_at >= newest_first[1].created_at);
    }

    #[tokio::test]
    async fn oversized_quantities_never_reach_the_database() {
        let store = setup().await;
        let engine = engine(store.clone());

        let error = engine
            .create_listing(&donor(), new_listing(1e19, "lbs"))
            .await
            .expect_err("meals would not fit an INTEGER column");
        assert_eq!(error.error_class(), "validation");

        let listings = store.query_listings(&ListingFilter::default()).await.expect("listings");
        assert!(listings.is_empty());
    }

    #[tokio::test]
    async fn reports_are_generated_and_persisted_from_sql_records() {
        let store = setup().await;
        let engine = engine(store.clone());
        for amount in [10.0, 20.0, 30.0] {
            let listing = engine.create_listing(&donor(), new_listing(amount, "lbs")).await.expect("create");
            let request =
                engine.submit_request(&recipient(), request_for(&listing)).await.expect("submit");
            engine.approve_request(&donor(), &request.id).await.expect("approve");
            engine.complete_request(&recipient(), &request.id).await.expect("complete");
        }

        let aggregator = ReportAggregator::new(
            store.clone(),
            InMemoryAuditSink::default(),
            ReportingPolicy::default(),
        );
        let analyst = Actor::new("analyst-1", Role::DataAnalyst);
        let start = Utc::now() - Duration::days(1);
        let report = aggregator
            .generate_report(&analyst, ReportType::Custom, start, Utc::now() + Duration::days(1))
            .await
            .expect("report");

        assert_eq!(report.summary.total_donations, 3);
        assert!((report.summary.total_food_saved_lbs - 60.0).abs() < 1e-9);
        assert!((report.summary.average_donation_size_lbs - 20.0).abs() < 1e-9);

        let stored = store.query_reports(SortOrder::NewestFirst).await.expect("reports");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, report.id);
        assert_eq!(stored[0].summary.total_meals_provided, report.summary.total_meals_provided);

        let found = store.find_report(&report.id).await.expect("find").expect("report stored");
        assert_eq!(found.report_type, ReportType::Custom);
        assert_eq!(found.summary.period, report.summary.period);
        let missing = store.find_report(&ReportId("RPT-missing".to_string())).await.expect("find");
        assert!(missing.is_none());

        let empty_start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let empty = aggregator
            .generate_report(&analyst, ReportType::Weekly, empty_start, empty_start + Duration::days(7))
            .await
            .expect("empty report");
        assert_eq!(empty.summary.total_donations, 0);
        assert_eq!(empty.summary.average_donation_size_lbs, 0.0);
    }
}
