use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::listing::ListingId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImpactRecordId(pub String);

/// Derived impact of one completed donation. Written once, never updated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactRecord {
    pub id: ImpactRecordId,
    pub donor_id: UserId,
    pub donation_id: ListingId,
    pub food_saved_lbs: f64,
    pub co2_avoided_lbs: f64,
    pub meals_provided: u64,
    pub recorded_at: DateTime<Utc>,
}
