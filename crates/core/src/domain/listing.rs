use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Available,
    Claimed,
    Completed,
    Expired,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "available" => Some(Self::Available),
            "claimed" => Some(Self::Claimed),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }

    pub fn can_transition_to(&self, next: ListingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Available, Self::Claimed)
                | (Self::Claimed, Self::Completed)
                | (Self::Available, Self::Expired)
        )
    }
}

/// Unit tag attached to a listing quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityUnit {
    #[serde(rename = "kg")]
    Kilograms,
    #[serde(rename = "lbs")]
    Pounds,
    Servings,
    Items,
}

impl QuantityUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kilograms => "kg",
            Self::Pounds => "lbs",
            Self::Servings => "servings",
            Self::Items => "items",
        }
    }
}

impl std::str::FromStr for QuantityUnit {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kg" | "mass-kg" => Ok(Self::Kilograms),
            "lbs" | "lb" | "mass-lb" => Ok(Self::Pounds),
            "servings" => Ok(Self::Servings),
            "items" => Ok(Self::Items),
            other => Err(DomainError::UnsupportedUnit(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: f64,
    pub unit: QuantityUnit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodCategory {
    Prepared,
    FreshProduce,
    Packaged,
    BakedGoods,
    Other,
}

impl FoodCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepared => "prepared",
            Self::FreshProduce => "fresh_produce",
            Self::Packaged => "packaged",
            Self::BakedGoods => "baked_goods",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "prepared" => Some(Self::Prepared),
            "fresh_produce" => Some(Self::FreshProduce),
            "packaged" => Some(Self::Packaged),
            "baked_goods" => Some(Self::BakedGoods),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Donor-supplied attributes for a new listing, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub title: String,
    pub description: Option<String>,
    pub category: FoodCategory,
    pub amount: f64,
    pub unit: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub pickup_location: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub donor_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub category: FoodCategory,
    pub quantity: Quantity,
    pub expires_at: Option<DateTime<Utc>>,
    pub pickup_location: String,
    pub status: ListingStatus,
    pub claimed_by: Option<UserId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expires_at| expires_at <= now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{FoodCategory, Listing, ListingId, ListingStatus, Quantity, QuantityUnit};
    use crate::domain::actor::UserId;
    use crate::errors::DomainError;

    fn listing(status: ListingStatus) -> Listing {
        let now = Utc::now();
        Listing {
            id: ListingId("LST-1".to_string()),
            donor_id: UserId("donor-1".to_string()),
            title: "Bread".to_string(),
            description: None,
            category: FoodCategory::BakedGoods,
            quantity: Quantity { amount: 4.0, unit: QuantityUnit::Kilograms },
            expires_at: Some(now + Duration::hours(6)),
            pickup_location: "12 Dock St".to_string(),
            status,
            claimed_by: None,
            claimed_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn allows_claim_then_completion() {
        assert!(ListingStatus::Available.can_transition_to(ListingStatus::Claimed));
        assert!(ListingStatus::Claimed.can_transition_to(ListingStatus::Completed));
        assert!(!ListingStatus::Available.can_transition_to(ListingStatus::Completed));
        assert!(!ListingStatus::Available.is_terminal());
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [ListingStatus::Completed, ListingStatus::Expired] {
            for next in [
                ListingStatus::Available,
                ListingStatus::Claimed,
                ListingStatus::Completed,
                ListingStatus::Expired,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal:?} -> {next:?}");
            }
            assert!(terminal.is_terminal());
        }
    }

    #[test]
    fn claimed_listing_cannot_expire() {
        assert!(ListingStatus::Available.can_transition_to(ListingStatus::Expired));
        assert!(!ListingStatus::Claimed.can_transition_to(ListingStatus::Expired));
        assert!(!ListingStatus::Claimed.is_terminal());
    }

    #[test]
    fn expiry_is_observed_not_enforced() {
        let listing = listing(ListingStatus::Available);
        let expires_at = listing.expires_at.expect("fixture sets expiry");
        assert!(!listing.is_past_expiry(expires_at - Duration::minutes(1)));
        assert!(listing.is_past_expiry(expires_at));
        assert_eq!(listing.status, ListingStatus::Available);
    }

    #[test]
    fn unit_tags_parse_with_aliases() {
        assert_eq!("kg".parse::<QuantityUnit>().ok(), Some(QuantityUnit::Kilograms));
        assert_eq!("mass-lb".parse::<QuantityUnit>().ok(), Some(QuantityUnit::Pounds));
        assert_eq!(" Servings ".parse::<QuantityUnit>().ok(), Some(QuantityUnit::Servings));
        let error = "crates".parse::<QuantityUnit>().expect_err("unknown unit");
        assert_eq!(error, DomainError::UnsupportedUnit("crates".to_string()));
    }
}
