use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    FoodDonor,
    RecipientOrg,
    DataAnalyst,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::FoodDonor => "food_donor",
            Self::RecipientOrg => "recipient_org",
            Self::DataAnalyst => "data_analyst",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "food_donor" | "donor" => Ok(Self::FoodDonor),
            "recipient_org" | "recipient" => Ok(Self::RecipientOrg),
            "data_analyst" | "analyst" => Ok(Self::DataAnalyst),
            other => Err(DomainError::Validation(format!(
                "unknown role `{other}` (expected admin|food_donor|recipient_org|data_analyst)"
            ))),
        }
    }
}

/// Role-gated operations exposed by the lifecycle engine and report aggregator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateListing,
    ExpireListings,
    SubmitRequest,
    ApproveRequest,
    RejectRequest,
    CompleteRequest,
    GenerateReport,
}

impl Action {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Self::CreateListing | Self::ExpireListings => &[Role::FoodDonor, Role::Admin],
            Self::SubmitRequest | Self::CompleteRequest => &[Role::RecipientOrg, Role::Admin],
            Self::ApproveRequest | Self::RejectRequest => &[Role::FoodDonor, Role::Admin],
            Self::GenerateReport => &[Role::DataAnalyst, Role::Admin],
        }
    }
}

/// Identity and role supplied by the caller for a single operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: UserId(id.into()), role }
    }

    pub fn can(&self, action: Action) -> bool {
        action.allowed_roles().contains(&self.role)
    }

    pub fn authorize(&self, action: Action) -> Result<(), DomainError> {
        if self.can(action) {
            return Ok(());
        }

        Err(DomainError::Unauthorized { role: self.role, action })
    }
}
