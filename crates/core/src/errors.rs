use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::actor::{Action, Role};
use crate::domain::listing::ListingStatus;
use crate::domain::request::RequestStatus;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unsupported quantity unit `{0}` (expected kg|lbs|servings|items)")]
    UnsupportedUnit(String),
    #[error("impact input {value} is outside the calculator domain (must be finite and >= 0)")]
    ImpactOutOfDomain { value: f64 },
    #[error("invalid listing transition from {from:?} to {to:?}")]
    InvalidListingTransition { from: ListingStatus, to: ListingStatus },
    #[error("invalid request transition from {from:?} to {to:?}")]
    InvalidRequestTransition { from: RequestStatus, to: RequestStatus },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("role {role:?} is not allowed to {action:?}")]
    Unauthorized { role: Role, action: Action },
    #[error("{kind} `{id}` was not found")]
    NotFound { kind: &'static str, id: String },
}

impl DomainError {
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Self::InvalidState(_)
                | Self::InvalidListingTransition { .. }
                | Self::InvalidRequestTransition { .. }
        )
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
    #[error("store failure: {0}")]
    Store(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Conflicts and store failures leave no partial state behind, so the whole
    /// operation may be retried from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Store(_))
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::Validation(_)) => "validation",
            Self::Domain(DomainError::UnsupportedUnit(_)) => "unsupported_unit",
            Self::Domain(DomainError::ImpactOutOfDomain { .. }) => "impact_domain",
            Self::Domain(DomainError::Unauthorized { .. }) => "unauthorized",
            Self::Domain(DomainError::NotFound { .. }) => "not_found",
            Self::Domain(_) => "invalid_state",
            Self::Conflict(_) => "conflict",
            Self::Store(_) => "store",
            Self::Configuration(_) => "config_validation",
        }
    }
}

impl From<ConfigError> for ApplicationError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::Unavailable(message) | StoreError::Decode(message) => Self::Store(message),
        }
    }
}
