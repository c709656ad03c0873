pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod impact;
pub mod lifecycle;
pub mod reports;
pub mod store;

pub use domain::actor::{Action, Actor, Role, UserId};
pub use domain::impact::{ImpactRecord, ImpactRecordId};
pub use domain::listing::{
    FoodCategory, Listing, ListingId, ListingStatus, NewListing, Quantity, QuantityUnit,
};
pub use domain::report::{Report, ReportId, ReportSummary, ReportType, ReportWindow};
pub use domain::request::{DonationRequest, RequestId, RequestStatus};
pub use errors::{ApplicationError, DomainError};
pub use impact::{compute_impact, to_canonical_mass, ImpactFigures};
pub use lifecycle::{DonationLifecycleEngine, LifecyclePolicy, NewRequest, TransitionReceipt};
pub use reports::{render_text, ImpactTotals, ReportAggregator, ReportingPolicy};
pub use store::{DonationStore, InMemoryDonationStore, StoreError};
