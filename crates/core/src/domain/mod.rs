pub mod actor;
pub mod impact;
pub mod listing;
pub mod report;
pub mod request;
