pub mod aggregator;
pub mod export;
pub mod summary;

pub use aggregator::{ReportAggregator, ReportingPolicy};
pub use export::render_text;
pub use summary::{summarize, ImpactTotals};
