use serde::{Deserialize, Serialize};

use crate::domain::impact::ImpactRecord;
use crate::domain::report::{ReportSummary, ReportWindow};

/// Lifetime sums across every recorded donation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactTotals {
    pub total_donations: u64,
    pub total_food_saved_lbs: f64,
    pub total_co2_avoided_lbs: f64,
    pub total_meals_provided: u64,
}

impl ImpactTotals {
    /// Counts saturate at `u64::MAX` rather than wrapping.
    pub fn from_records(records: &[ImpactRecord]) -> Self {
        records.iter().fold(Self::default(), |mut totals, record| {
            totals.total_donations = totals.total_donations.saturating_add(1);
            totals.total_food_saved_lbs += record.food_saved_lbs;
            totals.total_co2_avoided_lbs += record.co2_avoided_lbs;
            totals.total_meals_provided =
                totals.total_meals_provided.saturating_add(record.meals_provided);
            totals
        })
    }

    pub fn average_donation_size_lbs(&self) -> f64 {
        if self.total_donations == 0 {
            return 0.0;
        }
        self.total_food_saved_lbs / self.total_donations as f64
    }
}

/// Sums the records recorded inside `window`. Records outside it are ignored.
pub fn summarize(records: &[ImpactRecord], window: &ReportWindow) -> ReportSummary {
    let inside: Vec<ImpactRecord> =
        records.iter().filter(|record| window.contains(record.recorded_at)).cloned().collect();
    let totals = ImpactTotals::from_records(&inside);

    ReportSummary {
        period: window.period_label(),
        total_donations: totals.total_donations,
        total_food_saved_lbs: totals.total_food_saved_lbs,
        total_co2_avoided_lbs: totals.total_co2_avoided_lbs,
        total_meals_provided: totals.total_meals_provided,
        average_donation_size_lbs: totals.average_donation_size_lbs(),
    }
}
