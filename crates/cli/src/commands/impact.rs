use serde::Serialize;

use crate::commands::runtime::with_services;
use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct TotalsView {
    total_donations: u64,
    total_food_saved_lbs: f64,
    total_co2_avoided_lbs: f64,
    total_meals_provided: u64,
    average_donation_size_lbs: f64,
}

/// Lifetime impact across every completed donation.
pub fn totals() -> CommandResult {
    const COMMAND: &str = "impact totals";
    with_services(COMMAND, |services| async move {
        match services.reports.impact_totals().await {
            Ok(totals) => {
                let view = TotalsView {
                    total_donations: totals.total_donations,
                    total_food_saved_lbs: totals.total_food_saved_lbs,
                    total_co2_avoided_lbs: totals.total_co2_avoided_lbs,
                    total_meals_provided: totals.total_meals_provided,
                    average_donation_size_lbs: totals.average_donation_size_lbs(),
                };
                CommandResult::success_with_data(
                    COMMAND,
                    format!("{} completed donation(s)", view.total_donations),
                    &view,
                )
            }
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}
