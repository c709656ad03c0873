use std::fmt::Write;

use crate::domain::report::Report;

/// Plain-text rendering of a generated report.
pub fn render_text(report: &Report) -> String {
    let summary = &report.summary;
    let mut out = String::new();
    let _ = writeln!(out, "Food Waste Reduction Report");
    let _ = writeln!(out, "Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(out, "Type: {}", report.report_type.as_str());
    let _ = writeln!(out, "Period: {}", summary.period);
    let _ = writeln!(out);
    let _ = writeln!(out, "Total Donations: {}", summary.total_donations);
    let _ = writeln!(out, "Food Saved: {:.2} lbs", summary.total_food_saved_lbs);
    let _ = writeln!(out, "CO2 Emissions Avoided: {:.2} lbs", summary.total_co2_avoided_lbs);
    let _ = writeln!(out, "Meals Provided: {}", summary.total_meals_provided);
    let _ = writeln!(out, "Average Donation Size: {:.2} lbs", summary.average_donation_size_lbs);
    out
}
