use surplus_core::domain::actor::Actor;
use surplus_core::domain::report::{ReportId, ReportType};
use surplus_core::errors::{ApplicationError, DomainError};
use surplus_core::reports::render_text;

use crate::commands::runtime::with_services;
use crate::commands::{parse_instant, CommandResult};

/// Generates and stores a report. Weekly and monthly reports derive their end
/// from `start` when `end` is omitted.
pub fn generate(actor: &Actor, report_type: &str, start: &str, end: Option<&str>) -> CommandResult {
    const COMMAND: &str = "report generate";
    let parsed = (|| -> Result<_, ApplicationError> {
        let report_type = ReportType::parse(report_type).ok_or_else(|| {
            DomainError::Validation(format!(
                "unknown report type `{report_type}` (expected weekly|monthly|custom)"
            ))
        })?;
        let start = parse_instant("start", start)?;
        let end = end.map(|raw| parse_instant("end", raw)).transpose()?;
        Ok((report_type, start, end))
    })();
    let (report_type, start, end) = match parsed {
        Ok(parsed) => parsed,
        Err(error) => return CommandResult::from_application_error(COMMAND, &error),
    };

    with_services(COMMAND, |services| async move {
        match services.reports.generate_for_type(actor, report_type, start, end).await {
            Ok(report) => CommandResult::success_with_data(
                COMMAND,
                format!("report `{}` covers {}", report.id.0, report.summary.period),
                &report,
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

pub fn list() -> CommandResult {
    const COMMAND: &str = "report list";
    with_services(COMMAND, |services| async move {
        match services.reports.list_reports().await {
            Ok(reports) => CommandResult::success_with_data(
                COMMAND,
                format!("{} report(s)", reports.len()),
                &reports,
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

/// Prints the plain-text rendering of a stored report.
pub fn export(report_id: &str) -> CommandResult {
    const COMMAND: &str = "report export";
    let report_id = ReportId(report_id.to_string());
    with_services(COMMAND, |services| async move {
        match services.reports.find_report(&report_id).await {
            Ok(report) => CommandResult { exit_code: 0, output: render_text(&report) },
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}
