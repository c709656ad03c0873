use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Weekly,
    Monthly,
    Custom,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Half-open time window `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if start > end {
            return Err(DomainError::Validation(format!(
                "report window start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }

        Ok(Self { start, end })
    }

    /// Resolves the window for a report type. Weekly and monthly windows derive
    /// their end from `start` when none is given; custom windows require one.
    pub fn for_type(
        report_type: ReportType,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, DomainError> {
        let end = match (report_type, end) {
            (_, Some(end)) => end,
            (ReportType::Weekly, None) => start + Duration::days(7),
            (ReportType::Monthly, None) => start.checked_add_months(Months::new(1)).ok_or_else(
                || DomainError::Validation("monthly window end is out of range".to_string()),
            )?,
            (ReportType::Custom, None) => {
                return Err(DomainError::Validation(
                    "custom reports require an explicit end date".to_string(),
                ));
            }
        };

        Self::new(start, end)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    pub fn period_label(&self) -> String {
        format!("{} to {}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub period: String,
    pub total_donations: u64,
    pub total_food_saved_lbs: f64,
    pub total_co2_avoided_lbs: f64,
    pub total_meals_provided: u64,
    pub average_donation_size_lbs: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub created_by: UserId,
    pub report_type: ReportType,
    pub window: ReportWindow,
    pub summary: ReportSummary,
    pub generated_at: DateTime<Utc>,
}
