use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use surplus_core::store::StoreError;

pub mod donation;

pub use donation::SqlDonationStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(sqlx::Error::Database(error))
                if error.is_unique_violation() || error.is_foreign_key_violation() =>
            {
                StoreError::Conflict(error.to_string())
            }
            RepositoryError::Database(error) => StoreError::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
        }
    }
}

/// Fixed-width RFC3339 so that stored timestamps order correctly as text.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}`: {error}")))
}

pub(crate) fn decode_optional_timestamp(
    column: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|raw| decode_timestamp(column, &raw)).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{decode_timestamp, encode_timestamp, RepositoryError};
    use surplus_core::store::StoreError;

    #[test]
    fn encoded_timestamps_sort_lexically() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = whole + chrono::Duration::milliseconds(250);

        assert_eq!(encode_timestamp(whole), "2024-01-01T00:00:00.000000Z");
        assert!(encode_timestamp(whole) < encode_timestamp(later));
        assert_eq!(decode_timestamp("recorded_at", &encode_timestamp(later)).ok(), Some(later));
    }

    #[test]
    fn decode_failures_become_store_decode_errors() {
        let error = decode_timestamp("created_at", "yesterday").expect_err("not rfc3339");
        assert!(matches!(error, RepositoryError::Decode(ref message) if message.contains("created_at")));
        assert!(matches!(StoreError::from(error), StoreError::Decode(_)));
    }

    #[test]
    fn pool_failures_are_reported_as_unavailable() {
        let error = RepositoryError::Database(sqlx::Error::PoolTimedOut);
        assert!(matches!(StoreError::from(error), StoreError::Unavailable(_)));
    }
}
