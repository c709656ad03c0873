use chrono::Utc;
use surplus_core::domain::actor::{Actor, UserId};
use surplus_core::domain::listing::{ListingStatus, NewListing};
use surplus_core::errors::DomainError;
use surplus_core::store::ListingFilter;

use crate::commands::runtime::with_services;
use crate::commands::{parse_instant, CommandResult};

pub fn create(actor: &Actor, input: NewListing) -> CommandResult {
    const COMMAND: &str = "listing create";
    with_services(COMMAND, |services| async move {
        match services.engine.create_listing(actor, input).await {
            Ok(listing) => CommandResult::success_with_data(
                COMMAND,
                format!("listing `{}` is available", listing.id.0),
                &listing,
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

pub fn list(status: Option<&str>, donor: Option<&str>) -> CommandResult {
    const COMMAND: &str = "listing list";
    let status = match status.map(|raw| {
        ListingStatus::parse(raw).ok_or_else(|| {
            DomainError::Validation(format!(
                "unknown listing status `{raw}` (expected available|claimed|completed|expired)"
            ))
        })
    }) {
        Some(Err(error)) => return CommandResult::from_application_error(COMMAND, &error.into()),
        Some(Ok(status)) => Some(status),
        None => None,
    };
    let filter = ListingFilter {
        status,
        donor_id: donor.map(|donor| UserId(donor.to_string())),
        ..ListingFilter::default()
    };

    with_services(COMMAND, |services| async move {
        match services.engine.list_listings(&filter).await {
            Ok(listings) => CommandResult::success_with_data(
                COMMAND,
                format!("{} listing(s)", listings.len()),
                &listings,
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

/// Expires overdue available listings as of `now`, defaulting to the current time.
pub fn expire(actor: &Actor, now: Option<&str>) -> CommandResult {
    const COMMAND: &str = "listing expire";
    let now = match now.map(|raw| parse_instant("now", raw)).transpose() {
        Ok(now) => now.unwrap_or_else(Utc::now),
        Err(error) => return CommandResult::from_application_error(COMMAND, &error),
    };

    with_services(COMMAND, |services| async move {
        match services.engine.expire_listings(actor, now).await {
            Ok(expired) => {
                let ids: Vec<&str> = expired.iter().map(|id| id.0.as_str()).collect();
                CommandResult::success_with_data(
                    COMMAND,
                    format!("expired {} listing(s)", ids.len()),
                    &ids,
                )
            }
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}
