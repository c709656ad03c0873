use serde::Serialize;
use surplus_core::domain::actor::Actor;
use surplus_core::domain::listing::ListingId;
use surplus_core::domain::request::RequestId;
use surplus_core::errors::ApplicationError;
use surplus_core::lifecycle::{NewRequest, TransitionReceipt};

use crate::commands::runtime::with_services;
use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct TransitionView<'a> {
    correlation_id: &'a str,
    request_id: &'a str,
    request_status: &'static str,
    listing_id: &'a str,
    listing_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    impact: Option<ImpactView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    rejected_siblings: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct ImpactView {
    food_saved_lbs: f64,
    co2_avoided_lbs: f64,
    meals_provided: u64,
}

impl<'a> From<&'a TransitionReceipt> for TransitionView<'a> {
    fn from(receipt: &'a TransitionReceipt) -> Self {
        Self {
            correlation_id: &receipt.correlation_id,
            request_id: &receipt.request.id.0,
            request_status: receipt.request.status.as_str(),
            listing_id: &receipt.listing.id.0,
            listing_status: receipt.listing.status.as_str(),
            impact: receipt.impact_record.as_ref().map(|record| ImpactView {
                food_saved_lbs: record.food_saved_lbs,
                co2_avoided_lbs: record.co2_avoided_lbs,
                meals_provided: record.meals_provided,
            }),
            rejected_siblings: receipt.rejected_siblings.iter().map(|id| id.0.as_str()).collect(),
        }
    }
}

pub fn submit(
    actor: &Actor,
    listing_id: &str,
    message: Option<String>,
    requested_quantity: Option<f64>,
) -> CommandResult {
    const COMMAND: &str = "request submit";
    let input = NewRequest {
        listing_id: ListingId(listing_id.to_string()),
        message,
        requested_quantity,
    };

    with_services(COMMAND, |services| async move {
        match services.engine.submit_request(actor, input).await {
            Ok(request) => CommandResult::success_with_data(
                COMMAND,
                format!("request `{}` is pending", request.id.0),
                &request,
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

pub fn approve(actor: &Actor, request_id: &str) -> CommandResult {
    const COMMAND: &str = "request approve";
    let request_id = RequestId(request_id.to_string());
    with_services(COMMAND, |services| async move {
        render(COMMAND, services.engine.approve_request(actor, &request_id).await)
    })
}

pub fn reject(actor: &Actor, request_id: &str) -> CommandResult {
    const COMMAND: &str = "request reject";
    let request_id = RequestId(request_id.to_string());
    with_services(COMMAND, |services| async move {
        render(COMMAND, services.engine.reject_request(actor, &request_id).await)
    })
}

pub fn complete(actor: &Actor, request_id: &str) -> CommandResult {
    const COMMAND: &str = "request complete";
    let request_id = RequestId(request_id.to_string());
    with_services(COMMAND, |services| async move {
        render(COMMAND, services.engine.complete_request(actor, &request_id).await)
    })
}

/// Requests visible to the actor, newest first.
pub fn list(actor: &Actor) -> CommandResult {
    const COMMAND: &str = "request list";
    with_services(COMMAND, |services| async move {
        match services.engine.visible_requests(actor).await {
            Ok(requests) => CommandResult::success_with_data(
                COMMAND,
                format!("{} request(s)", requests.len()),
                &requests,
            ),
            Err(error) => CommandResult::from_application_error(COMMAND, &error),
        }
    })
}

fn render(command: &str, result: Result<TransitionReceipt, ApplicationError>) -> CommandResult {
    match result {
        Ok(receipt) => CommandResult::success_with_data(
            command,
            format!(
                "request `{}` is {}; listing `{}` is {}",
                receipt.request.id.0,
                receipt.request.status.as_str(),
                receipt.listing.id.0,
                receipt.listing.status.as_str()
            ),
            &TransitionView::from(&receipt),
        ),
        Err(error) => CommandResult::from_application_error(command, &error),
    }
}
