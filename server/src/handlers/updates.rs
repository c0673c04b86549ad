use anyhow::Result;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{Request, StatusCode, header};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use super::json_response::{HttpResponse, deliver_error_json, deliver_serialized_json, deliver_success_json};
use crate::AppState;
use shared::channel::HISTORY_CAPACITY;
use shared::types::{ApiError, Inbound, RealTimeUpdate, decode_inbound};

/// Largest body accepted by `POST /api/updates`.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct RecentUpdates {
    count: usize,
    updates: Vec<RealTimeUpdate>,
}

/// `?limit=N`, clamped to the history capacity. Unparsable values fall back to
/// the full capacity.
pub fn parse_limit(query: Option<&str>) -> usize {
    query
        .and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "limit")
                .and_then(|(_, value)| value.parse::<usize>().ok())
        })
        .unwrap_or(HISTORY_CAPACITY)
        .min(HISTORY_CAPACITY)
}

/// GET /api/updates
pub async fn get_recent(req: Request<hyper::body::Incoming>, state: AppState) -> Result<HttpResponse> {
    let limit = parse_limit(req.uri().query());
    let updates = state.hub.recent(limit).await;
    debug!("Returning {} recent updates (limit {})", updates.len(), limit);

    deliver_serialized_json(
        &RecentUpdates {
            count: updates.len(),
            updates,
        },
        StatusCode::OK,
    )
}

/// What a publish request body turned out to be.
#[derive(Debug, PartialEq)]
pub enum PublishOutcome {
    Accepted(RealTimeUpdate),
    Rejected(ApiError),
}

/// Classify a request body. Only well-formed `debt_update` objects are
/// publishable.
pub fn classify_body(body: &[u8]) -> PublishOutcome {
    let text = match std::str::from_utf8(body) {
        Ok(text) => text,
        Err(_) => {
            return PublishOutcome::Rejected(ApiError::InvalidPayload("body is not UTF-8".into()));
        }
    };

    match decode_inbound(text) {
        Ok(Inbound::DebtUpdate(update)) => PublishOutcome::Accepted(update),
        Ok(Inbound::Other(kind)) => PublishOutcome::Rejected(ApiError::UnsupportedType(kind)),
        Err(e) => PublishOutcome::Rejected(ApiError::InvalidPayload(e.to_string())),
    }
}

/// POST /api/updates
pub async fn post_update(req: Request<hyper::body::Incoming>, state: AppState) -> Result<HttpResponse> {
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_BYTES) {
        return deliver_error_json(&ApiError::PayloadTooLarge);
    }

    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return deliver_error_json(&ApiError::PayloadTooLarge);
        }
        Err(e) => {
            return deliver_error_json(&ApiError::InvalidPayload(format!("failed to read body: {}", e)));
        }
    };

    match classify_body(&body) {
        PublishOutcome::Accepted(update) => {
            info!("Accepted published update for {}", update.country);
            let delivered_to = state.hub.publish(update).await;
            deliver_success_json(Some(json!({ "delivered_to": delivered_to })), StatusCode::ACCEPTED)
        }
        PublishOutcome::Rejected(error) => deliver_error_json(&error),
    }
}
