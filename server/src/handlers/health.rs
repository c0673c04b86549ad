use anyhow::Result;
use hyper::{Request, StatusCode};

use super::json_response::{HttpResponse, deliver_serialized_json, deliver_text};
use crate::AppState;
use shared::types::ServerStats;

/// GET /health
pub async fn get_health(_req: Request<hyper::body::Incoming>, state: AppState) -> Result<HttpResponse> {
    let feed = state.hub.feed_info().await;
    let stats = {
        let cfg = state.config.read().await;
        ServerStats::build(&cfg, feed, state.started_at)
    };

    deliver_serialized_json(&stats, StatusCode::OK)
}

/// GET /metrics
pub async fn get_metrics(_req: Request<hyper::body::Incoming>, state: AppState) -> Result<HttpResponse> {
    let body = state.metrics.prometheus().await;
    deliver_text(body, "text/plain; version=0.0.4")
}
