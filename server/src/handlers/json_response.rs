use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{Response, StatusCode, header};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use tracing::{debug, warn};

use shared::types::ApiError;

pub type HttpResponse = Response<BoxBody<Bytes, Infallible>>;

pub fn empty() -> BoxBody<Bytes, Infallible> {
    Empty::<Bytes>::new().boxed()
}

pub fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, Infallible> {
    Full::new(chunk.into()).boxed()
}

/// Serialize any `Serialize` type and deliver it as a JSON response.
pub fn deliver_serialized_json<T: Serialize>(data: &T, status: StatusCode) -> Result<HttpResponse> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;

    debug!("Delivering serialized JSON response, size: {} bytes", json.len());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(full(json))
        .map_err(|e| anyhow!("Failed to build JSON response: {}", e))
}

/// Deliver an [`ApiError`] as `{"status":"error","code":..,"message":..}`
/// with the status code the error maps to.
pub fn deliver_error_json(error: &ApiError) -> Result<HttpResponse> {
    let status = error.status();
    warn!(
        "Delivering error JSON: {} - {} ({})",
        status.as_u16(),
        error.to_code(),
        error.to_message()
    );

    deliver_serialized_json(&error.to_response(), status)
}

/// Delivers a success JSON response with optional data.
pub fn deliver_success_json<T: Serialize>(data: Option<T>, status: StatusCode) -> Result<HttpResponse> {
    let body = match data {
        Some(d) => json!({
            "status": "success",
            "data": d
        }),
        None => json!({
            "status": "success"
        }),
    };

    deliver_serialized_json(&body, status)
}

/// Plain-text response, used for the Prometheus exposition.
pub fn deliver_text(body: String, content_type: &str) -> Result<HttpResponse> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(full(body))
        .map_err(|e| anyhow!("Failed to build text response: {}", e))
}

/// Last-resort 500 for when building a JSON response itself failed.
pub fn internal_error() -> HttpResponse {
    let mut res = Response::new(full(r#"{"status":"error","code":"INTERNAL_ERROR","message":"An internal error occurred"}"#));
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    res.headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    res
}
