use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message kind admitted into the history buffer.
pub const DEBT_UPDATE: &str = "debt_update";

// ---------------------------------------------------------------------------
// Wire record
// ---------------------------------------------------------------------------

/// Direction of a debt update, drives the icon and colour on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Positive,
    Negative,
    Neutral,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `debt_update` push notification.
///
/// Serialises with the `type` tag included so a record can be sent back out
/// on the wire unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealTimeUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub country: String,
    pub description: String,
    /// ISO-8601, kept as the sender wrote it.
    pub timestamp: String,
    pub impact: Impact,
}

impl RealTimeUpdate {
    /// Build a `debt_update` record.
    pub fn new(
        country: impl Into<String>,
        description: impl Into<String>,
        timestamp: impl Into<String>,
        impact: Impact,
    ) -> Self {
        Self {
            kind: DEBT_UPDATE.to_string(),
            country: country.into(),
            description: description.into(),
            timestamp: timestamp.into(),
            impact,
        }
    }

    /// Parsed timestamp. RFC 3339 is tried first; an ISO-8601 local time
    /// without an offset is read as UTC. `None` for anything else.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        let ts = self.timestamp.trim();
        if let Ok(t) = DateTime::parse_from_rfc3339(ts) {
            return Some(t.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|t| t.and_utc())
    }

    /// Serialise to the JSON text frame sent over `/ws`.
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for RealTimeUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.impact, self.country, self.description, self.timestamp
        )
    }
}

// ---------------------------------------------------------------------------
// Inbound decoding
// ---------------------------------------------------------------------------

/// Why an inbound text frame could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("invalid debt_update: {0}")]
    InvalidUpdate(String),
}

/// Classification of a decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A well-formed `debt_update`.
    DebtUpdate(RealTimeUpdate),
    /// Any other message kind. Not an error, just filtered out.
    Other(String),
}

/// Decode a text frame.
///
/// The `type` tag is inspected first so that frames of other kinds are
/// filtered regardless of their remaining fields; only `debt_update` frames
/// are held to the full record shape.
pub fn decode_inbound(text: &str) -> Result<Inbound, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let kind = object
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingType)?;

    if kind != DEBT_UPDATE {
        return Ok(Inbound::Other(kind.to_string()));
    }

    serde_json::from_value::<RealTimeUpdate>(value)
        .map(Inbound::DebtUpdate)
        .map_err(|e| DecodeError::InvalidUpdate(e.to_string()))
}
