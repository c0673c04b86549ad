use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Standard error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            status: "error".to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Update API error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    NotFound,
    MethodNotAllowed,
    UpgradeRequired,
    PayloadTooLarge,
    InvalidPayload(String),
    UnsupportedType(String),
    InternalError,
}

impl ApiError {
    pub fn to_code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::UpgradeRequired => "UPGRADE_REQUIRED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn to_message(&self) -> String {
        match self {
            Self::NotFound => "No such route".to_string(),
            Self::MethodNotAllowed => "Method not allowed on this route".to_string(),
            Self::UpgradeRequired => "This endpoint only speaks WebSocket".to_string(),
            Self::PayloadTooLarge => "Request body exceeds the size limit".to_string(),
            Self::InvalidPayload(reason) => format!("Invalid update payload: {}", reason),
            Self::UnsupportedType(kind) => {
                format!("Only debt_update can be published, got {}", kind)
            }
            Self::InternalError => "An internal error occurred".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedType(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.to_code(), &self.to_message())
    }
}
