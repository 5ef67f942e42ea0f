use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::models::datetime;

/// Fallback shown when a rejection carries no usable message field.
pub const DEFAULT_REJECTION_MESSAGE: &str = "request rejected by the backend";

/// Normalized shape of a backend error payload.
///
/// The backend is not consistent about which field carries the
/// human-readable message (`detail`, `error` or `message` depending on the
/// endpoint), and 403 responses on the vote endpoints may additionally carry
/// the election timeline (`start`, `end`). Every branch that inspects a
/// rejection goes through this one struct instead of probing raw JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    pub detail: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl ErrorBody {
    pub fn from_value(value: &serde_json::Value) -> Self {
        match value {
            // Some endpoints reply with a bare string body.
            serde_json::Value::String(text) => ErrorBody {
                message: Some(text.clone()),
                ..ErrorBody::default()
            },
            other => serde_json::from_value(other.clone()).unwrap_or_default(),
        }
    }

    /// Canonical message: `detail` wins over `error` wins over `message`.
    pub fn message(&self) -> &str {
        self.detail
            .as_deref()
            .or(self.error.as_deref())
            .or(self.message.as_deref())
            .unwrap_or(DEFAULT_REJECTION_MESSAGE)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start.as_deref().and_then(datetime::parse)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end.as_deref().and_then(datetime::parse)
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not authenticated")]
    Unauthenticated,
    /// The refresh token was missing or rejected. The session has been
    /// cleared and the caller must log in again.
    #[error("session expired, log in again")]
    SessionExpired,
    #[error("{0}")]
    Validation(String),
    #[error("backend rejected the request ({status}): {}", .body.message())]
    Rejected { status: u16, body: ErrorBody },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed backend response: {0}")]
    Decode(String),
    #[error("file access: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn rejected(status: u16, body: &serde_json::Value) -> Self {
        ApiError::Rejected {
            status,
            body: ErrorBody::from_value(body),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for surfacing to the user verbatim.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { body, .. } => body.message().to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
