use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors surfaced to the caller of the hub endpoint.
///
/// Everything except `TopicFetch` and `Internal` is a validation failure
/// and maps to `400 Bad Request` with a plain-text reason.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Content-Type must be application/x-www-form-urlencoded")]
    UnsupportedContentType,

    #[error("malformed form body: {0}")]
    MalformedForm(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{field} is not a valid absolute URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    #[error("hub.lease_seconds is used, but not valid: {0:?}")]
    InvalidLease(String),

    #[error("unknown hub.mode {0:?}")]
    UnknownMode(String),

    #[error("topic fetch failed: {0}")]
    TopicFetch(#[from] CallError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    pub fn status(&self) -> StatusCode {
        match self {
            HubError::TopicFetch(_) => StatusCode::BAD_GATEWAY,
            HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Failure of a single outbound HTTP call made by the hub.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CallError::Timeout
        } else {
            CallError::Transport(err)
        }
    }
}

/// Why an intent verification round-trip was rejected.
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error(transparent)]
    Call(#[from] CallError),

    #[error("callback is not a valid URL: {0}")]
    InvalidCallback(String),

    #[error("response body does not contain the challenge")]
    ChallengeMismatch,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config.json not found in any of {0:?}")]
    NotFound(Vec<PathBuf>),
}
