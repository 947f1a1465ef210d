//! Jobs API error types.

use thiserror::Error;

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SourceError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn unexpected_status(status: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            status,
            body: body.into(),
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
