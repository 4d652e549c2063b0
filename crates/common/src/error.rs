//! Error type surfaced by the record service.

use thiserror::Error;

/// Failures a caller of the record service can see.
///
/// Field-level decryption failures are not errors here: the value is passed
/// through and its path listed in the response instead.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing entity header or unknown entity type. → 400
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No usable encryption key could be resolved. → 503
    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::KeyUnavailable(_) => 503,
        }
    }

    /// Short machine-readable code placed in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::KeyUnavailable(_) => "key_unavailable",
        }
    }

    /// Caller-safe description, without the category prefix of `Display`.
    pub fn message(&self) -> &str {
        match self {
            ServiceError::BadRequest(m) | ServiceError::KeyUnavailable(m) => m,
        }
    }
}
