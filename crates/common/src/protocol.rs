//! JSON bodies exchanged with the record service.
//!
//! A record is one flat business entity taken from the document store, e.g. a
//! customer with `phone`, `email`, `address` and a `branches` list.

use serde::{Deserialize, Serialize};

/// A single record: field name → JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Encrypt / decrypt endpoints
// ---------------------------------------------------------------------------

/// Request body for `POST /records/encrypt` and `POST /records/decrypt`.
///
/// The entity type named in the `X-Entity-Type` header selects which fields of
/// `record` are protected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRequest {
    pub record: Record,
}

/// Response body for both record endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    /// The transformed record.
    pub record: Record,
    /// Paths of envelope values that could not be opened (decrypt only). Those
    /// values are returned unchanged in `record`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub undecryptable: Vec<String>,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether the encryption key has been resolved and cached.
    pub key_ready: bool,
    /// Number of entity types in the field catalog.
    pub entities_loaded: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_request_parses_nested_branches() {
        let body = json!({
            "record": {
                "name": "Acme",
                "phone": "03-1111-2222",
                "branches": [{"phone": "06-3333-4444"}]
            }
        });
        let req: RecordRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.record["phone"], "03-1111-2222");
        assert!(req.record["branches"].is_array());
    }

    #[test]
    fn undecryptable_omitted_when_empty() {
        let resp = RecordResponse {
            record: Record::new(),
            undecryptable: Vec::new(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("undecryptable"));

        let decoded: RecordResponse = serde_json::from_str(r#"{"record":{}}"#).unwrap();
        assert!(decoded.undecryptable.is_empty());
    }

    #[test]
    fn error_response_new() {
        let e = ErrorResponse::new("bad_request", "missing X-Entity-Type header");
        assert_eq!(e.code, "bad_request");
        assert!(e.message.contains("X-Entity-Type"));
    }
}
