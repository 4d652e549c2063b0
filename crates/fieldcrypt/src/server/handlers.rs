//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{ErrorResponse, HealthResponse, RecordRequest, RecordResponse};
use common::ServiceError;
use tracing::{error, warn};

use super::state::AppState;
use crate::key::KeyError;
use crate::record::EntitySpec;

/// `POST /records/encrypt`: encrypt the protected fields of one record.
///
/// The entity type is taken from the configured header (default
/// `X-Entity-Type`). Values that are already envelopes are left as they are.
pub async fn encrypt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordRequest>,
) -> Response {
    let spec = match entity_spec(&state, &headers) {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    match state.codec.encrypt_fields(&req.record, &spec.fields) {
        Ok(record) => (
            StatusCode::OK,
            Json(RecordResponse {
                record,
                undecryptable: Vec::new(),
            }),
        )
            .into_response(),
        Err(e) => error_response(key_failure(e)),
    }
}

/// `POST /records/decrypt`: decrypt the protected fields of one record.
///
/// Envelopes that fail to open are returned unchanged and listed in
/// `undecryptable`, so the caller can avoid writing them back as if repaired.
pub async fn decrypt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordRequest>,
) -> Response {
    let spec = match entity_spec(&state, &headers) {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    match state.codec.decrypt_fields_detailed(&req.record, &spec.fields) {
        Ok(report) => {
            if !report.failed.is_empty() {
                warn!(
                    failed = report.failed.len(),
                    "record contains undecryptable fields"
                );
            }
            (
                StatusCode::OK,
                Json(RecordResponse {
                    record: report.record,
                    undecryptable: report.failed,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(key_failure(e)),
    }
}

/// `GET /health`: readiness check.
///
/// Returns `200 OK` once the key is resolved, `503 Service Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let key_ready = state.codec.cipher().keys().is_ready();
    let entities_loaded = state.catalog.len();

    let (status_code, status_str) = if key_ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        key_ready,
        entities_loaded,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve the entity spec named by the entity header.
fn entity_spec<'a>(state: &'a AppState, headers: &HeaderMap) -> Result<&'a EntitySpec, ServiceError> {
    let header = state.entity_header_name.as_str();
    let name = headers
        .get(header)
        .ok_or_else(|| ServiceError::BadRequest(format!("missing {header} header")))?
        .to_str()
        .map_err(|_| {
            ServiceError::BadRequest(format!("{header} header contains non-ASCII characters"))
        })?;

    state
        .catalog
        .get(name)
        .map_err(|_| ServiceError::BadRequest(format!("unknown entity type: {name}")))
}

fn key_failure(e: KeyError) -> ServiceError {
    error!(error = %e, "encryption key unavailable");
    ServiceError::KeyUnavailable("encryption key is not configured".into())
}

fn error_response(e: ServiceError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::new(e.code(), e.message()))).into_response()
}
