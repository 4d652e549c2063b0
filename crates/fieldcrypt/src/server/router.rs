//! Axum router construction.

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::{handlers, middleware, state::AppState};

/// `/records/*`: the two directions of the record codec.
fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/encrypt", post(handlers::encrypt))
        .route("/decrypt", post(handlers::decrypt))
}

/// The sidecar's full router: record routes, readiness, JSON 404 fallback.
pub fn build(state: AppState) -> Router {
    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(middleware::MAX_BODY_BYTES))
        // Innermost: `Timeout` needs a `Default` response body.
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT));

    Router::new()
        .nest("/records", record_routes())
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(layers)
        .with_state(state)
}
