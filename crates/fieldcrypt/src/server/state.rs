//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::record::{EntityCatalog, RecordCodec};

/// Application state shared across all request handlers.
///
/// Every field is `Arc`-backed, so the per-request clone Axum performs is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Record codec holding the process key.
    pub codec: RecordCodec,
    /// Entity type → protected fields.
    pub catalog: Arc<EntityCatalog>,
    /// Name of the HTTP header identifying the entity type of each request.
    pub entity_header_name: Arc<String>,
}

impl AppState {
    pub fn new(codec: RecordCodec, catalog: EntityCatalog, entity_header_name: String) -> Self {
        Self {
            codec,
            catalog: Arc::new(catalog),
            entity_header_name: Arc::new(entity_header_name),
        }
    }
}
