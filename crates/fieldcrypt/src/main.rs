//! `fieldcrypt`: record encryption sidecar entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise structured JSON logging.
//! 3. Resolve the encryption key once; refuse to start without one.
//! 4. Load the entity catalog (built-in or from `ENTITY_CATALOG_PATH`).
//! 5. Build the Axum router and start serving.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use fieldcrypt::config::Config;
use fieldcrypt::crypto::FieldCipher;
use fieldcrypt::key::KeyProvider;
use fieldcrypt::record::{EntityCatalog, RecordCodec};
use fieldcrypt::server::{router, state::AppState};
use fieldcrypt::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "fieldcrypt starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key
    // -----------------------------------------------------------------------
    let keys = Arc::new(KeyProvider::new(cfg.key_source()));
    keys.resolve_key()
        .context("cannot start without a valid encryption key")?;
    info!("encryption key loaded");

    // -----------------------------------------------------------------------
    // 4. Entity catalog
    // -----------------------------------------------------------------------
    let catalog = EntityCatalog::load_or_builtin(cfg.catalog_path().as_deref())
        .context("failed to load entity catalog")?;
    info!(entities = catalog.len(), "entity catalog loaded");

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let codec = RecordCodec::new(FieldCipher::new(keys));
    let state = AppState::new(codec, catalog, cfg.entity_header_name.clone());
    let app = router::build(state);

    let addr: std::net::SocketAddr = ([127, 0, 0, 1], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
