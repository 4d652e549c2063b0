//! Structured logging for the record service.
//!
//! # Telemetry invariants
//!
//! - **No field values or key material** may appear in any log field. Log
//!   lengths, reasons and paths instead.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   overrides it when set.

pub mod init;

pub use init::init_telemetry;
