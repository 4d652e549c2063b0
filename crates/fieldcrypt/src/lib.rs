//! Field-level encryption for personally-identifying values stored in a flat
//! JSON document store.
//!
//! The layers, leaves first:
//! - [`key`]: resolves the single 256-bit key once per process.
//! - [`crypto`]: seals one string into an `enc:v1:` envelope and opens it again.
//! - [`record`]: applies the cipher to the declared fields of whole records.
//!
//! The `fieldcrypt` binary wraps these in a small HTTP sidecar; the `keyctl`
//! binary in this workspace owns key generation, backup and restore.

pub mod config;
pub mod crypto;
pub mod key;
pub mod record;
pub mod server;
pub mod telemetry;
