//! Resolution and process-lifetime caching of the field encryption key.
//!
//! # Lifecycle
//!
//! 1. An operator creates the key once with `keyctl generate`, which writes a
//!    single line of base64 to the key file.
//! 2. At startup the process builds one [`KeyProvider`] from a [`KeySource`]
//!    and shares it by `Arc` with every [`FieldCipher`](crate::crypto::FieldCipher).
//! 3. The first call to [`KeyProvider::resolve_key`] reads the environment
//!    value or the key file and caches the result. It is never re-read.
//!
//! Because the key is never re-read, replacing the key file under a running
//! process has no effect until restart. Rotate or restore keys only together
//! with a coordinated restart of every process sharing the document store.
//!
//! # Security invariants
//!
//! - Key material is never logged and never appears in `Debug` output.
//! - Cached key bytes are zeroed when the provider is dropped.

pub mod provider;

pub use provider::{KeyBytes, KeyError, KeyProvider, KeySource, KEY_LEN};
