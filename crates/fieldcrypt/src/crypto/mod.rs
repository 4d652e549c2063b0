//! AES-256-GCM field encryption primitives.
//!
//! This module knows nothing about records or HTTP. It turns one string into
//! one envelope and back, using the key held by a [`KeyProvider`](crate::key::KeyProvider).
//!
//! # Envelope format
//!
//! ```text
//! enc:v1:<base64-standard(nonce[12] ‖ tag[16] ‖ ciphertext)>
//! ```
//!
//! This string is the only thing ever written to the document store for a
//! protected field. Changing the prefix or the byte layout orphans every value
//! already stored.

pub mod cipher;

pub use cipher::{is_envelope, Decryption, EnvelopeError, FieldCipher, ENVELOPE_PREFIX};
