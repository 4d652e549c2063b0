//! AES-256-GCM encryption and decryption of individual string fields.
//!
//! Every call to [`FieldCipher::encrypt`] draws a fresh 96-bit nonce from the
//! OS CSPRNG, so sealing the same plaintext twice yields two different
//! envelopes. GCM must never see a repeated nonce under one key; do not add a
//! deterministic mode here.

use std::sync::Arc;

use aes_gcm::{
    aead::{generic_array::GenericArray, rand_core::RngCore, AeadInPlace, KeyInit, OsRng},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::warn;

use crate::key::{KeyBytes, KeyError, KeyProvider};

/// Byte length of an AES-GCM nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// Smallest decoded payload that can hold a nonce, a tag and one ciphertext byte.
pub const MIN_PAYLOAD_LEN: usize = NONCE_LEN + TAG_LEN + 1;

/// Literal prefix that marks a value as an envelope rather than plaintext.
pub const ENVELOPE_PREFIX: &str = "enc:v1:";

/// Reasons an envelope could not be opened.
///
/// None of these are surfaced through [`FieldCipher::decrypt`]; they are logged
/// and reported by [`FieldCipher::decrypt_detailed`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("value does not carry the envelope prefix")]
    MissingPrefix,

    #[error("envelope payload is not valid base64")]
    InvalidBase64,

    #[error("envelope payload too short: {0} bytes (minimum {MIN_PAYLOAD_LEN})")]
    TooShort(usize),

    /// Wrong key or tampered bytes.
    #[error("envelope failed authentication")]
    Authentication,

    #[error("decrypted value is not valid UTF-8")]
    NotUtf8,
}

/// A parsed envelope: `nonce ‖ tag ‖ ciphertext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encode to the stored form `enc:v1:<base64(nonce ‖ tag ‖ ciphertext)>`.
    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(NONCE_LEN + TAG_LEN + self.ciphertext.len());
        payload.extend_from_slice(&self.nonce);
        payload.extend_from_slice(&self.tag);
        payload.extend_from_slice(&self.ciphertext);
        format!("{ENVELOPE_PREFIX}{}", STANDARD.encode(payload))
    }

    /// Parse the stored form back into its parts.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvelopeError`] if the prefix is missing, the payload is
    /// not base64, or the payload is shorter than [`MIN_PAYLOAD_LEN`].
    pub fn parse(value: &str) -> Result<Self, EnvelopeError> {
        let encoded = value
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or(EnvelopeError::MissingPrefix)?;
        let payload = STANDARD
            .decode(encoded)
            .map_err(|_| EnvelopeError::InvalidBase64)?;
        if payload.len() < MIN_PAYLOAD_LEN {
            return Err(EnvelopeError::TooShort(payload.len()));
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&payload[..NONCE_LEN]);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&payload[NONCE_LEN..NONCE_LEN + TAG_LEN]);

        Ok(Self {
            nonce,
            tag,
            ciphertext: payload[NONCE_LEN + TAG_LEN..].to_vec(),
        })
    }
}

/// Outcome of [`FieldCipher::decrypt_detailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decryption {
    /// The envelope opened successfully.
    Decrypted(String),
    /// The value was not an envelope (legacy plaintext or empty) and is returned as-is.
    PassthroughLegacy(String),
    /// The value looked like an envelope but could not be opened.
    Failed {
        original: String,
        reason: EnvelopeError,
    },
}

impl Decryption {
    /// The value a read path should use: the plaintext, or the input unchanged.
    pub fn into_value(self) -> String {
        match self {
            Decryption::Decrypted(v) | Decryption::PassthroughLegacy(v) => v,
            Decryption::Failed { original, .. } => original,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Decryption::Failed { .. })
    }
}

/// Returns `true` if `value` carries the envelope prefix.
pub fn is_envelope(value: &str) -> bool {
    value.starts_with(ENVELOPE_PREFIX)
}

/// Seals and opens single string values with the process key.
///
/// Cheap to clone; all clones share one [`KeyProvider`].
#[derive(Clone, Debug)]
pub struct FieldCipher {
    keys: Arc<KeyProvider>,
}

impl FieldCipher {
    pub fn new(keys: Arc<KeyProvider>) -> Self {
        Self { keys }
    }

    /// The provider this cipher draws its key from.
    pub fn keys(&self) -> &KeyProvider {
        &self.keys
    }

    /// Encrypt `plaintext` into an envelope.
    ///
    /// Empty input and values that are already envelopes are returned
    /// unchanged, so running a migration pass twice never double-wraps.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if the key cannot be resolved.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, KeyError> {
        if plaintext.is_empty() || is_envelope(plaintext) {
            return Ok(plaintext.to_owned());
        }
        let key = self.keys.resolve_key()?;
        Ok(seal(key, plaintext.as_bytes())?.encode())
    }

    /// Decrypt `value`, falling back to returning it unchanged.
    ///
    /// Non-envelope values pass through without consulting the key. Envelopes
    /// that fail to parse or authenticate are logged and also returned
    /// unchanged; callers that need to tell the cases apart should use
    /// [`decrypt_detailed`](Self::decrypt_detailed).
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if the value is an envelope and the key cannot be resolved.
    pub fn decrypt(&self, value: &str) -> Result<String, KeyError> {
        Ok(self.decrypt_detailed(value)?.into_value())
    }

    /// Decrypt `value`, reporting whether it was opened, passed through, or failed.
    pub fn decrypt_detailed(&self, value: &str) -> Result<Decryption, KeyError> {
        if value.is_empty() || !is_envelope(value) {
            return Ok(Decryption::PassthroughLegacy(value.to_owned()));
        }
        let key = self.keys.resolve_key()?;

        let opened = Envelope::parse(value).and_then(|envelope| open(key, &envelope));
        match opened {
            Ok(plaintext) => Ok(Decryption::Decrypted(plaintext)),
            Err(reason) => {
                warn!(reason = %reason, len = value.len(), "field decryption failed; returning stored value");
                Ok(Decryption::Failed {
                    original: value.to_owned(),
                    reason,
                })
            }
        }
    }
}

fn build_cipher(key: &KeyBytes) -> Result<Aes256Gcm, KeyError> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| KeyError::InvalidLength(key.as_bytes().len()))
}

fn seal(key: &KeyBytes, plaintext: &[u8]) -> Result<Envelope, KeyError> {
    let cipher = build_cipher(key)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut ciphertext = plaintext.to_vec();
    // Only fails for plaintexts beyond GCM's ~64 GiB limit.
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut ciphertext)
        .map_err(|_| KeyError::InvalidLength(key.as_bytes().len()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(Envelope {
        nonce,
        tag: tag_bytes,
        ciphertext,
    })
}

fn open(key: &KeyBytes, envelope: &Envelope) -> Result<String, EnvelopeError> {
    let cipher = build_cipher(key).map_err(|_| EnvelopeError::Authentication)?;

    let mut buffer = envelope.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(&envelope.nonce),
            b"",
            &mut buffer,
            GenericArray::from_slice(&envelope.tag),
        )
        .map_err(|_| EnvelopeError::Authentication)?;

    String::from_utf8(buffer).map_err(|_| EnvelopeError::NotUtf8)
}
