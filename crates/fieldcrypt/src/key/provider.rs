//! [`KeyProvider`]: resolve-once cache for the active 256-bit key.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Configuration errors raised while resolving the key.
///
/// These are always fatal to the encrypt/decrypt call that triggered them.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Neither the environment nor the key file supplied a key.
    #[error("encryption key not configured: set ENCRYPTION_KEY or create the key file")]
    NotConfigured,

    /// A key was supplied but does not decode to exactly [`KEY_LEN`] bytes.
    #[error("encryption key has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),

    /// A key was supplied but is not valid base64.
    #[error("encryption key is not valid base64")]
    InvalidEncoding,

    /// The key file exists but could not be read.
    #[error("failed to read key file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// Dropping the buffer overwrites it with zeroes.
pub struct KeyBytes(Box<[u8; KEY_LEN]>);

impl KeyBytes {
    /// Generate a fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut buf = Box::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut buf[..]);
        Self(buf)
    }

    /// Copy `bytes` into a new key buffer.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidLength`] unless `bytes` is exactly [`KEY_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidLength(bytes.len()));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Decode a key from its base64 text form. Surrounding whitespace is ignored.
    pub fn from_base64(text: &str) -> Result<Self, KeyError> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(text.trim())
                .map_err(|_| KeyError::InvalidEncoding)?,
        );
        Self::from_slice(&decoded)
    }

    /// Encode the key as standard base64 (the key file format).
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0[..])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Zeroize for KeyBytes {
    fn zeroize(&mut self) {
        self.0[..].zeroize();
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for KeyBytes {}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// Where the key comes from, in precedence order.
#[derive(Debug, Clone)]
pub struct KeySource {
    /// Base64 key supplied through the environment (`ENCRYPTION_KEY`).
    pub env_key: Option<String>,
    /// Key file holding one line of base64.
    pub key_file: PathBuf,
}

impl KeySource {
    /// A source backed only by a key file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            env_key: None,
            key_file: path.into(),
        }
    }
}

/// The single active key for this process.
///
/// Construct once at startup and share by `Arc`. Resolution happens on the
/// first [`resolve_key`](Self::resolve_key) call; afterwards the cached key is
/// returned without touching the environment or disk, so concurrent readers
/// never contend.
#[derive(Debug)]
pub struct KeyProvider {
    source: Option<KeySource>,
    cached: OnceLock<KeyBytes>,
}

impl KeyProvider {
    /// Create a provider that resolves lazily from `source`.
    pub fn new(source: KeySource) -> Self {
        Self {
            source: Some(source),
            cached: OnceLock::new(),
        }
    }

    /// Create a provider that already holds `key`.
    pub fn from_key(key: KeyBytes) -> Self {
        let cached = OnceLock::new();
        let _ = cached.set(key);
        Self {
            source: None,
            cached,
        }
    }

    /// Returns `true` once a key has been resolved and cached.
    pub fn is_ready(&self) -> bool {
        self.cached.get().is_some()
    }

    /// Return the active key, resolving and caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::NotConfigured`] when no source supplies a key, or
    /// the length/encoding error of the last source that was present but unusable.
    pub fn resolve_key(&self) -> Result<&KeyBytes, KeyError> {
        if let Some(key) = self.cached.get() {
            return Ok(key);
        }
        let source = self.source.as_ref().ok_or(KeyError::NotConfigured)?;
        let key = resolve(source)?;
        Ok(self.cached.get_or_init(|| key))
    }
}

fn resolve(source: &KeySource) -> Result<KeyBytes, KeyError> {
    let mut rejected: Option<KeyError> = None;

    if let Some(text) = source.env_key.as_deref().filter(|t| !t.trim().is_empty()) {
        match KeyBytes::from_base64(text) {
            Ok(key) => {
                debug!("encryption key resolved from environment");
                return Ok(key);
            }
            Err(e) => {
                warn!(error = %e, "ENCRYPTION_KEY is unusable; falling back to key file");
                rejected = Some(e);
            }
        }
    }

    match read_key_file(&source.key_file)? {
        Some(text) => {
            let key = KeyBytes::from_base64(&text)?;
            debug!(path = %source.key_file.display(), "encryption key resolved from key file");
            Ok(key)
        }
        None => Err(rejected.unwrap_or(KeyError::NotConfigured)),
    }
}

/// Read the key file, returning `None` if it is missing or blank.
fn read_key_file(path: &Path) -> Result<Option<String>, KeyError> {
    match std::fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(None),
        Ok(text) => Ok(Some(text.trim().to_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(KeyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wiped_on_drop<T: ZeroizeOnDrop>() {}

    #[test]
    fn key_bytes_zeroize() {
        wiped_on_drop::<KeyBytes>();
        let mut key = KeyBytes::generate();
        assert!(key.as_bytes().iter().any(|&b| b != 0));
        key.zeroize();
        assert_eq!(key.as_bytes(), &[0u8; KEY_LEN]);
    }

    fn write_key_file(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join(".encryption_key");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn env_key_takes_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_key = KeyBytes::generate();
        let env_key = KeyBytes::generate();
        let path = write_key_file(&dir, &file_key.to_base64());

        let provider = KeyProvider::new(KeySource {
            env_key: Some(env_key.to_base64()),
            key_file: path,
        });
        assert_eq!(provider.resolve_key().unwrap().as_bytes(), env_key.as_bytes());
    }

    #[test]
    fn key_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let key = KeyBytes::generate();
        let path = write_key_file(&dir, &format!("  {}\n\n", key.to_base64()));

        let provider = KeyProvider::new(KeySource::file(path));
        assert_eq!(provider.resolve_key().unwrap().as_bytes(), key.as_bytes());
    }

    #[test]
    fn invalid_env_key_falls_back_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = KeyBytes::generate();
        let path = write_key_file(&dir, &key.to_base64());

        let provider = KeyProvider::new(KeySource {
            env_key: Some(STANDARD.encode([7u8; 16])),
            key_file: path,
        });
        assert_eq!(provider.resolve_key().unwrap().as_bytes(), key.as_bytes());
    }

    #[test]
    fn invalid_env_key_without_file_reports_length() {
        let dir = tempfile::tempdir().unwrap();
        let provider = KeyProvider::new(KeySource {
            env_key: Some(STANDARD.encode([7u8; 16])),
            key_file: dir.path().join("missing"),
        });
        assert!(matches!(
            provider.resolve_key(),
            Err(KeyError::InvalidLength(16))
        ));
        assert!(!provider.is_ready());
    }

    #[test]
    fn missing_everything_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let provider = KeyProvider::new(KeySource::file(dir.path().join("missing")));
        assert!(matches!(provider.resolve_key(), Err(KeyError::NotConfigured)));

        let blank = write_key_file(&dir, "   \n");
        let provider = KeyProvider::new(KeySource::file(blank));
        assert!(matches!(provider.resolve_key(), Err(KeyError::NotConfigured)));
    }

    #[test]
    fn wrong_length_file_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_key_file(&dir, &STANDARD.encode([1u8; 31]));
        let provider = KeyProvider::new(KeySource::file(path));
        assert!(matches!(
            provider.resolve_key(),
            Err(KeyError::InvalidLength(31))
        ));
    }

    #[test]
    fn non_base64_file_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_key_file(&dir, "not*base64*at*all");
        let provider = KeyProvider::new(KeySource::file(path));
        assert!(matches!(provider.resolve_key(), Err(KeyError::InvalidEncoding)));
    }

    #[test]
    fn key_is_not_reread_after_first_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let first = KeyBytes::generate();
        let path = write_key_file(&dir, &first.to_base64());
        let provider = KeyProvider::new(KeySource::file(path.clone()));
        provider.resolve_key().unwrap();
        assert!(provider.is_ready());

        // Rotating the file on disk does not affect the running provider.
        std::fs::write(&path, KeyBytes::generate().to_base64()).unwrap();
        assert_eq!(provider.resolve_key().unwrap().as_bytes(), first.as_bytes());

        std::fs::remove_file(&path).unwrap();
        assert_eq!(provider.resolve_key().unwrap().as_bytes(), first.as_bytes());
    }

    #[test]
    fn from_key_is_ready_immediately() {
        let provider = KeyProvider::from_key(KeyBytes::from_slice(&[0x42; KEY_LEN]).unwrap());
        assert!(provider.is_ready());
        assert_eq!(provider.resolve_key().unwrap().as_bytes(), &[0x42; KEY_LEN]);
    }

    #[test]
    fn base64_round_trip() {
        let key = KeyBytes::generate();
        let text = key.to_base64();
        assert_eq!(text.len(), 44);
        assert_eq!(KeyBytes::from_base64(&text).unwrap().as_bytes(), key.as_bytes());
    }

    #[test]
    fn key_bytes_redacted_in_debug() {
        let key = KeyBytes::from_slice(&[0xFF; KEY_LEN]).unwrap();
        let out = format!("{key:?}");
        assert!(out.contains("REDACTED"));
        assert!(!out.contains("255"));
    }
}
