//! On-disk key snapshots and their integrity digest.

use std::path::Path;

use chrono::{DateTime, Utc};
use fieldcrypt::key::{KeyBytes, KeyError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// File name prefix of every snapshot in the backup directory.
pub const SNAPSHOT_PREFIX: &str = "key-backup-";
/// File name suffix of every snapshot.
pub const SNAPSHOT_SUFFIX: &str = ".json";
/// File name prefix of the copy taken of the active key before a restore.
pub const PRE_RESTORE_PREFIX: &str = "pre-restore-";

/// Sortable UTC timestamp embedded in file names.
const FILE_TIMESTAMP: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Why a snapshot cannot be trusted.
#[derive(Debug, Error)]
pub enum SnapshotFault {
    #[error("unreadable: {0}")]
    Unreadable(#[from] std::io::Error),

    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("digest mismatch: stored key does not match stored digest")]
    DigestMismatch,

    #[error("stored key is unusable: {0}")]
    InvalidKey(#[source] KeyError),
}

/// One archived copy of the key.
///
/// `digest` detects corruption or tampering of the stored key; it is not a
/// second secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySnapshot {
    /// Key text exactly as it was in the key file (base64).
    pub key: String,
    /// Lowercase hex SHA-256 of `key`.
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub host: String,
    pub runtime: String,
}

impl std::fmt::Debug for KeySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySnapshot")
            .field("key", &"[REDACTED]")
            .field("digest", &self.digest)
            .field("created_at", &self.created_at)
            .field("host", &self.host)
            .field("runtime", &self.runtime)
            .finish()
    }
}

impl KeySnapshot {
    /// Snapshot `key_text` taken at `now` on this host.
    pub fn capture(key_text: &str, now: DateTime<Utc>) -> Self {
        let key = key_text.trim().to_owned();
        Self {
            digest: digest(&key),
            key,
            created_at: now,
            host: host_name(),
            runtime: runtime_description(),
        }
    }

    /// Read and parse the snapshot at `path` without checking it.
    pub fn load(path: &Path) -> Result<Self, SnapshotFault> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Recompute the digest and check the key decodes to a full-length key.
    pub fn check(&self) -> Result<(), SnapshotFault> {
        if digest(&self.key) != self.digest.to_ascii_lowercase() {
            return Err(SnapshotFault::DigestMismatch);
        }
        KeyBytes::from_base64(&self.key).map_err(SnapshotFault::InvalidKey)?;
        Ok(())
    }

    /// [`load`](Self::load) followed by [`check`](Self::check).
    pub fn load_verified(path: &Path) -> Result<Self, SnapshotFault> {
        let snapshot = Self::load(path)?;
        snapshot.check()?;
        Ok(snapshot)
    }
}

/// Lowercase hex SHA-256 of the key text.
pub fn digest(key_text: &str) -> String {
    format!("{:x}", Sha256::digest(key_text.as_bytes()))
}

/// `key-backup-<timestamp>.json`
pub fn snapshot_file_name(now: DateTime<Utc>) -> String {
    format!(
        "{SNAPSHOT_PREFIX}{}{SNAPSHOT_SUFFIX}",
        now.format(FILE_TIMESTAMP)
    )
}

/// `pre-restore-<timestamp>.key`
pub fn pre_restore_file_name(now: DateTime<Utc>) -> String {
    format!("{PRE_RESTORE_PREFIX}{}.key", now.format(FILE_TIMESTAMP))
}

pub fn is_snapshot_file_name(name: &str) -> bool {
    name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(SNAPSHOT_SUFFIX)
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".into())
}

fn runtime_description() -> String {
    format!(
        "{} {} ({}-{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn captured_snapshot_checks_out() {
        let key = KeyBytes::generate().to_base64();
        let snap = KeySnapshot::capture(&format!("{key}\n"), at(1_700_000_000));
        assert_eq!(snap.key, key);
        assert!(snap.check().is_ok());
        assert!(!snap.host.is_empty());
        if let Some(os_host) = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
        {
            assert_eq!(snap.host, os_host);
        }
        assert!(snap.runtime.contains("keyctl"));
    }

    #[test]
    fn altered_key_fails_digest() {
        let mut snap = KeySnapshot::capture(&KeyBytes::generate().to_base64(), at(0));
        let mut bytes = snap.key.clone().into_bytes();
        bytes[3] = if bytes[3] == b'A' { b'B' } else { b'A' };
        snap.key = String::from_utf8(bytes).unwrap();
        assert!(matches!(snap.check(), Err(SnapshotFault::DigestMismatch)));
    }

    #[test]
    fn short_key_with_matching_digest_is_rejected() {
        let short = "c2hvcnQ=";
        let snap = KeySnapshot::capture(short, at(0));
        assert!(matches!(
            snap.check(),
            Err(SnapshotFault::InvalidKey(KeyError::InvalidLength(5)))
        ));
    }

    #[test]
    fn file_names_sort_chronologically() {
        let early = snapshot_file_name(at(1_700_000_000));
        let late = snapshot_file_name(at(1_700_000_001));
        assert!(early < late);
        assert_eq!(early, "key-backup-20231114T221320.000000Z.json");
        assert!(is_snapshot_file_name(&early));
        assert!(!is_snapshot_file_name(&pre_restore_file_name(at(0))));
    }

    #[test]
    fn debug_redacts_key() {
        let key = KeyBytes::generate().to_base64();
        let snap = KeySnapshot::capture(&key, at(0));
        assert!(!format!("{snap:?}").contains(&key));
    }

    #[test]
    fn serialises_expected_fields() {
        let snap = KeySnapshot::capture(&KeyBytes::generate().to_base64(), at(0));
        let value = serde_json::to_value(&snap).unwrap();
        for field in ["key", "digest", "created_at", "host", "runtime"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }
}
