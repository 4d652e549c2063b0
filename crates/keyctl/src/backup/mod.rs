//! Key snapshot archive: backup, verify, restore.
//!
//! The archive is a directory of immutable, timestamped snapshot files. Each
//! backup appends one snapshot and then prunes the oldest beyond the retention
//! count. Nothing here goes through the field cipher; the manager works on the
//! key file directly and is only ever driven by an operator.
//!
//! # Safety rules
//!
//! - Snapshots and the key slot are only ever written by temp-file + rename.
//! - `restore` re-verifies the chosen snapshot itself; an earlier passing
//!   `verify` is not trusted.
//! - `restore` copies the current key aside before replacing it, so a restore
//!   can itself be undone.

pub mod snapshot;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fieldcrypt::key::{KeyBytes, KeyError};
use thiserror::Error;
use tracing::{info, warn};

use crate::fsutil::{self, PRIVATE_FILE_MODE};
pub use snapshot::{KeySnapshot, SnapshotFault};

/// Snapshots kept when no retention is configured.
pub const DEFAULT_RETENTION: usize = 10;

/// Errors from archive operations. Every variant aborts the operation.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("no active key in {}", .0.display())]
    MissingKey(PathBuf),

    #[error("active key is invalid: {0}")]
    InvalidKey(#[source] KeyError),

    #[error("a key already exists in {}; refusing to overwrite it", .0.display())]
    KeyAlreadyExists(PathBuf),

    #[error("snapshot {} already exists", .0.display())]
    SnapshotExists(PathBuf),

    #[error("pre-restore copy {} already exists", .0.display())]
    PreRestoreCopyExists(PathBuf),

    #[error("no snapshot named {0}")]
    UnknownSnapshot(String),

    /// The snapshot failed verification; nothing was changed.
    #[error("snapshot {file_name} failed verification: {reason}")]
    Integrity {
        file_name: String,
        #[source]
        reason: SnapshotFault,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> BackupError {
    let context = context.into();
    move |source| BackupError::Io { context, source }
}

/// A snapshot file in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub file_name: String,
    pub path: PathBuf,
}

/// Result of a successful backup.
#[derive(Debug)]
pub struct BackupOutcome {
    pub path: PathBuf,
    /// File names of snapshots removed by retention pruning, oldest first.
    pub pruned: Vec<String>,
}

/// Verification result of one snapshot.
#[derive(Debug)]
pub enum SnapshotStatus {
    Valid { created_at: DateTime<Utc> },
    Invalid(SnapshotFault),
}

#[derive(Debug)]
pub struct SnapshotCheck {
    pub file_name: String,
    pub status: SnapshotStatus,
}

/// Per-snapshot results of [`KeyBackupManager::verify`], newest first.
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub checks: Vec<SnapshotCheck>,
}

impl VerifyReport {
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn invalid_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| matches!(c.status, SnapshotStatus::Invalid(_)))
            .count()
    }

    /// `true` when every snapshot verified (vacuously true for an empty archive).
    pub fn all_valid(&self) -> bool {
        self.invalid_count() == 0
    }
}

/// Result of a successful restore.
#[derive(Debug)]
pub struct RestoreOutcome {
    pub restored_from: String,
    /// Copy of the key that was active before the restore, if there was one.
    pub pre_restore_copy: Option<PathBuf>,
}

/// Manages one key slot and its snapshot archive.
#[derive(Debug, Clone)]
pub struct KeyBackupManager {
    key_file: PathBuf,
    backup_dir: PathBuf,
    retention: usize,
}

impl KeyBackupManager {
    pub fn new(key_file: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            key_file: key_file.into(),
            backup_dir: backup_dir.into(),
            retention: retention.max(1),
        }
    }

    pub fn key_file(&self) -> &Path {
        &self.key_file
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshot the active key now.
    pub fn backup(&self) -> Result<BackupOutcome, BackupError> {
        self.backup_at(Utc::now())
    }

    /// Snapshot the active key, stamping the snapshot with `now`.
    ///
    /// # Errors
    ///
    /// Fails if the key file is missing, empty or invalid, if a snapshot with
    /// the same timestamp exists, or on any I/O error.
    pub fn backup_at(&self, now: DateTime<Utc>) -> Result<BackupOutcome, BackupError> {
        let key_text = self
            .read_active_key()?
            .ok_or_else(|| BackupError::MissingKey(self.key_file.clone()))?;
        KeyBytes::from_base64(&key_text).map_err(BackupError::InvalidKey)?;

        let snapshot = KeySnapshot::capture(&key_text, now);
        fsutil::ensure_private_dir(&self.backup_dir)
            .map_err(io_err(format!("failed to create {}", self.backup_dir.display())))?;

        let path = self.backup_dir.join(snapshot::snapshot_file_name(now));
        if path.exists() {
            return Err(BackupError::SnapshotExists(path));
        }
        let body = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| io_err("failed to serialise snapshot")(e.into()))?;
        fsutil::atomic_write(&path, &body, PRIVATE_FILE_MODE)
            .map_err(io_err(format!("failed to write {}", path.display())))?;
        info!(snapshot = %path.display(), "key snapshot written");

        let pruned = self.prune(&path)?;
        Ok(BackupOutcome { path, pruned })
    }

    /// Snapshots in the archive, newest first.
    pub fn list(&self) -> Result<Vec<SnapshotEntry>, BackupError> {
        let dir = match std::fs::read_dir(&self.backup_dir) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(io_err(format!("failed to list {}", self.backup_dir.display()))(e))
            }
        };

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry.map_err(io_err("failed to read backup directory entry"))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if snapshot::is_snapshot_file_name(&file_name) && entry.path().is_file() {
                entries.push(SnapshotEntry {
                    path: entry.path(),
                    file_name,
                });
            }
        }
        entries.sort_by(|a, b| b.file_name.cmp(&a.file_name));
        Ok(entries)
    }

    /// Recheck every snapshot in the archive.
    ///
    /// Unreadable or malformed snapshots are reported as invalid rather than
    /// aborting the run, so one bad file never hides the state of the others.
    pub fn verify(&self) -> Result<VerifyReport, BackupError> {
        let mut report = VerifyReport::default();
        for entry in self.list()? {
            let status = match KeySnapshot::load_verified(&entry.path) {
                Ok(s) => SnapshotStatus::Valid {
                    created_at: s.created_at,
                },
                Err(fault) => {
                    warn!(snapshot = %entry.file_name, reason = %fault, "snapshot failed verification");
                    SnapshotStatus::Invalid(fault)
                }
            };
            report.checks.push(SnapshotCheck {
                file_name: entry.file_name,
                status,
            });
        }
        Ok(report)
    }

    /// Restore the snapshot named `file_name` into the key slot.
    pub fn restore(&self, file_name: &str) -> Result<RestoreOutcome, BackupError> {
        self.restore_at(file_name, Utc::now())
    }

    /// Restore, stamping the pre-restore copy with `now`.
    ///
    /// # Errors
    ///
    /// [`BackupError::Integrity`] if the snapshot does not verify; the key
    /// slot is untouched in that case and on every other error.
    pub fn restore_at(&self, file_name: &str, now: DateTime<Utc>) -> Result<RestoreOutcome, BackupError> {
        let entry = self
            .list()?
            .into_iter()
            .find(|e| e.file_name == file_name)
            .ok_or_else(|| BackupError::UnknownSnapshot(file_name.to_owned()))?;

        let snapshot =
            KeySnapshot::load_verified(&entry.path).map_err(|reason| BackupError::Integrity {
                file_name: entry.file_name.clone(),
                reason,
            })?;

        let pre_restore_copy = match self.read_active_key()? {
            Some(current) => {
                if current == snapshot.key {
                    info!("snapshot key is already the active key");
                }
                let path = self.backup_dir.join(snapshot::pre_restore_file_name(now));
                if path.exists() {
                    return Err(BackupError::PreRestoreCopyExists(path));
                }
                fsutil::atomic_write(&path, format!("{current}\n").as_bytes(), PRIVATE_FILE_MODE)
                    .map_err(io_err(format!("failed to preserve current key to {}", path.display())))?;
                info!(copy = %path.display(), "current key preserved before restore");
                Some(path)
            }
            None => {
                warn!(key_file = %self.key_file.display(), "no active key to preserve; restoring into empty slot");
                None
            }
        };

        if let Some(parent) = self.key_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fsutil::ensure_private_dir(parent)
                .map_err(io_err(format!("failed to create {}", parent.display())))?;
        }
        fsutil::atomic_write(
            &self.key_file,
            format!("{}\n", snapshot.key).as_bytes(),
            PRIVATE_FILE_MODE,
        )
        .map_err(io_err(format!("failed to write {}", self.key_file.display())))?;
        info!(snapshot = %entry.file_name, "key restored");

        Ok(RestoreOutcome {
            restored_from: entry.file_name,
            pre_restore_copy,
        })
    }

    /// Remove the oldest snapshots beyond the retention count. `keep` (the
    /// snapshot just written) always counts as one of the retained ones, even
    /// when a clock step makes its name sort oldest.
    fn prune(&self, keep: &Path) -> Result<Vec<String>, BackupError> {
        let others: Vec<SnapshotEntry> = self
            .list()?
            .into_iter()
            .filter(|e| e.path != keep)
            .collect();
        let mut pruned = Vec::new();
        // `others` is newest first; everything past `retention - 1` goes, oldest first.
        for entry in others.iter().skip(self.retention - 1).rev() {
            std::fs::remove_file(&entry.path)
                .map_err(io_err(format!("failed to prune {}", entry.path.display())))?;
            info!(snapshot = %entry.file_name, "old snapshot pruned");
            pruned.push(entry.file_name.clone());
        }
        Ok(pruned)
    }

    /// Trimmed key text from the key file, or `None` if missing or blank.
    pub fn read_active_key(&self) -> Result<Option<String>, BackupError> {
        match std::fs::read_to_string(&self.key_file) {
            Ok(text) => {
                let trimmed = text.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_owned()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(format!("failed to read {}", self.key_file.display()))(e)),
        }
    }
}
