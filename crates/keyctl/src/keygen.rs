//! First-time key creation.

use std::path::Path;

use fieldcrypt::key::KeyBytes;
use tracing::info;

use crate::backup::BackupError;
use crate::fsutil::{self, PRIVATE_FILE_MODE};

/// Write a freshly generated key into `key_file`.
///
/// Only an empty slot is filled: an existing non-blank key file is never
/// overwritten, since losing the active key makes every stored envelope
/// unreadable. Replacing a key goes through restore, which keeps a copy.
pub fn generate(key_file: &Path) -> Result<(), BackupError> {
    match std::fs::read_to_string(key_file) {
        Ok(text) if !text.trim().is_empty() => {
            return Err(BackupError::KeyAlreadyExists(key_file.to_path_buf()))
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(BackupError::Io {
                context: format!("failed to inspect {}", key_file.display()),
                source,
            })
        }
    }

    if let Some(parent) = key_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fsutil::ensure_private_dir(parent).map_err(|source| BackupError::Io {
            context: format!("failed to create {}", parent.display()),
            source,
        })?;
    }

    let key = KeyBytes::generate();
    fsutil::atomic_write(
        key_file,
        format!("{}\n", key.to_base64()).as_bytes(),
        PRIVATE_FILE_MODE,
    )
    .map_err(|source| BackupError::Io {
        context: format!("failed to write {}", key_file.display()),
        source,
    })?;
    info!(key_file = %key_file.display(), "new encryption key generated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_empty_slot_with_valid_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/.encryption_key");
        generate(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        assert!(KeyBytes::from_base64(&text).is_ok());
        #[cfg(unix)]
        assert_eq!(fsutil::file_mode(&path).unwrap(), 0o600);
    }

    #[test]
    fn blank_file_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".encryption_key");
        std::fs::write(&path, "  \n").unwrap();
        generate(&path).unwrap();
        assert!(KeyBytes::from_base64(&std::fs::read_to_string(&path).unwrap()).is_ok());
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".encryption_key");
        generate(&path).unwrap();
        let first = std::fs::read(&path).unwrap();

        assert!(matches!(
            generate(&path),
            Err(BackupError::KeyAlreadyExists(_))
        ));
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }
}
