//! One-off pass that encrypts plaintext sensitive fields already in the
//! document store.
//!
//! The store is a single JSON object whose top-level keys are collections
//! (arrays of records). Records already sealed are left alone, so the pass can
//! be re-run after an interruption or against a partially migrated store.

use std::path::Path;

use fieldcrypt::key::KeyError;
use fieldcrypt::record::{EntityCatalog, RecordCodec};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::fsutil;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to read document store {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("document store is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("document store must be a JSON object of collections")]
    NotAnObject,

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("failed to write document store {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// What a migration pass did (or would do, for a dry run).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Records inspected across all catalog collections.
    pub records: usize,
    /// Records with at least one field newly encrypted.
    pub records_changed: usize,
    /// Individual field values newly encrypted.
    pub values_encrypted: usize,
    /// Whether the store file was rewritten.
    pub written: bool,
}

/// Encrypt every plaintext sensitive field in the store at `store_path`.
///
/// Collections named by `catalog` that are absent or not arrays are skipped,
/// as are array elements that are not objects. Unless `dry_run` is set and
/// only if something changed, the store is rewritten atomically with its
/// existing permission bits.
pub fn migrate(
    store_path: &Path,
    catalog: &EntityCatalog,
    codec: &RecordCodec,
    dry_run: bool,
) -> Result<MigrationSummary, MigrationError> {
    let text = std::fs::read_to_string(store_path).map_err(|source| MigrationError::Read {
        path: store_path.display().to_string(),
        source,
    })?;
    let mut store: Value = serde_json::from_str(&text)?;
    let collections = store.as_object_mut().ok_or(MigrationError::NotAnObject)?;

    let mut summary = MigrationSummary::default();
    for (entity, spec) in catalog.iter() {
        let Some(Value::Array(records)) = collections.get_mut(&spec.collection) else {
            debug!(entity, collection = %spec.collection, "collection absent; skipping");
            continue;
        };

        let mut changed_here = 0;
        for item in records.iter_mut() {
            let Value::Object(record) = item else { continue };
            summary.records += 1;

            let sealed = codec.encrypt_fields(record, &spec.fields)?;
            let newly = count_changed(record, &sealed);
            if newly > 0 {
                summary.values_encrypted += newly;
                summary.records_changed += 1;
                changed_here += 1;
                *record = sealed;
            }
        }
        info!(entity, collection = %spec.collection, records = records.len(), changed = changed_here, "collection migrated");
    }

    if dry_run || summary.values_encrypted == 0 {
        return Ok(summary);
    }

    let write_err = |source: std::io::Error| MigrationError::Write {
        path: store_path.display().to_string(),
        source,
    };
    let mode = fsutil::file_mode(store_path).map_err(write_err)?;
    let body = serde_json::to_vec_pretty(&store)?;
    fsutil::atomic_write(store_path, &body, mode).map_err(write_err)?;
    summary.written = true;
    Ok(summary)
}

/// Number of string leaves that differ between `before` and `after`.
fn count_changed(before: &serde_json::Map<String, Value>, after: &serde_json::Map<String, Value>) -> usize {
    after
        .iter()
        .map(|(k, new)| match (before.get(k), new) {
            (Some(Value::String(old)), Value::String(new)) => usize::from(old != new),
            (Some(Value::Array(old)), Value::Array(new)) => old
                .iter()
                .zip(new)
                .map(|pair| match pair {
                    (Value::Object(o), Value::Object(n)) => count_changed(o, n),
                    _ => 0,
                })
                .sum(),
            _ => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fieldcrypt::crypto::{is_envelope, FieldCipher};
    use fieldcrypt::key::{KeyBytes, KeyProvider};
    use serde_json::json;

    use super::*;

    fn codec() -> RecordCodec {
        RecordCodec::new(FieldCipher::new(Arc::new(KeyProvider::from_key(
            KeyBytes::generate(),
        ))))
    }

    fn write_store(dir: &Path, value: Value) -> std::path::PathBuf {
        let path = dir.join("db.json");
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        path
    }

    fn read_store(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn encrypts_plaintext_and_skips_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let codec = codec();
        let sealed_phone = codec.cipher().encrypt("03-0000-0000").unwrap();
        let path = write_store(
            dir.path(),
            json!({
                "customers": [
                    {"name": "Acme", "phone": sealed_phone, "email": "info@acme.example",
                     "branches": [{"name": "Kobe", "address": "1-2-3 Chuo"}]}
                ],
                "assignees": [{"name": "Sato", "phone": "", "email": null}],
                "invoices": [{"phone": "leave me"}]
            }),
        );

        let summary = migrate(&path, &EntityCatalog::builtin(), &codec, false).unwrap();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.records_changed, 1);
        assert_eq!(summary.values_encrypted, 2);
        assert!(summary.written);

        let store = read_store(&path);
        let customer = &store["customers"][0];
        assert_eq!(customer["phone"], sealed_phone);
        assert!(is_envelope(customer["email"].as_str().unwrap()));
        assert!(is_envelope(customer["branches"][0]["address"].as_str().unwrap()));
        assert_eq!(customer["branches"][0]["name"], "Kobe");
        assert_eq!(store["assignees"][0]["phone"], "");
        assert_eq!(store["invoices"][0]["phone"], "leave me");
    }

    #[test]
    fn second_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let codec = codec();
        let path = write_store(
            dir.path(),
            json!({"partners": [{"phone": "06-1234-5678"}]}),
        );
        let catalog = EntityCatalog::builtin();

        assert_eq!(migrate(&path, &catalog, &codec, false).unwrap().values_encrypted, 1);
        let after_first = std::fs::read(&path).unwrap();

        let second = migrate(&path, &catalog, &codec, false).unwrap();
        assert_eq!(second.values_encrypted, 0);
        assert!(!second.written);
        assert_eq!(std::fs::read(&path).unwrap(), after_first);
    }

    #[test]
    fn dry_run_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), json!({"assignees": [{"email": "a@b.example"}]}));
        let before = std::fs::read(&path).unwrap();

        let summary = migrate(&path, &EntityCatalog::builtin(), &codec(), true).unwrap();
        assert_eq!(summary.values_encrypted, 1);
        assert!(!summary.written);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_preserves_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), json!({"assignees": [{"email": "a@b.example"}]}));
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        migrate(&path, &EntityCatalog::builtin(), &codec(), false).unwrap();
        assert_eq!(fsutil::file_mode(&path).unwrap(), 0o640);
    }

    #[test]
    fn non_object_store_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(dir.path(), json!([1, 2, 3]));
        assert!(matches!(
            migrate(&path, &EntityCatalog::builtin(), &codec(), false),
            Err(MigrationError::NotAnObject)
        ));
    }
}
