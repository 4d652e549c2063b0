//! [`RecordCodec`]: applies [`FieldCipher`] across the declared fields of a record.

use serde_json::Value;

use crate::crypto::{Decryption, FieldCipher};
use crate::key::KeyError;

use super::fields::FieldSet;

pub use common::protocol::Record;

/// Result of [`RecordCodec::decrypt_fields_detailed`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptReport {
    /// The record with every openable envelope replaced by its plaintext.
    pub record: Record,
    /// Paths of envelopes left in place because they could not be opened,
    /// e.g. `"email"` or `"branches[2].phone"`.
    pub failed: Vec<String>,
}

/// Encrypts and decrypts the sensitive fields of whole records.
///
/// Both directions borrow the input and return a new record, and both are
/// safe to repeat: encrypting an already-encrypted record or decrypting a
/// plaintext record returns it unchanged.
#[derive(Clone, Debug)]
pub struct RecordCodec {
    cipher: FieldCipher,
}

impl RecordCodec {
    pub fn new(cipher: FieldCipher) -> Self {
        Self { cipher }
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    /// Encrypt each non-empty string field of `record` named in `fields`,
    /// recursing into declared sub-record lists.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if a value needs sealing and the key cannot be resolved.
    pub fn encrypt_fields(&self, record: &Record, fields: &FieldSet) -> Result<Record, KeyError> {
        let mut out = record.clone();
        self.encrypt_in_place(&mut out, fields)?;
        Ok(out)
    }

    /// Decrypt each field of `record` named in `fields`. Values that cannot be
    /// opened are left as stored.
    pub fn decrypt_fields(&self, record: &Record, fields: &FieldSet) -> Result<Record, KeyError> {
        Ok(self.decrypt_fields_detailed(record, fields)?.record)
    }

    /// Like [`decrypt_fields`](Self::decrypt_fields), also listing the fields
    /// whose envelopes failed to open.
    pub fn decrypt_fields_detailed(
        &self,
        record: &Record,
        fields: &FieldSet,
    ) -> Result<DecryptReport, KeyError> {
        let mut out = record.clone();
        let mut failed = Vec::new();
        self.decrypt_in_place(&mut out, fields, "", &mut failed)?;
        Ok(DecryptReport {
            record: out,
            failed,
        })
    }

    fn encrypt_in_place(&self, record: &mut Record, fields: &FieldSet) -> Result<(), KeyError> {
        for name in fields.fields() {
            if let Some(Value::String(s)) = record.get_mut(name) {
                if !s.is_empty() {
                    *s = self.cipher.encrypt(s)?;
                }
            }
        }
        for (name, sub_fields) in fields.collections() {
            if let Some(Value::Array(items)) = record.get_mut(name) {
                for item in items.iter_mut() {
                    if let Value::Object(sub) = item {
                        self.encrypt_in_place(sub, sub_fields)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn decrypt_in_place(
        &self,
        record: &mut Record,
        fields: &FieldSet,
        prefix: &str,
        failed: &mut Vec<String>,
    ) -> Result<(), KeyError> {
        for name in fields.fields() {
            if let Some(Value::String(s)) = record.get_mut(name) {
                match self.cipher.decrypt_detailed(s)? {
                    Decryption::Decrypted(plain) => *s = plain,
                    Decryption::PassthroughLegacy(_) => {}
                    Decryption::Failed { .. } => failed.push(format!("{prefix}{name}")),
                }
            }
        }
        for (name, sub_fields) in fields.collections() {
            if let Some(Value::Array(items)) = record.get_mut(name) {
                for (i, item) in items.iter_mut().enumerate() {
                    if let Value::Object(sub) = item {
                        let sub_prefix = format!("{prefix}{name}[{i}].");
                        self.decrypt_in_place(sub, sub_fields, &sub_prefix, failed)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::crypto::is_envelope;
    use crate::key::{KeyBytes, KeyProvider};

    fn codec() -> RecordCodec {
        RecordCodec::new(FieldCipher::new(Arc::new(KeyProvider::from_key(
            KeyBytes::generate(),
        ))))
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn encrypts_only_listed_fields() {
        let c = codec();
        let input = record(json!({"phone": "03-1111-2222", "name": "Acme"}));
        let out = c.encrypt_fields(&input, &FieldSet::new(["phone"])).unwrap();

        assert!(is_envelope(out["phone"].as_str().unwrap()));
        assert_eq!(out["name"], "Acme");
        // Input is untouched.
        assert_eq!(input["phone"], "03-1111-2222");
    }

    #[test]
    fn round_trip_restores_record() {
        let c = codec();
        let fields = FieldSet::new(["phone", "email", "address"]);
        let input = record(json!({
            "id": 7,
            "name": "Acme",
            "phone": "03-1111-2222",
            "email": "info@acme.example",
            "address": "大阪市北区1-2-3"
        }));
        let sealed = c.encrypt_fields(&input, &fields).unwrap();
        assert_ne!(sealed, input);
        assert_eq!(c.decrypt_fields(&sealed, &fields).unwrap(), input);
    }

    #[test]
    fn mixed_migration_record() {
        let c = codec();
        let existing = c.cipher().encrypt("info@acme.example").unwrap();
        let input = record(json!({"email": existing.clone(), "phone": "03-1111-2222"}));

        let out = c
            .encrypt_fields(&input, &FieldSet::new(["email", "phone"]))
            .unwrap();
        assert_eq!(out["email"].as_str().unwrap(), existing);
        let phone = out["phone"].as_str().unwrap();
        assert!(is_envelope(phone));
        assert_eq!(c.cipher().decrypt(phone).unwrap(), "03-1111-2222");
    }

    #[test]
    fn encrypt_is_idempotent_on_records() {
        let c = codec();
        let fields = FieldSet::new(["phone"]).with_collection("branches", FieldSet::new(["phone"]));
        let input = record(json!({
            "phone": "03-1111-2222",
            "branches": [{"phone": "06-3333-4444"}]
        }));
        let once = c.encrypt_fields(&input, &fields).unwrap();
        let twice = c.encrypt_fields(&once, &fields).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn absent_empty_and_non_string_fields_untouched() {
        let c = codec();
        let input = record(json!({"phone": "", "email": null, "fax": 12345}));
        let out = c
            .encrypt_fields(&input, &FieldSet::new(["phone", "email", "fax", "address"]))
            .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn recurses_into_sub_records() {
        let c = codec();
        let fields = FieldSet::new(["phone"])
            .with_collection("branches", FieldSet::new(["email"]));
        let input = record(json!({
            "phone": "03-1111-2222",
            "branches": [
                {"name": "Osaka", "email": "osaka@acme.example", "phone": "06-0000-0000"},
                {"name": "Nagoya"},
                "not a record"
            ]
        }));
        let out = c.encrypt_fields(&input, &fields).unwrap();
        let branches = out["branches"].as_array().unwrap();
        assert!(is_envelope(branches[0]["email"].as_str().unwrap()));
        // Sub-record field set is independent of the parent's.
        assert_eq!(branches[0]["phone"], "06-0000-0000");
        assert_eq!(branches[1], json!({"name": "Nagoya"}));
        assert_eq!(branches[2], "not a record");

        assert_eq!(c.decrypt_fields(&out, &fields).unwrap(), input);
    }

    #[test]
    fn empty_or_absent_sub_record_list_is_noop() {
        let c = codec();
        let fields = FieldSet::new(["phone"]).with_collection("branches", FieldSet::new(["phone"]));
        for input in [
            record(json!({"branches": []})),
            record(json!({"branches": null})),
            record(json!({"name": "Acme"})),
        ] {
            assert_eq!(c.encrypt_fields(&input, &fields).unwrap(), input);
            assert_eq!(c.decrypt_fields(&input, &fields).unwrap(), input);
        }
    }

    #[test]
    fn decrypt_passes_legacy_plaintext_through() {
        let c = codec();
        let input = record(json!({"phone": "090-1234-5678"}));
        let report = c
            .decrypt_fields_detailed(&input, &FieldSet::new(["phone"]))
            .unwrap();
        assert_eq!(report.record, input);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn decrypt_reports_unopenable_fields_by_path() {
        let writer = codec();
        let reader = codec();
        let fields = FieldSet::new(["email"]).with_collection("branches", FieldSet::new(["phone"]));
        let sealed = writer
            .encrypt_fields(
                &record(json!({
                    "email": "info@acme.example",
                    "branches": [{"phone": "plain"}, {"phone": "06-3333-4444"}]
                })),
                &fields,
            )
            .unwrap();

        let report = reader.decrypt_fields_detailed(&sealed, &fields).unwrap();
        assert_eq!(report.failed, vec!["email", "branches[0].phone", "branches[1].phone"]);
        // Unopenable values are returned exactly as stored.
        assert_eq!(report.record, sealed);
    }
}
