//! Entity type → sensitive field set.
//!
//! The catalog tells the record service and the offline migration which fields
//! of each entity type are protected and which document-store collection the
//! entity lives in. A built-in catalog covers the standard business entities;
//! deployments may replace it with a JSON file.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::fields::{FieldPathError, FieldSet};

/// Errors from loading a catalog file.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("failed to read entity catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("entity catalog is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("entity {entity}: {source}")]
    InvalidPath {
        entity: String,
        #[source]
        source: FieldPathError,
    },
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    /// Top-level key of the document store holding this entity's records.
    pub collection: String,
    /// Sensitive fields of one record.
    pub fields: FieldSet,
}

/// On-disk shape: `{"customer": {"collection": "customers", "fields": ["phone", ...]}}`.
#[derive(Debug, Deserialize)]
struct RawEntity {
    collection: String,
    fields: Vec<String>,
}

/// Lookup table of entity specs keyed by entity type name.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entities: BTreeMap<String, EntitySpec>,
}

impl EntityCatalog {
    /// The standard entities of the business-records application.
    pub fn builtin() -> Self {
        let contact = || FieldSet::new(["phone", "email", "address"]);
        let mut entities = BTreeMap::new();
        entities.insert(
            "customer".to_owned(),
            EntitySpec {
                collection: "customers".into(),
                fields: contact().with_collection("branches", contact()),
            },
        );
        entities.insert(
            "partner".to_owned(),
            EntitySpec {
                collection: "partners".into(),
                fields: contact().with_collection("branches", contact()),
            },
        );
        entities.insert(
            "assignee".to_owned(),
            EntitySpec {
                collection: "assignees".into(),
                fields: contact(),
            },
        );
        Self { entities }
    }

    /// Parse a catalog from its JSON form.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let raw: BTreeMap<String, RawEntity> = serde_json::from_str(text)?;
        let mut entities = BTreeMap::new();
        for (name, entry) in raw {
            let fields = FieldSet::from_paths(&entry.fields).map_err(|source| {
                CatalogError::InvalidPath {
                    entity: name.clone(),
                    source,
                }
            })?;
            entities.insert(
                name,
                EntitySpec {
                    collection: entry.collection,
                    fields,
                },
            );
        }
        Ok(Self { entities })
    }

    /// Load the catalog file at `path`.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// The built-in catalog, or the file at `path` when one is configured.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::builtin()),
        }
    }

    /// Look up an entity type by name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownEntity`] if `name` is not present.
    pub fn get(&self, name: &str) -> Result<&EntitySpec, CatalogError> {
        self.entities
            .get(name)
            .ok_or_else(|| CatalogError::UnknownEntity(name.to_owned()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntitySpec)> {
        self.entities.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
