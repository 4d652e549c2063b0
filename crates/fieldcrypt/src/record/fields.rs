//! Declarations of which fields on a record are sensitive.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Errors from parsing a field path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldPathError {
    #[error("field path is empty")]
    Empty,

    #[error("field path {0:?} has an empty segment")]
    EmptySegment(String),

    /// `a.b` without `[]`: records are flat, only sub-record lists nest.
    #[error("field path {0:?} nests into a non-list field; use `name[].field`")]
    NestedObject(String),

    /// `branches[]` with nothing after it.
    #[error("field path {0:?} names a list but no field inside it")]
    DanglingList(String),
}

/// Segments of a dot-notation field path.
#[derive(Debug, PartialEq, Eq)]
enum PathSegment<'a> {
    /// A field on the current record.
    Field(&'a str),
    /// A list of sub-records to descend into.
    Collection(&'a str),
}

/// Split `"branches[].contacts[].phone"` into its segments.
fn parse_path(path: &str) -> Result<Vec<PathSegment<'_>>, FieldPathError> {
    if path.trim().is_empty() {
        return Err(FieldPathError::Empty);
    }
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty() || *p == "[]") {
        return Err(FieldPathError::EmptySegment(path.to_owned()));
    }
    let last = parts.len() - 1;
    let mut segments = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        match part.strip_suffix("[]") {
            Some(_) if i == last => return Err(FieldPathError::DanglingList(path.to_owned())),
            Some(name) => segments.push(PathSegment::Collection(name)),
            None if i != last => return Err(FieldPathError::NestedObject(path.to_owned())),
            None => segments.push(PathSegment::Field(part)),
        }
    }
    Ok(segments)
}

/// The sensitive fields of one record type, plus the field sets of any
/// sub-record lists it embeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    fields: BTreeSet<String>,
    collections: BTreeMap<String, FieldSet>,
}

impl FieldSet {
    /// A field set with the given top-level fields and no sub-record lists.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            collections: BTreeMap::new(),
        }
    }

    /// Attach the field set used for each element of the `name` list.
    pub fn with_collection(mut self, name: impl Into<String>, fields: FieldSet) -> Self {
        self.collections.insert(name.into(), fields);
        self
    }

    /// Build a field set from dot paths such as `"email"` or `"branches[].phone"`.
    ///
    /// # Errors
    ///
    /// Returns the first [`FieldPathError`] encountered.
    pub fn from_paths<I, S>(paths: I) -> Result<Self, FieldPathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = FieldSet::default();
        for path in paths {
            let segments = parse_path(path.as_ref())?;
            set.insert(&segments);
        }
        Ok(set)
    }

    fn insert(&mut self, segments: &[PathSegment<'_>]) {
        match segments {
            [] => {}
            [PathSegment::Field(name)] => {
                self.fields.insert((*name).to_owned());
            }
            [PathSegment::Collection(name), rest @ ..] => {
                self.collections
                    .entry((*name).to_owned())
                    .or_default()
                    .insert(rest);
            }
            // parse_path only emits Field in last position.
            [PathSegment::Field(_), ..] => {}
        }
    }

    /// Top-level sensitive field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Sub-record lists and their field sets.
    pub fn collections(&self) -> impl Iterator<Item = (&str, &FieldSet)> {
        self.collections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.collections.is_empty()
    }

    /// Flatten back into dot paths, sorted.
    pub fn to_paths(&self) -> Vec<String> {
        let mut out: Vec<String> = self.fields.iter().cloned().collect();
        for (name, sub) in &self.collections {
            out.extend(sub.to_paths().into_iter().map(|p| format!("{name}[].{p}")));
        }
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_path_flat() {
        assert_eq!(parse_path("phone").unwrap(), vec![PathSegment::Field("phone")]);
    }

    #[test]
    fn parse_path_collection() {
        assert_eq!(
            parse_path("branches[].phone").unwrap(),
            vec![PathSegment::Collection("branches"), PathSegment::Field("phone")]
        );
    }

    #[test]
    fn parse_path_rejects_malformed() {
        assert_eq!(parse_path(""), Err(FieldPathError::Empty));
        assert!(matches!(parse_path("a..b"), Err(FieldPathError::EmptySegment(_))));
        assert!(matches!(parse_path("[].phone"), Err(FieldPathError::EmptySegment(_))));
        assert!(matches!(parse_path("address.zip"), Err(FieldPathError::NestedObject(_))));
        assert!(matches!(parse_path("branches[]"), Err(FieldPathError::DanglingList(_))));
    }

    #[test]
    fn empty_segment_wins_over_position_errors() {
        for path in ["a..b", "address.", "branches[]..phone", "a.[].b", ".phone"] {
            assert_eq!(
                parse_path(path),
                Err(FieldPathError::EmptySegment(path.to_owned())),
                "{path}"
            );
        }
    }

    #[test]
    fn from_paths_builds_nested_sets() {
        let set = FieldSet::from_paths([
            "phone",
            "email",
            "branches[].phone",
            "branches[].contacts[].email",
        ])
        .unwrap();

        let expected = FieldSet::new(["phone", "email"]).with_collection(
            "branches",
            FieldSet::new(["phone"]).with_collection("contacts", FieldSet::new(["email"])),
        );
        assert_eq!(set, expected);
    }

    #[test]
    fn to_paths_round_trips() {
        let paths = vec!["branches[].address", "branches[].phone", "email", "phone"];
        let set = FieldSet::from_paths(&paths).unwrap();
        let mut out = set.to_paths();
        out.sort();
        assert_eq!(out, paths);
    }
}
