//! Record-level field encryption.
//!
//! # Responsibilities
//!
//! - Declare which fields of a record are sensitive ([`FieldSet`]), including
//!   the independent field sets of embedded sub-record lists such as branch offices.
//! - Map entity types to their field sets and document-store collections ([`EntityCatalog`]).
//! - Encrypt and decrypt those fields on whole records ([`RecordCodec`]).
//!
//! During a live migration a record may hold envelopes and legacy plaintext
//! side by side; every operation here accepts that mix without error.

pub mod catalog;
pub mod codec;
pub mod fields;

pub use catalog::{CatalogError, EntityCatalog, EntitySpec};
pub use codec::{DecryptReport, Record, RecordCodec};
pub use fields::{FieldPathError, FieldSet};
