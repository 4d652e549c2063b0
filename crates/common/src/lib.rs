//! Error and request/response types shared by the `fieldvault` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
