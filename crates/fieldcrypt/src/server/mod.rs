//! Axum HTTP sidecar exposing record encryption to the business application.
//!
//! # Responsibilities
//! - Define the router with the record and health routes plus shared middleware.
//! - Inject shared application state (`AppState`) into handlers.
//!
//! The sidecar listens on plain HTTP and is meant to be bound to a local or
//! pod-internal address only.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
