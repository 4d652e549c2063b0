//! Limits applied by the layers in [`super::router::build`].

use std::time::Duration;

/// Per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest accepted request body. A record with a few dozen sub-records is a
/// few kilobytes; anything near this is a client bug.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
