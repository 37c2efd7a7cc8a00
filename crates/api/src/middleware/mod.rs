//! Authentication extractors.
//!
//! - [`auth::BasicAuth`] -- Verifies HTTP Basic credentials against the configured pair.

pub mod auth;
