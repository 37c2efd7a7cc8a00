//! Domain building blocks for the ComfyUI generation gateway.
//!
//! Holds everything that needs no I/O beyond reading the workflow file:
//! the workflow template and its per-request rendering, seed resolution,
//! credential checks and the shared [`error::CoreError`] type.

pub mod credentials;
pub mod error;
pub mod workflow;
