//! Request handlers.
//!
//! Handlers render the workflow template, delegate to the
//! [`ImageBackend`](comfygate_comfyui::generator::ImageBackend) held in
//! state, and map failures via [`AppError`](crate::error::AppError).

pub mod generate;
