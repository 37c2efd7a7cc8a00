//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, WebSocket connection management,
//! HTTP API wrappers, completion detection, history parsing and the
//! [`generator::ComfyUIGenerator`] that drives one generation job from
//! submission to downloaded images.

pub mod api;
pub mod client;
pub mod completion;
pub mod generator;
pub mod history;
pub mod messages;
pub mod retry;
pub mod waiter;
