use std::sync::Arc;

use comfygate_comfyui::generator::ImageBackend;
use comfygate_core::workflow::WorkflowTemplate;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
/// Nothing in here is mutated per request.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (credentials are read by the auth extractor).
    pub config: Arc<ServerConfig>,
    /// Validated workflow template, rendered fresh for every request.
    pub workflow: Arc<WorkflowTemplate>,
    /// Runs rendered jobs against ComfyUI.
    pub backend: Arc<dyn ImageBackend>,
    /// Cancelled on shutdown; each generation waits under a child token.
    pub shutdown: CancellationToken,
}
