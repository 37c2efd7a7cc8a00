use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use comfygate_comfyui::client::ComfyUIClientError;
use comfygate_comfyui::generator::GenerationError;
use comfygate_comfyui::waiter::WaitError;
use comfygate_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`GenerationError`] for
/// upstream failures. Implements [`IntoResponse`] to produce consistent
/// JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `comfygate_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The ComfyUI job failed or could not be run.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Template(_)
                | CoreError::TemplateNodeMissing { .. }
                | CoreError::TemplateFieldMissing { .. } => {
                    tracing::error!(error = %core, "Workflow template error");
                    internal()
                }
            },

            // --- Upstream errors ---
            AppError::Generation(err) => classify_generation_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
        }
        response
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Classify a generation failure into an HTTP status, error code, and message.
///
/// - ComfyUI unreachable maps to 503.
/// - ComfyUI answered badly (error status, wrong shape, dropped stream,
///   failed execution) maps to 502.
/// - The completion wait running out maps to 504.
/// - Shutdown interrupting the wait maps to 503.
fn classify_generation_error(err: &GenerationError) -> (StatusCode, &'static str, String) {
    let unavailable = || {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "UPSTREAM_UNAVAILABLE",
            "ComfyUI is unavailable".to_string(),
        )
    };
    let cancelled = || {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "GENERATION_CANCELLED",
            "Generation was cancelled".to_string(),
        )
    };
    let bad_gateway = |e: &GenerationError| {
        (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", e.to_string())
    };

    match err {
        GenerationError::Connect(ComfyUIClientError::Cancelled)
        | GenerationError::Wait(WaitError::Cancelled) => {
            tracing::info!(error = %err, "Generation cancelled");
            cancelled()
        }
        GenerationError::Connect(ComfyUIClientError::Connection(_)) => {
            tracing::error!(error = %err, "ComfyUI unreachable");
            unavailable()
        }
        GenerationError::Submit(api) if api.is_unreachable() => {
            tracing::error!(error = %err, "ComfyUI unreachable");
            unavailable()
        }
        GenerationError::Wait(WaitError::TimedOut(deadline)) => {
            tracing::warn!(error = %err, "Generation timed out");
            (
                StatusCode::GATEWAY_TIMEOUT,
                "GENERATION_TIMEOUT",
                format!("Generation did not complete within {} seconds", deadline.as_secs()),
            )
        }
        GenerationError::Submit(_)
        | GenerationError::Wait(WaitError::Closed | WaitError::ExecutionFailed { .. })
        | GenerationError::History(_)
        | GenerationError::HistoryShape(_)
        | GenerationError::Download { .. } => {
            tracing::error!(error = %err, "Generation failed upstream");
            bad_gateway(err)
        }
    }
}
