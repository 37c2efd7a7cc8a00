//! Drives one generation job end to end.
//!
//! [`ComfyUIGenerator`] opens the event stream, submits the job descriptor,
//! waits for completion, then downloads every image listed in the prompt's
//! history. The HTTP layer talks to it through the [`ImageBackend`] trait
//! so it can be swapped for a stub in tests.
//!
//! A prompt that is given up on (deadline, cancellation, or the request
//! future being dropped) is deleted from the queue and, if it is the one
//! executing, interrupted.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::{ComfyUIClient, ComfyUIClientError};
use crate::history::{extract_images, HistoryError};
use crate::retry::{connect_with_retry, RetryConfig};
use crate::waiter::{wait_for_completion, WaitError};

/// Default ceiling on how long a single prompt may take.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(300);

/// Something that turns a job descriptor into image bytes.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Run `workflow` to completion and return the produced images in
    /// output order.
    async fn generate(
        &self,
        workflow: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<Vec<Vec<u8>>, GenerationError>;

    /// Whether the backing service currently answers.
    async fn health_check(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Cannot open ComfyUI event stream: {0}")]
    Connect(#[from] ComfyUIClientError),

    #[error("Prompt submission failed: {0}")]
    Submit(#[source] ComfyUIApiError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("History request failed: {0}")]
    History(#[source] ComfyUIApiError),

    #[error(transparent)]
    HistoryShape(#[from] HistoryError),

    #[error("Image download failed for {filename}: {source}")]
    Download {
        filename: String,
        #[source]
        source: ComfyUIApiError,
    },
}

/// Settings for [`ComfyUIGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Base HTTP URL of the ComfyUI server.
    pub api_url: String,
    /// Prefix for the per-request WebSocket client id.
    pub client_id: String,
    /// Ceiling on the completion wait.
    pub completion_timeout: Duration,
    /// Ceiling on each individual HTTP call.
    pub http_timeout: Duration,
    pub retry: RetryConfig,
}

/// [`ImageBackend`] backed by a real ComfyUI server.
pub struct ComfyUIGenerator {
    api: ComfyUIApi,
    client: ComfyUIClient,
    client_id: String,
    completion_timeout: Duration,
    retry: RetryConfig,
}

impl ComfyUIGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, ComfyUIApiError> {
        let api = ComfyUIApi::with_timeout(&config.api_url, config.http_timeout)?;
        let client = ComfyUIClient::from_api_url(&config.api_url);

        Ok(Self {
            api,
            client,
            client_id: config.client_id,
            completion_timeout: config.completion_timeout,
            retry: config.retry,
        })
    }

    /// Client id for one request.
    ///
    /// ComfyUI keeps a single socket per client id, so concurrent requests
    /// sharing one id would steal each other's event stream.
    fn request_client_id(&self) -> String {
        format!("{}-{}", self.client_id, uuid::Uuid::new_v4())
    }

    async fn download_all(&self, prompt_id: &str) -> Result<Vec<Vec<u8>>, GenerationError> {
        let history = self
            .api
            .get_history(prompt_id)
            .await
            .map_err(GenerationError::History)?;
        let refs = extract_images(&history, prompt_id)?;

        tracing::debug!(prompt_id, image_count = refs.len(), "Fetching generated images");

        let mut images = Vec::with_capacity(refs.len());
        for image in &refs {
            let bytes = self
                .api
                .view_image(image)
                .await
                .map_err(|source| GenerationError::Download {
                    filename: image.filename.clone(),
                    source,
                })?;
            images.push(bytes);
        }
        Ok(images)
    }
}

/// Best-effort removal of an abandoned prompt.
///
/// `POST /queue` only drops prompts that have not started, so a running
/// prompt is interrupted as well.
async fn abandon(api: &ComfyUIApi, prompt_id: &str) {
    if let Err(e) = api.cancel_execution(prompt_id).await {
        tracing::warn!(prompt_id, error = %e, "Failed to remove abandoned prompt from queue");
    }

    match api.get_queue().await {
        Ok(queue) if queue.is_running(prompt_id) => match api.interrupt(prompt_id).await {
            Ok(()) => tracing::info!(prompt_id, "Interrupted abandoned prompt"),
            Err(e) => tracing::warn!(prompt_id, error = %e, "Failed to interrupt abandoned prompt"),
        },
        Ok(_) => {}
        Err(e) => tracing::warn!(prompt_id, error = %e, "Failed to read ComfyUI queue"),
    }
}

/// Abandons the prompt if dropped while still armed.
///
/// Covers the request future being dropped mid-wait (outer request timeout,
/// client disconnect), where no code after the `.await` gets to run.
struct AbandonGuard {
    api: ComfyUIApi,
    prompt_id: Option<String>,
}

impl AbandonGuard {
    fn new(api: &ComfyUIApi, prompt_id: &str) -> Self {
        Self {
            api: api.clone(),
            prompt_id: Some(prompt_id.to_string()),
        }
    }

    fn disarm(&mut self) {
        self.prompt_id = None;
    }

    async fn abandon_now(mut self) {
        if let Some(prompt_id) = self.prompt_id.take() {
            abandon(&self.api, &prompt_id).await;
        }
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        let Some(prompt_id) = self.prompt_id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        tracing::warn!(prompt_id = %prompt_id, "Request dropped while waiting, abandoning prompt");
        let api = self.api.clone();
        handle.spawn(async move {
            abandon(&api, &prompt_id).await;
        });
    }
}

#[async_trait]
impl ImageBackend for ComfyUIGenerator {
    async fn generate(
        &self,
        workflow: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<Vec<Vec<u8>>, GenerationError> {
        let client_id = self.request_client_id();

        // Subscribe before submitting so the completion event cannot be missed.
        let mut conn = connect_with_retry(&self.client, &client_id, &self.retry, &cancel).await?;

        let submitted = self
            .api
            .submit_workflow(&workflow, &client_id)
            .await
            .map_err(GenerationError::Submit)?;
        let prompt_id = submitted.prompt_id;

        tracing::info!(
            prompt_id = %prompt_id,
            client_id = %client_id,
            queue_position = submitted.number,
            "Workflow submitted to ComfyUI",
        );

        let mut guard = AbandonGuard::new(&self.api, &prompt_id);

        let waited = wait_for_completion(
            &mut conn.ws_stream,
            &prompt_id,
            self.completion_timeout,
            &cancel,
        )
        .await;

        // The stream is not needed past this point either way.
        let _ = conn.ws_stream.close(None).await;

        match waited {
            Ok(signal) => {
                guard.disarm();
                tracing::debug!(prompt_id = %prompt_id, ?signal, "Prompt finished");
            }
            Err(e @ (WaitError::TimedOut(_) | WaitError::Cancelled)) => {
                guard.abandon_now().await;
                return Err(e.into());
            }
            Err(e) => {
                guard.disarm();
                return Err(e.into());
            }
        }

        let images = self.download_all(&prompt_id).await?;
        tracing::info!(prompt_id = %prompt_id, image_count = images.len(), "Generation complete");
        Ok(images)
    }

    async fn health_check(&self) -> bool {
        match self.api.system_stats().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(api_url = self.api.api_url(), error = %e, "ComfyUI health check failed");
                false
            }
        }
    }
}
