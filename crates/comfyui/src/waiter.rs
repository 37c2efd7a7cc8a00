//! Blocking wait for a prompt to finish, driven by the WebSocket stream.
//!
//! [`wait_for_completion`] reads frames until the [`CompletionTracker`]
//! reports completion, the server reports a failure for the prompt, the
//! stream ends, the deadline passes, or the caller cancels.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::completion::{CompletionSignal, CompletionTracker, Observation};

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// The connection closed (or errored) before the prompt completed.
    #[error("ComfyUI event stream closed before prompt completed")]
    Closed,

    /// ComfyUI reported an error or interruption for the prompt.
    #[error("ComfyUI execution failed: {message}")]
    ExecutionFailed {
        node_id: Option<String>,
        message: String,
    },

    /// No completion signal arrived within the deadline.
    #[error("Prompt did not complete within {0:?}")]
    TimedOut(Duration),

    /// The wait was cancelled (shutdown or caller went away).
    #[error("Wait for prompt completion was cancelled")]
    Cancelled,
}

/// Wait until `prompt_id` completes on `stream`.
///
/// Binary frames (preview images), pings and pongs are ignored. Text
/// frames that do not parse are skipped.
pub async fn wait_for_completion<S>(
    stream: &mut S,
    prompt_id: &str,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<CompletionSignal, WaitError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut tracker = CompletionTracker::new(prompt_id);

    tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            tracing::info!(prompt_id, "Completion wait cancelled");
            Err(WaitError::Cancelled)
        }
        _ = tokio::time::sleep(deadline) => {
            tracing::warn!(prompt_id, deadline_secs = deadline.as_secs(), "Completion wait timed out");
            Err(WaitError::TimedOut(deadline))
        }
        result = read_until_complete(stream, &mut tracker) => result,
    }
}

async fn read_until_complete<S>(
    stream: &mut S,
    tracker: &mut CompletionTracker,
) -> Result<CompletionSignal, WaitError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                tracing::trace!(prompt_id = tracker.prompt_id(), message = %text, "Received");
                match tracker.observe_text(&text) {
                    Observation::Pending => {}
                    Observation::Completed(signal) => {
                        tracing::debug!(prompt_id = tracker.prompt_id(), ?signal, "Prompt completed");
                        return Ok(signal);
                    }
                    Observation::Failed(failure) => {
                        tracing::warn!(
                            prompt_id = tracker.prompt_id(),
                            node_id = ?failure.node_id,
                            error = %failure.message,
                            "Prompt execution failed",
                        );
                        return Err(WaitError::ExecutionFailed {
                            node_id: failure.node_id,
                            message: failure.message,
                        });
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::trace!("Ignoring binary message (preview image)");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                tracing::warn!(?frame, "ComfyUI WebSocket closed during wait");
                return Err(WaitError::Closed);
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket receive error");
                return Err(WaitError::Closed);
            }
        }
    }

    Err(WaitError::Closed)
}
