//! Completion detection for a submitted prompt.
//!
//! A job moves `Pending -> Completed` on the first of two independent
//! signals:
//!
//! - [`CompletionSignal::QueueDrained`]: a `status` broadcast reports
//!   `queue_remaining == 0`. This is global to the server, so under load
//!   from other clients it can fire before or after this prompt finishes.
//! - [`CompletionSignal::PromptFinished`]: an `executing` message with
//!   `node == null`, or an `execution_success`, for this prompt id.
//!
//! The two are OR-ed together; neither takes precedence.
//!
//! The socket is opened before the prompt is submitted, so frames buffered
//! ahead of the submission describe a queue that does not contain it yet.
//! A drained queue therefore only counts once some event has named this
//! prompt; ComfyUI sends `execution_start` to the submitting client as soon
//! as the prompt is picked up. The connection greeting (the `status`
//! carrying `sid`) is never a completion signal.

use crate::messages::{parse_message, ComfyUIMessage};

/// Which condition ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    QueueDrained,
    PromptFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Pending,
    Completed(CompletionSignal),
}

/// A failure reported by the server for the tracked prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    pub node_id: Option<String>,
    pub message: String,
}

/// Result of feeding one message to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Nothing relevant; keep waiting.
    Pending,
    Completed(CompletionSignal),
    Failed(ExecutionFailure),
}

/// Tracks one prompt through the event stream.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    prompt_id: String,
    state: CompletionState,
    /// Set once an event has referred to this prompt.
    seen_prompt: bool,
}

impl CompletionTracker {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            state: CompletionState::Pending,
            seen_prompt: false,
        }
    }

    pub fn prompt_id(&self) -> &str {
        &self.prompt_id
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    /// Whether the server has mentioned this prompt yet.
    pub fn seen_prompt(&self) -> bool {
        self.seen_prompt
    }

    /// Apply one parsed message. Once completed the state never changes.
    pub fn observe(&mut self, msg: &ComfyUIMessage) -> Observation {
        if let CompletionState::Completed(signal) = self.state {
            return Observation::Completed(signal);
        }

        if msg.prompt_id() == Some(self.prompt_id.as_str()) {
            self.seen_prompt = true;
        }

        if let ComfyUIMessage::Status(data) = msg {
            tracing::debug!(
                prompt_id = %self.prompt_id,
                queue_remaining = data.status.exec_info.queue_remaining,
                "ComfyUI queue status",
            );
        }

        let signal = match msg {
            ComfyUIMessage::Status(data)
                if self.seen_prompt
                    && data.sid.is_none()
                    && data.status.exec_info.queue_remaining == 0 =>
            {
                Some(CompletionSignal::QueueDrained)
            }
            ComfyUIMessage::ExecutionSuccess(data) if data.prompt_id == self.prompt_id => {
                Some(CompletionSignal::PromptFinished)
            }
            ComfyUIMessage::Executing(data)
                if data.node.is_none() && data.prompt_id.as_deref() == Some(&*self.prompt_id) =>
            {
                Some(CompletionSignal::PromptFinished)
            }
            ComfyUIMessage::ExecutionError(data) if data.prompt_id == self.prompt_id => {
                return Observation::Failed(ExecutionFailure {
                    node_id: Some(data.node_id.clone()),
                    message: format!("{}: {}", data.exception_type, data.exception_message),
                });
            }
            ComfyUIMessage::ExecutionInterrupted(data) if data.prompt_id == self.prompt_id => {
                return Observation::Failed(ExecutionFailure {
                    node_id: None,
                    message: "execution interrupted".to_string(),
                });
            }
            _ => None,
        };

        match signal {
            Some(signal) => {
                self.state = CompletionState::Completed(signal);
                Observation::Completed(signal)
            }
            None => Observation::Pending,
        }
    }

    /// Parse a raw text frame and apply it. Unparseable frames are ignored.
    pub fn observe_text(&mut self, text: &str) -> Observation {
        match parse_message(text) {
            Ok(msg) => self.observe(&msg),
            Err(e) => {
                tracing::trace!(error = %e, "Skipping unrecognised ComfyUI message");
                match self.state {
                    CompletionState::Completed(signal) => Observation::Completed(signal),
                    CompletionState::Pending => Observation::Pending,
                }
            }
        }
    }
}
