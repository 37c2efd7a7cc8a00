//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes the
//! kinds the gateway cares about into a strongly-typed [`ComfyUIMessage`].

use serde::Deserialize;

/// ComfyUI WebSocket messages understood by the gateway.
///
/// Deserialized via the adjacently-tagged `"type"` / `"data"` fields.
/// Unknown types (custom node extensions, monitors, ...) fail to parse
/// and are skipped by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ComfyUIMessage {
    /// Server status broadcast carrying the global queue depth.
    Status(StatusData),

    /// A prompt has started executing.
    ExecutionStart(PromptRef),

    /// Some nodes were skipped because their outputs are cached.
    ExecutionCached(ExecutionCachedData),

    /// A node is executing, or the prompt finished when `node` is `None`.
    Executing(ExecutingData),

    /// Step-level progress from a long-running node (e.g. KSampler).
    Progress(ProgressData),

    /// A node finished and produced output.
    Executed(ExecutedData),

    /// The prompt finished successfully (newer ComfyUI builds only).
    ExecutionSuccess(PromptRef),

    /// The prompt was interrupted through `POST /interrupt`.
    ExecutionInterrupted(PromptRef),

    /// Execution failed inside a node.
    ExecutionError(ErrorData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
    /// Session id; only present on the first status sent after connecting.
    #[serde(default)]
    pub sid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptRef {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Payload for `executing` messages.
///
/// Old ComfyUI builds omit `prompt_id`; such messages can never match a
/// specific job.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: i64,
    pub max: i64,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    pub node: String,
    pub output: serde_json::Value,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    pub node_id: String,
    #[serde(default)]
    pub node_type: Option<String>,
    pub exception_message: String,
    pub exception_type: String,
}

impl ComfyUIMessage {
    /// Prompt this message refers to, when it names one.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            ComfyUIMessage::Status(_) => None,
            ComfyUIMessage::ExecutionStart(data)
            | ComfyUIMessage::ExecutionSuccess(data)
            | ComfyUIMessage::ExecutionInterrupted(data) => Some(&data.prompt_id),
            ComfyUIMessage::ExecutionCached(data) => Some(&data.prompt_id),
            ComfyUIMessage::Executing(data) => data.prompt_id.as_deref(),
            ComfyUIMessage::Progress(data) => data.prompt_id.as_deref(),
            ComfyUIMessage::Executed(data) => Some(&data.prompt_id),
            ComfyUIMessage::ExecutionError(data) => Some(&data.prompt_id),
        }
    }
}

/// Parse a ComfyUI WebSocket text message into a typed enum.
///
/// Returns `Err` for malformed JSON, non-object payloads or unknown
/// `type` values.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}
