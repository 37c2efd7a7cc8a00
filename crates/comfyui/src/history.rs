//! Parsing of `GET /history/{prompt_id}` responses.
//!
//! The history endpoint answers with
//! `{"<prompt_id>": {"outputs": {"<node_id>": {"images": [...]}, ...}}}`.
//! Node order is preserved as sent so images come back in the order the
//! server listed them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Reference to one produced image, as accepted by `GET /view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Storage kind (`output`, `temp`, `input`).
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "output".to_string()
}

/// History entry for a single prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub outputs: IndexMap<String, NodeOutput>,
}

/// Output of one node. Only image outputs are of interest; other keys
/// (`gifs`, `text`, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Option<Vec<ImageRef>>,
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History has no entry for prompt {0}")]
    PromptMissing(String),

    #[error("Malformed history record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Pull every image reference for `prompt_id` out of a history response,
/// flattened in node order and then list order.
pub fn extract_images(
    history: &serde_json::Value,
    prompt_id: &str,
) -> Result<Vec<ImageRef>, HistoryError> {
    let entry = history
        .get(prompt_id)
        .ok_or_else(|| HistoryError::PromptMissing(prompt_id.to_string()))?;

    let record = HistoryRecord::deserialize(entry)?;

    Ok(record
        .outputs
        .into_values()
        .filter_map(|output| output.images)
        .flatten()
        .collect())
}
