#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Workflow template error: {0}")]
    Template(String),

    #[error("Workflow node '{node_id}' not found in template")]
    TemplateNodeMissing { node_id: String },

    #[error("Workflow node '{node_id}' has no inputs.{field} field")]
    TemplateFieldMissing {
        node_id: String,
        field: &'static str,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}
