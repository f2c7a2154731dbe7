/// Domain-specific error types for paperscout
///
/// Configuration problems are surfaced before any network activity with a message
/// naming the offending field. Mid-pipeline failures (sources, embeddings, gates)
/// have their own error types and are recovered locally; only the variants here
/// ever reach the binary.

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Topic corpus error: {0}")]
    Topics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::embedding::EmbeddingError> for PipelineError {
    fn from(e: crate::embedding::EmbeddingError) -> Self {
        PipelineError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Internal(format!("JSON error: {}", e))
    }
}

impl PipelineError {
    /// Helper to create validation errors with field names
    ///
    /// Example:
    /// ```
    /// use paperscout::errors::PipelineError;
    /// let err = PipelineError::validation("pipeline.min_score", "must be within [0, 1]");
    /// assert!(err.to_string().contains("must be within"));
    /// ```
    pub fn validation(field: &str, message: &str) -> Self {
        PipelineError::Validation {
            message: format!("{}: {}", field, message),
            field: Some(field.to_string()),
        }
    }
}
