//! Error types shared across the crate.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration {key}: {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read settings file {path:?}: {reason}")]
    Settings { path: PathBuf, reason: String },
}

/// Dataset could not be turned into matter records.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("failed to read dataset {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse dataset {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("dataset {path:?} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("dataset {path:?} contains no rows")]
    Empty { path: PathBuf },
}

/// Remote generation failures. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("model request failed: {reason}")]
    RequestFailed {
        status: Option<u16>,
        reason: String,
    },

    #[error("model response was malformed: {reason}")]
    MalformedResponse { reason: String },
}

impl LlmError {
    /// Short stable label for logs and audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::RequestFailed { .. } => "request_failed",
            Self::MalformedResponse { .. } => "malformed_response",
        }
    }
}

/// HTML rendering failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to render {template}: {reason}")]
pub struct RenderError {
    pub template: &'static str,
    pub reason: String,
}

/// Failures that abort a single advisor request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error(transparent)]
    DataLoad(#[from] DataLoadError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl PipelineError {
    /// Message suitable for showing to the person who issued the query.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyQuery => "Please enter a question or client name.".to_string(),
            Self::DataLoad(e) => format!("The matters dataset could not be loaded: {e}"),
            Self::Llm(LlmError::Timeout { .. }) => {
                "The model did not answer in time. Please try again.".to_string()
            }
            Self::Llm(e) => format!("Error querying the model: {e}"),
            Self::Render(e) => format!("Results could not be displayed: {e}"),
        }
    }
}
