use analysis_flow::FlowError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single analysis or follow-up action.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Sample file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not reach the model endpoint: {0}")]
    NetworkFailure(#[source] reqwest::Error),

    #[error("Model endpoint returned {status}: {body}")]
    UpstreamError { status: u16, body: String },

    #[error("Model response is not a valid analysis: {0}")]
    MalformedResponse(String),

    #[error("GEMINI_API_KEY is not set")]
    MissingCredential,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Failed to encode prompt data: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl AssistantError {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::FileNotFound(_) => "file_not_found",
            AssistantError::Io { .. } => "io",
            AssistantError::NetworkFailure(_) => "network_failure",
            AssistantError::UpstreamError { .. } => "upstream_error",
            AssistantError::MalformedResponse(_) => "malformed_response",
            AssistantError::MissingCredential => "missing_credential",
            AssistantError::InvalidConfig(_) => "invalid_config",
            AssistantError::InvalidInput(_) => "invalid_input",
            AssistantError::Encoding(_) => "encoding",
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;

/// Error of a user-initiated action, as seen by the service and the CLI.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Assistant(#[from] AssistantError),

    #[error(transparent)]
    Flow(FlowError),
}

impl From<FlowError> for ActionError {
    fn from(err: FlowError) -> Self {
        match err.into_task_source::<AssistantError>() {
            Ok(inner) => ActionError::Assistant(inner),
            Err(other) => ActionError::Flow(other),
        }
    }
}

impl ActionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::Assistant(e) => e.kind(),
            ActionError::Flow(FlowError::SessionNotFound(_)) => "session_not_found",
            ActionError::Flow(FlowError::Superseded(_)) => "superseded",
            ActionError::Flow(_) => "pipeline_error",
        }
    }
}
