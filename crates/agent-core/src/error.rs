//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Nothing in this workspace retries on any of these. Transport-class errors
/// end the current exchange, tool-class errors are folded back into the
/// conversation as tool results.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Connection or transfer failure
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered with status >= 400
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Malformed stream record or payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Maximum iterations reached in reasoning loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Whether this error ends the exchange it occurred in.
    pub fn is_transport(&self) -> bool {
        matches!(self, AgentError::Network(_) | AgentError::Http { .. })
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Network(msg) => format!("Network Error:\n{}", msg),
            AgentError::Http { message, .. } => message.clone(),
            AgentError::ToolNotFound(name) => format!("Tool '{}' not found.", name),
            AgentError::ToolValidation(msg) => format!("Invalid tool input: {}", msg),
            AgentError::ToolExecution(msg) => format!("Tool error: {}", msg),
            AgentError::MaxIterations(max) => {
                format!("Agent reached maximum number of iterations ({}).", max)
            }
            AgentError::Config(msg) => format!("Configuration problem: {}", msg),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
