//! Custom error types for Docent
//!
//! Provides a unified error handling system across all modules.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::ThreadId;

/// Main error type for Docent operations
#[derive(Error, Debug)]
pub enum DocentError {
    /// Ollama connection or API errors
    #[error("Ollama error: {0}")]
    Ollama(String),

    /// Ollama server could not be reached during startup
    #[error("Cannot reach Ollama at {0}. Start it with `ollama serve` and pull model '{1}'")]
    OllamaNotReachable(String, String),

    /// Model not available
    #[error("Model '{0}' not available in Ollama. Run: ollama pull {0}")]
    ModelNotFound(String),

    /// Retrieval index errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Document index file missing or unreadable
    #[error("Document index not found at {}", .0.display())]
    IndexNotFound(PathBuf),

    /// Tool execution errors
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// `resume` called on a thread that is not waiting for a decision
    #[error("Thread '{0}' has no pending approval to resume")]
    NoPendingApproval(ThreadId),

    /// `invoke` called on a thread that is waiting for a decision
    #[error("Thread '{0}' is waiting for a tool approval decision; resume it first")]
    ThreadSuspended(ThreadId),

    /// Decision payload could not be interpreted
    #[error("Invalid approval decision: {0}")]
    InvalidDecision(String),

    /// Decision token does not match the parked suspension
    #[error("Approval decision for thread '{0}' does not match its pending request")]
    StaleDecision(ThreadId),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for Docent operations
pub type Result<T> = std::result::Result<T, DocentError>;

impl DocentError {
    /// Create an Ollama error
    pub fn ollama(msg: impl Into<String>) -> Self {
        Self::Ollama(msg.into())
    }

    /// Create a retrieval error
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error belongs to the approval protocol family.
    ///
    /// Protocol errors are rejected input; the thread state is unchanged.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::NoPendingApproval(_)
                | Self::ThreadSuspended(_)
                | Self::InvalidDecision(_)
                | Self::StaleDecision(_)
        )
    }

    /// Whether this error should abort the session at startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::IndexNotFound(_)
                | Self::OllamaNotReachable(..)
                | Self::ModelNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_errors_are_classified() {
        let thread = ThreadId::from("t1");
        assert!(DocentError::NoPendingApproval(thread.clone()).is_protocol_error());
        assert!(DocentError::InvalidDecision("x".into()).is_protocol_error());
        assert!(!DocentError::config("missing").is_protocol_error());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(DocentError::IndexNotFound(PathBuf::from("/nope.json")).is_fatal());
        assert!(DocentError::ModelNotFound("llama3.2".into()).is_fatal());
        assert!(!DocentError::tool("boom").is_fatal());
    }
}
