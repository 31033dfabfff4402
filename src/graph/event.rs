//! Events produced by a graph run

use crate::llm::LlmError;
use serde_json::Value;
use thiserror::Error;

/// Internal event emitted by the engine, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// Incremental text fragment from the model
    Token(String),
    /// The model backend signalled the end of the final turn
    TurnComplete,
    ToolStarted { tool: String, input: Value },
    ToolCompleted { tool: String, output: Value },
    /// In-band failure reported by a producer other than the engine itself
    RunError(String),
}

/// Run-level failure, delivered as the final item of an event stream
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("{0}")]
    Model(#[from] LlmError),

    #[error("Agent stopped after reaching the limit of {max} steps")]
    StepLimitExceeded { max: u32 },

    #[error("Agent run ended unexpectedly")]
    Aborted,
}
