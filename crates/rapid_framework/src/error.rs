//! Error types for the rapid framework

use thiserror::Error;

/// Errors reported by the task supervisor and the synchronous context.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Synchronous job failed: {0}")]
    JobFailed(String),

    #[error("Synchronous job panicked: {0}")]
    JobPanicked(String),

    #[error("Synchronous context is no longer running")]
    ContextClosed,

    #[error("No tokio runtime is available on this thread")]
    NoRuntime,
}

/// Errors raised while building or dispatching commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Command {0} is already registered")]
    DuplicateCommand(String),

    #[error("Command {0} has no action")]
    MissingAction(String),
}

/// A command argument that could not be converted by its mapper.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct InvalidArgumentError {
    pub message: String,
}

impl InvalidArgumentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// JSON serialization errors.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("Failed to serialize value: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to deserialize value: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Plugin lifecycle errors
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Plugin is in state {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: crate::runtime::PluginState,
        actual: crate::runtime::PluginState,
    },
}

impl From<anyhow::Error> for PluginError {
    fn from(e: anyhow::Error) -> Self {
        PluginError::RuntimeError(e.to_string())
    }
}

pub type TaskResult<T> = Result<T, TaskError>;
pub type PluginResult<T> = Result<T, PluginError>;
