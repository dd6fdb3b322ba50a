//! Error handling for MediaFlow-RS
//!
//! Every component operation returns [`Result`]. Errors never cross component
//! boundaries by any other route, and none of them is fatal to a chain: the
//! caller decides whether to keep driving the remaining components.

use crate::pipeline::id::Iteration;
use thiserror::Error;

/// Main error type for MediaFlow-RS operations
#[derive(Error, Debug)]
pub enum MediaFlowError {
    /// Double init, use before init, destroy before init, bad tunables
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A message of the wrong type or subtype was delivered to `push`
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// `push`/`pull` observed an iteration lower than one already seen
    #[error("Iteration {received} precedes previously observed iteration {previous}")]
    IterationRegression {
        previous: Iteration,
        received: Iteration,
    },

    /// An external collaborator could not allocate a handle for a new session
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Opaque failure surfaced from a wrapped native collaborator
    #[error("External failure: {0}")]
    External(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<MediaFlowError>,
    },
}

/// Coarse classification of a [`MediaFlowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    InvalidMessage,
    IterationRegression,
    ResourceUnavailable,
    ExternalFailure,
    Io,
    Serialization,
}

impl MediaFlowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        MediaFlowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify the error, looking through any context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaFlowError::Configuration(_) => ErrorKind::Configuration,
            MediaFlowError::InvalidMessage(_) => ErrorKind::InvalidMessage,
            MediaFlowError::IterationRegression { .. } => ErrorKind::IterationRegression,
            MediaFlowError::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            MediaFlowError::External(_) => ErrorKind::ExternalFailure,
            MediaFlowError::Io(_) => ErrorKind::Io,
            MediaFlowError::Serialization(_) => ErrorKind::Serialization,
            MediaFlowError::WithContext { source, .. } => source.kind(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        MediaFlowError::Configuration(message.into())
    }

    pub fn invalid_message(message: impl Into<String>) -> Self {
        MediaFlowError::InvalidMessage(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        MediaFlowError::ResourceUnavailable(message.into())
    }

    pub fn external(message: impl Into<String>) -> Self {
        MediaFlowError::External(message.into())
    }
}

/// Result type alias for MediaFlow-RS operations
pub type Result<T> = std::result::Result<T, MediaFlowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
