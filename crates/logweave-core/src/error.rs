use thiserror::Error;

/// Core error types for LogWeave
#[derive(Debug, Error)]
pub enum LogWeaveError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Processor error in '{processor}': {message}")]
    Processor { processor: String, message: String },

    #[error("Malformed payload at '{path}': {reason}")]
    MalformedPayload { path: String, reason: String },

    #[error("Sequence store error: {0}")]
    Sequence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors specific to line sinks and batch delivery
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Delivery to '{sink}' failed after {attempts} attempt(s): {message}")]
    Delivery {
        sink: String,
        attempts: u32,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for LogWeave operations
pub type Result<T> = std::result::Result<T, LogWeaveError>;
