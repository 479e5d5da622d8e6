//! Error types for the assistant engine.

/// Top-level error type for the chat panel engine.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Remote inference call error (transport or non-success status).
    #[error("inference error: {0}")]
    Inference(String),

    /// Speech synthesis or narration session error.
    #[error("narration error: {0}")]
    Narration(String),

    /// Audio device, decode, or playback error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
