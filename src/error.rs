//! Utterance Error Types
//!
//! Errors raised while setting up engines and loading configuration. Failures
//! that happen while an utterance is being rendered are not returned from any
//! call; they reach the caller as [`crate::events::UtteranceEvent::Error`].

use thiserror::Error;

/// Central error type for the crate
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Engine connection error: {0}")]
    Connection(String),

    #[error("Protocol error {code}: {message}")]
    Protocol { code: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for fallible setup operations
pub type SpeechResult<T> = Result<T, SpeechError>;

