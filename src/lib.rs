//! Utterance Library
//!
//! A fluent speech request facade over pluggable text-to-speech engines.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod request;
pub mod utils;
pub mod utterance;

pub use engine::{Engine, Subscription};
pub use error::{SpeechError, SpeechResult};
pub use events::{EventKind, UtteranceError, UtteranceErrorKind, UtteranceEvent};
pub use request::SpeechRequest;
pub use utterance::{UtteranceConfig, Voice};
