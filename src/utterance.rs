//! Utterance configuration model

use crate::events::{EventHandler, EventHandlers, EventKind};
use crate::utils::range::{PITCH, RATE, VOLUME};
use serde::{Deserialize, Serialize};

/// A synthetic voice as reported by the engine
///
/// Owned by the engine's catalog. The facade keeps a copy of whichever voice
/// was last assigned and never checks that it still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// Language tag, e.g. "en-US"
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default)]
    pub default: bool,
}

impl Voice {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            variant: None,
            default: false,
        }
    }

    /// Case-sensitive substring match on the language tag
    pub fn matches_language(&self, filter: &str) -> bool {
        self.language.contains(filter)
    }
}

/// Keep the voices whose language tag contains `filter`
pub fn filter_voices(voices: Vec<Voice>, filter: Option<&str>) -> Vec<Voice> {
    match filter {
        Some(f) => voices
            .into_iter()
            .filter(|v| v.matches_language(f))
            .collect(),
        None => voices,
    }
}

/// Mutable configuration owned by a single speech request
///
/// Numeric fields are clamped on every write, so a value outside its range is
/// never observable.
#[derive(Debug, Clone)]
pub struct UtteranceConfig {
    text: String,
    rate: f32,
    pitch: f32,
    volume: f32,
    language: String,
    voice: Option<Voice>,
    handlers: EventHandlers,
}

impl Default for UtteranceConfig {
    fn default() -> Self {
        Self {
            text: String::new(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            language: String::new(),
            voice: None,
            handlers: EventHandlers::new(),
        }
    }
}

impl UtteranceConfig {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Language code, empty when the engine default applies
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn voice(&self) -> Option<&Voice> {
        self.voice.as_ref()
    }

    pub fn handlers(&self) -> &EventHandlers {
        &self.handlers
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.text = text;
    }

    pub(crate) fn set_rate(&mut self, value: f32) {
        self.rate = RATE.clamp(value);
    }

    pub(crate) fn set_pitch(&mut self, value: f32) {
        self.pitch = PITCH.clamp(value);
    }

    pub(crate) fn set_volume(&mut self, value: f32) {
        self.volume = VOLUME.clamp(value);
    }

    pub(crate) fn set_language(&mut self, code: String) {
        self.language = code;
    }

    pub(crate) fn set_voice(&mut self, voice: Voice) {
        self.voice = Some(voice);
    }

    pub(crate) fn set_handler(&mut self, kind: EventKind, handler: EventHandler) {
        self.handlers.set(kind, handler);
    }

    /// Freeze the current configuration for submission to an engine
    pub fn snapshot(&self) -> Utterance {
        Utterance {
            text: self.text.clone(),
            rate: self.rate,
            pitch: self.pitch,
            volume: self.volume,
            language: self.language.clone(),
            voice: self.voice.clone(),
            handlers: self.handlers.clone(),
        }
    }
}

/// One submission to an engine
///
/// Later changes to the originating request do not affect an utterance that
/// was already submitted.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub language: String,
    pub voice: Option<Voice>,
    pub handlers: EventHandlers,
}
