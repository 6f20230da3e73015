//! Speech request facade
//!
//! A [`SpeechRequest`] owns one [`UtteranceConfig`] and forwards control
//! commands to the engine it was created with. Setters chain:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use utterance::{engine::LogEngine, SpeechRequest};
//! let mut request = SpeechRequest::new(Arc::new(LogEngine::new()));
//! request
//!     .set_text("Docking request granted")
//!     .set_rate(1.2)
//!     .set_language("en-GB")
//!     .set_on_end(|_| println!("done"))
//!     .speak();
//! ```

use crate::config::Config;
use crate::engine::{Engine, Subscription};
use crate::events::{EventKind, UtteranceEvent};
use crate::utterance::{filter_voices, UtteranceConfig, Voice};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SpeechRequest {
    engine: Arc<dyn Engine>,
    config: UtteranceConfig,
}

impl SpeechRequest {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            config: UtteranceConfig::default(),
        }
    }

    /// Create a request seeded with the configured defaults
    ///
    /// A configured voice name is resolved against the engine's current
    /// catalog; if the catalog does not list it (or is not loaded yet) a bare
    /// descriptor with that name is used.
    pub fn from_config(engine: Arc<dyn Engine>, config: &Config) -> Self {
        let defaults = &config.defaults;
        let mut request = Self::new(engine);
        request
            .set_rate(defaults.rate)
            .set_pitch(defaults.pitch)
            .set_volume(defaults.volume)
            .set_language(defaults.language.clone());

        if let Some(name) = &defaults.voice {
            let voice = request
                .engine
                .voices()
                .into_iter()
                .find(|v| &v.name == name)
                .unwrap_or_else(|| {
                    warn!("⚠️ Voice '{}' not in engine catalog, using it by name", name);
                    Voice::new(name.clone(), defaults.language.clone())
                });
            request.set_voice(voice);
        }
        request
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Current configuration
    pub fn config(&self) -> &UtteranceConfig {
        &self.config
    }

    // Configuration

    /// Set the speaking rate, clamped to `[0, 10]`
    pub fn set_rate(&mut self, rate: f32) -> &mut Self {
        self.config.set_rate(rate);
        self
    }

    /// Set the pitch, clamped to `[0, 3]`
    pub fn set_pitch(&mut self, pitch: f32) -> &mut Self {
        self.config.set_pitch(pitch);
        self
    }

    /// Set the volume, clamped to `[0, 1]`
    pub fn set_volume(&mut self, volume: f32) -> &mut Self {
        self.config.set_volume(volume);
        self
    }

    /// Set the language code, passed to the engine as given
    pub fn set_language(&mut self, code: impl Into<String>) -> &mut Self {
        self.config.set_language(code.into());
        self
    }

    pub fn set_voice(&mut self, voice: Voice) -> &mut Self {
        self.config.set_voice(voice);
        self
    }

    pub fn set_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.config.set_text(text.into());
        self
    }

    // Events

    pub fn set_on_start<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&UtteranceEvent) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::Start, handler)
    }

    pub fn set_on_end<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&UtteranceEvent) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::End, handler)
    }

    pub fn set_on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&UtteranceEvent) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::Error, handler)
    }

    pub fn set_on_pause<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&UtteranceEvent) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::Pause, handler)
    }

    pub fn set_on_resume<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&UtteranceEvent) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::Resume, handler)
    }

    pub fn set_on_boundary<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&UtteranceEvent) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::Boundary, handler)
    }

    pub fn set_on_mark<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&UtteranceEvent) + Send + Sync + 'static,
    {
        self.set_handler(EventKind::Mark, handler)
    }

    fn set_handler<F>(&mut self, kind: EventKind, handler: F) -> &mut Self
    where
        F: Fn(&UtteranceEvent) + Send + Sync + 'static,
    {
        self.config.set_handler(kind, Arc::new(handler));
        self
    }

    /// Call `callback` with the voice list each time the engine's catalog changes
    ///
    /// The list is re-read from the engine on every change and narrowed with
    /// `filter` the same way [`SpeechRequest::voices`] does. The subscription
    /// belongs to the engine and outlives this request unless the returned
    /// handle is cancelled or dropped.
    pub fn on_voices_changed<F>(&self, filter: Option<&str>, callback: F) -> Subscription
    where
        F: Fn(Vec<Voice>) + Send + Sync + 'static,
    {
        let engine = Arc::downgrade(&self.engine);
        let filter = filter.map(str::to_string);
        let id = self.engine.subscribe_voices_changed(Arc::new(move || {
            if let Some(engine) = engine.upgrade() {
                callback(filter_voices(engine.voices(), filter.as_deref()));
            }
        }));
        Subscription::new(&self.engine, id)
    }

    // Control

    /// Submit the current configuration for rendering
    pub fn speak(&self) {
        debug!(
            "🗣️ Submitting utterance to '{}': '{}'",
            self.engine.name(),
            self.config.text()
        );
        self.engine.speak(self.config.snapshot());
    }

    /// Stop everything the engine is rendering or has queued
    pub fn cancel(&self) {
        debug!("🛑 Cancel requested");
        self.engine.cancel();
    }

    pub fn pause(&self) {
        debug!("⏸️ Pause requested");
        self.engine.pause();
    }

    pub fn resume(&self) {
        debug!("▶️ Resume requested");
        self.engine.resume();
    }

    // Status

    pub fn is_paused(&self) -> bool {
        self.engine.is_paused()
    }

    pub fn is_speaking(&self) -> bool {
        self.engine.is_speaking()
    }

    pub fn is_pending(&self) -> bool {
        self.engine.is_pending()
    }

    // Voices

    /// Engine voices, optionally only those whose language tag contains `filter`
    pub fn voices(&self, filter: Option<&str>) -> Vec<Voice> {
        filter_voices(self.engine.voices(), filter)
    }
}

impl fmt::Debug for SpeechRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechRequest")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LogEngine;

    fn request() -> SpeechRequest {
        SpeechRequest::new(Arc::new(LogEngine::new()))
    }

    #[test]
    fn test_rate_clamping() {
        let mut r = request();
        assert_eq!(r.set_rate(-5.0).config().rate(), 0.0);
        assert_eq!(r.set_rate(99.0).config().rate(), 10.0);
        assert_eq!(r.set_rate(4.0).config().rate(), 4.0);
    }

    #[test]
    fn test_pitch_and_volume_clamping() {
        let mut r = request();
        r.set_pitch(-1.0).set_volume(2.0);
        assert_eq!(r.config().pitch(), 0.0);
        assert_eq!(r.config().volume(), 1.0);

        r.set_pitch(2.5).set_volume(0.3);
        assert_eq!(r.config().pitch(), 2.5);
        assert_eq!(r.config().volume(), 0.3);
    }

    #[test]
    fn test_setters_return_same_instance() {
        let mut r = request();
        let this: *const SpeechRequest = &r;

        assert!(std::ptr::eq(r.set_rate(1.0), this));
        assert!(std::ptr::eq(r.set_pitch(1.0), this));
        assert!(std::ptr::eq(r.set_volume(1.0), this));
        assert!(std::ptr::eq(r.set_language("en-US"), this));
        assert!(std::ptr::eq(r.set_voice(Voice::new("alba", "en-GB")), this));
        assert!(std::ptr::eq(r.set_text("hi"), this));
        assert!(std::ptr::eq(r.set_on_start(|_| {}), this));
        assert!(std::ptr::eq(r.set_on_mark(|_| {}), this));
    }

    #[test]
    fn test_verbatim_fields() {
        let mut r = request();
        r.set_language("xx-NOT-A-LOCALE")
            .set_text("  spaced  ")
            .set_voice(Voice::new("ghost", "zz"));
        assert_eq!(r.config().language(), "xx-NOT-A-LOCALE");
        assert_eq!(r.config().text(), "  spaced  ");
        assert_eq!(r.config().voice().map(|v| v.name.as_str()), Some("ghost"));
    }

    #[test]
    fn test_from_config_applies_defaults() {
        let engine = Arc::new(LogEngine::new());
        engine.set_voices(vec![Voice::new("alba", "en-GB")]);

        let mut config = Config::default();
        config.defaults.rate = 25.0;
        config.defaults.language = "en-GB".to_string();
        config.defaults.voice = Some("alba".to_string());

        let r = SpeechRequest::from_config(engine, &config);
        assert_eq!(r.config().rate(), 10.0);
        assert_eq!(r.config().language(), "en-GB");
        assert_eq!(r.config().voice(), Some(&Voice::new("alba", "en-GB")));
    }

    #[test]
    fn test_from_config_unknown_voice_kept_by_name() {
        let mut config = Config::default();
        config.defaults.voice = Some("missing".to_string());

        let r = SpeechRequest::from_config(Arc::new(LogEngine::new()), &config);
        assert_eq!(r.config().voice().map(|v| v.name.as_str()), Some("missing"));
    }
}
