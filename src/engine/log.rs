//! Log fallback engine
//!
//! Used when no real synthesizer is configured. The text is written to the
//! log and the utterance completes immediately: `start` and `end` are
//! delivered from inside `speak()`.

use super::{lock, Engine, ListenerId, ListenerRegistry, VoicesListener};
use crate::events::UtteranceEvent;
use crate::utterance::{Utterance, Voice};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct LogEngine {
    paused: AtomicBool,
    voices: Mutex<Vec<Voice>>,
    listeners: ListenerRegistry,
}

impl LogEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the advertised catalog and notify listeners
    pub fn set_voices(&self, voices: Vec<Voice>) {
        *lock(&self.voices) = voices;
        self.listeners.notify();
    }
}

impl Engine for LogEngine {
    fn speak(&self, utterance: Utterance) {
        info!(
            "📢 Speaking (rate {:.2}, pitch {:.2}, volume {:.2}, lang '{}'): '{}'",
            utterance.rate, utterance.pitch, utterance.volume, utterance.language, utterance.text
        );
        utterance.handlers.dispatch(&UtteranceEvent::Start);
        utterance.handlers.dispatch(&UtteranceEvent::End);
    }

    fn cancel(&self) {
        debug!("🛑 Cancel requested");
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn is_speaking(&self) -> bool {
        false
    }

    fn is_pending(&self) -> bool {
        false
    }

    fn voices(&self) -> Vec<Voice> {
        lock(&self.voices).clone()
    }

    fn subscribe_voices_changed(&self, listener: VoicesListener) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe_voices_changed(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn name(&self) -> &str {
        "log"
    }
}
