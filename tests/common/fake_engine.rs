//! Fake Speech Engine for Testing
//!
//! Records every call and lets the test drive utterance events and state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use utterance::engine::{Engine, ListenerId, ListenerRegistry, VoicesListener};
use utterance::utterance::Utterance;
use utterance::{UtteranceEvent, Voice};

/// Control calls seen by the fake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Speak,
    Cancel,
    Pause,
    Resume,
}

#[derive(Debug, Default)]
pub struct FakeEngine {
    pub calls: Mutex<Vec<Call>>,
    pub submitted: Mutex<Vec<Utterance>>,
    pub paused: AtomicBool,
    pub speaking: AtomicBool,
    pub pending: AtomicBool,
    pub voices: Mutex<Vec<Voice>>,
    pub listeners: ListenerRegistry,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<Utterance> {
        self.submitted.lock().unwrap().clone()
    }

    /// Deliver `event` to the handlers of the `index`-th submitted utterance
    pub fn fire(&self, index: usize, event: UtteranceEvent) -> bool {
        let utterance = self.submitted.lock().unwrap()[index].clone();
        utterance.handlers.dispatch(&event)
    }

    /// Play the `index`-th utterance to completion
    pub fn complete(&self, index: usize) {
        self.fire(index, UtteranceEvent::Start);
        self.fire(index, UtteranceEvent::End);
    }

    /// Replace the catalog and announce the change
    pub fn set_voices(&self, voices: Vec<Voice>) {
        *self.voices.lock().unwrap() = voices;
        self.listeners.notify();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Engine for FakeEngine {
    fn speak(&self, utterance: Utterance) {
        self.record(Call::Speak);
        self.submitted.lock().unwrap().push(utterance);
    }

    fn cancel(&self) {
        self.record(Call::Cancel);
    }

    fn pause(&self) {
        self.record(Call::Pause);
    }

    fn resume(&self) {
        self.record(Call::Resume);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.lock().unwrap().clone()
    }

    fn subscribe_voices_changed(&self, listener: VoicesListener) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    fn unsubscribe_voices_changed(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

