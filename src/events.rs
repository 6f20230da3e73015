//! Utterance lifecycle events
//!
//! Engines report progress through [`UtteranceEvent`] values; the payload of
//! each variant is whatever the engine was able to tell us and is forwarded to
//! the caller's handler untouched.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Kinds of events an engine can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Engine began rendering the utterance
    Start,
    /// Engine finished rendering the utterance
    End,
    /// Engine failed while rendering the utterance
    Error,
    /// Rendering was suspended
    Pause,
    /// Rendering continued after a pause
    Resume,
    /// A word or sentence boundary was crossed
    Boundary,
    /// An embedded marker in the text was reached
    Mark,
    /// The engine's voice catalog changed (engine-wide)
    VoicesChanged,
}

impl EventKind {
    /// Kinds that belong to a single utterance
    pub const UTTERANCE: [EventKind; 7] = [
        EventKind::Start,
        EventKind::End,
        EventKind::Error,
        EventKind::Pause,
        EventKind::Resume,
        EventKind::Boundary,
        EventKind::Mark,
    ];

    pub fn is_utterance_scoped(&self) -> bool {
        Self::UTTERANCE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::End => "end",
            EventKind::Error => "error",
            EventKind::Pause => "pause",
            EventKind::Resume => "resume",
            EventKind::Boundary => "boundary",
            EventKind::Mark => "mark",
            EventKind::VoicesChanged => "voiceschanged",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Granularity of a boundary event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    Word,
    Sentence,
}

/// Why an utterance did not finish normally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceErrorKind {
    /// Removed from the engine by a cancel request
    Canceled,
    /// Cut off by another utterance
    Interrupted,
    /// The engine could not synthesize the text
    SynthesisFailed,
    /// The engine went away before the utterance completed
    EngineUnavailable,
}

/// Engine-reported failure for one utterance
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind:?}: {message}")]
pub struct UtteranceError {
    pub kind: UtteranceErrorKind,
    pub message: String,
}

impl UtteranceError {
    pub fn new(kind: UtteranceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Payload delivered to an utterance event handler
#[derive(Debug, Clone, PartialEq)]
pub enum UtteranceEvent {
    Start,
    End,
    Error(UtteranceError),
    Pause,
    Resume,
    Boundary { kind: BoundaryKind, char_index: usize },
    Mark { name: String },
}

impl UtteranceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UtteranceEvent::Start => EventKind::Start,
            UtteranceEvent::End => EventKind::End,
            UtteranceEvent::Error(_) => EventKind::Error,
            UtteranceEvent::Pause => EventKind::Pause,
            UtteranceEvent::Resume => EventKind::Resume,
            UtteranceEvent::Boundary { .. } => EventKind::Boundary,
            UtteranceEvent::Mark { .. } => EventKind::Mark,
        }
    }
}

/// Callback bound to one utterance event kind
pub type EventHandler = Arc<dyn Fn(&UtteranceEvent) + Send + Sync>;

/// Handlers registered on an utterance, at most one per kind
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: HashMap<EventKind, EventHandler>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, returning the handler it replaced
    ///
    /// `VoicesChanged` is engine-wide and cannot be bound here.
    pub fn set(&mut self, kind: EventKind, handler: EventHandler) -> Option<EventHandler> {
        if !kind.is_utterance_scoped() {
            warn!("⚠️ '{}' is not an utterance event, handler ignored", kind);
            return None;
        }
        self.handlers.insert(kind, handler)
    }

    pub fn get(&self, kind: EventKind) -> Option<&EventHandler> {
        self.handlers.get(&kind)
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke the handler registered for the event's kind
    ///
    /// Returns `false` when nothing was registered for it.
    pub fn dispatch(&self, event: &UtteranceEvent) -> bool {
        match self.handlers.get(&event.kind()) {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&'static str> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("EventHandlers").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, EventHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Arc::new(move |_: &UtteranceEvent| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(UtteranceEvent::Start.kind(), EventKind::Start);
        assert_eq!(
            UtteranceEvent::Mark {
                name: "m1".to_string()
            }
            .kind(),
            EventKind::Mark
        );
        assert!(!EventKind::VoicesChanged.is_utterance_scoped());
        assert!(EventKind::Mark.is_utterance_scoped());
        assert_eq!(EventKind::VoicesChanged.to_string(), "voiceschanged");
    }

    #[test]
    fn test_set_replaces_previous_handler() {
        let (first_count, first) = counter();
        let (second_count, second) = counter();

        let mut handlers = EventHandlers::new();
        assert!(handlers.set(EventKind::Start, first).is_none());
        assert!(handlers.set(EventKind::Start, second).is_some());
        assert_eq!(handlers.len(), 1);

        assert!(handlers.dispatch(&UtteranceEvent::Start));
        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_unregistered_kind() {
        let (count, handler) = counter();
        let mut handlers = EventHandlers::new();
        handlers.set(EventKind::End, handler);

        assert!(!handlers.dispatch(&UtteranceEvent::Start));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_voices_changed_not_bindable() {
        let (_, handler) = counter();
        let mut handlers = EventHandlers::new();
        assert!(handlers.set(EventKind::VoicesChanged, handler).is_none());
        assert!(handlers.is_empty());
    }
}
