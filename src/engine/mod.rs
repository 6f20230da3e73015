//! Speech engines
//!
//! The engine is the process-wide service that actually renders speech. A
//! [`crate::SpeechRequest`] never reaches for it through global state; it is
//! handed an `Arc<dyn Engine>` at construction.

use crate::config::Config;
use crate::error::SpeechResult;
use crate::utterance::{Utterance, Voice};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, warn};

pub mod log;
pub mod ssip;
pub mod ssip_protocol;

pub use self::log::LogEngine;
pub use self::ssip::{SsipEngine, SsipOptions};

/// Callback run whenever the engine's voice catalog changes
pub type VoicesListener = Arc<dyn Fn() + Send + Sync>;

/// Identifies one voices-changed listener on an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Trait for speech engines
///
/// Every method must return promptly. Rendering happens asynchronously and
/// its progress is reported through the handlers carried by each
/// [`Utterance`].
pub trait Engine: Send + Sync + fmt::Debug {
    /// Queue an utterance for rendering
    fn speak(&self, utterance: Utterance);

    /// Drop everything in flight or queued
    fn cancel(&self);

    /// Suspend rendering
    fn pause(&self);

    /// Continue a suspended rendering
    fn resume(&self);

    fn is_paused(&self) -> bool;

    /// Check if audio is currently being produced
    fn is_speaking(&self) -> bool;

    /// Check if utterances are queued but not yet started
    fn is_pending(&self) -> bool;

    /// Current voice catalog, empty until the engine has loaded it
    fn voices(&self) -> Vec<Voice>;

    fn subscribe_voices_changed(&self, listener: VoicesListener) -> ListenerId;

    /// Returns `false` if the listener was already gone
    fn unsubscribe_voices_changed(&self, id: ListenerId) -> bool;

    /// Get the engine name
    fn name(&self) -> &str;
}

/// Voices-changed listener bookkeeping shared by engine implementations
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, VoicesListener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: VoicesListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.listeners).push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every listener
    ///
    /// Listeners are called without the registry lock held so they may
    /// subscribe or unsubscribe from inside the callback.
    pub fn notify(&self) {
        let listeners: Vec<VoicesListener> = lock(&self.listeners)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        debug!("🔔 Notifying {} voices-changed listener(s)", listeners.len());
        for listener in listeners {
            listener();
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Handle to a voices-changed subscription
///
/// The subscription lives on the engine, not on the request that created it.
/// Dropping the handle unsubscribes; call [`Subscription::detach`] to keep it
/// for as long as the engine lives.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    engine: Weak<dyn Engine>,
    id: Option<ListenerId>,
}

impl Subscription {
    pub(crate) fn new(engine: &Arc<dyn Engine>, id: ListenerId) -> Self {
        Self {
            engine: Arc::downgrade(engine),
            id: Some(id),
        }
    }

    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }

    /// Check if the listener is still registered on a live engine
    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.engine.strong_count() > 0
    }

    /// Unsubscribe now
    ///
    /// Returns `false` if the engine is gone or had already dropped the listener.
    pub fn cancel(mut self) -> bool {
        self.unsubscribe()
    }

    /// Keep the listener registered for the rest of the engine's life
    pub fn detach(mut self) {
        self.id = None;
    }

    fn unsubscribe(&mut self) -> bool {
        let Some(id) = self.id.take() else {
            return false;
        };
        match self.engine.upgrade() {
            Some(engine) => engine.unsubscribe_voices_changed(id),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Lock a mutex, recovering the data if a callback panicked while holding it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Factory to create the configured engine
pub async fn create_engine(config: &Config) -> SpeechResult<Arc<dyn Engine>> {
    info!("🛠️ Creating speech engine: {}", config.engine);
    let engine: Arc<dyn Engine> = match config.engine.as_str() {
        "speechd" | "ssip" => {
            let options = SsipOptions::from_config(config);
            info!("  - Using speech-dispatcher at {}", options.socket_path.display());
            Arc::new(SsipEngine::connect(options).await?)
        }
        "log" => {
            info!("  - Using log engine");
            Arc::new(LogEngine::new())
        }
        other => {
            warn!("  - Unknown engine '{}', falling back to log engine", other);
            Arc::new(LogEngine::new())
        }
    };
    info!("✅ Speech engine '{}' initialized", engine.name());
    Ok(engine)
}
