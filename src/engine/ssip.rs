//! speech-dispatcher engine
//!
//! Talks SSIP to the speech-dispatcher daemon over its Unix socket. One tokio
//! task owns the connection: control calls only push a request onto a channel,
//! and the task turns daemon notifications into utterance events.

use super::ssip_protocol::{
    encode_body, parse_line, parse_voice, pitch_to_ssip, rate_to_ssip, volume_to_ssip, Command,
    Notification, NotificationKind, Reply, ReplyAssembler, CODE_MESSAGE_QUEUED,
    CODE_RECEIVING_DATA, DEFAULT_VOICE_TYPE,
};
use super::{lock, Engine, ListenerId, ListenerRegistry, VoicesListener};
use crate::config::Config;
use crate::error::{SpeechError, SpeechResult};
use crate::events::{EventHandlers, UtteranceError, UtteranceErrorKind, UtteranceEvent};
use crate::utterance::{Utterance, Voice};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, error, info, warn};

/// Connection settings for speech-dispatcher
#[derive(Debug, Clone)]
pub struct SsipOptions {
    pub socket_path: PathBuf,
    /// Sent as `user:application:component`
    pub client_name: String,
    /// Extra connection attempts while the daemon is starting up
    pub connect_retries: usize,
    /// Language sent for utterances that leave theirs empty
    pub default_language: String,
    /// Voice sent for utterances without one; `None` falls back to the
    /// daemon's default voice type
    pub default_voice: Option<String>,
}

impl Default for SsipOptions {
    fn default() -> Self {
        Self {
            socket_path: Self::default_socket_path(),
            client_name: default_client_name("utterance"),
            connect_retries: 3,
            default_language: DEFAULT_LANGUAGE.to_string(),
            default_voice: None,
        }
    }
}

impl SsipOptions {
    pub fn from_config(config: &Config) -> Self {
        let socket_path = config
            .socket_path
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_socket_path);
        let default_language = match config.defaults.language.as_str() {
            "" => DEFAULT_LANGUAGE.to_string(),
            language => language.to_string(),
        };
        Self {
            socket_path,
            client_name: default_client_name(&config.client_name),
            connect_retries: config.connect_retries,
            default_language,
            default_voice: config.defaults.voice.clone().filter(|v| !v.is_empty()),
        }
    }

    /// `$SPEECHD_ADDRESS`, else the daemon's socket in the runtime directory
    pub fn default_socket_path() -> PathBuf {
        if let Ok(address) = std::env::var("SPEECHD_ADDRESS") {
            if let Some(path) = address.strip_prefix("unix_socket:") {
                return PathBuf::from(path);
            }
            warn!("⚠️ Unsupported SPEECHD_ADDRESS '{}', using default socket", address);
        }
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("speech-dispatcher")
            .join("speechd.sock")
    }
}

/// speech-dispatcher's own `DefaultLanguage`
const DEFAULT_LANGUAGE: &str = "en";

fn default_client_name(application: &str) -> String {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("{}:{}:main", user, application)
}

/// Work for the connection task
enum Request {
    Speak(Utterance),
    Cancel,
    Pause,
    Resume,
    RefreshVoices,
    Shutdown,
}

struct Tracked {
    handlers: EventHandlers,
    started: bool,
}

#[derive(Default)]
struct PlaybackState {
    /// `speak()` calls the daemon has not acknowledged yet
    submitting: usize,
    /// Messages the daemon queued, by message id
    messages: HashMap<u64, Tracked>,
    paused: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<PlaybackState>,
    voices: Mutex<Vec<Voice>>,
    listeners: ListenerRegistry,
}

impl Shared {
    /// Fail every message the daemon will no longer report on
    fn fail_all(&self, reason: &str) {
        let orphaned: Vec<EventHandlers> = {
            let mut state = lock(&self.state);
            state.paused = false;
            state.messages.drain().map(|(_, t)| t.handlers).collect()
        };
        let event = UtteranceEvent::Error(UtteranceError::new(
            UtteranceErrorKind::EngineUnavailable,
            reason,
        ));
        for handlers in orphaned {
            handlers.dispatch(&event);
        }
    }
}

pub struct SsipEngine {
    tx: mpsc::UnboundedSender<Request>,
    shared: Arc<Shared>,
    socket_path: PathBuf,
}

impl fmt::Debug for SsipEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsipEngine")
            .field("socket_path", &self.socket_path)
            .finish()
    }
}

impl SsipEngine {
    /// Connect to speech-dispatcher and start the connection task
    ///
    /// The voice catalog is requested in the background; listen for
    /// voices-changed to learn when it is available.
    pub async fn connect(options: SsipOptions) -> SpeechResult<Self> {
        let path = options.socket_path.clone();
        let strategy = ExponentialBackoff::from_millis(10)
            .factor(5)
            .max_delay(Duration::from_secs(1))
            .map(jitter)
            .take(options.connect_retries);

        let stream = Retry::spawn(strategy, || UnixStream::connect(&path))
            .await
            .map_err(|e| {
                SpeechError::Connection(format!(
                    "speech-dispatcher not reachable at {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let shared = Arc::new(Shared::default());
        let defaults = SessionDefaults {
            language: options.default_language.clone(),
            voice: options.default_voice.clone(),
        };
        let mut conn = Connection::new(stream, shared.clone(), defaults);
        conn.command(&Command::SetClientName(options.client_name.clone()))
            .await?;
        conn.command(&Command::EnableNotifications).await?;
        info!(
            "🔊 Connected to speech-dispatcher at {} as {}",
            path.display(),
            options.client_name
        );
        debug!(
            "Session defaults: language {}, voice {}",
            options.default_language,
            options.default_voice.as_deref().unwrap_or(DEFAULT_VOICE_TYPE)
        );

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(conn.run(rx));

        let engine = Self {
            tx,
            shared,
            socket_path: path,
        };
        engine.refresh_voices();
        Ok(engine)
    }

    /// Ask the daemon for its voice list again
    pub fn refresh_voices(&self) {
        self.send(Request::RefreshVoices);
    }

    fn send(&self, request: Request) {
        if self.tx.send(request).is_err() {
            warn!("⚠️ speech-dispatcher connection closed, request dropped");
        }
    }
}

impl Drop for SsipEngine {
    fn drop(&mut self) {
        let _ = self.tx.send(Request::Shutdown);
    }
}

impl Engine for SsipEngine {
    fn speak(&self, utterance: Utterance) {
        lock(&self.shared.state).submitting += 1;
        if let Err(mpsc::error::SendError(Request::Speak(utterance))) =
            self.tx.send(Request::Speak(utterance))
        {
            lock(&self.shared.state).submitting -= 1;
            utterance
                .handlers
                .dispatch(&UtteranceEvent::Error(UtteranceError::new(
                    UtteranceErrorKind::EngineUnavailable,
                    "speech-dispatcher connection closed",
                )));
        }
    }

    fn cancel(&self) {
        self.send(Request::Cancel);
    }

    fn pause(&self) {
        self.send(Request::Pause);
    }

    fn resume(&self) {
        self.send(Request::Resume);
    }

    fn is_paused(&self) -> bool {
        lock(&self.shared.state).paused
    }

    fn is_speaking(&self) -> bool {
        lock(&self.shared.state)
            .messages
            .values()
            .any(|t| t.started)
    }

    fn is_pending(&self) -> bool {
        let state = lock(&self.shared.state);
        state.submitting > 0 || state.messages.values().any(|t| !t.started)
    }

    fn voices(&self) -> Vec<Voice> {
        lock(&self.shared.voices).clone()
    }

    fn subscribe_voices_changed(&self, listener: VoicesListener) -> ListenerId {
        self.shared.listeners.subscribe(listener)
    }

    fn unsubscribe_voices_changed(&self, id: ListenerId) -> bool {
        self.shared.listeners.unsubscribe(id)
    }

    fn name(&self) -> &str {
        "speechd"
    }
}

/// Settings restored for utterances that do not carry their own
///
/// Language and voice persist on the connection, so every message sets both.
struct SessionDefaults {
    language: String,
    voice: Option<String>,
}

struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    assembler: ReplyAssembler,
    shared: Arc<Shared>,
    defaults: SessionDefaults,
    /// Set between sending a message body and reading its id
    awaiting_id: bool,
    /// Notifications that arrived before their message id was known
    early: Vec<Notification>,
}

impl Connection {
    fn new(stream: UnixStream, shared: Arc<Shared>, defaults: SessionDefaults) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
            assembler: ReplyAssembler::new(),
            shared,
            defaults,
            awaiting_id: false,
            early: Vec::new(),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>) {
        loop {
            tokio::select! {
                request = rx.recv() => {
                    let request = match request {
                        Some(Request::Shutdown) | None => {
                            let _ = self.writer.write_all(Command::Quit.to_line().as_bytes()).await;
                            debug!("speech-dispatcher connection shut down");
                            break;
                        }
                        Some(r) => r,
                    };
                    if let Err(e) = self.handle(request).await {
                        error!("❌ speech-dispatcher connection failed: {}", e);
                        break;
                    }
                }
                line = self.lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if let Err(e) = self.on_line(&line) {
                                warn!("⚠️ Ignoring line from speech-dispatcher: {}", e);
                            }
                        }
                        Ok(None) => {
                            warn!("⚠️ speech-dispatcher closed the connection");
                            break;
                        }
                        Err(e) => {
                            error!("❌ Failed reading from speech-dispatcher: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        rx.close();
        while let Ok(request) = rx.try_recv() {
            if let Request::Speak(utterance) = request {
                lock(&self.shared.state).submitting -= 1;
                utterance
                    .handlers
                    .dispatch(&UtteranceEvent::Error(UtteranceError::new(
                        UtteranceErrorKind::EngineUnavailable,
                        "speech-dispatcher connection closed",
                    )));
            }
        }
        self.shared.fail_all("speech-dispatcher connection closed");
    }

    /// Errors returned here mean the connection is unusable
    async fn handle(&mut self, request: Request) -> SpeechResult<()> {
        match request {
            Request::Speak(utterance) => self.speak(utterance).await,
            Request::Cancel => self.control(Command::Cancel).await,
            Request::Pause => {
                self.control(Command::Pause).await?;
                lock(&self.shared.state).paused = true;
                Ok(())
            }
            Request::Resume => {
                self.control(Command::Resume).await?;
                lock(&self.shared.state).paused = false;
                Ok(())
            }
            Request::RefreshVoices => self.refresh_voices().await,
            Request::Shutdown => Ok(()),
        }
    }

    /// Send a control command; a refusal by the daemon is logged, not fatal
    async fn control(&mut self, command: Command) -> SpeechResult<()> {
        match self.command(&command).await {
            Ok(_) => Ok(()),
            Err(SpeechError::Protocol { code, message }) => {
                warn!("⚠️ speech-dispatcher refused {:?}: {} {}", command, code, message);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn speak(&mut self, utterance: Utterance) -> SpeechResult<()> {
        let Utterance {
            text,
            rate,
            pitch,
            volume,
            language,
            voice,
            handlers,
        } = utterance;

        let language = if language.is_empty() {
            self.defaults.language.clone()
        } else {
            language
        };
        let voice = match (voice, &self.defaults.voice) {
            (Some(voice), _) => Command::SetVoice(voice.name),
            (None, Some(name)) => Command::SetVoice(name.clone()),
            (None, None) => Command::SetVoiceType(DEFAULT_VOICE_TYPE.to_string()),
        };
        let commands = [
            Command::SetRate(rate_to_ssip(rate)),
            Command::SetPitch(pitch_to_ssip(pitch)),
            Command::SetVolume(volume_to_ssip(volume)),
            Command::SetLanguage(language),
            voice,
        ];

        let queued = self.submit(&commands, &text).await;
        let early = std::mem::take(&mut self.early);
        let mut state = lock(&self.shared.state);
        state.submitting -= 1;

        match queued {
            Ok(msg_id) => {
                debug!("📨 Message {} queued ({} chars)", msg_id, text.len());
                state.messages.insert(
                    msg_id,
                    Tracked {
                        handlers,
                        started: false,
                    },
                );
                drop(state);
                for notification in early {
                    if notification.msg_id == msg_id {
                        self.deliver(&notification);
                    } else {
                        debug!(
                            "Notification {:?} for unknown message {}",
                            notification.kind, notification.msg_id
                        );
                    }
                }
                Ok(())
            }
            Err(SpeechError::Protocol { code, message }) => {
                drop(state);
                warn!("⚠️ speech-dispatcher rejected utterance: {} {}", code, message);
                handlers.dispatch(&UtteranceEvent::Error(UtteranceError::new(
                    UtteranceErrorKind::SynthesisFailed,
                    message,
                )));
                Ok(())
            }
            Err(e) => {
                drop(state);
                handlers.dispatch(&UtteranceEvent::Error(UtteranceError::new(
                    UtteranceErrorKind::EngineUnavailable,
                    e.to_string(),
                )));
                Err(e)
            }
        }
    }

    /// Apply settings and send the text, returning the daemon's message id
    async fn submit(&mut self, settings: &[Command], text: &str) -> SpeechResult<u64> {
        for command in settings {
            self.command(command).await?;
        }

        let reply = self.command(&Command::Speak).await?;
        if reply.code != CODE_RECEIVING_DATA {
            return Err(SpeechError::Protocol {
                code: reply.code,
                message: format!("unexpected reply to SPEAK: {}", reply.message),
            });
        }

        self.awaiting_id = true;
        let reply = self.send_body(text).await;
        self.awaiting_id = false;
        let reply = reply?;
        if reply.code != CODE_MESSAGE_QUEUED {
            return Err(SpeechError::Protocol {
                code: reply.code,
                message: format!("message not queued: {}", reply.message),
            });
        }
        reply
            .data
            .first()
            .and_then(|id| id.trim().parse().ok())
            .ok_or_else(|| SpeechError::Protocol {
                code: reply.code,
                message: "queued message has no id".to_string(),
            })
    }

    async fn send_body(&mut self, text: &str) -> SpeechResult<Reply> {
        self.writer.write_all(encode_body(text).as_bytes()).await?;
        self.read_reply().await
    }

    async fn refresh_voices(&mut self) -> SpeechResult<()> {
        let reply = match self.command(&Command::ListVoices).await {
            Ok(reply) => reply,
            Err(SpeechError::Protocol { code, message }) => {
                warn!("⚠️ Could not list voices: {} {}", code, message);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let voices: Vec<Voice> = reply.data.iter().filter_map(|l| parse_voice(l)).collect();
        info!("🗣️ speech-dispatcher reports {} voice(s)", voices.len());
        *lock(&self.shared.voices) = voices;
        self.shared.listeners.notify();
        Ok(())
    }

    async fn command(&mut self, command: &Command) -> SpeechResult<Reply> {
        self.writer.write_all(command.to_line().as_bytes()).await?;
        self.read_reply().await
    }

    /// Read up to the next reply, handling notifications on the way
    async fn read_reply(&mut self) -> SpeechResult<Reply> {
        loop {
            let line = self.lines.next_line().await?.ok_or_else(|| {
                SpeechError::Connection("speech-dispatcher closed the connection".to_string())
            })?;
            let line = parse_line(&line)?;
            if let Some(reply) = self.assembler.push(line) {
                if reply.is_event() {
                    self.on_notification(&reply);
                    continue;
                }
                return reply.into_result();
            }
        }
    }

    /// Handle a line that arrived while no command was outstanding
    fn on_line(&mut self, raw: &str) -> SpeechResult<()> {
        let line = parse_line(raw)?;
        match self.assembler.push(line) {
            Some(reply) if reply.is_event() => self.on_notification(&reply),
            Some(reply) => warn!("⚠️ Unsolicited reply from speech-dispatcher: {:?}", reply),
            None => {}
        }
        Ok(())
    }

    fn on_notification(&mut self, reply: &Reply) {
        let notification = match Notification::from_reply(reply) {
            Ok(n) => n,
            Err(e) => {
                warn!("⚠️ Bad notification: {}", e);
                return;
            }
        };

        if self.deliver(&notification) {
            return;
        }
        if self.awaiting_id {
            // The daemon may start speaking before it reports the message id
            self.early.push(notification);
        } else {
            debug!(
                "Notification {:?} for unknown message {}",
                notification.kind, notification.msg_id
            );
        }
    }

    /// Dispatch a notification to its message's handlers
    ///
    /// Returns `false` if the message is not tracked.
    fn deliver(&self, notification: &Notification) -> bool {
        let (handlers, event) = {
            let mut state = lock(&self.shared.state);
            let msg_id = notification.msg_id;
            if !state.messages.contains_key(&msg_id) {
                return false;
            }
            let event = match notification.kind {
                NotificationKind::Begin => {
                    if let Some(t) = state.messages.get_mut(&msg_id) {
                        t.started = true;
                    }
                    UtteranceEvent::Start
                }
                NotificationKind::End => UtteranceEvent::End,
                NotificationKind::Canceled => UtteranceEvent::Error(UtteranceError::new(
                    UtteranceErrorKind::Canceled,
                    "canceled",
                )),
                NotificationKind::Paused => {
                    state.paused = true;
                    UtteranceEvent::Pause
                }
                NotificationKind::Resumed => {
                    state.paused = false;
                    UtteranceEvent::Resume
                }
                NotificationKind::IndexMark => UtteranceEvent::Mark {
                    name: notification.mark.clone().unwrap_or_default(),
                },
            };

            let handlers = match notification.kind {
                NotificationKind::End | NotificationKind::Canceled => {
                    state.messages.remove(&msg_id).map(|t| t.handlers)
                }
                _ => state.messages.get(&msg_id).map(|t| t.handlers.clone()),
            };
            (handlers, event)
        };

        if let Some(handlers) = handlers {
            handlers.dispatch(&event);
        }
        true
    }
}
