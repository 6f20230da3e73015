//! SSIP wire format
//!
//! speech-dispatcher speaks SSIP: CRLF-terminated text lines. A reply is any
//! number of `NNN-data` lines followed by one `NNN message` line. Codes in the
//! 700 range are asynchronous notifications and may arrive between replies.
//!
//! Reference: https://htmlpreview.github.io/?https://github.com/brailcom/speechd/blob/master/doc/ssip.html

use crate::error::{SpeechError, SpeechResult};
use crate::utils::clamp;
use crate::utterance::Voice;

pub const CODE_INDEX_MARK: u16 = 700;
pub const CODE_BEGIN: u16 = 701;
pub const CODE_END: u16 = 702;
pub const CODE_CANCELED: u16 = 703;
pub const CODE_PAUSED: u16 = 704;
pub const CODE_RESUMED: u16 = 705;

/// Reply to `SPEAK` meaning the daemon is waiting for the message body
pub const CODE_RECEIVING_DATA: u16 = 230;

/// Reply carrying the id of a queued message
pub const CODE_MESSAGE_QUEUED: u16 = 225;

/// speech-dispatcher's stock `DefaultVoiceType`
pub const DEFAULT_VOICE_TYPE: &str = "MALE1";

/// One parsed protocol line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub code: u16,
    /// `false` for `NNN-` continuation lines
    pub last: bool,
    pub text: String,
}

impl Line {
    pub fn is_event(&self) -> bool {
        (700..800).contains(&self.code)
    }
}

/// Parse a single line as read from the socket
pub fn parse_line(raw: &str) -> SpeechResult<Line> {
    let raw = raw.trim_end_matches(['\r', '\n']);
    let malformed = || SpeechError::Protocol {
        code: 0,
        message: format!("malformed line: '{}'", raw),
    };

    let code = raw
        .get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(malformed)?;

    let (last, text) = match raw.as_bytes().get(3) {
        None => (true, ""),
        Some(b' ') => (true, &raw[4..]),
        Some(b'-') => (false, &raw[4..]),
        Some(_) => return Err(malformed()),
    };

    Ok(Line {
        code,
        last,
        text: text.to_string(),
    })
}

/// A complete reply or notification
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub code: u16,
    /// Text of the continuation lines
    pub data: Vec<String>,
    /// Text of the final line
    pub message: String,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_event(&self) -> bool {
        (700..800).contains(&self.code)
    }

    pub fn into_result(self) -> SpeechResult<Reply> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(SpeechError::Protocol {
                code: self.code,
                message: self.message,
            })
        }
    }
}

/// Gathers lines until a reply is complete
///
/// Replies and notifications are assembled separately because a notification
/// can arrive in the middle of an unrelated reply.
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    reply: Vec<String>,
    event: Vec<String>,
}

impl ReplyAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line, returning the reply it completes, if any
    pub fn push(&mut self, line: Line) -> Option<Reply> {
        let pending = if line.is_event() {
            &mut self.event
        } else {
            &mut self.reply
        };

        if !line.last {
            pending.push(line.text);
            return None;
        }

        Some(Reply {
            code: line.code,
            data: std::mem::take(pending),
            message: line.text,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    IndexMark,
    Begin,
    End,
    Canceled,
    Paused,
    Resumed,
}

/// An asynchronous event about one queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub msg_id: u64,
    pub client_id: u64,
    /// Name of the index mark, only set for `IndexMark`
    pub mark: Option<String>,
}

impl Notification {
    pub fn from_reply(reply: &Reply) -> SpeechResult<Self> {
        let kind = match reply.code {
            CODE_INDEX_MARK => NotificationKind::IndexMark,
            CODE_BEGIN => NotificationKind::Begin,
            CODE_END => NotificationKind::End,
            CODE_CANCELED => NotificationKind::Canceled,
            CODE_PAUSED => NotificationKind::Paused,
            CODE_RESUMED => NotificationKind::Resumed,
            code => {
                return Err(SpeechError::Protocol {
                    code,
                    message: format!("not a notification: {}", reply.message),
                })
            }
        };

        let field = |idx: usize| -> SpeechResult<u64> {
            reply
                .data
                .get(idx)
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| SpeechError::Protocol {
                    code: reply.code,
                    message: format!("notification missing field {}", idx),
                })
        };

        let mark = match kind {
            NotificationKind::IndexMark => reply.data.get(2).cloned(),
            _ => None,
        };

        Ok(Self {
            kind,
            msg_id: field(0)?,
            client_id: field(1)?,
            mark,
        })
    }
}

/// Commands this client sends
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetClientName(String),
    EnableNotifications,
    SetRate(i32),
    SetPitch(i32),
    SetVolume(i32),
    SetLanguage(String),
    SetVoice(String),
    SetVoiceType(String),
    Speak,
    Cancel,
    Pause,
    Resume,
    ListVoices,
    Quit,
}

impl Command {
    /// Wire form including the trailing CRLF
    pub fn to_line(&self) -> String {
        let body = match self {
            Command::SetClientName(name) => format!("SET self CLIENT_NAME {}", name),
            Command::EnableNotifications => "SET self NOTIFICATION all on".to_string(),
            Command::SetRate(v) => format!("SET self RATE {}", v),
            Command::SetPitch(v) => format!("SET self PITCH {}", v),
            Command::SetVolume(v) => format!("SET self VOLUME {}", v),
            Command::SetLanguage(code) => format!("SET self LANGUAGE {}", code),
            Command::SetVoice(name) => format!("SET self SYNTHESIS_VOICE {}", name),
            Command::SetVoiceType(kind) => format!("SET self VOICE_TYPE {}", kind),
            Command::Speak => "SPEAK".to_string(),
            Command::Cancel => "CANCEL self".to_string(),
            Command::Pause => "PAUSE self".to_string(),
            Command::Resume => "RESUME self".to_string(),
            Command::ListVoices => "LIST SYNTHESIS_VOICES".to_string(),
            Command::Quit => "QUIT".to_string(),
        };
        body + "\r\n"
    }
}

/// Encode a message body sent after `SPEAK`
///
/// Lines starting with a dot get a second one so the body cannot end early;
/// the result carries the terminating `.` line.
pub fn encode_body(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");
    out
}

/// Map a rate in `[0, 10]` (1 = normal) onto SSIP's `[-100, 100]`
///
/// Logarithmic, so 0.1 and 10 sit at the two ends and 1 lands on 0.
pub fn rate_to_ssip(rate: f32) -> i32 {
    if rate <= 0.1 {
        return -100;
    }
    clamp(-100.0, (100.0 * rate.log10()).round(), 100.0) as i32
}

/// Map a pitch in `[0, 3]` (1 = natural) onto SSIP's `[-100, 100]`
///
/// Piecewise linear: `[0, 1]` covers the lower half and `[1, 3]` the upper.
pub fn pitch_to_ssip(pitch: f32) -> i32 {
    let scaled = if pitch <= 1.0 {
        100.0 * (pitch - 1.0)
    } else {
        50.0 * (pitch - 1.0)
    };
    clamp(-100.0, scaled.round(), 100.0) as i32
}

/// Map a volume in `[0, 1]` onto SSIP's `[-100, 100]`
pub fn volume_to_ssip(volume: f32) -> i32 {
    clamp(-100.0, (200.0 * volume - 100.0).round(), 100.0) as i32
}

/// Parse one `LIST SYNTHESIS_VOICES` data line: `name\tlanguage\tvariant`
pub fn parse_voice(line: &str) -> Option<Voice> {
    let mut fields = line.split('\t');
    let name = fields.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let language = fields.next().unwrap_or("").trim();
    let variant = fields
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "none")
        .map(str::to_string);

    Some(Voice {
        name: name.to_string(),
        language: language.to_string(),
        variant,
        default: false,
    })
}
