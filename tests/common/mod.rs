//! Helpers shared by the integration tests
//!
//! Each test binary compiles this module and uses only part of it.
#![allow(dead_code)]

pub mod fake_engine;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use utterance::engine::SsipOptions;

/// In-process stand-in for the speech-dispatcher daemon
///
/// Serves one client. Messages whose text contains "hold" start but never end
/// on their own, "mark" emits an index mark named `m1`, "hangup" closes the
/// connection right after the message starts, "early" is played to the end
/// before its id is reported, and the voice name "bogus" is refused.
pub struct FakeSpeechd {
    pub temp_dir: TempDir,
    pub socket_path: PathBuf,
    /// Every command line received, excluding message bodies
    pub received: Arc<Mutex<Vec<String>>>,
    /// Message bodies, one entry per SPEAK
    pub bodies: Arc<Mutex<Vec<String>>>,
}

impl FakeSpeechd {
    pub fn start() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let socket_path = temp_dir.path().join("speechd.sock");
        let listener = UnixListener::bind(&socket_path).expect("Failed to bind socket");

        let received = Arc::new(Mutex::new(Vec::new()));
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let (r, b) = (received.clone(), bodies.clone());
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                serve(stream, r, b).await;
            }
        });

        Self {
            temp_dir,
            socket_path,
            received,
            bodies,
        }
    }

    pub fn options(&self) -> SsipOptions {
        SsipOptions {
            socket_path: self.socket_path.clone(),
            client_name: "test:utterance:main".to_string(),
            connect_retries: 0,
            default_language: "en".to_string(),
            default_voice: None,
        }
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

const CLIENT_ID: u64 = 1;

async fn send(writer: &mut OwnedWriteHalf, lines: &[String]) {
    for line in lines {
        writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .expect("Failed to write to client");
    }
}

fn event(code: u16, msg_id: u64, name: &str) -> Vec<String> {
    vec![
        format!("{}-{}", code, msg_id),
        format!("{}-{}", code, CLIENT_ID),
        format!("{} {}", code, name),
    ]
}

async fn serve(
    stream: tokio::net::UnixStream,
    received: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<String>>>,
) {
    let (read, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut next_id = 1u64;
    let mut held: Vec<u64> = Vec::new();

    while let Ok(Some(line)) = lines.next_line().await {
        received.lock().unwrap().push(line.clone());
        let mut out: Vec<String> = Vec::new();

        if line == "SPEAK" {
            send(&mut writer, &["230 OK RECEIVING DATA".to_string()]).await;
            let mut body = Vec::new();
            while let Ok(Some(l)) = lines.next_line().await {
                if l == "." {
                    break;
                }
                body.push(l.strip_prefix('.').map(str::to_string).unwrap_or(l));
            }
            let text = body.join("\n");
            bodies.lock().unwrap().push(text.clone());

            let id = next_id;
            next_id += 1;
            if text.contains("early") {
                out.extend(event(701, id, "BEGIN"));
                out.extend(event(702, id, "END"));
                out.push(format!("225-{}", id));
                out.push("225 OK MESSAGE QUEUED".to_string());
                send(&mut writer, &out).await;
                continue;
            }
            out.push(format!("225-{}", id));
            out.push("225 OK MESSAGE QUEUED".to_string());
            out.extend(event(701, id, "BEGIN"));
            if text.contains("mark") {
                out.push(format!("700-{}", id));
                out.push(format!("700-{}", CLIENT_ID));
                out.push("700-m1".to_string());
                out.push("700 INDEX_MARK".to_string());
            }
            if text.contains("hangup") {
                send(&mut writer, &out).await;
                break;
            }
            if text.contains("hold") {
                held.push(id);
            } else {
                out.extend(event(702, id, "END"));
            }
        } else if line.starts_with("SET self SYNTHESIS_VOICE bogus") {
            out.push("409 ERR INVALID VOICE".to_string());
        } else if line.starts_with("SET self CLIENT_NAME") {
            out.push("208 OK CLIENT NAME SET".to_string());
        } else if line.starts_with("SET self") {
            out.push("203 OK SET".to_string());
        } else if line == "LIST SYNTHESIS_VOICES" {
            out.push("249-alba\ten-GB\tnone".to_string());
            out.push("249-klaus\tde-DE\tnone".to_string());
            out.push("249-jenny\ten-US\tf1".to_string());
            out.push("249 OK VOICE LIST SENT".to_string());
        } else if line == "PAUSE self" {
            out.push("210 OK PAUSED".to_string());
            for id in &held {
                out.extend(event(704, *id, "PAUSED"));
            }
        } else if line == "RESUME self" {
            out.push("210 OK RESUMED".to_string());
            for id in &held {
                out.extend(event(705, *id, "RESUMED"));
            }
        } else if line == "CANCEL self" {
            out.push("210 OK CANCELED".to_string());
            for id in held.drain(..) {
                out.extend(event(703, id, "CANCELED"));
            }
        } else if line == "QUIT" {
            send(&mut writer, &["231 HAPPY HACKING".to_string()]).await;
            break;
        } else {
            out.push("300 ERR UNKNOWN COMMAND".to_string());
        }

        send(&mut writer, &out).await;
    }
}
