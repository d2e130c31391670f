#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for VibeChess client integration tests.
//!
//! Provides a scripted [`MockTransport`]/[`MockConnector`] pair, a recording
//! [`MockApi`], a recording [`MockAudio`] output and helpers for building
//! the server's frame JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::json;
use tokio::sync::mpsc;
use vibechess_client::protocol::SubmitPromptResponse;
use vibechess_client::{
    AudioOutput, ClientError, Color, EventTransport, GameState, GameStatus, PromptStatus,
    SessionApi, SessionEvent, SessionId, StreamConnector,
};

pub type Script = Vec<Option<Result<String, ClientError>>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A transport that replays scripted frames in order.
///
/// Once the script is exhausted, `recv()` hangs so the client loop stays
/// alive until it is closed.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, ClientError>>>,
    /// Number of `close()` calls across every transport of a connector.
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl EventTransport for MockTransport {
    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out one scripted [`MockTransport`] per `connect()`.
///
/// When the scripts run out, `connect()` fails with a transport error.
pub struct MockConnector {
    scripts: StdMutex<VecDeque<Script>>,
    /// Session ids passed to `connect()`, in order.
    pub connects: StdMutex<Vec<String>>,
    pub closes: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: StdMutex::new(VecDeque::from(scripts)),
            connects: StdMutex::new(Vec::new()),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// A connector with a single stream carrying `frames`.
    pub fn single(frames: Vec<String>) -> Arc<Self> {
        Self::new(vec![frames.into_iter().map(|f| Some(Ok(f))).collect()])
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for MockConnector {
    async fn connect(&self, session_id: &str) -> Result<Box<dyn EventTransport>, ClientError> {
        self.connects.lock().unwrap().push(session_id.to_owned());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(incoming) => Ok(Box::new(MockTransport {
                incoming: VecDeque::from(incoming),
                closes: Arc::clone(&self.closes),
            })),
            None => Err(ClientError::Transport("connection refused".into())),
        }
    }
}

// ── MockApi ─────────────────────────────────────────────────────────

/// A [`SessionApi`] that counts calls.
///
/// Each successful snapshot has `move_count` equal to the number of
/// snapshot fetches so far, so tests can tell refetches apart.
#[derive(Default)]
pub struct MockApi {
    snapshots: AtomicUsize,
    statuses: AtomicUsize,
    pub fail_snapshots: AtomicBool,
    pub prompts: StdMutex<Vec<(String, Color, String)>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.statuses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionApi for MockApi {
    async fn fetch_snapshot(&self, _session_id: &str) -> Result<GameState, ClientError> {
        let n = self.snapshots.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_snapshots.load(Ordering::SeqCst) {
            return Err(ClientError::HttpStatus {
                status: 503,
                url: "mock://snapshot".into(),
            });
        }
        Ok(GameState {
            position: format!("snapshot-{n}"),
            move_log: None,
            status: GameStatus::InProgress,
            winner: None,
            move_count: n,
        })
    }

    async fn fetch_status(&self, _session_id: &str) -> Result<PromptStatus, ClientError> {
        self.statuses.fetch_add(1, Ordering::SeqCst);
        Ok(PromptStatus::default())
    }

    async fn create_session(&self) -> Result<SessionId, ClientError> {
        Ok("MOCK01".into())
    }

    async fn submit_prompt(
        &self,
        session_id: &str,
        color: Color,
        prompt: &str,
    ) -> Result<SubmitPromptResponse, ClientError> {
        vibechess_client::api::validate_prompt(prompt)?;
        self.prompts
            .lock()
            .unwrap()
            .push((session_id.to_owned(), color, prompt.to_owned()));
        Ok(SubmitPromptResponse {
            message: "Prompt submitted".into(),
            game_started: false,
        })
    }
}

// ── MockAudio ───────────────────────────────────────────────────────

/// Everything a [`MockAudio`] was asked to do.
#[derive(Debug, Default)]
pub struct AudioLog {
    pub started: Vec<Vec<u8>>,
    pub stops: usize,
    pub active: Option<Vec<u8>>,
    /// Highest number of clips audible at once.
    pub max_simultaneous: usize,
}

/// An [`AudioOutput`] that records calls instead of making sound.
pub struct MockAudio {
    log: Arc<StdMutex<AudioLog>>,
}

impl MockAudio {
    pub fn new() -> (Self, Arc<StdMutex<AudioLog>>) {
        let log = Arc::new(StdMutex::new(AudioLog::default()));
        (
            Self {
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl AudioOutput for MockAudio {
    fn start(&mut self, clip: &[u8]) -> Result<(), ClientError> {
        let mut log = self.log.lock().unwrap();
        let audible = usize::from(log.active.is_some()) + 1;
        log.max_simultaneous = log.max_simultaneous.max(audible);
        log.started.push(clip.to_vec());
        log.active = Some(clip.to_vec());
        Ok(())
    }

    fn stop(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.stops += 1;
        log.active = None;
    }

    fn is_playing(&self) -> bool {
        self.log.lock().unwrap().active.is_some()
    }
}

// ── JSON helper functions ───────────────────────────────────────────

pub fn encode_clip(clip: &[u8]) -> String {
    STANDARD.encode(clip)
}

pub fn thinking_json(color: &str, comment: Option<&str>) -> String {
    json!({ "type": "thinking", "color": color, "comment": comment }).to_string()
}

pub fn move_json(move_number: u32, color: &str, san: &str, comment: Option<&str>) -> String {
    json!({
        "type": "move",
        "move_number": move_number,
        "color": color,
        "move_uci": "e2e4",
        "move_san": san,
        "comment": comment,
        "was_fallback": false,
        "board_fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
    })
    .to_string()
}

/// A move frame carrying a commentary clip.
pub fn move_with_audio_json(move_number: u32, color: &str, san: &str, clip: &[u8]) -> String {
    json!({
        "type": "move",
        "move_number": move_number,
        "color": color,
        "move_san": san,
        "commentary": format!("{san} is played."),
        "commentary_audio": encode_clip(clip),
    })
    .to_string()
}

pub fn game_over_json(result: &str, termination: &str) -> String {
    json!({ "type": "game_over", "result": result, "termination": termination }).to_string()
}

pub fn prompt_submitted_json(color: &str) -> String {
    json!({ "type": "prompt_submitted", "color": color }).to_string()
}

pub fn game_started_json() -> String {
    json!({ "type": "game_started" }).to_string()
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive events until `pred` matches, returning the match.
///
/// Panics if the channel closes first.
pub async fn wait_for(
    rx: &mut mpsc::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = rx.recv().await.expect("event channel closed early");
        if pred(&event) {
            return event;
        }
    }
}

/// Drain the channel until it closes, returning every remaining event.
pub async fn drain(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}
