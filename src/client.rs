//! Event stream client for a single game session.
//!
//! [`EventStreamClient`] is a thin handle to a background loop task that
//! owns the session's one stream connection and its [`AudioCoordinator`].
//! For every frame the loop appends to the message log, drives audio, and
//! refetches the authoritative snapshot when the frame implies a state
//! change. Notifications are emitted on a bounded channel
//! ([`tokio::sync::mpsc::Receiver<SessionEvent>`]) returned from
//! [`EventStreamClient::open`]; the handle's accessors expose the log, the
//! game state and the connection status.
//!
//! # Example
//!
//! ```rust,ignore
//! let api: Arc<dyn SessionApi> = Arc::new(HttpSessionApi::new(http.clone())?);
//! let connector = Arc::new(SseConnector::new(http)?);
//! let (mut client, mut events) = EventStreamClient::open(
//!     connector,
//!     api,
//!     AudioCoordinator::silent(),
//!     StreamConfig::new("K7Q2ZD"),
//! );
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Message(msg) => println!("{}", msg.message),
//!         SessionEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! client.close().await;
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::api::SessionApi;
use crate::audio::AudioCoordinator;
use crate::event::SessionEvent;
use crate::model::{ChatMessage, ConnectionStatus, GameState};
use crate::protocol::{Frame, SessionId, StreamEvent};
use crate::transport::{EventTransport, StreamConnector};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default deadline for one snapshot refetch.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// ── Configuration ───────────────────────────────────────────────────

/// Automatic re-open of the stream after a transport failure.
///
/// Each attempt reuses the same session identifier, resets the status to
/// [`ConnectionStatus::Connecting`] and, once connected, refetches the
/// snapshot to cover frames missed while disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Pause before each attempt.
    pub delay: Duration,
    /// Consecutive failed attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Configuration for an [`EventStreamClient`].
///
/// Only the session identifier is required.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use vibechess_client::client::{ReconnectPolicy, StreamConfig};
///
/// let config = StreamConfig::new("K7Q2ZD")
///     .with_event_channel_capacity(64)
///     .with_reconnect(ReconnectPolicy::new(Duration::from_secs(3)).with_max_attempts(5));
/// assert_eq!(config.session_id, "K7Q2ZD");
/// assert!(config.initial_load);
/// ```
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Session to follow.
    pub session_id: SessionId,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, non-critical events are dropped
    /// (with a warning logged) to avoid blocking the stream loop.
    /// `Disconnected` and `Closed` are always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`EventStreamClient::close`] waits for the loop before
    /// aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Deadline for each snapshot fetch. Defaults to **10 seconds**.
    pub fetch_timeout: Duration,
    /// Fetch a snapshot after the first connect attempt, whether or not the
    /// stream opened. Defaults to `true`.
    pub initial_load: bool,
    /// Automatic reconnection. Defaults to `None`: a failed stream stays
    /// disconnected until the caller opens a new client.
    pub reconnect: Option<ReconnectPolicy>,
}

impl StreamConfig {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            initial_load: true,
            reconnect: None,
        }
    }

    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_initial_load(mut self, initial_load: bool) -> Self {
        self.initial_load = initial_load;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the handle (readers) and the loop (sole writer).
struct SessionState {
    status: AtomicU8,
    messages: Mutex<Vec<ChatMessage>>,
    game: Mutex<Option<GameState>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(ConnectionStatus::Connecting as u8),
            messages: Mutex::new(Vec::new()),
            game: Mutex::new(None),
        }
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Move to `next` unless already closed. Returns whether it moved.
    fn set_status(&self, next: ConnectionStatus) -> bool {
        self.status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (ConnectionStatus::from_u8(raw) != ConnectionStatus::Closed).then_some(next as u8)
            })
            .is_ok()
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to the live view of one session.
///
/// Created via [`EventStreamClient::open`], which spawns the background
/// stream loop and returns this handle together with an event receiver.
pub struct EventStreamClient {
    session_id: SessionId,
    /// Shared state updated by the stream loop.
    state: Arc<SessionState>,
    /// Handle to the background stream loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the stream loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl EventStreamClient {
    /// Open the event stream for `config.session_id`.
    ///
    /// The stream is connected from the background task, so this returns
    /// immediately with status [`ConnectionStatus::Connecting`].
    ///
    /// # Arguments
    ///
    /// * `connector`: opens (and re-opens) the stream for the session.
    /// * `api`: used for the initial load and for refetches.
    /// * `audio`: becomes the sole owner of playback for this session.
    /// * `config`: session identifier and tuning.
    ///
    /// # Returns
    ///
    /// A tuple of `(client_handle, event_receiver)`.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn open(
        connector: Arc<dyn StreamConnector>,
        api: Arc<dyn SessionApi>,
        audio: AudioCoordinator,
        config: StreamConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(SessionState::new());

        let stream_loop = StreamLoop {
            session_id: config.session_id.clone(),
            connector,
            api,
            audio,
            state: Arc::clone(&state),
            event_tx,
            fetch_timeout: config.fetch_timeout,
            initial_load: config.initial_load,
            reconnect: config.reconnect,
        };
        let task = tokio::spawn(stream_loop.run(shutdown_rx));

        let client = Self {
            session_id: config.session_id,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    /// Close the stream, stop audio and end the background loop.
    ///
    /// Idempotent: later calls return immediately and nothing is cleaned up
    /// twice. The status becomes [`ConnectionStatus::Closed`] and never
    /// changes again.
    pub async fn close(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            debug!(session = %self.session_id, "close requested");
            let _ = tx.send(());
        }

        // Await the loop with a timeout. If it doesn't exit in time, abort it
        // so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("stream loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("stream loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("stream loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.set_status(ConnectionStatus::Closed);
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state.status()
    }

    /// Returns `true` while frames are being received.
    pub fn is_connected(&self) -> bool {
        self.connection_status().is_connected()
    }

    /// A copy of the message log, in arrival order.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.messages.lock().await.clone()
    }

    pub async fn message_count(&self) -> usize {
        self.state.messages.lock().await.len()
    }

    /// The last successfully fetched snapshot, if any.
    pub async fn game_state(&self) -> Option<GameState> {
        self.state.game.lock().await.clone()
    }
}

impl std::fmt::Debug for EventStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamClient")
            .field("session_id", &self.session_id)
            .field("status", &self.connection_status())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        // `Drop` cannot await a graceful close. Aborting the task drops the
        // loop future, which drops the transport and the audio coordinator;
        // both stop on drop.
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state.set_status(ConnectionStatus::Closed);
    }
}

// ── Stream loop ─────────────────────────────────────────────────────

/// Everything the background task owns.
struct StreamLoop {
    session_id: SessionId,
    connector: Arc<dyn StreamConnector>,
    api: Arc<dyn SessionApi>,
    audio: AudioCoordinator,
    state: Arc<SessionState>,
    event_tx: mpsc::Sender<SessionEvent>,
    fetch_timeout: Duration,
    initial_load: bool,
    reconnect: Option<ReconnectPolicy>,
}

/// Why a connected stream stopped delivering frames.
enum StreamEnd {
    Shutdown,
    Failed(Option<String>),
}

impl StreamLoop {
    /// Connect, pump frames, and (if a policy is set) reconnect until closed.
    ///
    /// The shutdown receiver is polled only until it first completes; every
    /// branch that observes it returns right away.
    async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        debug!(session = %self.session_id, "stream loop started");
        let mut failed_attempts: u32 = 0;
        let mut first_attempt = true;

        loop {
            self.set_status(ConnectionStatus::Connecting);
            self.emit(SessionEvent::Connecting).await;

            let connected = tokio::select! {
                _ = &mut shutdown_rx => {
                    self.finish_closed().await;
                    return;
                }
                result = self.connector.connect(&self.session_id) => result,
            };

            let mut transport = match connected {
                Ok(transport) => {
                    failed_attempts = 0;
                    self.set_status(ConnectionStatus::Connected);
                    self.emit(SessionEvent::Connected).await;
                    info!(session = %self.session_id, "event stream connected");
                    Ok(transport)
                }
                Err(e) => {
                    error!(session = %self.session_id, "failed to open event stream: {e}");
                    failed_attempts += 1;
                    Err(format!("failed to open event stream: {e}"))
                }
            };

            // The initial load does not depend on the stream opening. A
            // reconnect may have missed frames; the snapshot covers them.
            let needs_snapshot = if first_attempt {
                self.initial_load
            } else {
                transport.is_ok()
            };
            first_attempt = false;
            if needs_snapshot {
                let refetched = tokio::select! {
                    _ = &mut shutdown_rx => false,
                    () = self.refetch() => true,
                };
                if !refetched {
                    if let Ok(transport) = transport.as_mut() {
                        let _ = transport.close().await;
                    }
                    self.finish_closed().await;
                    return;
                }
            }

            let reason = match transport {
                Ok(mut transport) => {
                    match self.pump(transport.as_mut(), &mut shutdown_rx).await {
                        StreamEnd::Shutdown => {
                            let _ = transport.close().await;
                            self.finish_closed().await;
                            return;
                        }
                        StreamEnd::Failed(reason) => {
                            let _ = transport.close().await;
                            reason
                        }
                    }
                }
                Err(reason) => Some(reason),
            };

            self.set_status(ConnectionStatus::Disconnected);
            self.emit_critical(SessionEvent::Disconnected { reason }).await;

            let retry = match self.reconnect {
                Some(policy) => policy
                    .max_attempts
                    .is_none_or(|max| failed_attempts < max)
                    .then_some(policy.delay),
                None => None,
            };

            let Some(delay) = retry else {
                debug!(session = %self.session_id, "not reconnecting; waiting for close");
                // Frames are no longer processed, but a clip may still be
                // playing until the handle is closed.
                let _ = (&mut shutdown_rx).await;
                self.finish_closed().await;
                return;
            };

            debug!(session = %self.session_id, ?delay, "reconnecting after delay");
            tokio::select! {
                _ = &mut shutdown_rx => {
                    self.finish_closed().await;
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Receive and handle frames until the stream ends or shutdown fires.
    async fn pump(
        &mut self,
        transport: &mut dyn EventTransport,
        shutdown_rx: &mut oneshot::Receiver<()>,
    ) -> StreamEnd {
        loop {
            let incoming = tokio::select! {
                _ = &mut *shutdown_rx => return StreamEnd::Shutdown,
                incoming = transport.recv() => incoming,
            };

            match incoming {
                Some(Ok(text)) => {
                    // A refetch in progress is abandoned on shutdown; its
                    // result is never written.
                    tokio::select! {
                        _ = &mut *shutdown_rx => return StreamEnd::Shutdown,
                        () = self.handle_frame(&text) => {}
                    }
                }
                Some(Err(e)) => {
                    error!(session = %self.session_id, "event stream error: {e}");
                    return StreamEnd::Failed(Some(format!("event stream error: {e}")));
                }
                None => {
                    debug!(session = %self.session_id, "event stream ended by server");
                    return StreamEnd::Failed(None);
                }
            }
        }
    }

    /// Apply one frame: log entry, audio, then refetch if state changed.
    async fn handle_frame(&mut self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session = %self.session_id, "dropping malformed frame: {e}; raw: {text}");
                return;
            }
        };
        debug!(session = %self.session_id, kind = frame.event.kind(), "frame received");

        if let Some(message) = ChatMessage::from_event(&frame.event) {
            self.state.messages.lock().await.push(message.clone());
            self.emit(SessionEvent::Message(message)).await;
        }

        match &frame.event {
            StreamEvent::PromptSubmitted { color } => {
                self.emit(SessionEvent::PromptSubmitted { color: *color })
                    .await;
            }
            StreamEvent::GameStarted => self.emit(SessionEvent::GameStarted).await,
            StreamEvent::Unknown => debug!("ignoring frame of unknown type"),
            _ => {}
        }

        if let Some(clip) = frame.commentary_audio.as_deref() {
            self.audio.play(clip);
        }

        if frame.event.changes_state() {
            self.refetch().await;
        }
    }

    /// Replace the game state with a fresh snapshot. On failure the previous
    /// state is kept.
    async fn refetch(&mut self) {
        let fetch = self.api.fetch_snapshot(&self.session_id);
        match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(game)) => {
                *self.state.game.lock().await = Some(game.clone());
                self.emit(SessionEvent::StateUpdated(game)).await;
            }
            Ok(Err(e)) => {
                warn!(session = %self.session_id, "snapshot fetch failed, keeping previous state: {e}");
            }
            Err(_) => {
                warn!(session = %self.session_id, "snapshot fetch timed out, keeping previous state");
            }
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        if self.state.set_status(status) {
            debug!(session = %self.session_id, ?status, "connection status");
        }
    }

    async fn finish_closed(&mut self) {
        self.audio.stop();
        self.set_status(ConnectionStatus::Closed);
        self.emit_critical(SessionEvent::Closed).await;
        debug!(session = %self.session_id, "stream loop exited");
    }

    /// Emit an event. If the channel is full, log a warning and drop the
    /// event to avoid blocking the stream loop.
    ///
    /// `&mut self`: the loop future must stay `Send` without a `Sync` output.
    async fn emit(&mut self, event: SessionEvent) {
        if event.is_critical() {
            return self.emit_critical(event).await;
        }
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Emit an event that must never be silently dropped.
    async fn emit_critical(&mut self, event: SessionEvent) {
        if self.event_tx.send(event).await.is_err() {
            debug!("event channel closed, receiver dropped");
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::{ClientError, Result};
    use crate::model::PromptStatus;
    use crate::protocol::{Color, GameStatus, SubmitPromptResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex as StdMutex;

    // ── Mocks ───────────────────────────────────────────────────────

    /// A transport that replays scripted frames, then hangs.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl EventTransport for MockTransport {
        async fn recv(&mut self) -> Option<Result<String>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Hands out one scripted transport per connect; fails once exhausted.
    struct MockConnector {
        scripts: StdMutex<VecDeque<Vec<Option<Result<String>>>>>,
        connects: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
    }

    impl MockConnector {
        fn new(scripts: Vec<Vec<Option<Result<String>>>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: StdMutex::new(VecDeque::from(scripts)),
                connects: Arc::new(AtomicUsize::new(0)),
                closed: Arc::new(AtomicBool::new(false)),
            })
        }
    }

    #[async_trait]
    impl StreamConnector for MockConnector {
        async fn connect(&self, session_id: &str) -> Result<Box<dyn EventTransport>> {
            assert_eq!(session_id, "TEST01");
            self.connects.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(incoming) => Ok(Box::new(MockTransport {
                    incoming: VecDeque::from(incoming),
                    closed: Arc::clone(&self.closed),
                })),
                None => Err(ClientError::Transport("connection refused".into())),
            }
        }
    }

    /// Counts snapshot fetches; returns a state whose move count is the
    /// number of fetches so far. Fetch number `fail_from` and later fail.
    #[derive(Default)]
    struct MockApi {
        fetches: AtomicUsize,
        fail_from: Option<usize>,
    }

    impl MockApi {
        fn failing_from(n: usize) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail_from: Some(n),
            }
        }
    }

    #[async_trait]
    impl SessionApi for MockApi {
        async fn fetch_snapshot(&self, _session_id: &str) -> Result<GameState> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_from.is_some_and(|from| n >= from) {
                return Err(ClientError::HttpStatus {
                    status: 503,
                    url: "mock".into(),
                });
            }
            Ok(GameState {
                position: format!("fen-{n}"),
                move_log: None,
                status: GameStatus::InProgress,
                winner: None,
                move_count: n,
            })
        }

        async fn fetch_status(&self, _session_id: &str) -> Result<PromptStatus> {
            Ok(PromptStatus::default())
        }

        async fn create_session(&self) -> Result<SessionId> {
            Ok("TEST01".into())
        }

        async fn submit_prompt(
            &self,
            _session_id: &str,
            _color: Color,
            _prompt: &str,
        ) -> Result<SubmitPromptResponse> {
            unimplemented!()
        }
    }

    fn frame(json: &str) -> Option<Result<String>> {
        Some(Ok(json.to_owned()))
    }

    fn open(
        connector: Arc<MockConnector>,
        api: Arc<MockApi>,
        config: StreamConfig,
    ) -> (EventStreamClient, mpsc::Receiver<SessionEvent>) {
        EventStreamClient::open(connector, api, AudioCoordinator::silent(), config)
    }

    async fn next_matching(
        events: &mut mpsc::Receiver<SessionEvent>,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn connecting_then_connected() {
        let connector = MockConnector::new(vec![vec![]]);
        let api = Arc::new(MockApi::default());
        let (mut client, mut events) = open(
            connector,
            Arc::clone(&api),
            StreamConfig::new("TEST01").with_initial_load(false),
        );
        assert_eq!(client.connection_status(), ConnectionStatus::Connecting);

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connecting);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert!(client.is_connected());
        assert_eq!(api.fetches.load(Ordering::SeqCst), 0);

        client.close().await;
    }

    #[tokio::test]
    async fn initial_load_populates_game_state() {
        let connector = MockConnector::new(vec![vec![]]);
        let api = Arc::new(MockApi::default());
        let (mut client, mut events) = open(connector, Arc::clone(&api), StreamConfig::new("TEST01"));

        let event = next_matching(&mut events, |e| matches!(e, SessionEvent::StateUpdated(_))).await;
        let SessionEvent::StateUpdated(state) = event else {
            unreachable!()
        };
        assert_eq!(state.position, "fen-1");
        assert_eq!(client.game_state().await, Some(state));

        client.close().await;
    }

    #[tokio::test]
    async fn initial_load_runs_when_stream_is_refused() {
        let connector = MockConnector::new(vec![]);
        let connects = Arc::clone(&connector.connects);
        let api = Arc::new(MockApi::default());
        let (mut client, mut events) = open(connector, Arc::clone(&api), StreamConfig::new("TEST01"));

        let event = next_matching(&mut events, |e| matches!(e, SessionEvent::StateUpdated(_))).await;
        let SessionEvent::StateUpdated(state) = event else {
            unreachable!()
        };
        next_matching(&mut events, |e| matches!(e, SessionEvent::Disconnected { .. })).await;

        assert_eq!(client.game_state().await, Some(state));
        assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        client.close().await;
    }

    #[tokio::test]
    async fn refused_reconnects_do_not_refetch() {
        let connector = MockConnector::new(vec![vec![None]]);
        let api = Arc::new(MockApi::default());
        let (mut client, mut events) = open(
            connector,
            Arc::clone(&api),
            StreamConfig::new("TEST01")
                .with_reconnect(ReconnectPolicy::new(Duration::from_millis(1)).with_max_attempts(2)),
        );

        let mut disconnects = 0;
        while disconnects < 3 {
            if let SessionEvent::Disconnected { .. } = events.recv().await.unwrap() {
                disconnects += 1;
            }
        }
        // Only the initial load; neither refused attempt fetched.
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        client.close().await;
    }

    /// Playable from one thread at a time only.
    struct UnsyncOutput {
        plays: std::cell::Cell<u32>,
    }

    impl crate::audio::AudioOutput for UnsyncOutput {
        fn start(&mut self, _clip: &[u8]) -> Result<()> {
            self.plays.set(self.plays.get() + 1);
            Ok(())
        }

        fn stop(&mut self) {}

        fn is_playing(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn loop_accepts_output_that_is_send_but_not_sync() {
        fn assert_send<T: Send>(_: &T) {}

        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let (event_tx, _event_rx) = mpsc::channel(1);
        let stream_loop = StreamLoop {
            session_id: "TEST01".into(),
            connector: MockConnector::new(vec![]),
            api: Arc::new(MockApi::default()),
            audio: AudioCoordinator::new(UnsyncOutput {
                plays: std::cell::Cell::new(0),
            }),
            state: Arc::new(SessionState::new()),
            event_tx,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            initial_load: false,
            reconnect: None,
        };
        assert_send(&stream_loop.run(shutdown_rx));

        let connector = MockConnector::new(vec![vec![frame(
            r#"{"type":"thinking","commentary_audio":"AAAA"}"#,
        )]]);
        let (mut client, mut events) = EventStreamClient::open(
            connector,
            Arc::new(MockApi::default()),
            AudioCoordinator::new(UnsyncOutput {
                plays: std::cell::Cell::new(0),
            }),
            StreamConfig::new("TEST01").with_initial_load(false),
        );
        next_matching(&mut events, |e| matches!(e, SessionEvent::Message(_))).await;
        client.close().await;
    }

    #[tokio::test]
    async fn move_and_game_over_each_refetch_once() {
        let connector = MockConnector::new(vec![vec![
            frame(r#"{"type":"thinking","color":"white"}"#),
            frame(r#"{"type":"prompt_submitted","color":"black"}"#),
            frame(r#"{"type":"game_started"}"#),
            frame(r#"{"type":"move","color":"white","move_san":"e4"}"#),
            frame(r#"{"type":"game_over","result":"white_wins","termination":"checkmate"}"#),
        ]]);
        let api = Arc::new(MockApi::default());
        let (mut client, mut events) = open(
            connector,
            Arc::clone(&api),
            StreamConfig::new("TEST01").with_initial_load(false),
        );

        let first = next_matching(&mut events, |e| matches!(e, SessionEvent::StateUpdated(_))).await;
        assert!(matches!(first, SessionEvent::StateUpdated(ref s) if s.move_count == 1));
        let second = next_matching(&mut events, |e| matches!(e, SessionEvent::StateUpdated(_))).await;
        assert!(matches!(second, SessionEvent::StateUpdated(ref s) if s.move_count == 2));
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);

        let log = client.messages().await;
        let texts: Vec<_> = log.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Thinking...", "e4", "Game Over: white_wins (checkmate)"]
        );

        client.close().await;
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped_and_stream_stays_open() {
        let connector = MockConnector::new(vec![vec![
            frame("{not json"),
            frame(r#"{"type":"move","color":"black","move_san":"e5","comment":"Mirror"}"#),
        ]]);
        let api = Arc::new(MockApi::default());
        let (mut client, mut events) = open(
            connector,
            api,
            StreamConfig::new("TEST01").with_initial_load(false),
        );

        let event = next_matching(&mut events, |e| matches!(e, SessionEvent::Message(_))).await;
        let SessionEvent::Message(message) = event else {
            unreachable!()
        };
        assert_eq!(message.message, "e5: Mirror");
        assert_eq!(client.message_count().await, 1);
        assert!(client.is_connected());

        client.close().await;
    }

    #[tokio::test]
    async fn failed_refetch_keeps_previous_state() {
        let connector = MockConnector::new(vec![vec![frame(
            r#"{"type":"move","color":"white","move_san":"d4"}"#,
        )]]);
        let api = Arc::new(MockApi::failing_from(2));
        let (mut client, mut events) = open(connector, Arc::clone(&api), StreamConfig::new("TEST01"));

        next_matching(&mut events, |e| matches!(e, SessionEvent::StateUpdated(_))).await;
        next_matching(&mut events, |e| matches!(e, SessionEvent::Message(_))).await;
        while api.fetches.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        assert_eq!(client.game_state().await.unwrap().position, "fen-1");
        client.close().await;
    }

    #[tokio::test]
    async fn transport_error_disconnects_without_retry() {
        let connector = MockConnector::new(vec![vec![Some(Err(ClientError::Transport(
            "reset by peer".into(),
        )))]]);
        let connects = Arc::clone(&connector.connects);
        let closed = Arc::clone(&connector.closed);
        let api = Arc::new(MockApi::default());
        let (mut client, mut events) = open(
            connector,
            api,
            StreamConfig::new("TEST01").with_initial_load(false),
        );

        let event =
            next_matching(&mut events, |e| matches!(e, SessionEvent::Disconnected { .. })).await;
        let SessionEvent::Disconnected { reason } = event else {
            unreachable!()
        };
        assert!(reason.unwrap().contains("reset by peer"));
        assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);
        assert!(closed.load(Ordering::Relaxed));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        client.close().await;
        assert_eq!(client.connection_status(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn reconnect_reuses_session_and_refetches() {
        let connector = MockConnector::new(vec![
            vec![None],
            vec![frame(r#"{"type":"thinking","comment":"Back again"}"#)],
        ]);
        let connects = Arc::clone(&connector.connects);
        let api = Arc::new(MockApi::default());
        let (mut client, mut events) = open(
            connector,
            Arc::clone(&api),
            StreamConfig::new("TEST01")
                .with_initial_load(false)
                .with_reconnect(ReconnectPolicy::new(Duration::from_millis(5))),
        );

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connecting);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Disconnected { reason: None }
        );
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connecting);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::StateUpdated(_)
        ));
        let event = events.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::Message(ref m) if m.message == "Back again"));

        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        client.close().await;
    }

    #[tokio::test]
    async fn reconnect_gives_up_after_max_attempts() {
        // One stream that ends, then every connect is refused.
        let connector = MockConnector::new(vec![vec![None]]);
        let connects = Arc::clone(&connector.connects);
        let api = Arc::new(MockApi::default());
        let (mut client, mut events) = open(
            connector,
            api,
            StreamConfig::new("TEST01")
                .with_initial_load(false)
                .with_reconnect(ReconnectPolicy::new(Duration::from_millis(1)).with_max_attempts(2)),
        );

        let mut disconnects = 0;
        while disconnects < 3 {
            if let SessionEvent::Disconnected { .. } = events.recv().await.unwrap() {
                disconnects += 1;
            }
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 3);
        assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);

        client.close().await;
    }

    #[tokio::test]
    async fn double_close_is_harmless() {
        let connector = MockConnector::new(vec![vec![]]);
        let closed = Arc::clone(&connector.closed);
        let api = Arc::new(MockApi::default());
        let (mut client, mut events) = open(connector, api, StreamConfig::new("TEST01"));

        next_matching(&mut events, |e| *e == SessionEvent::Connected).await;
        client.close().await;
        client.close().await;

        assert!(closed.load(Ordering::Relaxed));
        assert_eq!(client.connection_status(), ConnectionStatus::Closed);

        let mut closed_events = 0;
        while let Some(event) = events.recv().await {
            if event == SessionEvent::Closed {
                closed_events += 1;
            }
        }
        assert_eq!(closed_events, 1);
    }

    #[tokio::test]
    async fn closed_status_is_terminal() {
        let state = SessionState::new();
        assert!(state.set_status(ConnectionStatus::Connected));
        assert!(state.set_status(ConnectionStatus::Closed));
        assert!(!state.set_status(ConnectionStatus::Connecting));
        assert_eq!(state.status(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn drop_without_close_ends_the_loop() {
        let connector = MockConnector::new(vec![vec![]]);
        let api = Arc::new(MockApi::default());
        let (client, mut events) = open(connector, api, StreamConfig::new("TEST01"));

        next_matching(&mut events, |e| *e == SessionEvent::Connected).await;
        drop(client);

        // The aborted loop drops its sender; the channel drains and closes.
        while events.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn config_defaults() {
        let config = StreamConfig::new("TEST01");
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert!(config.initial_load);
        assert!(config.reconnect.is_none());
        assert_eq!(
            StreamConfig::new("X").with_event_channel_capacity(0).event_channel_capacity,
            1
        );
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let connector = MockConnector::new(vec![vec![]]);
        let api = Arc::new(MockApi::default());
        let (mut client, _events) = open(connector, api, StreamConfig::new("TEST01"));
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("EventStreamClient"));
        assert!(debug_str.contains("TEST01"));
        client.close().await;
    }
}
