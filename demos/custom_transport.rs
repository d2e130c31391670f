//! # Custom Transport Example
//!
//! Shows how to implement [`StreamConnector`] and [`EventTransport`] with a
//! simple in-process loopback channel, and [`SessionApi`] with a canned
//! snapshot. This is useful for:
//!
//! - **Testing**: exercise a UI against scripted games without a server
//! - **Custom backends**: adapt any frame source (WebSocket, file replay, QUIC)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use vibechess_client::protocol::SubmitPromptResponse;
use vibechess_client::{
    AudioCoordinator, ClientError, Color, EventStreamClient, EventTransport, GameState,
    GameStatus, PromptStatus, SessionApi, SessionEvent, SessionId, StreamConfig,
    StreamConnector,
};

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a channel-based "loopback" transport
// ─────────────────────────────────────────────────────────────────────

/// The client half: frames pushed by the fake server arrive here.
pub struct LoopbackTransport {
    rx: mpsc::UnboundedReceiver<String>,
}

/// Hands out the single loopback transport on the first `connect`.
pub struct LoopbackConnector {
    transport: Mutex<Option<LoopbackTransport>>,
}

/// Create a connected `(connector, server_tx)` pair.
fn loopback_pair() -> (LoopbackConnector, mpsc::UnboundedSender<String>) {
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    let connector = LoopbackConnector {
        transport: Mutex::new(Some(LoopbackTransport { rx: client_rx })),
    };
    (connector, server_tx)
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the transport traits
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl EventTransport for LoopbackTransport {
    /// Receive the next frame from the "server" side.
    ///
    /// Returns `None` when the server channel is closed; this is how the
    /// client discovers that the stream has ended.
    ///
    /// This method is **cancel-safe** because `mpsc::UnboundedReceiver::recv`
    /// is cancel-safe.
    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        self.rx.recv().await.map(Ok)
    }

    /// Close is a no-op for channels; dropping is sufficient.
    async fn close(&mut self) -> Result<(), ClientError> {
        self.rx.close();
        Ok(())
    }
}

#[async_trait]
impl StreamConnector for LoopbackConnector {
    async fn connect(&self, _session_id: &str) -> Result<Box<dyn EventTransport>, ClientError> {
        let transport = self
            .transport
            .lock()
            .map_err(|_| ClientError::Transport("connector lock poisoned".into()))?
            .take()
            .ok_or_else(|| ClientError::Transport("loopback already consumed".into()))?;
        Ok(Box::new(transport))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: A canned snapshot source
// ─────────────────────────────────────────────────────────────────────

/// Reports one more move each time it is asked.
#[derive(Default)]
pub struct ReplayApi {
    fetches: Mutex<usize>,
}

#[async_trait]
impl SessionApi for ReplayApi {
    async fn fetch_snapshot(&self, _session_id: &str) -> Result<GameState, ClientError> {
        let mut fetches = self
            .fetches
            .lock()
            .map_err(|_| ClientError::Transport("api lock poisoned".into()))?;
        *fetches += 1;
        Ok(GameState {
            position: "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2".into(),
            move_log: Some("1. e4 e5".into()),
            status: GameStatus::InProgress,
            winner: None,
            move_count: *fetches,
        })
    }

    async fn fetch_status(&self, _session_id: &str) -> Result<PromptStatus, ClientError> {
        Ok(PromptStatus {
            white_submitted: true,
            black_submitted: true,
        })
    }

    async fn create_session(&self) -> Result<SessionId, ClientError> {
        Ok("LOCAL1".into())
    }

    async fn submit_prompt(
        &self,
        _session_id: &str,
        _color: Color,
        _prompt: &str,
    ) -> Result<SubmitPromptResponse, ClientError> {
        Ok(SubmitPromptResponse {
            message: "accepted".into(),
            game_started: true,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 4: Wire together the client and the fake server
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for readable output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (connector, server) = loopback_pair();
    let (mut client, mut event_rx) = EventStreamClient::open(
        Arc::new(connector),
        Arc::new(ReplayApi::default()),
        AudioCoordinator::silent(),
        StreamConfig::new("LOCAL1").with_initial_load(false),
    );

    // ── Fake server: push a short game ──────────────────────────────
    let frames = [
        serde_json::json!({ "type": "game_started" }),
        serde_json::json!({ "type": "thinking", "color": "white", "comment": "Center." }),
        serde_json::json!({ "type": "move", "color": "white", "move_san": "e4" }),
        serde_json::json!({ "type": "move", "color": "black", "move_san": "e5", "comment": "Symmetry." }),
        serde_json::json!({ "type": "game_over", "result": "draw", "termination": "agreement" }),
    ];
    for frame in &frames {
        server.send(frame.to_string())?;
    }
    // Ending the stream makes the client report Disconnected.
    drop(server);

    // ── Read events from the client ─────────────────────────────────
    while let Some(event) = event_rx.recv().await {
        match &event {
            SessionEvent::Message(msg) => {
                tracing::info!("[{}] {}", msg.player, msg.message);
            }
            SessionEvent::StateUpdated(state) => {
                tracing::info!("state refreshed ({} fetches)", state.move_count);
            }
            SessionEvent::Disconnected { reason } => {
                tracing::info!(
                    "stream ended: {}",
                    reason.as_deref().unwrap_or("clean")
                );
                break;
            }
            other => {
                tracing::info!("event: {other:?}");
            }
        }
    }

    // ── Clean shutdown ──────────────────────────────────────────────
    let total = client.message_count().await;
    client.close().await;
    tracing::info!("Done: {total} message(s) in the log.");
    Ok(())
}
