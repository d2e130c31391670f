//! # Watch Game Example
//!
//! Demonstrates a complete live-view lifecycle:
//!
//! 1. Create a game (or follow an existing one)
//! 2. Wait in the waiting room until both prompts are submitted
//! 3. Open the event stream and print every message and board update
//! 4. Shut down gracefully on Ctrl+C or when the stream ends
//!
//! ## Running
//!
//! ```sh
//! # Start the game server on localhost:8000, then:
//! cargo run --example watch_game
//!
//! # Follow an existing game on another server:
//! VIBECHESS_URL=http://my-server:8000 VIBECHESS_GAME=K7Q2ZD cargo run --example watch_game
//!
//! # With spoken commentary:
//! cargo run --example watch_game --features audio-rodio
//! ```

use std::sync::Arc;

use vibechess_client::http::{HttpConfig, HttpSessionApi};
use vibechess_client::{
    AudioCoordinator, EventStreamClient, PollerConfig, SessionApi, SessionEvent, SseConnector,
    StreamConfig, WaitingRoomEvent, WaitingRoomPoller,
};

/// Default server URL when `VIBECHESS_URL` is not set.
const DEFAULT_URL: &str = "http://localhost:8000";

#[cfg(feature = "audio-rodio")]
fn audio() -> AudioCoordinator {
    match vibechess_client::RodioOutput::new() {
        Ok(output) => AudioCoordinator::new(output),
        Err(e) => {
            tracing::warn!("audio unavailable, continuing silently: {e}");
            AudioCoordinator::silent()
        }
    }
}

#[cfg(not(feature = "audio-rodio"))]
fn audio() -> AudioCoordinator {
    AudioCoordinator::silent()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("VIBECHESS_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let http = HttpConfig::new(url).with_resource("games");
    let api: Arc<dyn SessionApi> = Arc::new(HttpSessionApi::new(http.clone())?);

    let session_id = match std::env::var("VIBECHESS_GAME") {
        Ok(id) => id,
        Err(_) => {
            let id = api.create_session().await?;
            tracing::info!("Created game {id}; share the code and submit both prompts");
            id
        }
    };

    // ── Waiting room ────────────────────────────────────────────────
    let (mut poller, mut room_rx) =
        WaitingRoomPoller::start(Arc::clone(&api), PollerConfig::new(session_id.clone()));
    loop {
        tokio::select! {
            event = room_rx.recv() => match event {
                Some(WaitingRoomEvent::StatusChanged(status)) => {
                    tracing::info!(
                        "prompts: white={} black={}",
                        status.white_submitted,
                        status.black_submitted
                    );
                }
                Some(WaitingRoomEvent::BothSubmitted) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                poller.cancel().await;
                return Ok(());
            }
        }
    }
    poller.cancel().await;

    // ── Live view ───────────────────────────────────────────────────
    let connector = Arc::new(SseConnector::new(http)?);
    let (mut client, mut event_rx) = EventStreamClient::open(
        connector,
        api,
        audio(),
        StreamConfig::new(session_id),
    );

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Connected => tracing::info!("stream connected"),
                    SessionEvent::Message(msg) => println!("[{}] {}", msg.player, msg.message),
                    SessionEvent::StateUpdated(state) => {
                        println!("  {}", state.position);
                        if let Some(winner) = state.winner {
                            println!("  result: {winner}");
                        }
                    }
                    SessionEvent::Disconnected { reason } => {
                        tracing::info!(
                            "stream ended: {}",
                            reason.as_deref().unwrap_or("closed by server")
                        );
                        break;
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, closing");
                break;
            }
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────
    client.close().await;
    Ok(())
}
