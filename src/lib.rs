//! # VibeChess Client
//!
//! Live-view client for VibeChess sessions: two language models play chess
//! from strategy prompts, and the server pushes each turn over a one-way
//! event stream.
//!
//! This crate keeps a local view of one session in sync with that stream.
//! It appends a message per event, plays commentary audio one clip at a
//! time, and refetches the authoritative snapshot whenever an event implies
//! the board changed.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`StreamConnector`] and
//!   [`EventTransport`] for any frame source
//! - **Tolerant wire format**: unknown event types are ignored and both the
//!   server's field names and the abstract names are accepted
//! - **SSE built-in**: the default `http` feature provides [`SseConnector`]
//!   and [`HttpSessionApi`](http::HttpSessionApi)
//! - **Event-driven**: receive typed [`SessionEvent`]s via a channel
//! - **Single-voice audio**: [`AudioCoordinator`] never overlaps clips; the
//!   `audio-rodio` feature plays them on the default device
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vibechess_client::http::{HttpConfig, HttpSessionApi};
//! use vibechess_client::{
//!     AudioCoordinator, EventStreamClient, SessionApi, SessionEvent, SseConnector, StreamConfig,
//! };
//!
//! # async fn example() -> Result<(), vibechess_client::ClientError> {
//! let http = HttpConfig::new("http://localhost:8000").with_resource("games");
//! let api: Arc<dyn SessionApi> = Arc::new(HttpSessionApi::new(http.clone())?);
//! let connector = Arc::new(SseConnector::new(http)?);
//!
//! let (mut client, mut events) = EventStreamClient::open(
//!     connector,
//!     api,
//!     AudioCoordinator::silent(),
//!     StreamConfig::new("K7Q2ZD"),
//! );
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Message(msg) => println!("[{}] {}", msg.player, msg.message),
//!         SessionEvent::StateUpdated(state) => println!("board: {}", state.position),
//!         SessionEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod audio;
pub mod client;
pub mod error;
pub mod event;
#[cfg(feature = "http")]
pub mod http;
pub mod model;
pub mod poller;
pub mod protocol;
pub mod sse;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::SessionApi;
pub use audio::{AudioCoordinator, AudioOutput, NullOutput};
pub use client::{EventStreamClient, ReconnectPolicy, StreamConfig};
pub use error::ClientError;
pub use event::SessionEvent;
pub use model::{ChatMessage, ConnectionStatus, GameState, MessageKind, PromptStatus};
pub use poller::{PollerConfig, WaitingRoomEvent, WaitingRoomPoller};
pub use protocol::{Color, GameStatus, SessionId, StreamEvent};
pub use transport::{EventTransport, StreamConnector};

#[cfg(feature = "http")]
pub use transports::{SseConnector, SseTransport};

#[cfg(feature = "audio-rodio")]
pub use audio::speaker::RodioOutput;
