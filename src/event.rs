//! Notifications emitted by the event stream client.

use crate::model::{ChatMessage, GameState};
use crate::protocol::Color;

/// A change in the live view of a session, delivered on the channel returned
/// by [`EventStreamClient::open`](crate::EventStreamClient::open).
///
/// The channel is a notification feed; the handle's accessors
/// (`messages`, `game_state`, `connection_status`) stay authoritative even
/// if a slow consumer causes events to be dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A stream connection attempt is starting.
    Connecting,
    /// The stream is open and frames are flowing.
    Connected,
    /// The stream failed or ended. Always delivered.
    Disconnected {
        /// Human-readable cause, if known.
        reason: Option<String>,
    },
    /// A new entry was appended to the message log.
    Message(ChatMessage),
    /// One side committed its prompt.
    PromptSubmitted {
        color: Option<Color>,
    },
    /// The waiting phase is over.
    GameStarted,
    /// A fresh snapshot replaced the game state.
    StateUpdated(GameState),
    /// The handle was closed. Always the last event.
    Closed,
}

impl SessionEvent {
    /// Terminal and status events that must never be dropped.
    pub(crate) fn is_critical(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Closed)
    }
}
