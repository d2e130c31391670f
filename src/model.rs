//! Local view of a session: the message log entries, the game state mirror
//! and the connection status read by the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{
    Color, GameOverPayload, GameStatus, MovePayload, MoveRecord, PromptStatusBody,
    SessionSnapshot, StreamEvent, ThinkingPayload,
};

/// Text shown for a `thinking` frame that carries no comment.
pub const THINKING_PLACEHOLDER: &str = "Thinking...";

// ── Chat messages ───────────────────────────────────────────────────

/// Display category of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Thinking,
    Action,
    GameOver,
}

/// One entry in the session's append-only message log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Locally generated; unique within a session only.
    pub id: Uuid,
    pub player: Color,
    /// Rendered text, derived from the frame.
    pub message: String,
    /// Client-side receipt time.
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_notation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary_audio_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_emotion: Option<String>,
}

impl ChatMessage {
    fn new(player: Color, kind: MessageKind, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            player,
            message,
            timestamp: Utc::now(),
            kind,
            move_notation: None,
            position: None,
            commentary: None,
            commentary_audio_ref: None,
            self_emotion: None,
            opponent_emotion: None,
        }
    }

    /// Render the log entry for a stream event.
    ///
    /// Returns `None` for events that add nothing to the log
    /// (`prompt_submitted`, `game_started` and unknown types).
    pub fn from_event(event: &StreamEvent) -> Option<Self> {
        match event {
            StreamEvent::Thinking(payload) => Some(Self::thinking(payload)),
            StreamEvent::Move(payload) => Some(Self::action(payload)),
            StreamEvent::GameOver(payload) => Some(Self::game_over(payload)),
            StreamEvent::PromptSubmitted { .. } | StreamEvent::GameStarted | StreamEvent::Unknown => {
                None
            }
        }
    }

    fn thinking(payload: &ThinkingPayload) -> Self {
        let text = [&payload.comment, &payload.commentary]
            .into_iter()
            .filter_map(|text| text.as_deref())
            .find(|text| !text.is_empty())
            .unwrap_or(THINKING_PLACEHOLDER)
            .to_owned();
        let mut msg = Self::new(payload.color.unwrap_or_default(), MessageKind::Thinking, text);
        msg.commentary = payload.commentary.clone();
        msg.self_emotion = payload.my_emotion.clone();
        msg.opponent_emotion = payload.opponent_emotion.clone();
        msg
    }

    fn action(payload: &MovePayload) -> Self {
        let text = match payload.comment.as_deref() {
            Some(comment) if !comment.is_empty() => format!("{}: {comment}", payload.move_san),
            _ => payload.move_san.clone(),
        };
        let mut msg = Self::new(payload.color, MessageKind::Action, text);
        msg.move_notation = Some(payload.move_san.clone());
        msg.position = payload.position.clone();
        msg.commentary = payload.commentary.clone();
        msg.commentary_audio_ref = payload.commentary_audio.clone();
        msg.self_emotion = payload.my_emotion.clone();
        msg.opponent_emotion = payload.opponent_emotion.clone();
        msg
    }

    fn game_over(payload: &GameOverPayload) -> Self {
        let mut text = format!("Game Over: {}", payload.result);
        if let Some(reason) = payload.reason.as_deref().filter(|r| !r.is_empty()) {
            text.push_str(&format!(" ({reason})"));
        }
        let player = payload
            .color
            .or_else(|| winner_color(&payload.result))
            .unwrap_or_default();
        Self::new(player, MessageKind::GameOver, text)
    }
}

/// Side named by a result string such as `white_wins` or `0-1`.
fn winner_color(result: &str) -> Option<Color> {
    match result {
        "white_wins" | "white" | "1-0" => Some(Color::White),
        "black_wins" | "black" | "0-1" => Some(Color::Black),
        _ => None,
    }
}

// ── Game state ──────────────────────────────────────────────────────

/// Mirror of the server's authoritative state.
///
/// Only ever built from a complete [`SessionSnapshot`]; stream frames never
/// patch it directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_log: Option<String>,
    pub status: GameStatus,
    pub winner: Option<String>,
    pub move_count: usize,
}

impl From<SessionSnapshot> for GameState {
    fn from(snapshot: SessionSnapshot) -> Self {
        let move_log = snapshot
            .move_log_text
            .or_else(|| render_move_log(&snapshot.moves));
        Self {
            position: snapshot.position,
            move_log,
            status: snapshot.status,
            winner: snapshot.winner,
            move_count: snapshot.moves.len(),
        }
    }
}

/// Numbered move list, e.g. `1. e4 e5 2. Nf3`. A history that starts with
/// black gets the `1...` continuation form.
fn render_move_log(moves: &[MoveRecord]) -> Option<String> {
    if moves.is_empty() {
        return None;
    }
    let mut parts = Vec::with_capacity(moves.len() * 2);
    for (idx, record) in moves.iter().enumerate() {
        match record.color {
            Color::White => parts.push(format!("{}.", record.move_number)),
            Color::Black if idx == 0 => parts.push(format!("{}...", record.move_number)),
            Color::Black => {}
        }
        parts.push(record.move_san.clone());
    }
    Some(parts.join(" "))
}

// ── Waiting room ────────────────────────────────────────────────────

/// Which sides have committed their strategy prompt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptStatus {
    pub white_submitted: bool,
    pub black_submitted: bool,
}

impl PromptStatus {
    /// Both prompts are in; the waiting phase is over.
    pub fn both_submitted(&self) -> bool {
        self.white_submitted && self.black_submitted
    }
}

impl From<&PromptStatusBody> for PromptStatus {
    fn from(body: &PromptStatusBody) -> Self {
        let started = matches!(
            body.status,
            Some(GameStatus::InProgress | GameStatus::Completed)
        );
        Self {
            white_submitted: started
                || body
                    .white_submitted
                    .unwrap_or(body.white_prompt.is_some()),
            black_submitted: started
                || body
                    .black_submitted
                    .unwrap_or(body.black_prompt.is_some()),
        }
    }
}

// ── Connection status ───────────────────────────────────────────────

/// State of the event stream as seen by the presentation layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionStatus {
    #[default]
    Connecting = 0,
    Connected = 1,
    Disconnected = 2,
    /// Terminal: the handle was closed.
    Closed = 3,
}

impl ConnectionStatus {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Connected,
            2 => Self::Disconnected,
            _ => Self::Closed,
        }
    }

    /// `true` only while frames are being received.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn move_event(san: &str, comment: Option<&str>) -> StreamEvent {
        StreamEvent::Move(Box::new(MovePayload {
            color: Color::Black,
            move_san: san.into(),
            comment: comment.map(Into::into),
            position: Some("fen".into()),
            commentary_audio: Some("AAAA".into()),
            my_emotion: Some("smug".into()),
            ..MovePayload::default()
        }))
    }

    #[test]
    fn move_text_is_notation_alone_without_comment() {
        let msg = ChatMessage::from_event(&move_event("e4", None)).unwrap();
        assert_eq!(msg.message, "e4");
        assert_eq!(msg.kind, MessageKind::Action);
        assert_eq!(msg.move_notation.as_deref(), Some("e4"));
        assert_eq!(msg.player, Color::Black);
    }

    #[test]
    fn move_text_appends_comment() {
        let msg = ChatMessage::from_event(&move_event("e4", Some("Central control"))).unwrap();
        assert_eq!(msg.message, "e4: Central control");
        assert_eq!(msg.position.as_deref(), Some("fen"));
        assert_eq!(msg.commentary_audio_ref.as_deref(), Some("AAAA"));
        assert_eq!(msg.self_emotion.as_deref(), Some("smug"));
    }

    #[test]
    fn game_over_text() {
        let mut payload = GameOverPayload {
            result: "white_wins".into(),
            ..GameOverPayload::default()
        };
        let msg = ChatMessage::from_event(&StreamEvent::GameOver(payload.clone())).unwrap();
        assert_eq!(msg.message, "Game Over: white_wins");
        assert_eq!(msg.kind, MessageKind::GameOver);
        assert_eq!(msg.player, Color::White);

        payload.reason = Some("checkmate".into());
        let msg = ChatMessage::from_event(&StreamEvent::GameOver(payload)).unwrap();
        assert_eq!(msg.message, "Game Over: white_wins (checkmate)");
    }

    #[test]
    fn game_over_player_follows_winner() {
        let payload = GameOverPayload {
            result: "black_wins".into(),
            ..GameOverPayload::default()
        };
        let msg = ChatMessage::from_event(&StreamEvent::GameOver(payload)).unwrap();
        assert_eq!(msg.player, Color::Black);
    }

    #[test]
    fn thinking_falls_back_to_placeholder() {
        let msg =
            ChatMessage::from_event(&StreamEvent::Thinking(ThinkingPayload::default())).unwrap();
        assert_eq!(msg.message, THINKING_PLACEHOLDER);
        assert_eq!(msg.kind, MessageKind::Thinking);

        let payload = ThinkingPayload {
            color: Some(Color::Black),
            commentary: Some("Eyeing the kingside".into()),
            ..ThinkingPayload::default()
        };
        let msg = ChatMessage::from_event(&StreamEvent::Thinking(payload)).unwrap();
        assert_eq!(msg.message, "Eyeing the kingside");
        assert_eq!(msg.player, Color::Black);
    }

    #[test]
    fn empty_comment_falls_through_to_commentary() {
        let payload = ThinkingPayload {
            comment: Some(String::new()),
            commentary: Some("Eyeing f7".into()),
            ..ThinkingPayload::default()
        };
        let msg = ChatMessage::from_event(&StreamEvent::Thinking(payload)).unwrap();
        assert_eq!(msg.message, "Eyeing f7");

        let payload = ThinkingPayload {
            comment: Some(String::new()),
            commentary: Some(String::new()),
            ..ThinkingPayload::default()
        };
        let msg = ChatMessage::from_event(&StreamEvent::Thinking(payload)).unwrap();
        assert_eq!(msg.message, THINKING_PLACEHOLDER);
    }

    #[test]
    fn informational_events_add_no_message() {
        assert!(ChatMessage::from_event(&StreamEvent::GameStarted).is_none());
        assert!(ChatMessage::from_event(&StreamEvent::Unknown).is_none());
        assert!(ChatMessage::from_event(&StreamEvent::PromptSubmitted {
            color: Some(Color::White)
        })
        .is_none());
    }

    #[test]
    fn message_ids_are_unique() {
        let a = ChatMessage::from_event(&move_event("e4", None)).unwrap();
        let b = ChatMessage::from_event(&move_event("e4", None)).unwrap();
        assert_ne!(a.id, b.id);
    }

    fn record(number: u32, color: Color, san: &str) -> MoveRecord {
        MoveRecord {
            move_number: number,
            color,
            move_uci: None,
            move_san: san.into(),
            comment: None,
            was_fallback: false,
            created_at: None,
        }
    }

    #[test]
    fn game_state_renders_move_log_when_absent() {
        let snapshot = SessionSnapshot {
            session_id: None,
            status: GameStatus::InProgress,
            position: "fen".into(),
            move_log_text: None,
            winner: None,
            moves: vec![
                record(1, Color::White, "e4"),
                record(1, Color::Black, "e5"),
                record(2, Color::White, "Nf3"),
            ],
            current_turn: Some(Color::Black),
            white_prompt: None,
            black_prompt: None,
        };
        let state = GameState::from(snapshot);
        assert_eq!(state.move_count, 3);
        assert_eq!(state.move_log.as_deref(), Some("1. e4 e5 2. Nf3"));
    }

    #[test]
    fn empty_history_has_no_move_log() {
        assert!(render_move_log(&[]).is_none());
        assert_eq!(
            render_move_log(&[record(4, Color::Black, "Qxf7#")]).as_deref(),
            Some("4... Qxf7#")
        );
    }

    #[test]
    fn prompt_status_inferred_from_prompts() {
        let body = PromptStatusBody {
            white_prompt: Some("attack".into()),
            ..PromptStatusBody::default()
        };
        let status = PromptStatus::from(&body);
        assert!(status.white_submitted);
        assert!(!status.black_submitted);
        assert!(!status.both_submitted());

        let body = PromptStatusBody {
            white_submitted: Some(true),
            black_submitted: Some(true),
            ..PromptStatusBody::default()
        };
        assert!(PromptStatus::from(&body).both_submitted());
    }

    #[test]
    fn started_game_counts_as_both_submitted() {
        let body = PromptStatusBody {
            status: Some(GameStatus::InProgress),
            ..PromptStatusBody::default()
        };
        assert!(PromptStatus::from(&body).both_submitted());
    }

    #[test]
    fn connection_status_round_trips_through_u8() {
        for status in [
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Closed,
        ] {
            assert_eq!(ConnectionStatus::from_u8(status as u8), status);
        }
    }
}
