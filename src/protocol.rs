//! Wire-compatible types for the game server's HTTP and event-stream API.
//!
//! The server names some fields differently from the client's local view
//! (`board_fen` vs. `position`, `result` vs. `winner`, `termination` vs.
//! `reason`). Serialization always produces the server's names. On input
//! every spelling is read into its own slot and merged; when a body carries
//! more than one, the server's name wins.

use serde::{Deserialize, Serialize};

use crate::error::Result;

// ── Type aliases ────────────────────────────────────────────────────

/// Opaque identifier of one game instance (the server's "game code").
pub type SessionId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Side of the board.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    #[default]
    White,
    Black,
}

impl Color {
    /// The other side.
    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a game as reported by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// One or both strategy prompts are still missing.
    #[default]
    #[serde(rename = "waiting_for_prompts", alias = "waiting")]
    Waiting,
    /// Both prompts are in and moves are being played.
    InProgress,
    /// The game has ended; `result` is set.
    Completed,
}

// ── Stream frames ───────────────────────────────────────────────────

/// Payload of a `thinking` frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThinkingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent_emotion: Option<String>,
}

/// Payload of a `move` frame.
/// Boxed in `StreamEvent` to reduce enum size.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "wire::MovePayload")]
pub struct MovePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_number: Option<u32>,
    pub color: Color,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_uci: Option<String>,
    pub move_san: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// `true` when the server substituted a random legal move.
    pub was_fallback: bool,
    /// Position after the move. Read from `board_fen`, `fen` or `position`.
    #[serde(rename = "board_fen", skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_ascii: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
    /// Base64-encoded spoken commentary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commentary_audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_emotion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent_emotion: Option<String>,
}

/// Payload of a `game_over` frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "wire::GameOverPayload")]
pub struct GameOverPayload {
    /// `white_wins`, `black_wins`, `draw`, or any server-defined string.
    pub result: String,
    /// Read from `termination` or `reason`.
    #[serde(rename = "termination", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// One frame on the event stream, discriminated by its `type` field.
///
/// Unrecognized `type` values deserialize to [`StreamEvent::Unknown`] so that
/// new server events never break older clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// One side has committed its strategy prompt.
    PromptSubmitted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<Color>,
    },
    /// Both prompts are in; the game loop has begun.
    GameStarted,
    /// An agent is deliberating.
    Thinking(ThinkingPayload),
    /// A move was played.
    Move(Box<MovePayload>),
    /// The game has ended.
    GameOver(GameOverPayload),
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Whether this event changes authoritative state and therefore requires
    /// a snapshot refetch.
    pub fn changes_state(&self) -> bool {
        matches!(self, Self::Move(_) | Self::GameOver(_))
    }

    /// Wire name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PromptSubmitted { .. } => "prompt_submitted",
            Self::GameStarted => "game_started",
            Self::Thinking(_) => "thinking",
            Self::Move(_) => "move",
            Self::GameOver(_) => "game_over",
            Self::Unknown => "unknown",
        }
    }
}

/// A decoded stream frame: the classified event plus any audio attachment.
///
/// The audio payload is read from the raw object so that it is honored on
/// every frame type, including ones this client does not otherwise
/// understand.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: StreamEvent,
    pub commentary_audio: Option<String>,
}

impl Frame {
    /// Parse one frame's data.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Parse`](crate::ClientError::Parse) if the text
    /// is not a JSON object with a `type` field, or a known event type lacks
    /// its required fields.
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let commentary_audio = value
            .get("commentary_audio")
            .and_then(serde_json::Value::as_str)
            .filter(|audio| !audio.is_empty())
            .map(str::to_owned);
        let event = serde_json::from_value(value)?;
        Ok(Self {
            event,
            commentary_audio,
        })
    }
}

// ── Snapshot bodies ─────────────────────────────────────────────────

/// One recorded move in a snapshot's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveRecord {
    pub move_number: u32,
    pub color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_uci: Option<String>,
    pub move_san: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub was_fallback: bool,
    /// ISO 8601 server timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Body of `GET /{resource}/{id}`: the full authoritative game state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "wire::SessionSnapshot")]
pub struct SessionSnapshot {
    /// Read from `game_code`, `session_id` or `id`.
    #[serde(rename = "game_code", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub status: GameStatus,
    /// Read from `board_fen`, `position` or `fen`; one is required.
    #[serde(rename = "board_fen")]
    pub position: String,
    #[serde(rename = "moveLogText", skip_serializing_if = "Option::is_none")]
    pub move_log_text: Option<String>,
    /// Read from `result` or `winner`.
    #[serde(rename = "result")]
    pub winner: Option<String>,
    pub moves: Vec<MoveRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black_prompt: Option<String>,
}

/// Body of the lightweight status endpoint.
///
/// Accepts either explicit `*_submitted` flags or the full snapshot body, in
/// which case submission is inferred from non-null `*_prompt` fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptStatusBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_submitted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_submitted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GameStatus>,
}

// ── Request / response bodies ───────────────────────────────────────

/// Body of `POST /{resource}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "wire::CreateSessionResponse")]
pub struct CreateSessionResponse {
    /// Read from `game_code`, `session_id` or `id`.
    #[serde(rename = "game_code")]
    pub session_id: SessionId,
}

/// Body sent to `POST /{resource}/{id}/prompt`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitPromptRequest {
    pub color: Color,
    pub prompt: String,
}

/// Response of `POST /{resource}/{id}/prompt`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitPromptResponse {
    pub message: String,
    /// `true` when this submission completed the pair and the game began.
    #[serde(default)]
    pub game_started: bool,
}

// ── Input spellings ─────────────────────────────────────────────────

/// Raw input shapes with one slot per accepted spelling.
mod wire {
    use serde::Deserialize;

    use super::{Color, GameStatus, MoveRecord, SessionId};

    /// First present value, in order of preference.
    fn first<T, const N: usize>(spellings: [Option<T>; N]) -> Option<T> {
        spellings.into_iter().flatten().next()
    }

    #[derive(Deserialize)]
    pub(super) struct MovePayload {
        move_number: Option<u32>,
        color: Color,
        move_uci: Option<String>,
        move_san: String,
        comment: Option<String>,
        #[serde(default)]
        was_fallback: bool,
        board_fen: Option<String>,
        fen: Option<String>,
        position: Option<String>,
        board_ascii: Option<String>,
        commentary: Option<String>,
        commentary_audio: Option<String>,
        my_emotion: Option<String>,
        opponent_emotion: Option<String>,
    }

    impl From<MovePayload> for super::MovePayload {
        fn from(raw: MovePayload) -> Self {
            Self {
                move_number: raw.move_number,
                color: raw.color,
                move_uci: raw.move_uci,
                move_san: raw.move_san,
                comment: raw.comment,
                was_fallback: raw.was_fallback,
                position: first([raw.board_fen, raw.fen, raw.position]),
                board_ascii: raw.board_ascii,
                commentary: raw.commentary,
                commentary_audio: raw.commentary_audio,
                my_emotion: raw.my_emotion,
                opponent_emotion: raw.opponent_emotion,
            }
        }
    }

    #[derive(Deserialize)]
    pub(super) struct GameOverPayload {
        result: String,
        termination: Option<String>,
        reason: Option<String>,
        color: Option<Color>,
    }

    impl From<GameOverPayload> for super::GameOverPayload {
        fn from(raw: GameOverPayload) -> Self {
            Self {
                result: raw.result,
                reason: first([raw.termination, raw.reason]),
                color: raw.color,
            }
        }
    }

    #[derive(Deserialize)]
    pub(super) struct SessionSnapshot {
        game_code: Option<SessionId>,
        session_id: Option<SessionId>,
        id: Option<SessionId>,
        status: GameStatus,
        board_fen: Option<String>,
        position: Option<String>,
        fen: Option<String>,
        #[serde(rename = "moveLogText")]
        move_log_camel: Option<String>,
        move_log_text: Option<String>,
        result: Option<String>,
        winner: Option<String>,
        #[serde(default)]
        moves: Vec<MoveRecord>,
        current_turn: Option<Color>,
        white_prompt: Option<String>,
        black_prompt: Option<String>,
    }

    impl TryFrom<SessionSnapshot> for super::SessionSnapshot {
        type Error = &'static str;

        fn try_from(raw: SessionSnapshot) -> Result<Self, Self::Error> {
            let position = first([raw.board_fen, raw.position, raw.fen])
                .ok_or("missing field `board_fen`")?;
            Ok(Self {
                session_id: first([raw.game_code, raw.session_id, raw.id]),
                status: raw.status,
                position,
                move_log_text: first([raw.move_log_camel, raw.move_log_text]),
                winner: first([raw.result, raw.winner]),
                moves: raw.moves,
                current_turn: raw.current_turn,
                white_prompt: raw.white_prompt,
                black_prompt: raw.black_prompt,
            })
        }
    }

    #[derive(Deserialize)]
    pub(super) struct CreateSessionResponse {
        game_code: Option<SessionId>,
        session_id: Option<SessionId>,
        id: Option<SessionId>,
    }

    impl TryFrom<CreateSessionResponse> for super::CreateSessionResponse {
        type Error = &'static str;

        fn try_from(raw: CreateSessionResponse) -> Result<Self, Self::Error> {
            let session_id = first([raw.game_code, raw.session_id, raw.id])
                .ok_or("missing field `game_code`")?;
            Ok(Self { session_id })
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_is_not_an_error() {
        let frame = Frame::parse(r#"{"type":"viewer_count","count":3}"#).unwrap();
        assert_eq!(frame.event, StreamEvent::Unknown);
        assert!(frame.commentary_audio.is_none());
    }

    #[test]
    fn audio_is_extracted_from_any_frame_type() {
        let frame =
            Frame::parse(r#"{"type":"announcement","commentary_audio":"SUQzAwAA"}"#).unwrap();
        assert_eq!(frame.event, StreamEvent::Unknown);
        assert_eq!(frame.commentary_audio.as_deref(), Some("SUQzAwAA"));
    }

    #[test]
    fn missing_type_is_a_parse_error() {
        let err = Frame::parse(r#"{"move_san":"e4"}"#).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn move_requires_san() {
        let err = Frame::parse(r#"{"type":"move","color":"white"}"#).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn server_move_frame_parses() {
        let text = r#"{
            "type": "move",
            "move_number": 1,
            "color": "white",
            "move_uci": "e2e4",
            "move_san": "e4",
            "comment": null,
            "was_fallback": false,
            "board_fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
            "board_ascii": "r n b q k b n r",
            "commentary": null,
            "commentary_audio": null,
            "my_emotion": "confident",
            "opponent_emotion": null
        }"#;
        let frame = Frame::parse(text).unwrap();
        let StreamEvent::Move(payload) = frame.event else {
            panic!("expected Move");
        };
        assert_eq!(payload.move_san, "e4");
        assert_eq!(payload.move_uci.as_deref(), Some("e2e4"));
        assert_eq!(payload.color, Color::White);
        assert!(payload.position.as_deref().unwrap().starts_with("rnbqkbnr"));
        assert_eq!(payload.my_emotion.as_deref(), Some("confident"));
        assert!(frame.commentary_audio.is_none());
    }

    #[test]
    fn game_over_accepts_reason_alias() {
        let frame = Frame::parse(r#"{"type":"game_over","result":"draw","reason":"stalemate"}"#)
            .unwrap();
        let StreamEvent::GameOver(payload) = frame.event else {
            panic!("expected GameOver");
        };
        assert_eq!(payload.reason.as_deref(), Some("stalemate"));

        let json = serde_json::to_value(StreamEvent::GameOver(payload)).unwrap();
        assert_eq!(json["termination"], "stalemate");
        assert_eq!(json["type"], "game_over");
    }

    #[test]
    fn state_changing_events() {
        assert!(StreamEvent::Move(Box::default()).changes_state());
        assert!(StreamEvent::GameOver(GameOverPayload::default()).changes_state());
        assert!(!StreamEvent::Thinking(ThinkingPayload::default()).changes_state());
        assert!(!StreamEvent::GameStarted.changes_state());
        assert!(!StreamEvent::PromptSubmitted { color: None }.changes_state());
        assert!(!StreamEvent::Unknown.changes_state());
    }

    #[test]
    fn snapshot_accepts_server_and_abstract_names() {
        let server = r#"{
            "game_code": "K7Q2ZD",
            "status": "waiting_for_prompts",
            "white_prompt": "play the London",
            "black_prompt": null,
            "board_fen": "8/8/8/8/8/8/8/8 w - - 0 1",
            "current_turn": "white",
            "result": null,
            "moves": [],
            "created_at": "2026-01-01T00:00:00"
        }"#;
        let snapshot: SessionSnapshot = serde_json::from_str(server).unwrap();
        assert_eq!(snapshot.session_id.as_deref(), Some("K7Q2ZD"));
        assert_eq!(snapshot.status, GameStatus::Waiting);
        assert_eq!(snapshot.white_prompt.as_deref(), Some("play the London"));

        let abstract_shape = r#"{
            "position": "8/8/8/8/8/8/8/8 w - - 0 1",
            "moveLogText": "1. e4",
            "status": "completed",
            "winner": "white_wins",
            "moves": []
        }"#;
        let snapshot: SessionSnapshot = serde_json::from_str(abstract_shape).unwrap();
        assert_eq!(snapshot.status, GameStatus::Completed);
        assert_eq!(snapshot.winner.as_deref(), Some("white_wins"));
        assert_eq!(snapshot.move_log_text.as_deref(), Some("1. e4"));
    }

    #[test]
    fn create_response_accepts_game_code() {
        let body: CreateSessionResponse = serde_json::from_str(r#"{"game_code":"ABC123"}"#).unwrap();
        assert_eq!(body.session_id, "ABC123");

        let body: CreateSessionResponse =
            serde_json::from_str(r#"{"id":"OLD","game_code":"ABC123"}"#).unwrap();
        assert_eq!(body.session_id, "ABC123");

        assert!(serde_json::from_str::<CreateSessionResponse>("{}").is_err());
    }

    #[test]
    fn duplicate_spellings_merge_instead_of_failing() {
        let frame = Frame::parse(
            r#"{"type":"move","color":"black","move_san":"e5","fen":"F","position":"F"}"#,
        )
        .unwrap();
        let StreamEvent::Move(payload) = frame.event else {
            panic!("expected Move");
        };
        assert_eq!(payload.position.as_deref(), Some("F"));

        let frame = Frame::parse(
            r#"{"type":"game_over","result":"draw","reason":"r","termination":"t"}"#,
        )
        .unwrap();
        let StreamEvent::GameOver(payload) = frame.event else {
            panic!("expected GameOver");
        };
        assert_eq!(payload.reason.as_deref(), Some("t"));

        let snapshot: SessionSnapshot = serde_json::from_str(
            r#"{"status":"completed","fen":"F","winner":"black_wins","result":"white_wins"}"#,
        )
        .unwrap();
        assert_eq!(snapshot.winner.as_deref(), Some("white_wins"));
        assert_eq!(snapshot.position, "F");
    }

    #[test]
    fn serialization_uses_server_names() {
        let payload = MovePayload {
            move_san: "e4".into(),
            position: Some("F".into()),
            ..MovePayload::default()
        };
        let json = serde_json::to_value(StreamEvent::Move(Box::new(payload))).unwrap();
        assert_eq!(json["board_fen"], "F");
        assert!(json.get("position").is_none());
    }
}
