//! Request/response side of the server API.
//!
//! [`SessionApi`] covers the four calls the client makes outside the event
//! stream. The client loop and the waiting-room poller only depend on this
//! trait; [`HttpSessionApi`](crate::http::HttpSessionApi) is the production
//! implementation.

use async_trait::async_trait;

use crate::error::{ClientError, Result};
use crate::model::{GameState, PromptStatus};
use crate::protocol::{Color, SessionId, SubmitPromptResponse};

/// Longest strategy prompt the server accepts, in characters.
pub const MAX_PROMPT_CHARS: usize = 2000;

/// Calls that return a complete value or fail; none of them partially
/// updates anything.
#[async_trait]
pub trait SessionApi: Send + Sync + 'static {
    /// Fetch the full authoritative state of a session.
    ///
    /// # Errors
    ///
    /// Returns a transport error on network failure or a non-success
    /// status, and a parse error if the body does not match.
    async fn fetch_snapshot(&self, session_id: &str) -> Result<GameState>;

    /// Fetch which sides have submitted their prompt.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_snapshot`](SessionApi::fetch_snapshot).
    async fn fetch_status(&self, session_id: &str) -> Result<PromptStatus>;

    /// Create a new session and return its identifier.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_snapshot`](SessionApi::fetch_snapshot).
    async fn create_session(&self) -> Result<SessionId>;

    /// Submit the strategy prompt for one side.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidPrompt`] if the prompt is empty or too
    /// long, otherwise the same errors as
    /// [`fetch_snapshot`](SessionApi::fetch_snapshot).
    async fn submit_prompt(
        &self,
        session_id: &str,
        color: Color,
        prompt: &str,
    ) -> Result<SubmitPromptResponse>;
}

/// Check a prompt against the server's length bounds before sending it.
///
/// # Errors
///
/// Returns [`ClientError::InvalidPrompt`] for empty or over-long prompts.
pub fn validate_prompt(prompt: &str) -> Result<()> {
    let chars = prompt.chars().count();
    if chars == 0 {
        return Err(ClientError::InvalidPrompt("prompt is empty".into()));
    }
    if chars > MAX_PROMPT_CHARS {
        return Err(ClientError::InvalidPrompt(format!(
            "prompt is {chars} characters, limit is {MAX_PROMPT_CHARS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn prompt_bounds() {
        assert!(validate_prompt("Play the Sicilian and trade queens early").is_ok());
        assert!(matches!(
            validate_prompt(""),
            Err(ClientError::InvalidPrompt(_))
        ));
        assert!(validate_prompt(&"é".repeat(MAX_PROMPT_CHARS)).is_ok());
        assert!(validate_prompt(&"a".repeat(MAX_PROMPT_CHARS + 1)).is_err());
    }
}
