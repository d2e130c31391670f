//! Error types for the live session client.

use thiserror::Error;

/// Errors that can occur while following a game session.
///
/// Every failure falls into one of three families: parse errors (a single
/// malformed frame or body), transport errors (a fetch or the stream itself
/// failed) and playback errors (a commentary clip could not be played). None
/// of them is fatal: callers log them and keep the last consistent state.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A frame or response body was not valid JSON for the expected shape.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A request or the event stream could not be completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status code.
    #[error("server returned HTTP {status} for {url}")]
    HttpStatus {
        /// Numeric HTTP status.
        status: u16,
        /// Request URL, for diagnostics.
        url: String,
    },

    /// An audio clip could not be decoded or played.
    #[error("playback error: {0}")]
    Playback(String),

    /// An audio payload was not valid base64.
    #[error("audio payload is not valid base64: {0}")]
    AudioDecode(#[from] base64::DecodeError),

    /// A strategy prompt was rejected before it was sent.
    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns `true` for malformed frames and bodies.
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    /// Returns `true` for network, status, stream and timeout failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::HttpStatus { .. }
                | Self::Timeout
                | Self::Io(_)
        )
    }

    /// Returns `true` for audio decode and device failures.
    pub fn is_playback(&self) -> bool {
        matches!(self, Self::Playback(_) | Self::AudioDecode(_))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = err.status() {
            return Self::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(ToString::to_string).unwrap_or_default(),
            };
        }
        Self::Transport(err.to_string())
    }
}

/// A specialized [`Result`] type for session client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_is_disjoint() {
        let parse = ClientError::from(serde_json::from_str::<u8>("{").unwrap_err());
        assert!(parse.is_parse());
        assert!(!parse.is_transport());
        assert!(!parse.is_playback());

        let status = ClientError::HttpStatus {
            status: 404,
            url: "http://localhost/sessions/ABC".into(),
        };
        assert!(status.is_transport());
        assert_eq!(
            status.to_string(),
            "server returned HTTP 404 for http://localhost/sessions/ABC"
        );

        let playback = ClientError::Playback("no output device".into());
        assert!(playback.is_playback());
        assert!(!playback.is_transport());

        let decode = ClientError::from(base64::DecodeError::InvalidLength);
        assert!(decode.is_playback());
        assert!(ClientError::Timeout.is_transport());
    }
}
