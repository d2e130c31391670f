//! [`SessionApi`] over HTTP using `reqwest`.
//!
//! # Feature gate
//!
//! This module is only available when the `http` feature is enabled (it is
//! enabled by default).

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::{validate_prompt, SessionApi};
use crate::error::{ClientError, Result};
use crate::model::{GameState, PromptStatus};
use crate::protocol::{
    Color, CreateSessionResponse, PromptStatusBody, SessionId, SessionSnapshot,
    SubmitPromptRequest, SubmitPromptResponse,
};

const DEFAULT_RESOURCE: &str = "sessions";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the server lives and how its routes are named.
///
/// # Example
///
/// ```
/// use vibechess_client::http::HttpConfig;
///
/// let config = HttpConfig::new("http://localhost:8000/").with_resource("games");
/// assert_eq!(config.session_url("ABC123"), "http://localhost:8000/games/ABC123");
/// assert_eq!(config.events_url("ABC123"), "http://localhost:8000/games/ABC123/events");
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Server origin, without trailing slash.
    pub base_url: String,
    /// Collection path segment (`sessions` or `games`).
    pub resource: String,
    /// Suffix of the lightweight status endpoint. `None` polls the snapshot
    /// endpoint itself.
    pub status_path: Option<String>,
    /// Whole-request timeout for request/response calls. Not applied to the
    /// event stream, which stays open indefinitely.
    pub request_timeout: Duration,
    /// TCP/TLS connect timeout, applied to every request.
    pub connect_timeout: Duration,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            resource: DEFAULT_RESOURCE.to_owned(),
            status_path: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into().trim_matches('/').to_owned();
        self
    }

    /// Poll `/{resource}/{id}/{path}` instead of the snapshot endpoint.
    #[must_use]
    pub fn with_status_path(mut self, path: impl Into<String>) -> Self {
        self.status_path = Some(path.into().trim_matches('/').to_owned());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, self.resource)
    }

    pub fn session_url(&self, session_id: &str) -> String {
        format!("{}/{session_id}", self.collection_url())
    }

    pub fn status_url(&self, session_id: &str) -> String {
        match &self.status_path {
            Some(path) => format!("{}/{path}", self.session_url(session_id)),
            None => self.session_url(session_id),
        }
    }

    pub fn prompt_url(&self, session_id: &str) -> String {
        format!("{}/prompt", self.session_url(session_id))
    }

    pub fn events_url(&self, session_id: &str) -> String {
        format!("{}/events", self.session_url(session_id))
    }

    /// Build a `reqwest` client honoring the connect timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the TLS backend cannot be
    /// initialized.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build HTTP client: {e}")))
    }
}

/// Production [`SessionApi`].
#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    http: reqwest::Client,
    config: HttpConfig,
}

impl HttpSessionApi {
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let http = config.build_client()?;
        Ok(Self { http, config })
    }

    /// Share an existing `reqwest` client (and its connection pool).
    pub fn with_client(http: reqwest::Client, config: HttpConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        decode(url, response).await
    }
}

/// Map a non-success status to [`ClientError::HttpStatus`], otherwise parse
/// the body as `T`.
async fn decode<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::HttpStatus {
            status: status.as_u16(),
            url: url.to_owned(),
        });
    }
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn fetch_snapshot(&self, session_id: &str) -> Result<GameState> {
        let snapshot: SessionSnapshot = self.get_json(&self.config.session_url(session_id)).await?;
        Ok(GameState::from(snapshot))
    }

    async fn fetch_status(&self, session_id: &str) -> Result<PromptStatus> {
        let body: PromptStatusBody = self.get_json(&self.config.status_url(session_id)).await?;
        Ok(PromptStatus::from(&body))
    }

    async fn create_session(&self) -> Result<SessionId> {
        let url = self.config.collection_url();
        debug!(url = %url, "POST");
        let response = self
            .http
            .post(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        let body: CreateSessionResponse = decode(&url, response).await?;
        Ok(body.session_id)
    }

    async fn submit_prompt(
        &self,
        session_id: &str,
        color: Color,
        prompt: &str,
    ) -> Result<SubmitPromptResponse> {
        validate_prompt(prompt)?;
        let url = self.config.prompt_url(session_id);
        debug!(url = %url, color = %color, "POST prompt");
        let response = self
            .http
            .post(&url)
            .timeout(self.config.request_timeout)
            .json(&SubmitPromptRequest {
                color,
                prompt: prompt.to_owned(),
            })
            .send()
            .await?;
        decode(&url, response).await
    }
}
