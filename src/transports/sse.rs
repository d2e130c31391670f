//! `text/event-stream` transport using `reqwest`.
//!
//! This module provides [`SseConnector`], a [`StreamConnector`] that opens
//! `GET /{resource}/{id}/events`, and [`SseTransport`], the
//! [`EventTransport`] it returns. The response body is read by a background
//! task that decodes frames with [`SseDecoder`] and hands each frame's data
//! to the transport over a bounded channel, which keeps
//! [`recv`](EventTransport::recv) cancel-safe.
//!
//! # Feature gate
//!
//! This module is only available when the `http` feature is enabled (it is
//! enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), vibechess_client::ClientError> {
//! use vibechess_client::http::HttpConfig;
//! use vibechess_client::{EventTransport, SseConnector, StreamConnector};
//!
//! let connector = SseConnector::new(HttpConfig::new("http://localhost:8000"))?;
//! let mut stream = connector.connect("K7Q2ZD").await?;
//!
//! while let Some(Ok(frame)) = stream.recv().await {
//!     println!("frame: {frame}");
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ClientError, Result};
use crate::http::HttpConfig;
use crate::sse::SseDecoder;
use crate::transport::{EventTransport, StreamConnector};

/// Frames buffered between the body reader and the client loop.
const FRAME_BUFFER: usize = 64;

/// Opens event streams against an HTTP server.
#[derive(Debug, Clone)]
pub struct SseConnector {
    http: reqwest::Client,
    config: HttpConfig,
}

impl SseConnector {
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let http = config.build_client()?;
        Ok(Self { http, config })
    }

    /// Share an existing `reqwest` client.
    pub fn with_client(http: reqwest::Client, config: HttpConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl StreamConnector for SseConnector {
    async fn connect(&self, session_id: &str) -> Result<Box<dyn EventTransport>> {
        let url = self.config.events_url(session_id);
        tracing::debug!(url = %url, "opening event stream");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("failed to open event stream: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        tracing::info!(url = %url, "event stream established");
        Ok(Box::new(SseTransport::from_response(response)))
    }
}

/// An [`EventTransport`] reading one `text/event-stream` response body.
///
/// # Cancel Safety
///
/// [`recv`](EventTransport::recv) only awaits an `mpsc::Receiver`, so it is
/// cancel-safe.
#[derive(Debug)]
pub struct SseTransport {
    rx: mpsc::Receiver<Result<String>>,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl SseTransport {
    /// Start reading an already-open streaming response.
    pub fn from_response(response: reqwest::Response) -> Self {
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let reader = tokio::spawn(read_body(response, tx));
        Self {
            rx,
            reader: Some(reader),
            closed: false,
        }
    }
}

/// Decode the body into frames until it ends, fails, or the transport is
/// dropped.
async fn read_body(response: reqwest::Response, tx: mpsc::Sender<Result<String>>) {
    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for data in decoder.feed(&bytes) {
                    if tx.send(Ok(data)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx
                    .send(Err(ClientError::Transport(format!(
                        "event stream read error: {e}"
                    ))))
                    .await;
                return;
            }
        }
    }

    if let Some(data) = decoder.finish() {
        let _ = tx.send(Ok(data)).await;
    }
    tracing::debug!("event stream body ended");
}

#[async_trait]
impl EventTransport for SseTransport {
    async fn recv(&mut self) -> Option<Result<String>> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.rx.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
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
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn sse_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SseTransport>();
        assert_send::<SseConnector>();
    }

    /// Serve one HTTP/1.1 response on a local port, then close.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut tcp, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let mut request = Vec::new();
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = tcp.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "{status_line}\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n"
            );
            tcp.write_all(head.as_bytes()).await.unwrap();
            tcp.write_all(body.as_bytes()).await.unwrap();
            tcp.shutdown().await.unwrap();
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn frames_are_delivered_in_order() {
        let base = serve_once(
            "HTTP/1.1 200 OK",
            ": hello\n\ndata: {\"type\":\"game_started\"}\n\ndata: {\"type\":\"move\"}\n\n",
        )
        .await;
        let connector = SseConnector::new(HttpConfig::new(base).with_resource("games")).unwrap();
        let mut transport = connector.connect("ABC123").await.unwrap();

        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"type":"game_started"}"#
        );
        assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"type":"move"}"#);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let base = serve_once("HTTP/1.1 404 Not Found", "").await;
        let connector = SseConnector::new(HttpConfig::new(base)).unwrap();
        let err = connector.connect("MISSING").await.err().unwrap();
        assert!(matches!(err, ClientError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let connector = SseConnector::new(HttpConfig::new("http://127.0.0.1:1")).unwrap();
        let err = connector.connect("ABC").await.err().unwrap();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let base = serve_once("HTTP/1.1 200 OK", "data: 1\n\n").await;
        let connector = SseConnector::new(HttpConfig::new(base)).unwrap();
        let mut transport = tokio_test::assert_ok!(connector.connect("ABC").await);
        tokio_test::assert_ok!(transport.close().await);
        tokio_test::assert_ok!(transport.close().await);
        assert!(transport.recv().await.is_none());
    }
}
