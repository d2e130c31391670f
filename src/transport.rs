//! Transport abstraction for the one-way event stream.
//!
//! The server pushes JSON frames and never reads anything back, so an
//! [`EventTransport`] only receives. Each call to
//! [`recv`](EventTransport::recv) returns the data of one complete frame;
//! framing (`text/event-stream` lines, WebSocket messages, test scripts) is
//! the implementation's concern.
//!
//! Opening a stream needs the session identifier, and re-opening after a
//! failure must reuse the same one, so connection setup goes through a
//! [`StreamConnector`] that the client holds for the lifetime of the
//! session.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use vibechess_client::error::ClientError;
//! use vibechess_client::transport::{EventTransport, StreamConnector};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl EventTransport for MyTransport {
//!     async fn recv(&mut self) -> Option<Result<String, ClientError>> {
//!         // Return None when the server ends the stream cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ClientError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl StreamConnector for MyConnector {
//!     async fn connect(&self, session_id: &str) -> Result<Box<dyn EventTransport>, ClientError> {
//!         Ok(Box::new(MyTransport { /* ... */ }))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ClientError;

/// A receive-only channel of JSON frames from the server.
///
/// # Cancel Safety
///
/// [`recv`](EventTransport::recv) **MUST** be cancel-safe because the client
/// loop races it against its shutdown signal in `tokio::select!`.
/// Channel-backed implementations (wrapping `mpsc::Receiver`) are naturally
/// cancel-safe.
#[async_trait]
pub trait EventTransport: Send + 'static {
    /// Receive the next frame's data.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: the stream failed
    /// - `None`: the server ended the stream cleanly
    async fn recv(&mut self) -> Option<Result<String, ClientError>>;

    /// Close the stream. Must be safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails. Implementations should still
    /// release resources in that case.
    async fn close(&mut self) -> Result<(), ClientError>;
}

/// Opens event streams for a session.
#[async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    /// Open the stream for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the stream cannot be opened.
    async fn connect(&self, session_id: &str) -> Result<Box<dyn EventTransport>, ClientError>;
}
