//! Transport implementations for the event stream.
//!
//! This module provides concrete [`StreamConnector`](crate::StreamConnector)
//! implementations behind feature gates. Enable the corresponding Cargo
//! feature to pull in a transport:
//!
//! | Feature | Transport                            |
//! |---------|--------------------------------------|
//! | `http`  | [`SseConnector`] / [`SseTransport`]  |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), vibechess_client::ClientError> {
//! use vibechess_client::http::HttpConfig;
//! use vibechess_client::{SseConnector, StreamConnector};
//!
//! let connector = SseConnector::new(HttpConfig::new("http://localhost:8000"))?;
//! let mut stream = connector.connect("K7Q2ZD").await?;
//!
//! if let Some(Ok(frame)) = stream.recv().await {
//!     println!("server said: {frame}");
//! }
//!
//! stream.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "http")]
pub mod sse;

#[cfg(feature = "http")]
pub use sse::{SseConnector, SseTransport};
