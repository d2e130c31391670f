//! Speaker output using `rodio`.
//!
//! `rodio::OutputStream` must stay on the thread that created it, so
//! [`RodioOutput`] parks the stream on a dedicated thread and keeps only the
//! `Send` handle and the current `Sink`. Dropping the output releases the
//! thread and the device.
//!
//! # Feature gate
//!
//! This module is only available when the `audio-rodio` feature is enabled.

use std::io::Cursor;
use std::sync::mpsc as std_mpsc;
use std::thread;

use ::rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, info};

use super::AudioOutput;
use crate::error::{ClientError, Result};

/// Default-device [`AudioOutput`].
pub struct RodioOutput {
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    /// Dropping this sender lets the device thread exit.
    _keepalive: std_mpsc::Sender<()>,
}

impl RodioOutput {
    /// Open the default output device.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Playback`] if no output device is available.
    pub fn new() -> Result<Self> {
        let (handle_tx, handle_rx) = std_mpsc::channel();
        let (keepalive_tx, keepalive_rx) = std_mpsc::channel::<()>();

        thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                let opened = OutputStream::try_default()
                    .map_err(|e| ClientError::Playback(format!("failed to get output device: {e}")));
                match opened {
                    Ok((stream, handle)) => {
                        if handle_tx.send(Ok(handle)).is_err() {
                            return;
                        }
                        // Blocks until the owning RodioOutput is dropped.
                        let _ = keepalive_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = handle_tx.send(Err(e));
                    }
                }
            })?;

        let handle = handle_rx
            .recv()
            .map_err(|_| ClientError::Playback("audio thread exited during setup".into()))??;

        info!("audio output initialized");
        Ok(Self {
            handle,
            sink: None,
            _keepalive: keepalive_tx,
        })
    }
}

impl AudioOutput for RodioOutput {
    fn start(&mut self, clip: &[u8]) -> Result<()> {
        let source = Decoder::new(Cursor::new(clip.to_vec()))
            .map_err(|e| ClientError::Playback(format!("failed to decode audio: {e}")))?;
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| ClientError::Playback(format!("failed to create sink: {e}")))?;
        sink.append(source);
        self.sink = Some(sink);
        debug!("audio playback started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
            debug!("audio playback stopped");
        }
    }

    fn is_playing(&self) -> bool {
        self.sink.as_ref().is_some_and(|sink| !sink.empty())
    }
}

impl std::fmt::Debug for RodioOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioOutput")
            .field("playing", &self.is_playing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rodio_output_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<RodioOutput>();
    }

    // Note: requires audio hardware and may not work in CI
    #[test]
    #[ignore = "Requires audio hardware"]
    fn rodio_output_creation() {
        assert!(RodioOutput::new().is_ok());
    }
}
