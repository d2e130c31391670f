//! Single-voice playback of commentary clips.
//!
//! The [`AudioCoordinator`] owns the one [`AudioOutput`] of a session and
//! guarantees that at most one clip is audible: every [`play`] stops the
//! current clip before starting the next. Clips are never queued, a new one
//! always pre-empts the old. Failures are logged and swallowed so playback
//! can never hold up the message log.
//!
//! [`play`]: AudioCoordinator::play

#[cfg(feature = "audio-rodio")]
pub mod speaker;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// A device that plays one decoded clip at a time.
///
/// Implementations do not need to enforce exclusivity themselves; the
/// coordinator always calls [`stop`](AudioOutput::stop) before
/// [`start`](AudioOutput::start).
pub trait AudioOutput: Send + 'static {
    /// Begin playing an encoded clip (MP3, WAV, ...).
    ///
    /// # Errors
    ///
    /// Returns a playback error if the clip cannot be decoded or the device
    /// refuses to play it.
    fn start(&mut self, clip: &[u8]) -> Result<()>;

    /// Silence the current clip, if any. Must be safe to call when idle.
    fn stop(&mut self);

    /// Whether a clip is still audible.
    fn is_playing(&self) -> bool;
}

/// An output that discards every clip, for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn start(&mut self, _clip: &[u8]) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_playing(&self) -> bool {
        false
    }
}

/// Sole owner of a session's audio output.
pub struct AudioCoordinator {
    output: Box<dyn AudioOutput>,
    /// Count of clips successfully started.
    started: u64,
}

impl AudioCoordinator {
    pub fn new(output: impl AudioOutput) -> Self {
        Self {
            output: Box::new(output),
            started: 0,
        }
    }

    /// A coordinator that never makes a sound.
    pub fn silent() -> Self {
        Self::new(NullOutput)
    }

    /// Play a base64-encoded clip, stopping whatever is playing first.
    ///
    /// Never fails: decode and device errors are logged at `warn`.
    pub fn play(&mut self, encoded: &str) {
        self.output.stop();

        let clip = match STANDARD.decode(encoded.trim()).map_err(ClientError::from) {
            Ok(clip) => clip,
            Err(e) => {
                warn!("discarding commentary audio: {e}");
                return;
            }
        };

        match self.output.start(&clip) {
            Ok(()) => {
                self.started += 1;
                debug!(bytes = clip.len(), "commentary clip started");
            }
            Err(e) => warn!("commentary playback failed: {e}"),
        }
    }

    /// Silence the current clip.
    pub fn stop(&mut self) {
        self.output.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.output.is_playing()
    }

    /// Number of clips that started successfully.
    pub fn clips_started(&self) -> u64 {
        self.started
    }
}

impl Default for AudioCoordinator {
    fn default() -> Self {
        Self::silent()
    }
}

impl std::fmt::Debug for AudioCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCoordinator")
            .field("playing", &self.is_playing())
            .field("started", &self.started)
            .finish()
    }
}

impl Drop for AudioCoordinator {
    fn drop(&mut self) {
        self.output.stop();
    }
}
