use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::artifact::Artifact;
use super::state::{Party, SessionState};
use crate::audio::{AudioFormat, CaptureError, CaptureHandle};

/// Result of one countdown step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still recording with this many seconds left
    Counting(u32),
    /// The countdown hit zero and the capture was asked to stop
    Expired,
    /// The session is no longer recording; the tick had no effect
    Ignored,
}

/// One live recording: owns the capture handle and the chunks it produced.
///
/// Created when capture starts and consumed by [`RecordingSession::finish`].
/// Every path out of `Recording` goes through a single state check, so the
/// handle's `stop()` runs at most once.
pub struct RecordingSession {
    mode: Party,
    state: SessionState,
    generation: u64,
    handle: Box<dyn CaptureHandle>,
    format: AudioFormat,
    chunks: Vec<Vec<u8>>,
    countdown_duration: u32,
    countdown_remaining: u32,
    started_at: DateTime<Utc>,
}

impl RecordingSession {
    /// Start `handle` and enter `Recording`
    pub fn begin(
        mode: Party,
        generation: u64,
        countdown_secs: u32,
        mut handle: Box<dyn CaptureHandle>,
    ) -> Result<Self, CaptureError> {
        handle.start()?;

        let countdown = countdown_secs.max(1);
        let format = handle.format();
        info!(
            "Recording session {} started for {} ({}s countdown, {}Hz, {} channels)",
            generation, mode, countdown, format.sample_rate, format.channels
        );

        Ok(Self {
            mode,
            state: SessionState::Recording,
            generation,
            handle,
            format,
            chunks: Vec::new(),
            countdown_duration: countdown,
            countdown_remaining: countdown,
            started_at: Utc::now(),
        })
    }

    pub fn mode(&self) -> Party {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    pub fn countdown_duration(&self) -> u32 {
        self.countdown_duration
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_capture_active(&self) -> bool {
        self.handle.is_active()
    }

    /// Buffer a chunk. Accepted while recording and while a stop is pending,
    /// since capture resources flush their last buffer before reporting stop.
    pub fn push_chunk(&mut self, data: Vec<u8>) -> bool {
        match self.state {
            SessionState::Recording | SessionState::Finalizing => {
                self.chunks.push(data);
                true
            }
            _ => {
                debug!("Dropping chunk in state {:?}", self.state);
                false
            }
        }
    }

    /// Advance the countdown by one step
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_recording() {
            return TickOutcome::Ignored;
        }

        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining > 0 {
            return TickOutcome::Counting(self.countdown_remaining);
        }

        info!("Countdown expired for session {}", self.generation);
        self.request_stop();
        TickOutcome::Expired
    }

    /// Move `Recording → Finalizing` and stop the capture.
    ///
    /// Returns false without touching the handle when the session is not
    /// recording, which is how a late second stop trigger is absorbed.
    pub fn request_stop(&mut self) -> bool {
        if !self.is_recording() {
            debug!(
                "Stop ignored for session {}: already {:?}",
                self.generation, self.state
            );
            return false;
        }

        self.state = SessionState::Finalizing;
        self.handle.stop();
        true
    }

    /// The capture reported that it has stopped. If nobody asked it to, the
    /// device went away; the session finalizes with what it has.
    pub fn capture_ended(&mut self) {
        if self.is_recording() {
            warn!(
                "Capture for session {} ended before a stop was requested",
                self.generation
            );
            self.state = SessionState::Finalizing;
        }
    }

    /// Assemble the artifact and release the capture handle
    pub fn finish(mut self) -> Artifact {
        self.state = SessionState::Stopped;
        let chunks = std::mem::take(&mut self.chunks);
        let artifact = Artifact::assemble(self.mode, self.format, chunks);

        if artifact.is_empty() {
            warn!("Session {} finished without capturing audio", self.generation);
        }

        artifact
    }
}
