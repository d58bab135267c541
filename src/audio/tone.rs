// Synthetic capture source: a sine tone streamed in fixed-size chunks
//
// Behaves like a real input device from the session's point of view: chunks
// arrive on a timer while the handle is active, a final buffer is flushed
// after `stop()`, and `on_stop` fires once the generator has wound down.

use std::f32::consts::TAU;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

use super::backend::{AudioFormat, CaptureConfig, CaptureError, CaptureHandle, CaptureProvider, CaptureSink};

const AMPLITUDE: f32 = 0.3 * i16::MAX as f32;

/// Tone generator provider
pub struct ToneProvider {
    config: CaptureConfig,
    available: bool,
}

impl ToneProvider {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            available: true,
        }
    }

    /// A provider whose acquisition always fails, as if permission were denied
    pub fn unavailable(config: CaptureConfig) -> Self {
        Self {
            config,
            available: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureProvider for ToneProvider {
    async fn acquire(&self, sink: CaptureSink) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        if !self.available {
            return Err(CaptureError::Unavailable(
                "tone source is disabled".to_string(),
            ));
        }

        if self.config.sample_rate == 0 || self.config.channels == 0 {
            return Err(CaptureError::Unavailable(format!(
                "unsupported tone format ({}Hz, {} channels)",
                self.config.sample_rate, self.config.channels
            )));
        }

        debug!(
            "Tone source acquired: {}Hz tone at {}Hz, {} channels",
            self.config.tone_frequency_hz, self.config.sample_rate, self.config.channels
        );

        Ok(Box::new(ToneHandle::new(self.config.clone(), sink)))
    }

    fn name(&self) -> &str {
        "tone"
    }
}

/// Handle over one running tone generator
pub struct ToneHandle {
    config: CaptureConfig,
    sink: CaptureSink,
    started: bool,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ToneHandle {
    fn new(config: CaptureConfig, sink: CaptureSink) -> Self {
        Self {
            config,
            sink,
            started: false,
            stop_tx: None,
            task: None,
        }
    }
}

impl CaptureHandle for ToneHandle {
    fn start(&mut self) -> Result<(), CaptureError> {
        assert!(!self.started, "capture handle started twice");
        self.started = true;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let mut generator = ToneGenerator::new(&self.config);
        let sink = self.sink.clone();
        let period = Duration::from_millis(self.config.chunk_duration_ms.max(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => sink.on_chunk(generator.next_chunk()),
                    // Fires on an explicit stop and when the handle is dropped
                    _ = &mut stop_rx => {
                        sink.on_chunk(generator.next_chunk());
                        break;
                    }
                }
            }

            sink.on_stop();
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);

        info!("Tone capture started");
        Ok(())
    }

    fn stop(&mut self) {
        match self.stop_tx.take() {
            Some(stop_tx) => {
                let _ = stop_tx.send(());
                info!("Tone capture stopping");
            }
            // Never started: nothing to flush, report the stop directly
            None if !self.started => self.sink.on_stop(),
            None => {}
        }
    }

    fn is_active(&self) -> bool {
        self.stop_tx.is_some() && !self.sink.is_stopped()
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::new(self.config.sample_rate, self.config.channels)
    }
}

/// Phase-continuous sine generator producing PCM16 LE bytes
struct ToneGenerator {
    phase: f32,
    step: f32,
    channels: usize,
    frames_per_chunk: usize,
}

impl ToneGenerator {
    fn new(config: &CaptureConfig) -> Self {
        let frames_per_chunk =
            (config.sample_rate as u64 * config.chunk_duration_ms / 1000).max(1) as usize;

        Self {
            phase: 0.0,
            step: TAU * config.tone_frequency_hz / config.sample_rate as f32,
            channels: config.channels as usize,
            frames_per_chunk,
        }
    }

    fn next_chunk(&mut self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            self.frames_per_chunk * self.channels * AudioFormat::BYTES_PER_SAMPLE,
        );

        for _ in 0..self.frames_per_chunk {
            let sample = (self.phase.sin() * AMPLITUDE) as i16;
            for _ in 0..self.channels {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
            self.phase = (self.phase + self.step) % TAU;
        }

        bytes
    }
}
