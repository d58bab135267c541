use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Layout of the bytes a capture handle delivers: 16-bit signed PCM,
/// little-endian, interleaved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl AudioFormat {
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// MIME type for raw linear PCM (RFC 3551 `L16`)
    pub fn mime_type(&self) -> String {
        format!(
            "audio/L16; rate={}; channels={}",
            self.sample_rate, self.channels
        )
    }

    /// Bytes needed for one second of audio
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * Self::BYTES_PER_SAMPLE
    }
}

/// Failure to obtain or drive a capture resource
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Capture is unsupported on this host or permission was denied
    #[error("audio capture unavailable: {0}")]
    Unavailable(String),

    /// The device was found but refused to run
    #[error("capture device error: {0}")]
    Device(String),
}

/// Notification delivered from a capture handle to its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A buffer of captured audio
    Chunk { generation: u64, data: Vec<u8> },
    /// The resource has finished stopping; no further chunks follow
    Stopped { generation: u64 },
}

impl CaptureEvent {
    pub fn generation(&self) -> u64 {
        match self {
            CaptureEvent::Chunk { generation, .. } | CaptureEvent::Stopped { generation } => {
                *generation
            }
        }
    }
}

/// The `on_chunk` / `on_stop` pair handed to a provider on acquisition.
///
/// Callable from any thread, including realtime audio callbacks. `on_stop`
/// is delivered at most once; chunks arriving after it are dropped.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    generation: u64,
    tx: mpsc::UnboundedSender<CaptureEvent>,
    stopped: Arc<AtomicBool>,
}

impl CaptureSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<CaptureEvent>) -> Self {
        Self {
            generation,
            tx,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Session generation this sink reports to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver a buffer of captured audio
    pub fn on_chunk(&self, data: Vec<u8>) {
        if data.is_empty() || self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let event = CaptureEvent::Chunk {
            generation: self.generation,
            data,
        };
        if self.tx.send(event).is_err() {
            debug!("Capture chunk dropped: session controller is gone");
        }
    }

    /// Report that the resource has finished stopping
    pub fn on_stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let event = CaptureEvent::Stopped {
            generation: self.generation,
        };
        if self.tx.send(event).is_err() {
            debug!("Capture stop dropped: session controller is gone");
        }
    }

    /// Whether `on_stop` has already fired
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A controllable recording handle returned by a provider.
///
/// `start` may be called at most once per handle; a second call is a
/// contract violation and panics. `stop` releases the underlying resource
/// and eventually results in exactly one `on_stop` on the sink.
pub trait CaptureHandle: Send {
    /// Begin delivering chunks
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop capturing and release the resource
    fn stop(&mut self);

    /// Whether the handle is currently delivering audio
    fn is_active(&self) -> bool;

    /// Format of the chunks this handle delivers
    fn format(&self) -> AudioFormat;
}

/// Capture resource provider trait
///
/// Implementations:
/// - Tone: synthetic sine wave (demos and testing)
/// - Microphone: cpal default or named input device (`microphone` feature)
#[async_trait::async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Acquire the capture resource, wiring its output into `sink`.
    ///
    /// May wait on a permission prompt or device handshake.
    async fn acquire(&self, sink: CaptureSink) -> Result<Box<dyn CaptureHandle>, CaptureError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Which capture resource backs the sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    /// Synthetic tone generator
    #[default]
    Tone,
    /// Microphone input
    Microphone,
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureSource::Tone => write!(f, "tone"),
            CaptureSource::Microphone => write!(f, "microphone"),
        }
    }
}

impl FromStr for CaptureSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tone" => Ok(CaptureSource::Tone),
            "microphone" | "mic" => Ok(CaptureSource::Microphone),
            other => anyhow::bail!("Unknown capture source '{}' (expected tone or microphone)", other),
        }
    }
}

/// Configuration for capture providers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture resource to use
    pub source: CaptureSource,
    /// Input device name, or "default" for the system default
    pub device: String,
    /// Sample rate for synthetic capture (microphones use their native rate)
    pub sample_rate: u32,
    /// Channel count for synthetic capture (microphones are mixed to mono)
    pub channels: u16,
    /// How much audio each chunk carries, in milliseconds
    pub chunk_duration_ms: u64,
    /// Pitch of the synthetic tone
    pub tone_frequency_hz: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: CaptureSource::Tone,
            device: "default".to_string(),
            sample_rate: 16000,
            channels: 1,
            chunk_duration_ms: 250,
            tone_frequency_hz: 440.0,
        }
    }
}

/// Capture provider factory
pub struct CaptureProviderFactory;

impl CaptureProviderFactory {
    /// Create a capture provider for the configured source
    pub fn create(config: &CaptureConfig) -> Result<Box<dyn CaptureProvider>> {
        match config.source {
            CaptureSource::Tone => Ok(Box::new(super::tone::ToneProvider::new(config.clone()))),

            CaptureSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    use super::microphone::MicrophoneProvider;
                    Ok(Box::new(MicrophoneProvider::new(config.device.clone())))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    anyhow::bail!("Microphone capture requires building with the `microphone` feature")
                }
            }
        }
    }
}
