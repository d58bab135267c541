pub mod backend;
pub mod tone;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{
    AudioFormat, CaptureConfig, CaptureError, CaptureEvent, CaptureHandle, CaptureProvider,
    CaptureProviderFactory, CaptureSink, CaptureSource,
};
pub use tone::ToneProvider;
