pub mod audio;
pub mod config;
pub mod http;
pub mod session;
pub mod settings;

pub use audio::{
    AudioFormat, CaptureConfig, CaptureError, CaptureEvent, CaptureHandle, CaptureProvider,
    CaptureProviderFactory, CaptureSink, CaptureSource, ToneProvider,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    Artifact, ArtifactRef, ArtifactStore, ControllerError, Party, SessionConfig,
    SessionController, SessionEvent, SessionSnapshot, SessionState, StartOutcome, StartRequest,
    StopTrigger,
};
pub use settings::{PartySettings, PartySettingsUpdate, SettingsStore};
