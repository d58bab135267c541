//! Recording session management
//!
//! This module provides the timed capture session behind the recorder UI:
//! - `RecordingSession`: one live capture, its chunks and its countdown
//! - `SessionController`: task that serializes start/stop requests,
//!   capture notifications and countdown ticks
//! - Observable state (snapshots and transition events) for UI layers
//! - Artifacts and the store that hands out references to them

mod artifact;
mod config;
mod controller;
mod session;
mod state;

pub use artifact::{Artifact, ArtifactRef, ArtifactStore};
pub use config::{SessionConfig, DEFAULT_COUNTDOWN_SECS};
pub use controller::{ControllerError, SessionController, StartOutcome, StartRequest};
pub use session::{RecordingSession, TickOutcome};
pub use state::{ObservableState, Party, SessionEvent, SessionSnapshot, SessionState, StopTrigger};
