use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::{broadcast, watch};

use super::artifact::ArtifactRef;

const EVENT_CAPACITY: usize = 64;

/// Which side of the conversation a recording belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    #[default]
    Person1,
    Person2,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Person1 => write!(f, "person1"),
            Party::Person2 => write!(f, "person2"),
        }
    }
}

impl FromStr for Party {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "person1" => Ok(Party::Person1),
            "person2" => Ok(Party::Person2),
            other => anyhow::bail!("Unknown party '{}' (expected person1 or person2)", other),
        }
    }
}

/// Lifecycle state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Finalizing,
    Stopped,
}

/// What ended a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopTrigger {
    /// The UI asked to stop
    Manual,
    /// The countdown ran out
    Countdown,
    /// The controller is shutting down
    Shutdown,
}

/// Everything a UI needs to render the recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub mode: Party,
    pub state: SessionState,
    pub is_recording: bool,
    pub has_started_recording: bool,
    pub countdown_remaining: u32,
    pub countdown_duration: u32,
    /// Latest finished recording; cleared when a new one starts
    pub artifact_ref: Option<ArtifactRef>,
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn idle(mode: Party, countdown_secs: u32) -> Self {
        Self {
            mode,
            state: SessionState::Idle,
            is_recording: false,
            has_started_recording: false,
            countdown_remaining: countdown_secs,
            countdown_duration: countdown_secs,
            artifact_ref: None,
            started_at: None,
        }
    }
}

/// Transition notifications, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started { mode: Party, countdown_secs: u32 },
    Tick { remaining: u32 },
    StopRequested { trigger: StopTrigger, remaining: u32 },
    Stopped { artifact: ArtifactRef },
    Reset,
    StartFailed { reason: String },
}

/// Publisher side of the observable session state.
///
/// Snapshots go through a watch channel (latest value wins); events go
/// through a broadcast channel so short-lived states like `Stopped` are
/// still seen by subscribers.
pub struct ObservableState {
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl ObservableState {
    pub fn new(initial: SessionSnapshot) -> Self {
        let (snapshot, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { snapshot, events }
    }

    pub fn current(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn update(&self, modify: impl FnOnce(&mut SessionSnapshot)) {
        self.snapshot.send_modify(modify);
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
