use futures::future::OptionFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, error, info, warn};

use super::artifact::{ArtifactRef, ArtifactStore};
use super::config::SessionConfig;
use super::session::{RecordingSession, TickOutcome};
use super::state::{
    ObservableState, Party, SessionEvent, SessionSnapshot, SessionState, StopTrigger,
};
use crate::audio::{CaptureError, CaptureEvent, CaptureProvider, CaptureSink};

const COMMAND_CAPACITY: usize = 32;

/// Parameters for one start request
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    /// Party to record for; defaults to the controller's current mode
    pub mode: Option<Party>,
    /// Countdown override in seconds
    pub countdown_secs: Option<u32>,
}

/// What a start request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session is recording
    Started,
    /// A session is already recording or finalizing; nothing changed
    AlreadyActive,
    /// The capture resource could not be acquired; nothing changed
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("session controller has shut down")]
    Closed,
}

enum Command {
    Start {
        request: StartRequest,
        reply: oneshot::Sender<StartOutcome>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    SetMode {
        mode: Party,
    },
    Shutdown,
}

/// Handle to the session controller task.
///
/// The task owns the single recording session and applies start/stop
/// requests, capture notifications and countdown ticks one at a time.
#[derive(Clone)]
pub struct SessionController {
    commands: mpsc::Sender<Command>,
    observable: Arc<ObservableState>,
    store: Arc<ArtifactStore>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionController {
    /// Spawn a controller with its own artifact store
    pub fn spawn(config: SessionConfig, provider: Box<dyn CaptureProvider>) -> Self {
        Self::with_store(config, provider, Arc::new(ArtifactStore::new()))
    }

    /// Spawn a controller that registers artifacts in `store`
    pub fn with_store(
        config: SessionConfig,
        provider: Box<dyn CaptureProvider>,
        store: Arc<ArtifactStore>,
    ) -> Self {
        let observable = Arc::new(ObservableState::new(SessionSnapshot::idle(
            config.default_mode,
            config.countdown_secs.max(1),
        )));

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();

        info!(
            "Session controller using {} capture ({}s countdown)",
            provider.name(),
            config.countdown_secs
        );

        let actor = SessionActor {
            mode: config.default_mode,
            config,
            provider,
            observable: Arc::clone(&observable),
            store: Arc::clone(&store),
            session: None,
            ticker: None,
            next_generation: 1,
            capture_tx,
        };
        let task = tokio::spawn(actor.run(command_rx, capture_rx));

        Self {
            commands: command_tx,
            observable,
            store,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Start a recording. Returns once capture is running or has failed.
    pub async fn start(&self, request: StartRequest) -> Result<StartOutcome, ControllerError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Start { request, reply }).await?;
        response.await.map_err(|_| ControllerError::Closed)
    }

    /// Stop the current recording. Returns whether this call performed the
    /// stop; false when nothing was recording.
    pub async fn stop(&self) -> Result<bool, ControllerError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Stop { reply }).await?;
        response.await.map_err(|_| ControllerError::Closed)
    }

    /// Switch the party subsequent recordings are routed to
    pub async fn set_mode(&self, mode: Party) -> Result<(), ControllerError> {
        self.send(Command::SetMode { mode }).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.observable.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.observable.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.observable.events()
    }

    pub fn artifacts(&self) -> Arc<ArtifactStore> {
        Arc::clone(&self.store)
    }

    /// Stop any active capture and wait for the controller task to exit
    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        let task = self.task.lock().await.take();
        let Some(task) = task else {
            return Ok(());
        };

        // The task may already be gone if every other handle was dropped
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = task.await {
            error!("Session controller task panicked: {}", e);
        }
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<(), ControllerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ControllerError::Closed)
    }
}

struct SessionActor {
    config: SessionConfig,
    provider: Box<dyn CaptureProvider>,
    observable: Arc<ObservableState>,
    store: Arc<ArtifactStore>,
    mode: Party,
    session: Option<RecordingSession>,
    ticker: Option<Interval>,
    next_generation: u64,
    capture_tx: mpsc::UnboundedSender<CaptureEvent>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
    ) {
        debug!("Session controller task started");

        loop {
            tokio::select! {
                biased;

                Some(event) = capture_rx.recv() => self.on_capture_event(event),

                command = commands.recv() => match command {
                    Some(Command::Start { request, reply }) => {
                        let outcome = self.start(request).await;
                        let _ = reply.send(outcome);
                    }
                    Some(Command::Stop { reply }) => {
                        let stopped = self.stop(StopTrigger::Manual);
                        let _ = reply.send(stopped);
                    }
                    Some(Command::SetMode { mode }) => self.set_mode(mode),
                    Some(Command::Shutdown) | None => break,
                },

                Some(_) = OptionFuture::from(self.ticker.as_mut().map(|t| t.tick())) => self.on_tick(),
            }
        }

        self.shutdown();
        debug!("Session controller task stopped");
    }

    async fn start(&mut self, request: StartRequest) -> StartOutcome {
        if let Some(session) = &self.session {
            debug!(
                "Start ignored: session {} is {:?}",
                session.generation(),
                session.state()
            );
            return StartOutcome::AlreadyActive;
        }

        let mode = request.mode.unwrap_or(self.mode);
        let countdown = request
            .countdown_secs
            .unwrap_or(self.config.countdown_secs)
            .max(1);
        let generation = self.next_generation;
        self.next_generation += 1;

        let sink = CaptureSink::new(generation, self.capture_tx.clone());
        let session = match self.provider.acquire(sink).await {
            Ok(handle) => RecordingSession::begin(mode, generation, countdown, handle),
            Err(e) => Err(e),
        };

        let session = match session {
            Ok(session) => session,
            Err(e) => return self.start_failed(e),
        };

        self.mode = mode;
        self.ticker = Some(countdown_ticker(self.config.tick_interval()));

        let started_at = session.started_at();
        self.observable.update(|s| {
            s.mode = mode;
            s.state = SessionState::Recording;
            s.is_recording = true;
            s.has_started_recording = true;
            s.countdown_remaining = countdown;
            s.countdown_duration = countdown;
            s.artifact_ref = None;
            s.started_at = Some(started_at);
        });
        self.observable.emit(SessionEvent::Started {
            mode,
            countdown_secs: countdown,
        });

        self.session = Some(session);
        StartOutcome::Started
    }

    fn start_failed(&self, error: CaptureError) -> StartOutcome {
        warn!("Recording not started: {}", error);
        let reason = error.to_string();
        self.observable.emit(SessionEvent::StartFailed {
            reason: reason.clone(),
        });
        StartOutcome::Unavailable(reason)
    }

    fn stop(&mut self, trigger: StopTrigger) -> bool {
        let Some(session) = self.session.as_mut() else {
            debug!("Stop ignored: no active session");
            return false;
        };

        if !session.request_stop() {
            return false;
        }

        self.ticker = None;
        let remaining = session.countdown_remaining();
        info!(
            "Stopping session {} ({:?}, {}s left)",
            session.generation(),
            trigger,
            remaining
        );

        self.observable.update(|s| s.state = SessionState::Finalizing);
        self.observable
            .emit(SessionEvent::StopRequested { trigger, remaining });
        true
    }

    fn on_tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.ticker = None;
            return;
        };

        match session.tick() {
            TickOutcome::Counting(remaining) => {
                self.observable.update(|s| s.countdown_remaining = remaining);
                self.observable.emit(SessionEvent::Tick { remaining });
            }
            TickOutcome::Expired => {
                self.ticker = None;
                self.observable.update(|s| {
                    s.countdown_remaining = 0;
                    s.state = SessionState::Finalizing;
                });
                self.observable.emit(SessionEvent::Tick { remaining: 0 });
                self.observable.emit(SessionEvent::StopRequested {
                    trigger: StopTrigger::Countdown,
                    remaining: 0,
                });
            }
            TickOutcome::Ignored => self.ticker = None,
        }
    }

    fn on_capture_event(&mut self, event: CaptureEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!(
                "Capture event for session {} arrived with no active session",
                event.generation()
            );
            return;
        };

        if event.generation() != session.generation() {
            debug!(
                "Discarding capture event from stale session {}",
                event.generation()
            );
            return;
        }

        match event {
            CaptureEvent::Chunk { data, .. } => {
                session.push_chunk(data);
            }
            CaptureEvent::Stopped { .. } => {
                session.capture_ended();
                self.ticker = None;
                self.finalize();
            }
        }
    }

    fn finalize(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let generation = session.generation();
        let artifact = session.finish();
        info!(
            "Session {} finalized: {} chunks, {:.1}s of {}",
            generation,
            artifact.chunk_count,
            artifact.duration_secs(),
            artifact.mime_type()
        );
        let artifact_ref: ArtifactRef = self.store.register(artifact);

        self.observable.update(|s| {
            s.state = SessionState::Stopped;
            s.is_recording = false;
            s.has_started_recording = false;
            s.artifact_ref = Some(artifact_ref.clone());
        });
        self.observable.emit(SessionEvent::Stopped {
            artifact: artifact_ref,
        });

        self.observable.update(|s| {
            s.state = SessionState::Idle;
            s.started_at = None;
        });
        self.observable.emit(SessionEvent::Reset);
    }

    fn set_mode(&mut self, mode: Party) {
        debug!("Mode set to {}", mode);
        self.mode = mode;
        self.observable.update(|s| s.mode = mode);
    }

    fn shutdown(&mut self) {
        self.stop(StopTrigger::Shutdown);
        self.ticker = None;

        // Nobody is left to wait for the stop notification; dropping the
        // session releases the capture handle.
        if let Some(session) = self.session.take() {
            info!("Discarding unfinished session {}", session.generation());
            self.observable.update(|s| {
                s.state = SessionState::Idle;
                s.is_recording = false;
                s.has_started_recording = false;
                s.started_at = None;
            });
            self.observable.emit(SessionEvent::Reset);
        }
    }
}

fn countdown_ticker(period: Duration) -> Interval {
    // The first step lands one full period after the start
    interval_at(Instant::now() + period, period)
}
