//! The session orchestrator: owner of the recording state machine.
//!
//! One controller thread multiplexes consumer requests, audio events,
//! and backend events with `select!`, so every state transition happens
//! on a single thread and needs no locking. Each capture period gets a
//! fresh audio channel; events from an earlier period land in a dropped
//! receiver and cannot leak into the next session.
//!
//! Ordering contracts enforced here:
//! - the backend session is started, and acknowledged, before capture
//!   begins, so no audio is produced with nowhere to go;
//! - on stop, the capture flush is drained into the backend before
//!   `flush_and_stop`, so the backend sees every captured chunk before
//!   it produces the final transcript.

use crate::audio::source::{AudioEvent, AudioSource};
use crate::backend::{BackendEvent, TranscriptionBackend};
use crate::defaults;
use crate::error::{Result, VoxdError};
use crate::session::events::{ErrorKind, SessionEvent};
use crate::session::{
    CaptureSource, Session, SessionConfig, SessionId, SessionMode, SessionState,
};
use crossbeam_channel::{Receiver, Sender, bounded, never, select, unbounded};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Tunables for the controller loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bounded wait for the backend start acknowledgement, and again
    /// for the capture device to come up.
    pub start_ack_timeout: Duration,
    /// Bounded wait for the final transcript after flush.
    pub recovery_window: Duration,
    /// Level below which a chunk counts as silence.
    pub silence_threshold: f32,
    /// Trailing silence before auto-stop fires.
    pub silence_duration: Duration,
    /// 0 = errors only, 1 = session progress, 2 = dropped stale results.
    pub verbosity: u8,
    pub quiet: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            start_ack_timeout: defaults::START_ACK_TIMEOUT,
            recovery_window: defaults::RECOVERY_WINDOW,
            silence_threshold: defaults::SILENCE_THRESHOLD,
            silence_duration: defaults::SILENCE_DURATION,
            verbosity: 0,
            quiet: false,
        }
    }
}

/// Parameters of a start request.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub source: CaptureSource,
    pub mode: SessionMode,
    pub silence_auto_stop: bool,
    pub config: SessionConfig,
}

impl StartRequest {
    pub fn microphone() -> Self {
        Self {
            source: CaptureSource::Microphone,
            mode: SessionMode::VoiceInput,
            silence_auto_stop: false,
            config: SessionConfig::default(),
        }
    }

    pub fn system_audio() -> Self {
        Self {
            source: CaptureSource::SystemAudio,
            mode: SessionMode::Subtitle,
            silence_auto_stop: false,
            config: SessionConfig::default(),
        }
    }

    pub fn with_silence_auto_stop(mut self) -> Self {
        self.silence_auto_stop = true;
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

/// Snapshot answered to a status request.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    pub source: Option<CaptureSource>,
    pub backend_ready: bool,
}

enum Request {
    Start(StartRequest, Sender<Result<SessionId>>),
    Stop(Sender<Result<()>>),
    Cancel(Sender<Result<()>>),
    Status(Sender<StatusReport>),
    Shutdown,
}

/// Owning handle to a running orchestrator.
///
/// Requests are forwarded to the controller thread; start preconditions
/// are answered synchronously through a reply channel, everything else
/// about a session arrives on the event receiver.
pub struct OrchestratorHandle {
    requests: Sender<Request>,
    thread: Option<JoinHandle<()>>,
}

impl OrchestratorHandle {
    /// Begin a new session.
    ///
    /// # Errors
    /// `SourceBusy` if a session is already active, `BackendNotReady`
    /// if the backend cannot accept one, or a device error if the
    /// source cannot be prepared. On `Ok` the returned id identifies
    /// every event of the new session.
    pub fn request_start(&self, request: StartRequest) -> Result<SessionId> {
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(Request::Start(request, reply_tx))
            .map_err(|_| VoxdError::OrchestratorGone)?;
        reply_rx.recv().map_err(|_| VoxdError::OrchestratorGone)?
    }

    /// Stop the active session and produce a final transcript.
    /// Returns once the stop is underway; the final text arrives as a
    /// `FinalText` event.
    pub fn request_stop(&self) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(Request::Stop(reply_tx))
            .map_err(|_| VoxdError::OrchestratorGone)?;
        reply_rx.recv().map_err(|_| VoxdError::OrchestratorGone)?
    }

    /// Abandon the active session without a final transcript.
    pub fn cancel(&self) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(Request::Cancel(reply_tx))
            .map_err(|_| VoxdError::OrchestratorGone)?;
        reply_rx.recv().map_err(|_| VoxdError::OrchestratorGone)?
    }

    pub fn status(&self) -> Result<StatusReport> {
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(Request::Status(reply_tx))
            .map_err(|_| VoxdError::OrchestratorGone)?;
        reply_rx.recv().map_err(|_| VoxdError::OrchestratorGone)
    }

    /// Stop the controller thread, abandoning any active session.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for OrchestratorHandle {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

/// Builder for the controller thread.
pub struct Orchestrator {
    microphone: Box<dyn AudioSource>,
    system_audio: Box<dyn AudioSource>,
    backend: Box<dyn TranscriptionBackend>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        microphone: Box<dyn AudioSource>,
        system_audio: Box<dyn AudioSource>,
        backend: Box<dyn TranscriptionBackend>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            microphone,
            system_audio,
            backend,
            config,
        }
    }

    /// Spawn the controller thread. The receiver carries every
    /// [`SessionEvent`] the orchestrator publishes.
    pub fn spawn(mut self) -> (OrchestratorHandle, Receiver<SessionEvent>) {
        let (request_tx, request_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (backend_tx, backend_rx) = unbounded();
        self.backend.set_event_sender(backend_tx);

        let thread = std::thread::spawn(move || {
            let mut controller = Controller {
                microphone: self.microphone,
                system_audio: self.system_audio,
                backend: self.backend,
                config: self.config,
                requests: request_rx,
                backend_rx,
                events: event_tx,
                audio_rx: None,
                session: None,
                phase: StartPhase::None,
                deadline: None,
                next_id: 0,
            };
            controller.run();
        });

        (
            OrchestratorHandle {
                requests: request_tx,
                thread: Some(thread),
            },
            event_rx,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StartPhase {
    None,
    /// Waiting for the backend's `SessionStarted`.
    AwaitBackendAck,
    /// Waiting for the source's `CaptureStarted`.
    AwaitCaptureStart,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Deadline {
    BackendAck,
    CaptureStart,
    Recovery,
}

struct Controller {
    microphone: Box<dyn AudioSource>,
    system_audio: Box<dyn AudioSource>,
    backend: Box<dyn TranscriptionBackend>,
    config: OrchestratorConfig,
    requests: Receiver<Request>,
    backend_rx: Receiver<BackendEvent>,
    events: Sender<SessionEvent>,
    /// Fresh per capture period; `None` whenever no capture is running.
    audio_rx: Option<Receiver<AudioEvent>>,
    session: Option<Session>,
    phase: StartPhase,
    deadline: Option<(Instant, Deadline)>,
    next_id: SessionId,
}

/// Safeguard when draining a capture flush; real sources have already
/// queued everything by the time stop_capture returns.
const FLUSH_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

const IDLE_TICK: Duration = Duration::from_secs(3600);

impl Controller {
    fn run(&mut self) {
        loop {
            let audio = self
                .audio_rx
                .clone()
                .unwrap_or_else(never::<AudioEvent>);
            let timeout = match self.deadline {
                Some((at, _)) => at.saturating_duration_since(Instant::now()),
                None => IDLE_TICK,
            };

            select! {
                recv(self.requests) -> request => match request {
                    Ok(Request::Start(start, reply)) => {
                        let outcome = self.handle_start(start);
                        let _ = reply.send(outcome);
                    }
                    Ok(Request::Stop(reply)) => {
                        let outcome = self.handle_stop();
                        let _ = reply.send(outcome);
                    }
                    Ok(Request::Cancel(reply)) => {
                        let outcome = self.handle_cancel();
                        let _ = reply.send(outcome);
                    }
                    Ok(Request::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Ok(Request::Shutdown) | Err(_) => {
                        if self.session.is_some() {
                            let _ = self.handle_cancel();
                        }
                        return;
                    }
                },
                recv(audio) -> event => {
                    if let Ok(event) = event {
                        self.handle_audio(event);
                    } else {
                        // Capture worker went away without a flush.
                        self.audio_rx = None;
                    }
                },
                recv(self.backend_rx) -> event => match event {
                    Ok(event) => self.handle_backend(event),
                    Err(_) => {
                        if self.session.is_some() {
                            self.abandon(ErrorKind::Transport, "backend event channel closed");
                        }
                    }
                },
                default(timeout) => self.handle_deadline(),
            }
        }
    }

    fn status(&self) -> StatusReport {
        StatusReport {
            state: self
                .session
                .as_ref()
                .map_or(SessionState::Idle, |s| s.state),
            session_id: self.session.as_ref().map(|s| s.id),
            source: self.session.as_ref().map(|s| s.source),
            backend_ready: self.backend.is_ready(),
        }
    }

    fn source_for(&mut self, source: CaptureSource) -> &mut Box<dyn AudioSource> {
        match source {
            CaptureSource::Microphone => &mut self.microphone,
            CaptureSource::SystemAudio => &mut self.system_audio,
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: SessionState) {
        if let Some(session) = &mut self.session {
            session.state = state;
            if state.is_terminal() {
                session.started_at = None;
            }
        }
        self.emit(SessionEvent::StateChanged { state });
    }

    fn log(&self, level: u8, message: &str) {
        if !self.config.quiet && self.config.verbosity >= level {
            eprintln!("voxd: {}", message);
        }
    }

    // Start path

    fn handle_start(&mut self, request: StartRequest) -> Result<SessionId> {
        if let Some(session) = &self.session {
            let active = session.source;
            self.emit(SessionEvent::Error {
                kind: ErrorKind::Precondition,
                message: format!("a {} session is already active", active),
            });
            return Err(VoxdError::SourceBusy { active });
        }
        if !self.backend.is_ready() {
            self.emit(SessionEvent::Error {
                kind: ErrorKind::Precondition,
                message: "transcription backend is not ready".to_string(),
            });
            return Err(VoxdError::BackendNotReady);
        }

        self.source_for(request.source).prepare()?;

        self.next_id += 1;
        let session = Session::new(
            self.next_id,
            request.source,
            request.mode,
            request.silence_auto_stop,
            request.config,
        );
        let id = session.id;
        let config = session.config.clone();
        self.session = Some(session);
        self.set_state(SessionState::Starting);
        self.log(1, &format!("session {} starting ({})", id, request.source));

        if let Err(e) = self.backend.start_session(&config) {
            self.abandon(ErrorKind::Transport, &e.to_string());
            return Err(e);
        }
        self.phase = StartPhase::AwaitBackendAck;
        self.deadline = Some((
            Instant::now() + self.config.start_ack_timeout,
            Deadline::BackendAck,
        ));
        Ok(id)
    }

    /// Backend acknowledged; now bring the capture device up.
    fn begin_capture(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let source_kind = session.source;
        let silence_auto_stop = session.silence_auto_stop;
        let threshold = self.config.silence_threshold;
        let duration = self.config.silence_duration;

        let (audio_tx, audio_rx) = unbounded();
        self.audio_rx = Some(audio_rx);
        let source = self.source_for(source_kind);
        source.start_capture(audio_tx);
        if silence_auto_stop {
            source.enable_silence_detection(threshold, duration);
        }

        self.phase = StartPhase::AwaitCaptureStart;
        self.deadline = Some((
            Instant::now() + self.config.start_ack_timeout,
            Deadline::CaptureStart,
        ));
    }

    // Stop path

    fn handle_stop(&mut self) -> Result<()> {
        let Some(session) = &self.session else {
            return Err(VoxdError::NotRecording);
        };
        match session.state {
            SessionState::Capturing => {
                self.stop_capturing();
                Ok(())
            }
            // A stop before capture is up abandons the start.
            SessionState::Starting => {
                self.abandon(ErrorKind::Device, "stopped before capture started");
                Ok(())
            }
            // Already on the way down.
            SessionState::Stopping | SessionState::AwaitingFinal => Ok(()),
            SessionState::Idle | SessionState::Abandoned => Err(VoxdError::NotRecording),
        }
    }

    /// The ordered stop: capture flush drains into the backend before
    /// the backend is told to finish.
    fn stop_capturing(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let source_kind = session.source;
        let id = session.id;
        self.set_state(SessionState::Stopping);
        self.log(1, &format!("session {} stopping", id));

        let source = self.source_for(source_kind);
        source.disable_silence_detection();
        source.stop_capture();

        if let Err(e) = self.drain_flush_into_backend() {
            self.abandon(ErrorKind::Transport, &e.to_string());
            return;
        }

        if let Err(e) = self.backend.flush_and_stop() {
            self.abandon(ErrorKind::Transport, &e.to_string());
            return;
        }
        self.set_state(SessionState::AwaitingFinal);
        self.deadline = Some((
            Instant::now() + self.config.recovery_window,
            Deadline::Recovery,
        ));
    }

    /// Forward every chunk captured before the stop, up to `Flushed`.
    ///
    /// Blocks the controller for at most [`FLUSH_DRAIN_TIMEOUT`] per
    /// event, so a source that never sends `Flushed` cannot wedge the
    /// session state machine.
    fn drain_flush_into_backend(&mut self) -> Result<()> {
        let Some(audio_rx) = self.audio_rx.take() else {
            return Ok(());
        };
        while let Ok(event) = audio_rx.recv_timeout(FLUSH_DRAIN_TIMEOUT) {
            match event {
                AudioEvent::Chunk(chunk) => self.backend.feed_audio(&chunk)?,
                AudioEvent::Flushed => break,
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_cancel(&mut self) -> Result<()> {
        let Some(session) = &self.session else {
            return Err(VoxdError::NotRecording);
        };
        let id = session.id;
        self.log(1, &format!("session {} cancelled", id));
        self.abandon_quiet();
        Ok(())
    }

    /// Tear the session down without a final transcript, reporting why.
    fn abandon(&mut self, kind: ErrorKind, message: &str) {
        self.emit(SessionEvent::Error {
            kind,
            message: message.to_string(),
        });
        self.abandon_quiet();
    }

    fn abandon_quiet(&mut self) {
        if let Some(session) = &self.session {
            let source_kind = session.source;
            let source = self.source_for(source_kind);
            source.disable_silence_detection();
            source.stop_capture();
        }
        // Discard whatever the flush produced.
        if let Some(audio_rx) = self.audio_rx.take() {
            while let Ok(event) = audio_rx.recv_timeout(FLUSH_DRAIN_TIMEOUT) {
                if event == AudioEvent::Flushed {
                    break;
                }
            }
        }
        let _ = self.backend.stop_immediately();
        self.deadline = None;
        self.phase = StartPhase::None;
        self.set_state(SessionState::Abandoned);
        self.set_state(SessionState::Idle);
        self.session = None;
    }

    /// Normal completion after the final transcript was delivered.
    fn finish(&mut self) {
        self.deadline = None;
        self.phase = StartPhase::None;
        self.set_state(SessionState::Idle);
        self.session = None;
    }

    // Event handlers

    fn handle_audio(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::CaptureStarted { ok: true, .. } => {
                if self.phase == StartPhase::AwaitCaptureStart {
                    self.phase = StartPhase::None;
                    self.deadline = None;
                    self.set_state(SessionState::Capturing);
                    if let Some(session) = &self.session {
                        self.log(1, &format!("session {} capturing", session.id));
                    }
                }
            }
            AudioEvent::CaptureStarted { ok: false, message } => {
                let message =
                    message.unwrap_or_else(|| "audio capture failed to start".to_string());
                self.abandon(ErrorKind::Device, &message);
            }
            AudioEvent::Chunk(chunk) => {
                let capturing = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.state == SessionState::Capturing);
                if !capturing {
                    return;
                }
                if let Err(e) = self.backend.feed_audio(&chunk) {
                    self.abandon(ErrorKind::Transport, &e.to_string());
                }
            }
            AudioEvent::Telemetry(sample) => {
                self.emit(SessionEvent::VolumeUpdate {
                    level: sample.volume,
                });
                self.emit(SessionEvent::SignalQuality { snr: sample.snr });
            }
            AudioEvent::SilenceElapsed => {
                let auto_stop = self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.silence_auto_stop && s.state == SessionState::Capturing);
                if auto_stop {
                    // Same path as a user stop; the final transcript
                    // still arrives.
                    self.log(1, "silence threshold reached, stopping");
                    self.stop_capturing();
                }
            }
            AudioEvent::Flushed => {
                // Flush outside the stop path: capture period is over.
                self.audio_rx = None;
            }
        }
    }

    fn handle_backend(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::SessionStarted { ok: true, .. } => {
                if self.phase == StartPhase::AwaitBackendAck {
                    self.begin_capture();
                }
            }
            BackendEvent::SessionStarted { ok: false, message } => {
                if self.session.is_some() {
                    let message =
                        message.unwrap_or_else(|| "backend rejected the session".to_string());
                    self.abandon(ErrorKind::Transport, &message);
                }
            }
            BackendEvent::Partial(text) => {
                let session_id = self.session.as_ref().and_then(|s| {
                    (!s.state.is_terminal() && s.started_at.is_some()).then_some(s.id)
                });
                match session_id {
                    Some(session_id) => {
                        self.emit(SessionEvent::PartialText { session_id, text })
                    }
                    None => self.log(2, "dropping stale partial result"),
                }
            }
            BackendEvent::Final(text) => {
                let session_id = self
                    .session
                    .as_ref()
                    .and_then(|s| (s.state == SessionState::AwaitingFinal).then_some(s.id));
                match session_id {
                    Some(session_id) => {
                        self.emit(SessionEvent::FinalText { session_id, text });
                        self.finish();
                    }
                    None => self.log(2, "dropping stale final result"),
                }
            }
            BackendEvent::Error(message) => {
                if self.session.is_some() {
                    self.abandon(ErrorKind::Transport, &message);
                }
            }
            BackendEvent::ConnectionChanged(connected) => {
                if !connected && self.session.is_some() {
                    self.abandon(ErrorKind::Transport, "backend connection lost");
                }
            }
        }
    }

    fn handle_deadline(&mut self) {
        let Some((at, kind)) = self.deadline else {
            return;
        };
        if Instant::now() < at {
            return;
        }
        self.deadline = None;
        match kind {
            Deadline::BackendAck => {
                self.abandon(
                    ErrorKind::Transport,
                    "backend did not acknowledge session start",
                );
            }
            Deadline::CaptureStart => {
                self.abandon(ErrorKind::Device, "audio capture did not start in time");
            }
            Deadline::Recovery => {
                // The flush completed but the final never came; force
                // idle so the next session can start immediately.
                self.emit(SessionEvent::Error {
                    kind: ErrorKind::ResultTimeout,
                    message: "no final transcript within the recovery window".to_string(),
                });
                self.abandon_quiet();
            }
        }
    }
}
