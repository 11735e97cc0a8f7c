//! Daemon mode for voxd: owns the session orchestrator and serves IPC.

pub mod handler;

use crate::audio::source::AudioSource;
use crate::backend::TranscriptionBackend;
use crate::backend::local::LocalBackend;
use crate::backend::remote::RemoteBackend;
use crate::config::{BackendKind, Config, OutputConfig, SinkKind};
use crate::error::{Result, VoxdError};
use crate::ipc::server::IpcServer;
use crate::replacements::apply_replacements;
use crate::session::events::{ErrorKind, SessionEvent};
use crate::session::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle};
use crate::sink::{CommandSink, StdoutSink, TextSink};
use crate::stt::whisper::{WhisperConfig, WhisperTranscriber};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::Notify;

#[cfg(feature = "cpal-audio")]
use crate::audio::capture::{CpalSource, suppress_audio_warnings};
#[cfg(feature = "cpal-audio")]
use crate::session::CaptureSource;

/// How a session ended, as observed by the event consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Final transcript after replacement rules.
    Final(String),
    /// Session was abandoned; the message is the published error.
    Failed(String),
}

/// Shared state behind the IPC command handler.
pub struct DaemonState {
    pub handle: OrchestratorHandle,
    /// Terminal outcomes, one per session that got past its preconditions.
    pub outcomes: Receiver<SessionOutcome>,
    pub config: Config,
    /// Bounded wait for a final transcript after a stop request.
    pub stop_wait: Duration,
    /// Signalled by the `shutdown` command.
    pub shutdown: Arc<Notify>,
}

/// Run the daemon: build the orchestrator, start the IPC server, wait
/// for a shutdown command or signal.
pub async fn run_daemon(
    config: Config,
    socket_path: Option<PathBuf>,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    #[cfg(feature = "cpal-audio")]
    suppress_audio_warnings();

    let (microphone, system_audio) = build_sources(&config)?;
    let backend = build_backend(&config, quiet)?;

    let orchestrator_config = OrchestratorConfig {
        start_ack_timeout: config.session.start_ack_timeout(),
        recovery_window: config.session.recovery_window(),
        silence_threshold: config.audio.silence_threshold,
        silence_duration: config.audio.silence_duration(),
        verbosity,
        quiet,
    };
    let stop_wait = config.session.recovery_window() + Duration::from_secs(2);

    let orchestrator = Orchestrator::new(microphone, system_audio, backend, orchestrator_config);
    let (handle, events) = orchestrator.spawn();

    let (outcomes, _consumer) = spawn_event_consumer(events, config.output.clone(), quiet, verbosity);

    let shutdown = Arc::new(Notify::new());
    let state = DaemonState {
        handle,
        outcomes,
        config,
        stop_wait,
        shutdown: Arc::clone(&shutdown),
    };

    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path));

    if !quiet {
        eprintln!(
            "voxd: IPC server listening at {}",
            server.socket_path().display()
        );
        eprintln!("voxd: daemon ready");
    }

    let handler = handler::DaemonCommandHandler::new(state);

    let server_clone = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { server_clone.start(handler).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nvoxd: received SIGINT, shutting down");
            }
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                eprintln!("voxd: error setting up signal handler: {}", e);
            }
            if !quiet {
                eprintln!("\nvoxd: received SIGTERM, shutting down");
            }
        }
        _ = shutdown.notified() => {
            if !quiet {
                eprintln!("voxd: shutdown requested");
            }
        }
    }

    server.stop().await?;
    if let Err(e) = server_handle.await {
        eprintln!("voxd: daemon server task failed: {e}");
    }

    if !quiet {
        eprintln!("voxd: daemon stopped");
    }

    Ok(())
}

/// Wait for SIGTERM (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| VoxdError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}

#[cfg(feature = "cpal-audio")]
fn build_sources(config: &Config) -> Result<(Box<dyn AudioSource>, Box<dyn AudioSource>)> {
    let microphone = CpalSource::new(
        CaptureSource::Microphone,
        config.audio.device.as_deref(),
        config.audio.silence_threshold,
    );
    let system_audio = CpalSource::new(
        CaptureSource::SystemAudio,
        config.audio.loopback_device.as_deref(),
        config.audio.silence_threshold,
    );
    Ok((Box::new(microphone), Box::new(system_audio)))
}

#[cfg(not(feature = "cpal-audio"))]
fn build_sources(_config: &Config) -> Result<(Box<dyn AudioSource>, Box<dyn AudioSource>)> {
    Err(VoxdError::Other(
        "this build has no live audio support (cpal-audio feature disabled)".to_string(),
    ))
}

pub(crate) fn build_backend(config: &Config, quiet: bool) -> Result<Box<dyn TranscriptionBackend>> {
    match config.backend.kind {
        BackendKind::Local => {
            if !quiet {
                eprintln!(
                    "voxd: loading model '{}'",
                    config.backend.model_path.display()
                );
            }
            let transcriber = WhisperTranscriber::new(WhisperConfig {
                model_path: config.backend.model_path.clone(),
                language: config.backend.language.clone(),
                threads: None,
                prompt: None,
            })?;
            if !quiet {
                eprintln!("voxd: model loaded");
            }
            Ok(Box::new(
                LocalBackend::new(Arc::new(transcriber))
                    .with_partial_interval(config.session.partial_interval()),
            ))
        }
        BackendKind::Remote => {
            let mut backend = RemoteBackend::new(&config.backend.remote_addr);
            backend.connect()?;
            if !quiet {
                eprintln!("voxd: connected to {}", config.backend.remote_addr);
            }
            Ok(Box::new(backend))
        }
    }
}

/// Consume session events: deliver finals through the configured sink
/// and publish terminal outcomes for waiting stop commands.
pub fn spawn_event_consumer(
    events: Receiver<SessionEvent>,
    output: OutputConfig,
    quiet: bool,
    verbosity: u8,
) -> (Receiver<SessionOutcome>, thread::JoinHandle<()>) {
    let (tx, rx) = unbounded();
    let handle = thread::spawn(move || consume_events(events, output, tx, quiet, verbosity));
    (rx, handle)
}

fn consume_events(
    events: Receiver<SessionEvent>,
    output: OutputConfig,
    outcomes: Sender<SessionOutcome>,
    quiet: bool,
    verbosity: u8,
) {
    let sink: Box<dyn TextSink> = match output.sink {
        SinkKind::Command => match &output.command {
            Some(command) => Box::new(CommandSink::new(command.clone())),
            None => {
                eprintln!("voxd: output sink is 'command' but no command is configured");
                Box::new(StdoutSink::new())
            }
        },
        SinkKind::Stdout => Box::new(StdoutSink::new()),
    };

    for event in events.iter() {
        match event {
            SessionEvent::FinalText { text, .. } => {
                let processed = apply_replacements(&text, &output.replacements);
                if let Err(e) = sink.deliver(&processed) {
                    eprintln!("voxd: failed to deliver transcript: {}", e);
                }
                let _ = outcomes.send(SessionOutcome::Final(processed));
            }
            SessionEvent::PartialText { text, .. } => {
                if !quiet && verbosity >= 1 {
                    eprintln!("voxd: partial: {}", text);
                }
            }
            SessionEvent::Error { kind, message } => {
                if !quiet {
                    eprintln!("voxd: session error ({}): {}", kind, message);
                }
                // Precondition failures are answered synchronously and
                // never consume a session.
                if kind != ErrorKind::Precondition {
                    let _ = outcomes.send(SessionOutcome::Failed(message));
                }
            }
            SessionEvent::StateChanged { state } => {
                if !quiet && verbosity >= 1 {
                    eprintln!("voxd: state: {}", state);
                }
            }
            SessionEvent::VolumeUpdate { .. } | SessionEvent::SignalQuality { .. } => {}
        }
    }
}
