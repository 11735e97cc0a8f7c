//! One-shot transcription of a WAV file or stdin.
//!
//! Runs the same session machinery as the daemon: the file plays the
//! microphone role, end-of-file reads as trailing silence, and the
//! silence watchdog drives the session through the normal stop path.

use crate::audio::source::NullSource;
use crate::audio::wav::WavSource;
use crate::backend::TranscriptionBackend;
use crate::config::Config;
use crate::daemon::{SessionOutcome, build_backend, spawn_event_consumer};
use crate::error::{Result, VoxdError};
use crate::session::SessionConfig;
use crate::session::orchestrator::{Orchestrator, OrchestratorConfig, StartRequest};
use std::path::Path;
use std::time::Duration;

/// Transcribe a WAV file (or stdin when `input` is None) and deliver the
/// final transcript through the configured output sink.
pub fn run_file_command(
    config: Config,
    input: Option<&Path>,
    silence: Option<Duration>,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    let source = match input {
        Some(path) => WavSource::from_path(path, config.audio.silence_threshold)?,
        None => WavSource::from_stdin(config.audio.silence_threshold)?,
    };
    let backend = build_backend(&config, quiet)?;
    run_session(source, backend, &config, silence, quiet, verbosity)
}

/// Drive one session over a finite source and wait for its outcome.
pub fn run_session(
    source: WavSource,
    backend: Box<dyn TranscriptionBackend>,
    config: &Config,
    silence: Option<Duration>,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    let audio_len = source.duration();
    let silence = silence.unwrap_or_else(|| config.audio.silence_duration());

    let orchestrator_config = OrchestratorConfig {
        start_ack_timeout: config.session.start_ack_timeout(),
        recovery_window: config.session.recovery_window(),
        silence_threshold: config.audio.silence_threshold,
        silence_duration: silence,
        verbosity,
        quiet,
    };

    let orchestrator = Orchestrator::new(
        Box::new(source),
        Box::new(NullSource::new()),
        backend,
        orchestrator_config,
    );
    let (handle, events) = orchestrator.spawn();
    let (outcomes, _consumer) =
        spawn_event_consumer(events, config.output.clone(), quiet, verbosity);

    let session_config = SessionConfig {
        language: config.backend.language.clone(),
        prompt: None,
        vocabulary: Vec::new(),
        free_speak: true,
    };
    let request = StartRequest::microphone()
        .with_silence_auto_stop()
        .with_config(session_config);

    handle.request_start(request)?;

    // Worst case: the whole clip plays out, silence elapses, then the
    // recovery window passes without a final.
    let wait = audio_len + silence + config.session.recovery_window() + Duration::from_secs(5);
    let outcome = outcomes.recv_timeout(wait).map_err(|_| VoxdError::Other(
        "no transcription result arrived".to_string(),
    ))?;

    handle.shutdown();

    match outcome {
        SessionOutcome::Final(_) => Ok(()),
        SessionOutcome::Failed(message) => Err(VoxdError::Other(message)),
    }
}
