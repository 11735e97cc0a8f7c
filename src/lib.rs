//! voxd - Voice dictation sessions for Linux
//!
//! A session orchestrator around interchangeable audio sources and
//! transcription backends, with a daemon and Unix-socket control CLI.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod app;
pub mod audio;
pub mod backend;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod ipc;
pub mod replacements;
pub mod session;
pub mod sink;
pub mod stt;

// Core capability traits
pub use audio::source::AudioSource;
pub use backend::TranscriptionBackend;
pub use sink::{CollectorSink, CommandSink, StdoutSink, TextSink};
pub use stt::transcriber::Transcriber;

// Session machinery
pub use session::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle, StartRequest};
pub use session::{CaptureSource, SessionEvent, SessionId, SessionMode, SessionState};

// Error handling
pub use error::{Result, VoxdError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
