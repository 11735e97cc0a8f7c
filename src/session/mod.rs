//! Session types for the recording orchestrator.
//!
//! A session is one start-to-finish recording/transcription attempt,
//! identified by a unique monotonically increasing id. The orchestrator
//! in [`orchestrator`] is the only code that mutates a session.

pub mod events;
pub mod orchestrator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

pub use events::{ErrorKind, SessionEvent};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle, StartRequest};

/// Opaque unique session token. Never reused within a process.
pub type SessionId = u64;

/// Physical audio source a session captures from.
///
/// At most one session of either source may be active at a time; the
/// two sources are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    Microphone,
    SystemAudio,
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureSource::Microphone => write!(f, "microphone"),
            CaptureSource::SystemAudio => write!(f, "system-audio"),
        }
    }
}

/// What the session's output is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Dictation into the focused application.
    VoiceInput,
    /// Live captioning of system audio; no text injection.
    Subtitle,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::VoiceInput => write!(f, "voice-input"),
            SessionMode::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// Recording session state machine.
///
/// Success path: `Idle → Starting → Capturing → Stopping → AwaitingFinal → Idle`.
/// `Abandoned` is reachable from every non-idle state and immediately
/// resolves back to `Idle`; it is observable through state-change events
/// but never a resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Capturing,
    Stopping,
    AwaitingFinal,
    Abandoned,
}

impl SessionState {
    /// Terminal states: no fragment may be forwarded to consumers once
    /// the session that produced it reached one of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Abandoned)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Capturing => "capturing",
            SessionState::Stopping => "stopping",
            SessionState::AwaitingFinal => "awaiting_final",
            SessionState::Abandoned => "abandoned",
        };
        write!(f, "{}", s)
    }
}

/// Immutable parameters attached to a session at start time.
///
/// Constructed by the settings/scene resolver and passed through to the
/// backend untouched; the orchestrator does not interpret these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Language code, or "auto".
    pub language: String,
    /// Scene-derived prompt hint for the model.
    pub prompt: Option<String>,
    /// Scene-derived vocabulary hints.
    pub vocabulary: Vec<String>,
    /// Free-speak (continuous) vs push-to-talk semantics.
    pub free_speak: bool,
}

/// The unit of work from "start" to "final text or abandonment".
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub mode: SessionMode,
    pub source: CaptureSource,
    pub state: SessionState,
    /// Cleared exactly when the session becomes terminal; a fragment
    /// handler that observes `None` must treat the fragment as stale.
    pub started_at: Option<Instant>,
    pub silence_auto_stop: bool,
    pub config: SessionConfig,
}

impl Session {
    pub fn new(
        id: SessionId,
        source: CaptureSource,
        mode: SessionMode,
        silence_auto_stop: bool,
        config: SessionConfig,
    ) -> Self {
        Self {
            id,
            mode,
            source,
            state: SessionState::Starting,
            started_at: Some(Instant::now()),
            silence_auto_stop,
            config,
        }
    }
}

/// Continuous session-scoped signal telemetry; consumed by UI layers,
/// never persisted by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    /// RMS level, 0.0 to 1.0.
    pub volume: f32,
    /// Estimated signal-to-noise ratio in dB.
    pub snr: f32,
    /// Trailing silence observed so far.
    pub silence: std::time::Duration,
}
