//! Outbound events from the orchestrator to consumers.
//!
//! Delivered on a crossbeam channel from the controller thread; safe for
//! consumers to re-dispatch to their own rendering thread.

use crate::session::{SessionId, SessionState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy surfaced to consumers.
///
/// Stale results are not represented here: they are dropped silently and
/// reported only at high verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Backend not ready or a conflicting session was active; rejected
    /// synchronously with no state change.
    Precondition,
    /// The audio source could not start or failed mid-capture.
    Device,
    /// The backend connection dropped while a session was in flight.
    Transport,
    /// Flush completed but no final fragment arrived within the
    /// recovery window.
    ResultTimeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Precondition => "precondition",
            ErrorKind::Device => "device",
            ErrorKind::Transport => "transport",
            ErrorKind::ResultTimeout => "result_timeout",
        };
        write!(f, "{}", s)
    }
}

/// Events the orchestrator publishes to its consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A refinable partial transcription for the tracked session.
    PartialText { session_id: SessionId, text: String },
    /// The final transcription; exactly one per completed session.
    FinalText { session_id: SessionId, text: String },
    /// Current input level, 0.0 to 1.0.
    VolumeUpdate { level: f32 },
    /// Estimated signal-to-noise ratio in dB.
    SignalQuality { snr: f32 },
    /// The session state machine moved.
    StateChanged { state: SessionState },
    /// A handled failure worth telling the user about.
    Error { kind: ErrorKind, message: String },
}
