//! JSON message protocol for IPC communication between CLI and daemon.

use crate::session::{CaptureSource, SessionMode, SessionState};
use serde::{Deserialize, Serialize};

/// Commands sent by CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start a session on the given source
    Start {
        source: CaptureSource,
        mode: SessionMode,
        #[serde(default)]
        free_speak: bool,
    },
    /// Stop the active session and wait for the final transcript
    Stop,
    /// Abort the active session without a final transcript
    Cancel,
    /// Get daemon status
    Status,
    /// Shutdown the daemon
    Shutdown,
}

impl Command {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by daemon to CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Command succeeded
    Ok,
    /// Session started
    Started { session_id: u64 },
    /// Session stopped with its final transcript
    Transcription { text: String },
    /// Current daemon status
    Status {
        state: SessionState,
        session_id: Option<u64>,
        source: Option<CaptureSource>,
        backend_ready: bool,
    },
    /// Error occurred
    Error { message: String },
}

impl Response {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
