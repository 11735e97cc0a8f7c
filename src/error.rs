//! Error types for voxd.

use thiserror::Error;

use crate::session::CaptureSource;

#[derive(Error, Debug)]
pub enum VoxdError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Session preconditions (rejected synchronously at request_start)
    #[error("Transcription backend is not ready")]
    BackendNotReady,

    #[error("A {active} session is already active")]
    SourceBusy { active: CaptureSource },

    #[error("No session is active")]
    NotRecording,

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Transcription backend errors
    #[error("Backend session failed: {message}")]
    Backend { message: String },

    #[error("Backend connection failed: {message}")]
    Transport { message: String },

    #[error("Transcription model not found at {path}")]
    TranscriptionModelNotFound { path: String },

    #[error("Transcription inference failed: {message}")]
    TranscriptionInferenceFailed { message: String },

    // Orchestrator lifecycle
    #[error("Session orchestrator has shut down")]
    OrchestratorGone,

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxdError {
    /// Returns true for failures rejected synchronously at `request_start`
    /// without touching session state.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            VoxdError::BackendNotReady | VoxdError::SourceBusy { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxdError>;
