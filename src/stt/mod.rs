//! Speech-to-text engines behind the local backend.

pub mod transcriber;
pub mod whisper;

pub use transcriber::{MockTranscriber, Transcriber};
pub use whisper::{WhisperConfig, WhisperTranscriber};
