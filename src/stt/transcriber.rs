use crate::error::{Result, VoxdError};
use std::sync::Arc;

/// Trait for batch speech-to-text transcription.
///
/// Implementations receive the full audio accumulated so far; the local
/// backend calls this repeatedly with a growing buffer to produce
/// refining partials, then once more for the final pass.
pub trait Transcriber: Send + Sync {
    /// Transcribe audio samples to text.
    ///
    /// # Arguments
    /// * `audio` - Audio samples as 16-bit PCM at 16kHz mono
    fn transcribe(&self, audio: &[i16]) -> Result<String>;

    /// Name of the loaded model.
    fn model_name(&self) -> &str;

    /// Whether the engine is loaded and able to transcribe.
    fn is_ready(&self) -> bool;
}

/// Implement Transcriber for Arc<T> so one engine can serve many sessions.
impl<T: Transcriber> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[i16]) -> Result<String> {
        (**self).transcribe(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Scripted transcriber for tests.
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    should_fail: bool,
}

impl MockTranscriber {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            should_fail: false,
        }
    }

    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[i16]) -> Result<String> {
        if self.should_fail {
            Err(VoxdError::TranscriptionInferenceFailed {
                message: "mock transcription failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}
