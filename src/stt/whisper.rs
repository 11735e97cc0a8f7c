//! Whisper-based speech-to-text via whisper-rs.
//!
//! Requires the `whisper` feature and cmake:
//!
//! ```bash
//! cargo build --features whisper
//! ```

use crate::defaults;
use crate::error::{Result, VoxdError};
use crate::stt::transcriber::Transcriber;
use std::path::PathBuf;

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for the Whisper engine.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the ggml model file.
    pub model_path: PathBuf,
    /// Language code ("en", "es", ...) or "auto".
    pub language: String,
    /// Inference threads (None = auto-detect).
    pub threads: Option<usize>,
    /// Initial prompt biasing recognition, e.g. scene vocabulary.
    pub prompt: Option<String>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.bin"),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: None,
            prompt: None,
        }
    }
}

/// Whisper implementation of [`Transcriber`].
///
/// The WhisperContext is wrapped in a Mutex; a fresh state is created
/// per transcription run.
#[cfg(feature = "whisper")]
pub struct WhisperTranscriber {
    context: Mutex<WhisperContext>,
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

/// Stub used when the binary is built without the `whisper` feature.
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperTranscriber {
    config: WhisperConfig,
    model_name: String,
}

fn model_name_from_path(path: &std::path::Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(feature = "whisper")]
impl WhisperTranscriber {
    /// Load the model at `config.model_path`.
    ///
    /// # Errors
    /// `TranscriptionModelNotFound` if the file is missing,
    /// `TranscriptionInferenceFailed` if loading fails.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        // Route whisper.cpp output through the hooks so it stays quiet.
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !config.model_path.exists() {
            return Err(VoxdError::TranscriptionModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }

        let model_name = model_name_from_path(&config.model_path);

        let mut context_params = WhisperContextParameters::default();
        // Fused attention kernels avoid the standalone softmax CUDA
        // kernel that crashes on sm_120 GPUs with ggml <= 1.7.6.
        context_params.flash_attn(true);
        let context = WhisperContext::new_with_params(
            config
                .model_path
                .to_str()
                .ok_or_else(|| VoxdError::TranscriptionInferenceFailed {
                    message: "invalid UTF-8 in model path".to_string(),
                })?,
            context_params,
        )
        .map_err(|e| VoxdError::TranscriptionInferenceFailed {
            message: format!("failed to load Whisper model: {}", e),
        })?;

        Ok(Self {
            context: Mutex::new(context),
            config,
            model_name,
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    /// Whisper expects f32 samples in [-1.0, 1.0].
    fn convert_audio(samples: &[i16]) -> Vec<f32> {
        samples
            .iter()
            .map(|&sample| sample as f32 / 32768.0)
            .collect()
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperTranscriber {
    /// Stub constructor; only validates that the model file exists.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(VoxdError::TranscriptionModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }

        let model_name = model_name_from_path(&config.model_path);

        Ok(Self { config, model_name })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    /// Available without the feature for testing.
    pub fn convert_audio(samples: &[i16]) -> Vec<f32> {
        samples
            .iter()
            .map(|&sample| sample as f32 / 32768.0)
            .collect()
    }
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &[i16]) -> Result<String> {
        let audio_f32 = Self::convert_audio(audio);

        let context = self
            .context
            .lock()
            .map_err(|e| VoxdError::TranscriptionInferenceFailed {
                message: format!("failed to acquire context lock: {}", e),
            })?;

        let mut state =
            context
                .create_state()
                .map_err(|e| VoxdError::TranscriptionInferenceFailed {
                    message: format!("failed to create Whisper state: {}", e),
                })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if self.config.language == defaults::DEFAULT_LANGUAGE {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.config.language));
        }

        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }

        if let Some(prompt) = &self.config.prompt {
            params.set_initial_prompt(prompt);
        }

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &audio_f32)
            .map_err(|e| VoxdError::TranscriptionInferenceFailed {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let mut transcription = String::new();
        for segment in state.as_iter() {
            transcription.push_str(&segment.to_string());
        }

        Ok(transcription.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "whisper"))]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, _audio: &[i16]) -> Result<String> {
        Err(VoxdError::TranscriptionInferenceFailed {
            message: concat!(
                "Whisper feature not enabled. This binary was built without speech recognition.\n",
                "To fix: cargo build --release (whisper is enabled by default)\n",
                "If build fails with cmake errors, install: sudo apt install cmake"
            )
            .to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let config = WhisperConfig::default();
        assert_eq!(config.model_path, PathBuf::from("models/ggml-base.bin"));
        assert_eq!(config.language, defaults::DEFAULT_LANGUAGE);
        assert_eq!(config.threads, None);
        assert_eq!(config.prompt, None);
    }

    #[test]
    fn missing_model_file_is_reported() {
        let config = WhisperConfig {
            model_path: PathBuf::from("/nonexistent/model.bin"),
            language: "en".to_string(),
            threads: None,
            prompt: None,
        };

        match WhisperTranscriber::new(config) {
            Err(VoxdError::TranscriptionModelNotFound { path }) => {
                assert_eq!(path, "/nonexistent/model.bin");
            }
            other => panic!("expected TranscriptionModelNotFound, got {:?}", other),
        }
    }

    #[test]
    fn model_name_comes_from_file_stem() {
        assert_eq!(
            model_name_from_path(std::path::Path::new("/models/ggml-base.bin")),
            "ggml-base"
        );
        assert_eq!(model_name_from_path(std::path::Path::new("")), "unknown");
    }

    #[test]
    fn convert_audio_normalizes_range() {
        let samples = vec![0i16, 16384, -16384, 32767, -32768];
        let converted = WhisperTranscriber::convert_audio(&samples);

        assert_eq!(converted.len(), samples.len());
        assert_eq!(converted[0], 0.0);
        assert!((converted[1] - 0.5).abs() < 0.01);
        assert!((converted[2] + 0.5).abs() < 0.01);
        assert!((converted[3] - 1.0).abs() < 0.01);
        assert_eq!(converted[4], -1.0);
    }

    #[test]
    fn convert_audio_empty() {
        assert!(WhisperTranscriber::convert_audio(&[]).is_empty());
    }

    #[test]
    fn transcriber_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<WhisperTranscriber>();
        assert_sync::<WhisperTranscriber>();
    }
}
