use crate::defaults;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub backend: BackendConfig,
    pub session: SessionTuning,
    pub output: OutputConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Microphone device name; None picks the best default.
    pub device: Option<String>,
    /// Monitor device for system-audio capture; None picks the first
    /// monitor source the host exposes.
    pub loopback_device: Option<String>,
    pub sample_rate: u32,
    pub silence_threshold: f32,
    pub silence_duration_ms: u32,
}

/// Which transcription backend sessions run against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

/// Transcription backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Address of the remote streaming server (kind = "remote").
    pub remote_addr: String,
    /// Whisper model path (kind = "local").
    pub model_path: PathBuf,
    pub language: String,
}

/// Session orchestrator tunables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionTuning {
    pub start_ack_timeout_ms: u32,
    pub recovery_window_ms: u32,
    pub partial_interval_ms: u32,
    /// Free-speak dictation: sessions auto-stop on trailing silence.
    pub free_speak: bool,
}

/// Where final transcripts go.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Stdout,
    Command,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub sink: SinkKind,
    /// Command receiving the transcript on stdin (sink = "command").
    pub command: Option<String>,
    /// Literal phrase replacements applied to final transcripts.
    pub replacements: BTreeMap<String, String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            loopback_device: None,
            sample_rate: defaults::SAMPLE_RATE,
            silence_threshold: defaults::SILENCE_THRESHOLD,
            silence_duration_ms: defaults::SILENCE_DURATION.as_millis() as u32,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            remote_addr: defaults::REMOTE_ADDR.to_string(),
            model_path: PathBuf::from("models/ggml-base.bin"),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            start_ack_timeout_ms: defaults::START_ACK_TIMEOUT.as_millis() as u32,
            recovery_window_ms: defaults::RECOVERY_WINDOW.as_millis() as u32,
            partial_interval_ms: defaults::PARTIAL_INTERVAL.as_millis() as u32,
            free_speak: false,
        }
    }
}

impl SessionTuning {
    pub fn start_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.start_ack_timeout_ms as u64)
    }

    pub fn recovery_window(&self) -> Duration {
        Duration::from_millis(self.recovery_window_ms as u64)
    }

    pub fn partial_interval(&self) -> Duration {
        Duration::from_millis(self.partial_interval_ms as u64)
    }
}

impl AudioConfig {
    pub fn silence_duration(&self) -> Duration {
        Duration::from_millis(self.silence_duration_ms as u64)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file
    /// doesn't exist. Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXD_MODEL → backend.model_path
    /// - VOXD_LANGUAGE → backend.language
    /// - VOXD_AUDIO_DEVICE → audio.device
    /// - VOXD_REMOTE_ADDR → backend.remote_addr (also selects remote)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("VOXD_MODEL")
            && !model.is_empty()
        {
            self.backend.model_path = PathBuf::from(model);
        }

        if let Ok(language) = std::env::var("VOXD_LANGUAGE")
            && !language.is_empty()
        {
            self.backend.language = language;
        }

        if let Ok(device) = std::env::var("VOXD_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(addr) = std::env::var("VOXD_REMOTE_ADDR")
            && !addr.is_empty()
        {
            self.backend.remote_addr = addr;
            self.backend.kind = BackendKind::Remote;
        }

        self
    }

    /// Default configuration file path: ~/.config/voxd/config.toml
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxd").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Serialize tests that touch environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: only used in tests with ENV_LOCK held.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_voxd_env() {
        remove_env("VOXD_MODEL");
        remove_env("VOXD_LANGUAGE");
        remove_env("VOXD_AUDIO_DEVICE");
        remove_env("VOXD_REMOTE_ADDR");
    }

    #[test]
    fn default_config_values() {
        let config = Config::default();

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.loopback_device, None);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.silence_threshold, 0.02);
        assert_eq!(config.audio.silence_duration_ms, 1500);

        assert_eq!(config.backend.kind, BackendKind::Local);
        assert_eq!(config.backend.language, "auto");

        assert_eq!(config.session.recovery_window_ms, 5000);
        assert_eq!(config.session.start_ack_timeout_ms, 3000);
        assert!(!config.session.free_speak);

        assert_eq!(config.output.sink, SinkKind::Stdout);
        assert!(config.output.replacements.is_empty());
    }

    #[test]
    fn load_from_toml_file() {
        let toml_content = r#"
            [audio]
            device = "pipewire"
            loopback_device = "alsa_output.analog-stereo.monitor"
            silence_duration_ms = 2000

            [backend]
            kind = "remote"
            remote_addr = "10.0.0.2:7700"
            language = "de"

            [session]
            recovery_window_ms = 8000
            free_speak = true

            [output]
            sink = "command"
            command = "wtype -"

            [output.replacements]
            "new line" = "\n"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.device, Some("pipewire".to_string()));
        assert_eq!(
            config.audio.loopback_device,
            Some("alsa_output.analog-stereo.monitor".to_string())
        );
        assert_eq!(config.audio.silence_duration(), Duration::from_secs(2));

        assert_eq!(config.backend.kind, BackendKind::Remote);
        assert_eq!(config.backend.remote_addr, "10.0.0.2:7700");
        assert_eq!(config.backend.language, "de");

        assert_eq!(config.session.recovery_window(), Duration::from_secs(8));
        assert!(config.session.free_speak);

        assert_eq!(config.output.sink, SinkKind::Command);
        assert_eq!(config.output.command, Some("wtype -".to_string()));
        assert_eq!(config.output.replacements["new line"], "\n");
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_content = r#"
            [backend]
            language = "fr"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.backend.language, "fr");
        assert_eq!(config.backend.kind, BackendKind::Local);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.session.recovery_window_ms, 5000);
    }

    #[test]
    fn env_overrides_apply() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voxd_env();

        set_env("VOXD_MODEL", "/models/ggml-small.bin");
        set_env("VOXD_LANGUAGE", "fr");
        set_env("VOXD_AUDIO_DEVICE", "pulse");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.backend.model_path, PathBuf::from("/models/ggml-small.bin"));
        assert_eq!(config.backend.language, "fr");
        assert_eq!(config.audio.device, Some("pulse".to_string()));
        assert_eq!(config.backend.kind, BackendKind::Local);

        clear_voxd_env();
    }

    #[test]
    fn env_remote_addr_selects_remote_backend() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voxd_env();

        set_env("VOXD_REMOTE_ADDR", "192.168.1.5:7700");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.backend.kind, BackendKind::Remote);
        assert_eq!(config.backend.remote_addr, "192.168.1.5:7700");

        clear_voxd_env();
    }

    #[test]
    fn env_empty_string_is_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_voxd_env();

        set_env("VOXD_LANGUAGE", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.backend.language, "auto");

        clear_voxd_env();
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let invalid_toml = r#"
            [audio
            device = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }

    #[test]
    fn load_or_default_for_missing_file() {
        let missing = Path::new("/tmp/nonexistent_voxd_config_12345.toml");
        let config = Config::load_or_default(missing).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn unknown_backend_kind_is_rejected() {
        let toml_content = r#"
            [backend]
            kind = "cloud"
        "#;
        let result: std::result::Result<Config, _> = toml::from_str(toml_content);
        assert!(result.is_err());
    }
}
