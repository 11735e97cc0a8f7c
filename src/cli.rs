//! Command-line interface for voxd
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Voice dictation sessions for Linux
#[derive(Parser, Debug)]
#[command(name = "voxd", version, about = "Voice dictation sessions for Linux")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: session progress, -vv: dropped stale results)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device (e.g., pipewire)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Whisper model path (local backend)
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Language code for transcription (default: auto-detect). Examples: auto, en, de
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Address of a remote streaming server; selects the remote backend
    #[arg(long, value_name = "ADDR")]
    pub remote: Option<String>,
}

/// Parse a duration string.
///
/// Supports any format accepted by `humantime`: bare numbers
/// (milliseconds), single-unit (`800ms`, `2s`), and compound (`1m30s`).
fn parse_silence(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → milliseconds
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe a WAV file (or stdin) through the session machinery
    Run {
        /// WAV file to transcribe; reads stdin when omitted
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Trailing silence that ends the session. Examples: 800ms, 2s
        #[arg(long, value_name = "DURATION", value_parser = parse_silence)]
        silence: Option<Duration>,
    },

    /// Start the daemon (foreground process for systemd)
    Daemon {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Start a session via IPC
    Start {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,

        /// Capture system audio (monitor device) instead of the microphone
        #[arg(long)]
        system: bool,

        /// Auto-stop on trailing silence instead of waiting for `stop`
        #[arg(long)]
        free_speak: bool,
    },

    /// Stop the session and print the final transcript via IPC
    Stop {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Abort the session without a transcript via IPC
    Cancel {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Get daemon status via IPC
    Status {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Shut the daemon down via IPC
    Shutdown {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxd.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// List available audio input devices
    Devices,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_no_args() {
        let cli = Cli::try_parse_from(["voxd"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.device.is_none());
        assert!(cli.model.is_none());
        assert!(cli.language.is_none());
        assert!(cli.remote.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_single() {
        let cli = Cli::try_parse_from(["voxd", "-v"]).unwrap();
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["voxd", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_with_options() {
        let cli = Cli::try_parse_from([
            "voxd",
            "--device",
            "pipewire",
            "--model",
            "/models/ggml-base.bin",
            "--language",
            "en",
        ])
        .unwrap();

        assert_eq!(cli.device.as_deref(), Some("pipewire"));
        assert_eq!(cli.model, Some(PathBuf::from("/models/ggml-base.bin")));
        assert_eq!(cli.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_parse_run_with_input() {
        let cli = Cli::try_parse_from(["voxd", "run", "--input", "clip.wav"]).unwrap();
        match cli.command {
            Some(Commands::Run { input, silence }) => {
                assert_eq!(input, Some(PathBuf::from("clip.wav")));
                assert!(silence.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_silence_durations() {
        let cli = Cli::try_parse_from(["voxd", "run", "--silence", "800ms"]).unwrap();
        match cli.command {
            Some(Commands::Run { silence, .. }) => {
                assert_eq!(silence, Some(Duration::from_millis(800)));
            }
            _ => panic!("Expected Run command"),
        }

        // Bare numbers are milliseconds
        let cli = Cli::try_parse_from(["voxd", "run", "--silence", "1500"]).unwrap();
        match cli.command {
            Some(Commands::Run { silence, .. }) => {
                assert_eq!(silence, Some(Duration::from_millis(1500)));
            }
            _ => panic!("Expected Run command"),
        }

        let cli = Cli::try_parse_from(["voxd", "run", "--silence", "1m30s"]).unwrap();
        match cli.command {
            Some(Commands::Run { silence, .. }) => {
                assert_eq!(silence, Some(Duration::from_secs(90)));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_invalid_silence_is_an_error() {
        assert!(Cli::try_parse_from(["voxd", "run", "--silence", "soon"]).is_err());
    }

    #[test]
    fn test_parse_start_flags() {
        let cli = Cli::try_parse_from(["voxd", "start", "--system", "--free-speak"]).unwrap();
        match cli.command {
            Some(Commands::Start {
                system, free_speak, ..
            }) => {
                assert!(system);
                assert!(free_speak);
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_parse_daemon_with_socket() {
        let cli = Cli::try_parse_from(["voxd", "daemon", "--socket", "/tmp/test.sock"]).unwrap();
        match cli.command {
            Some(Commands::Daemon { socket }) => {
                assert_eq!(socket, Some(PathBuf::from("/tmp/test.sock")));
            }
            _ => panic!("Expected Daemon command"),
        }
    }

    #[test]
    fn test_parse_devices() {
        let cli = Cli::try_parse_from(["voxd", "devices"]).unwrap();
        match cli.command {
            Some(Commands::Devices) => {}
            _ => panic!("Expected Devices command"),
        }
    }

    #[test]
    fn test_parse_global_quiet_with_subcommand() {
        let cli = Cli::try_parse_from(["voxd", "--quiet", "status"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Some(Commands::Status { .. })));
    }

    #[test]
    fn test_parse_remote_selects_address() {
        let cli = Cli::try_parse_from(["voxd", "--remote", "10.0.0.2:7700"]).unwrap();
        assert_eq!(cli.remote.as_deref(), Some("10.0.0.2:7700"));
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let result = Cli::try_parse_from(["voxd", "invalid"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_help_flag() {
        let result = Cli::try_parse_from(["voxd", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
