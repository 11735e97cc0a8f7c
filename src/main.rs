use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use voxd::cli::{Cli, Commands};
use voxd::config::{BackendKind, Config};
use voxd::daemon::run_daemon;
use voxd::ipc::client::send_command;
use voxd::ipc::protocol::{Command, Response};
use voxd::ipc::server::IpcServer;
use voxd::session::{CaptureSource, SessionMode};

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    let command = cli.command.take();

    match command {
        None | Some(Commands::Run { .. }) => {
            let config = apply_overrides(load_config(cli.config.as_deref())?, &cli);
            let (input, silence) = match command {
                Some(Commands::Run { input, silence }) => (input, silence),
                _ => (None, None),
            };
            voxd::app::run_file_command(
                config,
                input.as_deref(),
                silence,
                cli.quiet,
                cli.verbose,
            )?;
        }
        Some(Commands::Daemon { socket }) => {
            let config = apply_overrides(load_config(cli.config.as_deref())?, &cli);
            run_daemon(config, socket, cli.quiet, cli.verbose).await?;
        }
        Some(Commands::Start {
            socket,
            system,
            free_speak,
        }) => {
            let (source, mode) = if system {
                (CaptureSource::SystemAudio, SessionMode::Subtitle)
            } else {
                (CaptureSource::Microphone, SessionMode::VoiceInput)
            };
            handle_ipc_command(
                socket,
                Command::Start {
                    source,
                    mode,
                    free_speak,
                },
            )
            .await?;
        }
        Some(Commands::Stop { socket }) => {
            handle_ipc_command(socket, Command::Stop).await?;
        }
        Some(Commands::Cancel { socket }) => {
            handle_ipc_command(socket, Command::Cancel).await?;
        }
        Some(Commands::Status { socket }) => {
            handle_ipc_command(socket, Command::Status).await?;
        }
        Some(Commands::Shutdown { socket }) => {
            handle_ipc_command(socket, Command::Shutdown).await?;
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/voxd/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else if let Some(default_path) = Config::default_path() {
        Config::load_or_default(&default_path)?
    } else {
        Config::default()
    };

    Ok(config.with_env_overrides())
}

/// Apply CLI flag overrides on top of the loaded configuration.
fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(device) = &cli.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(model) = &cli.model {
        config.backend.model_path = model.clone();
    }
    if let Some(language) = &cli.language {
        config.backend.language = language.clone();
    }
    if let Some(remote) = &cli.remote {
        config.backend.remote_addr = remote.clone();
        config.backend.kind = BackendKind::Remote;
    }
    config
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = voxd::audio::capture::list_input_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    eprintln!("This build has no live audio support (cpal-audio feature disabled)");
    std::process::exit(1);
}

/// Send an IPC command to the daemon and render the response.
async fn handle_ipc_command(socket: Option<PathBuf>, command: Command) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    match send_command(&socket_path, command).await {
        Ok(response) => match response {
            Response::Ok => {
                println!("{}", "OK".green());
            }
            Response::Started { session_id } => {
                println!("{} (session {})", "Recording".green(), session_id);
            }
            Response::Transcription { text } => {
                println!("{}", text);
            }
            Response::Status {
                state,
                session_id,
                source,
                backend_ready,
            } => {
                println!("Daemon status:");
                println!("  {}    {}", "State:".dimmed(), state);
                match session_id {
                    Some(id) => println!("  {}  {}", "Session:".dimmed(), id),
                    None => println!("  {}  none", "Session:".dimmed()),
                }
                if let Some(source) = source {
                    println!("  {}   {}", "Source:".dimmed(), source);
                }
                if backend_ready {
                    println!("  {}  {}", "Backend:".dimmed(), "ready".green());
                } else {
                    println!("  {}  {}", "Backend:".dimmed(), "not ready".red());
                }
            }
            Response::Error { message } => {
                eprintln!("{}", format!("Error: {}", message).red());
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!(
                "{}",
                format!("Failed to communicate with daemon: {}", e).red()
            );
            eprintln!("Is the daemon running? Start it with: voxd daemon");
            std::process::exit(1);
        }
    }

    Ok(())
}
