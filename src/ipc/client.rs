//! IPC client for sending commands to the daemon.

use crate::error::{Result, VoxdError};
use crate::ipc::protocol::{Command, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Send one command to the daemon and read its response.
///
/// # Errors
/// Returns `VoxdError::IpcConnection` if connection fails,
/// `VoxdError::IpcProtocol` if serialization/deserialization fails.
pub async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| VoxdError::IpcConnection {
            message: format!("Failed to connect to daemon: {}", e),
        })?;

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let command_json = command.to_json().map_err(|e| VoxdError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;

    writer
        .write_all(command_json.as_bytes())
        .await
        .map_err(|e| VoxdError::IpcConnection {
            message: format!("Failed to write command: {}", e),
        })?;

    writer
        .write_all(b"\n")
        .await
        .map_err(|e| VoxdError::IpcConnection {
            message: format!("Failed to write newline: {}", e),
        })?;

    writer.flush().await.map_err(|e| VoxdError::IpcConnection {
        message: format!("Failed to flush writer: {}", e),
    })?;

    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .await
        .map_err(|e| VoxdError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;

    let response =
        Response::from_json(response_line.trim()).map_err(|e| VoxdError::IpcProtocol {
            message: format!("Failed to deserialize response: {}", e),
        })?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::{CommandHandler, IpcServer};
    use crate::session::{CaptureSource, SessionMode, SessionState};
    use tempfile::TempDir;

    struct MockHandler;

    #[async_trait::async_trait]
    impl CommandHandler for MockHandler {
        async fn handle(&self, command: Command) -> Response {
            match command {
                Command::Start { source, .. } => {
                    if source == CaptureSource::SystemAudio {
                        Response::Error {
                            message: "no monitor device".to_string(),
                        }
                    } else {
                        Response::Started { session_id: 3 }
                    }
                }
                Command::Stop => Response::Transcription {
                    text: "test transcription".to_string(),
                },
                Command::Cancel => Response::Ok,
                Command::Status => Response::Status {
                    state: SessionState::Idle,
                    session_id: None,
                    source: None,
                    backend_ready: true,
                },
                Command::Shutdown => Response::Ok,
            }
        }
    }

    async fn spawn_server(socket_path: std::path::PathBuf) {
        tokio::spawn(async move {
            let server = IpcServer::new(socket_path);
            server.start(MockHandler).await
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn send_status_command() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        spawn_server(socket_path.clone()).await;

        let response = send_command(&socket_path, Command::Status).await.unwrap();
        match response {
            Response::Status {
                state,
                backend_ready,
                ..
            } => {
                assert_eq!(state, SessionState::Idle);
                assert!(backend_ready);
            }
            other => panic!("expected Status response, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_start_command() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        spawn_server(socket_path.clone()).await;

        let response = send_command(
            &socket_path,
            Command::Start {
                source: CaptureSource::Microphone,
                mode: SessionMode::VoiceInput,
                free_speak: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(response, Response::Started { session_id: 3 });
    }

    #[tokio::test]
    async fn error_responses_survive_the_wire() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        spawn_server(socket_path.clone()).await;

        let response = send_command(
            &socket_path,
            Command::Start {
                source: CaptureSource::SystemAudio,
                mode: SessionMode::Subtitle,
                free_speak: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            response,
            Response::Error {
                message: "no monitor device".to_string()
            }
        );
    }

    #[tokio::test]
    async fn send_stop_command() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        spawn_server(socket_path.clone()).await;

        let response = send_command(&socket_path, Command::Stop).await.unwrap();
        assert_eq!(
            response,
            Response::Transcription {
                text: "test transcription".to_string()
            }
        );
    }

    #[tokio::test]
    async fn connection_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("nonexistent.sock");

        let result = send_command(&socket_path, Command::Status).await;
        match result {
            Err(VoxdError::IpcConnection { message }) => {
                assert!(message.contains("Failed to connect to daemon"));
            }
            other => panic!("expected IpcConnection error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn sequential_commands_reuse_the_socket_path() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        spawn_server(socket_path.clone()).await;

        for _ in 0..3 {
            let response = send_command(&socket_path, Command::Status).await.unwrap();
            assert!(matches!(response, Response::Status { .. }));
        }
    }
}
