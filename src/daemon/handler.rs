//! Command handler implementation for the daemon.

use crate::daemon::{DaemonState, SessionOutcome};
use crate::ipc::protocol::{Command, Response};
use crate::ipc::server::CommandHandler;
use crate::session::orchestrator::StartRequest;
use crate::session::{CaptureSource, SessionConfig, SessionMode};
use std::sync::Arc;

/// Command handler for daemon IPC commands.
pub struct DaemonCommandHandler {
    state: Arc<DaemonState>,
}

impl DaemonCommandHandler {
    pub fn new(state: DaemonState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    fn start_session(&self, source: CaptureSource, mode: SessionMode, free_speak: bool) -> Response {
        let free_speak = free_speak || self.state.config.session.free_speak;

        let session_config = SessionConfig {
            language: self.state.config.backend.language.clone(),
            prompt: None,
            vocabulary: Vec::new(),
            free_speak,
        };

        let mut request = match source {
            CaptureSource::Microphone => StartRequest::microphone(),
            CaptureSource::SystemAudio => StartRequest::system_audio(),
        };
        request.mode = mode;
        request = request.with_config(session_config);
        if free_speak {
            request = request.with_silence_auto_stop();
        }

        // Drain outcomes of earlier sessions so a following stop does
        // not pick up a stale result.
        while self.state.outcomes.try_recv().is_ok() {}

        match self.state.handle.request_start(request) {
            Ok(session_id) => Response::Started { session_id },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        }
    }

    /// Stop the active session, then wait (bounded) for its outcome.
    fn stop_session(&self) -> Response {
        if let Err(e) = self.state.handle.request_stop() {
            return Response::Error {
                message: e.to_string(),
            };
        }

        match self.state.outcomes.recv_timeout(self.state.stop_wait) {
            Ok(SessionOutcome::Final(text)) => Response::Transcription { text },
            Ok(SessionOutcome::Failed(message)) => Response::Error { message },
            // The orchestrator's own recovery timeout publishes a
            // failure before this fires; treat it as stopped anyway.
            Err(_) => Response::Ok,
        }
    }

    fn cancel_session(&self) -> Response {
        match self.state.handle.cancel() {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        }
    }

    fn get_status(&self) -> Response {
        match self.state.handle.status() {
            Ok(report) => Response::Status {
                state: report.state,
                session_id: report.session_id,
                source: report.source,
                backend_ready: report.backend_ready,
            },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Start {
                source,
                mode,
                free_speak,
            } => self.start_session(source, mode, free_speak),
            Command::Stop => {
                // Waits up to stop_wait for the final transcript.
                let state = Arc::clone(&self.state);
                tokio::task::spawn_blocking(move || {
                    DaemonCommandHandler { state }.stop_session()
                })
                .await
                .unwrap_or_else(|e| Response::Error {
                    message: format!("stop task failed: {}", e),
                })
            }
            Command::Cancel => self.cancel_session(),
            Command::Status => self.get_status(),
            Command::Shutdown => {
                self.state.shutdown.notify_one();
                Response::Ok
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::MockAudioSource;
    use crate::backend::MockBackend;
    use crate::config::Config;
    use crate::daemon::spawn_event_consumer;
    use crate::session::orchestrator::{Orchestrator, OrchestratorConfig};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn test_handler(backend: MockBackend) -> DaemonCommandHandler {
        let config = Config::default();
        let orchestrator_config = OrchestratorConfig {
            start_ack_timeout: Duration::from_millis(500),
            recovery_window: Duration::from_millis(500),
            quiet: true,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(
            Box::new(MockAudioSource::new().with_chunks(vec![vec![100i16; 160]])),
            Box::new(MockAudioSource::new()),
            Box::new(backend),
            orchestrator_config,
        );
        let (handle, events) = orchestrator.spawn();
        let (outcomes, _consumer) =
            spawn_event_consumer(events, config.output.clone(), true, 0);

        DaemonCommandHandler::new(DaemonState {
            handle,
            outcomes,
            config,
            stop_wait: Duration::from_secs(2),
            shutdown: Arc::new(Notify::new()),
        })
    }

    #[tokio::test]
    async fn status_when_idle() {
        let handler = test_handler(MockBackend::new());
        let response = handler.handle(Command::Status).await;
        match response {
            Response::Status {
                session_id,
                backend_ready,
                ..
            } => {
                assert_eq!(session_id, None);
                assert!(backend_ready);
            }
            other => panic!("expected Status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stop_when_not_recording_is_an_error() {
        let handler = test_handler(MockBackend::new());
        let response = handler.handle(Command::Stop).await;
        match response {
            Response::Error { message } => {
                assert!(message.contains("No session is active"));
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancel_when_not_recording_is_an_error() {
        let handler = test_handler(MockBackend::new());
        let response = handler.handle(Command::Cancel).await;
        assert!(matches!(response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn start_then_stop_returns_transcript() {
        let handler = test_handler(MockBackend::new().with_final("hello world"));

        let response = handler
            .handle(Command::Start {
                source: CaptureSource::Microphone,
                mode: SessionMode::VoiceInput,
                free_speak: false,
            })
            .await;
        let session_id = match response {
            Response::Started { session_id } => session_id,
            other => panic!("expected Started, got {:?}", other),
        };
        assert!(session_id > 0);

        // Let capture come up before stopping.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let response = handler.handle(Command::Stop).await;
        assert_eq!(
            response,
            Response::Transcription {
                text: "hello world".to_string()
            }
        );
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_active() {
        let handler = test_handler(MockBackend::new().with_final("x"));

        let start = Command::Start {
            source: CaptureSource::Microphone,
            mode: SessionMode::VoiceInput,
            free_speak: false,
        };
        assert!(matches!(
            handler.handle(start.clone()).await,
            Response::Started { .. }
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let response = handler.handle(start).await;
        match response {
            Response::Error { message } => {
                assert!(message.contains("already active"));
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn shutdown_signals_the_daemon() {
        let handler = test_handler(MockBackend::new());
        let shutdown = Arc::clone(&handler.state.shutdown);

        let waiter = tokio::spawn(async move { shutdown.notified().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let response = handler.handle(Command::Shutdown).await;
        assert_eq!(response, Response::Ok);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("shutdown should be signalled")
            .unwrap();
    }
}
