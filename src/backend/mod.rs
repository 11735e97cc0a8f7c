//! Transcription backends: engines that turn fed audio into text.

pub mod local;
pub mod protocol;
pub mod remote;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

use crate::audio::source::{CallLog, log_call};
use crate::error::Result;
use crate::session::SessionConfig;
use crossbeam_channel::Sender;
use std::time::Duration;

/// Events a backend reports to its subscriber.
///
/// Events for one backend session are delivered in order on a single
/// channel; `Final` is always the last text event of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Acknowledgement of `start_session`. `ok: false` carries the
    /// reason the backend could not start.
    SessionStarted { ok: bool, message: Option<String> },
    /// Provisional transcript; replaced wholesale by the next one.
    Partial(String),
    /// The definitive transcript for the session.
    Final(String),
    /// The engine failed mid-session; no final transcript will follow.
    Error(String),
    /// Transport connectivity changed (remote backends).
    ConnectionChanged(bool),
}

/// A transcription engine consuming session audio.
///
/// All methods are called from the orchestrator's controller thread.
/// Acknowledgements and text arrive asynchronously on the registered
/// event channel, never as return values.
pub trait TranscriptionBackend: Send {
    /// Whether the backend can accept a new session right now.
    fn is_ready(&self) -> bool;

    /// Register the channel for this backend's events. Registered once,
    /// before the first session; the channel outlives individual sessions.
    fn set_event_sender(&mut self, events: Sender<BackendEvent>);

    /// Begin a session. The outcome arrives as `SessionStarted`.
    fn start_session(&mut self, config: &SessionConfig) -> Result<()>;

    /// Feed captured audio, in capture order.
    fn feed_audio(&mut self, samples: &[i16]) -> Result<()>;

    /// No more audio will arrive; produce the final transcript.
    /// Audio already fed must be consumed before the stop takes effect.
    fn flush_and_stop(&mut self) -> Result<()>;

    /// Drop the session without producing a final transcript.
    fn stop_immediately(&mut self) -> Result<()>;
}

/// Scripted backend for orchestrator tests.
pub struct MockBackend {
    events: Option<Sender<BackendEvent>>,
    ready: bool,
    ack: AckBehavior,
    partials: Vec<String>,
    next_partial: usize,
    final_text: Option<String>,
    final_delay: Option<Duration>,
    call_log: Option<CallLog>,
}

enum AckBehavior {
    Ack,
    Reject(String),
    Silent,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            events: None,
            ready: true,
            ack: AckBehavior::Ack,
            partials: Vec::new(),
            next_partial: 0,
            final_text: Some("mock final transcript".to_string()),
            final_delay: None,
            call_log: None,
        }
    }

    /// Backend reports not ready; `start_session` must never be reached.
    pub fn with_not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Session start is rejected asynchronously with this message.
    pub fn with_start_rejection(mut self, message: &str) -> Self {
        self.ack = AckBehavior::Reject(message.to_string());
        self
    }

    /// The start acknowledgement never arrives.
    pub fn with_no_ack(mut self) -> Self {
        self.ack = AckBehavior::Silent;
        self
    }

    /// Emit one scripted partial per `feed_audio` call, in order.
    pub fn with_partials(mut self, partials: &[&str]) -> Self {
        self.partials = partials.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_final(mut self, text: &str) -> Self {
        self.final_text = Some(text.to_string());
        self
    }

    /// The final transcript never arrives after `flush_and_stop`.
    pub fn with_no_final(mut self) -> Self {
        self.final_text = None;
        self
    }

    /// Deliver the final transcript from a worker thread after a delay.
    pub fn with_final_delay(mut self, delay: Duration) -> Self {
        self.final_delay = Some(delay);
        self
    }

    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.call_log = Some(log);
        self
    }

    fn send(&self, event: BackendEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptionBackend for MockBackend {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn set_event_sender(&mut self, events: Sender<BackendEvent>) {
        self.events = Some(events);
    }

    fn start_session(&mut self, _config: &SessionConfig) -> Result<()> {
        log_call(&self.call_log, "backend.start_session");
        self.next_partial = 0;
        match &self.ack {
            AckBehavior::Ack => self.send(BackendEvent::SessionStarted {
                ok: true,
                message: None,
            }),
            AckBehavior::Reject(message) => self.send(BackendEvent::SessionStarted {
                ok: false,
                message: Some(message.clone()),
            }),
            AckBehavior::Silent => {}
        }
        Ok(())
    }

    fn feed_audio(&mut self, _samples: &[i16]) -> Result<()> {
        log_call(&self.call_log, "backend.feed");
        if let Some(partial) = self.partials.get(self.next_partial) {
            self.next_partial += 1;
            let partial = partial.clone();
            self.send(BackendEvent::Partial(partial));
        }
        Ok(())
    }

    fn flush_and_stop(&mut self) -> Result<()> {
        log_call(&self.call_log, "backend.flush");
        let Some(text) = self.final_text.clone() else {
            return Ok(());
        };
        match (self.final_delay, &self.events) {
            (Some(delay), Some(events)) => {
                let events = events.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    let _ = events.send(BackendEvent::Final(text));
                });
            }
            _ => self.send(BackendEvent::Final(text)),
        }
        Ok(())
    }

    fn stop_immediately(&mut self) -> Result<()> {
        log_call(&self.call_log, "backend.stop_immediately");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::call_log;
    use crossbeam_channel::unbounded;

    fn started(events: &crossbeam_channel::Receiver<BackendEvent>) -> BackendEvent {
        events
            .recv_timeout(Duration::from_millis(200))
            .expect("expected an event")
    }

    #[test]
    fn mock_acks_session_start() {
        let (tx, rx) = unbounded();
        let mut backend = MockBackend::new();
        backend.set_event_sender(tx);
        backend.start_session(&SessionConfig::default()).unwrap();

        assert_eq!(
            started(&rx),
            BackendEvent::SessionStarted {
                ok: true,
                message: None
            }
        );
    }

    #[test]
    fn mock_rejection_carries_message() {
        let (tx, rx) = unbounded();
        let mut backend = MockBackend::new().with_start_rejection("engine busy");
        backend.set_event_sender(tx);
        backend.start_session(&SessionConfig::default()).unwrap();

        assert_eq!(
            started(&rx),
            BackendEvent::SessionStarted {
                ok: false,
                message: Some("engine busy".to_string())
            }
        );
    }

    #[test]
    fn mock_no_ack_stays_silent() {
        let (tx, rx) = unbounded();
        let mut backend = MockBackend::new().with_no_ack();
        backend.set_event_sender(tx);
        backend.start_session(&SessionConfig::default()).unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn mock_emits_partials_per_feed_then_final_on_flush() {
        let (tx, rx) = unbounded();
        let mut backend = MockBackend::new()
            .with_partials(&["hel", "hello wo"])
            .with_final("hello world");
        backend.set_event_sender(tx);
        backend.start_session(&SessionConfig::default()).unwrap();
        let _ = started(&rx);

        backend.feed_audio(&[0i16; 160]).unwrap();
        backend.feed_audio(&[0i16; 160]).unwrap();
        backend.feed_audio(&[0i16; 160]).unwrap();
        backend.flush_and_stop().unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                BackendEvent::Partial("hel".to_string()),
                BackendEvent::Partial("hello wo".to_string()),
                BackendEvent::Final("hello world".to_string()),
            ]
        );
    }

    #[test]
    fn mock_no_final_never_delivers() {
        let (tx, rx) = unbounded();
        let mut backend = MockBackend::new().with_no_final();
        backend.set_event_sender(tx);
        backend.start_session(&SessionConfig::default()).unwrap();
        let _ = started(&rx);

        backend.flush_and_stop().unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn mock_delayed_final_arrives_later() {
        let (tx, rx) = unbounded();
        let mut backend = MockBackend::new()
            .with_final("late")
            .with_final_delay(Duration::from_millis(30));
        backend.set_event_sender(tx);
        backend.start_session(&SessionConfig::default()).unwrap();
        let _ = started(&rx);

        backend.flush_and_stop().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(500)).unwrap(),
            BackendEvent::Final("late".to_string())
        );
    }

    #[test]
    fn mock_records_call_order() {
        let log = call_log();
        let (tx, _rx) = unbounded();
        let mut backend = MockBackend::new().with_call_log(log.clone());
        backend.set_event_sender(tx);

        backend.start_session(&SessionConfig::default()).unwrap();
        backend.feed_audio(&[0i16; 10]).unwrap();
        backend.flush_and_stop().unwrap();

        let calls = log.lock().unwrap();
        assert_eq!(
            *calls,
            vec!["backend.start_session", "backend.feed", "backend.flush"]
        );
    }

    #[test]
    fn mock_readiness_flag() {
        assert!(MockBackend::new().is_ready());
        assert!(!MockBackend::new().with_not_ready().is_ready());
    }
}
