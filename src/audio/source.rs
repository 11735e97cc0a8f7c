//! The audio source capability.
//!
//! Capture delivery is crossbeam channel sends rather than callbacks:
//! each capture period gets a fresh `Sender<AudioEvent>`,
//! and because a single channel carries chunks, telemetry, and the
//! final `Flushed` marker in order, the flush guarantee ("every
//! already-captured chunk has been delivered before the stop completes")
//! is a property of channel ordering rather than locking.

use crate::error::Result;
use crate::session::TelemetrySample;
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Events a capturing source pushes to its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// The underlying device is actually running (or failed to).
    ///
    /// Device/permission failure is expected and recoverable, so it is
    /// reported here rather than as an error return from
    /// `start_capture`. Reported once; the source does not retry.
    CaptureStarted { ok: bool, message: Option<String> },
    /// One chunk of 16-bit PCM at 16kHz mono, in capture order.
    Chunk(Vec<i16>),
    /// Continuous signal telemetry, pushed while capturing.
    Telemetry(TelemetrySample),
    /// Trailing silence exceeded the armed duration. Fires at most once
    /// per armed period; re-arm to fire again.
    SilenceElapsed,
    /// Every chunk captured before `stop_capture` has been delivered.
    Flushed,
}

/// Trait for live audio sources (microphone, system loop-back, file).
///
/// Allows swapping implementations (real device vs mock). Completions
/// arrive as [`AudioEvent`]s on the sender registered at
/// `start_capture`, never as return values; implementations may block
/// for a bounded time (device probing, joining a capture worker) but
/// never wait on an unbounded condition.
pub trait AudioSource: Send {
    /// Acquire and validate device access without starting capture.
    fn prepare(&mut self) -> Result<()>;

    /// Begin delivering chunks asynchronously on `events`.
    ///
    /// Emits `CaptureStarted { ok: true, .. }` once the device is
    /// actually running, or `ok: false` with a message on failure.
    fn start_capture(&mut self, events: Sender<AudioEvent>);

    /// Stop producing new chunks; emits `Flushed` only after every
    /// already-captured chunk has been delivered.
    fn stop_capture(&mut self);

    /// Arm the trailing-silence watchdog.
    fn enable_silence_detection(&mut self, threshold: f32, duration: Duration);

    /// Disarm the trailing-silence watchdog.
    fn disable_silence_detection(&mut self);
}

/// Shared call log used by mocks so tests can assert cross-component
/// call ordering (e.g. capture flush before backend stop).
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Create an empty call log.
pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Record an entry on a call log, tolerating a poisoned lock in tests.
pub(crate) fn log_call(log: &Option<CallLog>, entry: &str) {
    if let Some(log) = log
        && let Ok(mut entries) = log.lock()
    {
        entries.push(entry.to_string());
    }
}

/// Source for a slot that has no device behind it, e.g. the system-audio
/// slot during a file run. Rejects every start attempt at `prepare`.
#[derive(Debug, Clone, Default)]
pub struct NullSource;

impl NullSource {
    pub fn new() -> Self {
        Self
    }
}

impl AudioSource for NullSource {
    fn prepare(&mut self) -> Result<()> {
        Err(crate::error::VoxdError::AudioDeviceNotFound {
            device: "none".to_string(),
        })
    }

    fn start_capture(&mut self, _events: Sender<AudioEvent>) {}

    fn stop_capture(&mut self) {}

    fn enable_silence_detection(&mut self, _threshold: f32, _duration: Duration) {}

    fn disable_silence_detection(&mut self) {}
}

/// Scripted audio source for testing.
///
/// On a successful start it emits the configured head chunks right after
/// `CaptureStarted`; on stop it emits the configured tail chunks and
/// then `Flushed`, which is exactly the flush guarantee orchestrator
/// tests need to exercise.
pub struct MockAudioSource {
    head_chunks: Vec<Vec<i16>>,
    tail_chunks: Vec<Vec<i16>>,
    fail_prepare: bool,
    fail_start: bool,
    silence_on_arm: bool,
    error_message: String,
    events: Option<Sender<AudioEvent>>,
    silence_armed: bool,
    call_log: Option<CallLog>,
}

impl MockAudioSource {
    pub fn new() -> Self {
        Self {
            head_chunks: vec![vec![0i16; 160]],
            tail_chunks: Vec::new(),
            fail_prepare: false,
            fail_start: false,
            silence_on_arm: false,
            error_message: "mock audio error".to_string(),
            events: None,
            silence_armed: false,
            call_log: None,
        }
    }

    /// Chunks emitted immediately after a successful capture start.
    pub fn with_chunks(mut self, chunks: Vec<Vec<i16>>) -> Self {
        self.head_chunks = chunks;
        self
    }

    /// Chunks emitted between `stop_capture` and `Flushed`.
    pub fn with_tail_chunks(mut self, chunks: Vec<Vec<i16>>) -> Self {
        self.tail_chunks = chunks;
        self
    }

    /// Fail `prepare` with the configured message.
    pub fn with_prepare_failure(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    /// Report `CaptureStarted { ok: false }` instead of starting.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Emit `SilenceElapsed` as soon as silence detection is armed.
    pub fn with_silence_on_arm(mut self) -> Self {
        self.silence_on_arm = true;
        self
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Record calls on a shared log for cross-component ordering tests.
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.call_log = Some(log);
        self
    }

    fn send(&self, event: AudioEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn prepare(&mut self) -> Result<()> {
        log_call(&self.call_log, "source.prepare");
        if self.fail_prepare {
            Err(crate::error::VoxdError::AudioCapture {
                message: self.error_message.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn start_capture(&mut self, events: Sender<AudioEvent>) {
        log_call(&self.call_log, "source.start_capture");
        self.events = Some(events);
        if self.fail_start {
            self.send(AudioEvent::CaptureStarted {
                ok: false,
                message: Some(self.error_message.clone()),
            });
            return;
        }
        self.send(AudioEvent::CaptureStarted {
            ok: true,
            message: None,
        });
        for chunk in self.head_chunks.clone() {
            self.send(AudioEvent::Chunk(chunk));
        }
    }

    fn stop_capture(&mut self) {
        log_call(&self.call_log, "source.stop_capture");
        for chunk in self.tail_chunks.clone() {
            self.send(AudioEvent::Chunk(chunk));
        }
        self.send(AudioEvent::Flushed);
        self.events = None;
    }

    fn enable_silence_detection(&mut self, _threshold: f32, _duration: Duration) {
        log_call(&self.call_log, "source.enable_silence");
        self.silence_armed = true;
        if self.silence_on_arm {
            self.send(AudioEvent::SilenceElapsed);
        }
    }

    fn disable_silence_detection(&mut self) {
        log_call(&self.call_log, "source.disable_silence");
        self.silence_armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn mock_emits_started_then_chunks_in_order() {
        let (tx, rx) = unbounded();
        let mut source =
            MockAudioSource::new().with_chunks(vec![vec![1i16; 10], vec![2i16; 10]]);

        source.start_capture(tx);

        assert_eq!(
            rx.recv().unwrap(),
            AudioEvent::CaptureStarted {
                ok: true,
                message: None
            }
        );
        assert_eq!(rx.recv().unwrap(), AudioEvent::Chunk(vec![1i16; 10]));
        assert_eq!(rx.recv().unwrap(), AudioEvent::Chunk(vec![2i16; 10]));
    }

    #[test]
    fn mock_start_failure_reports_once_via_event() {
        let (tx, rx) = unbounded();
        let mut source = MockAudioSource::new()
            .with_start_failure()
            .with_error_message("device busy");

        source.start_capture(tx);

        assert_eq!(
            rx.recv().unwrap(),
            AudioEvent::CaptureStarted {
                ok: false,
                message: Some("device busy".to_string())
            }
        );
        // No retry, no chunks.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn mock_flush_delivers_tail_chunks_before_flushed() {
        let (tx, rx) = unbounded();
        let mut source = MockAudioSource::new()
            .with_chunks(vec![])
            .with_tail_chunks(vec![vec![9i16; 4]]);

        source.start_capture(tx);
        assert!(matches!(
            rx.recv().unwrap(),
            AudioEvent::CaptureStarted { ok: true, .. }
        ));

        source.stop_capture();
        assert_eq!(rx.recv().unwrap(), AudioEvent::Chunk(vec![9i16; 4]));
        assert_eq!(rx.recv().unwrap(), AudioEvent::Flushed);
    }

    #[test]
    fn mock_prepare_failure() {
        let mut source = MockAudioSource::new().with_prepare_failure();
        assert!(source.prepare().is_err());
    }

    #[test]
    fn mock_silence_fires_only_when_armed() {
        let (tx, rx) = unbounded();
        let mut source = MockAudioSource::new()
            .with_chunks(vec![])
            .with_silence_on_arm();

        source.start_capture(tx);
        let _ = rx.recv().unwrap(); // CaptureStarted

        assert!(rx.try_recv().is_err());
        source.enable_silence_detection(0.02, Duration::from_secs(2));
        assert_eq!(rx.recv().unwrap(), AudioEvent::SilenceElapsed);
    }

    #[test]
    fn call_log_records_order() {
        let log = call_log();
        let (tx, _rx) = unbounded();
        let mut source = MockAudioSource::new().with_call_log(log.clone());

        source.prepare().unwrap();
        source.start_capture(tx);
        source.stop_capture();

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec!["source.prepare", "source.start_capture", "source.stop_capture"]
        );
    }

    #[test]
    fn trait_is_object_safe() {
        let source: Box<dyn AudioSource> = Box::new(MockAudioSource::new());
        drop(source);
    }
}
