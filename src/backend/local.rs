//! In-process transcription backend wrapping a [`Transcriber`] engine.
//!
//! Fed audio accumulates in a shared buffer. A per-session worker
//! re-transcribes the growing buffer on an interval to produce refining
//! partials, then runs one last pass over everything for the final
//! transcript. A generation counter silences workers of sessions that
//! were cancelled while an inference pass was in flight.

use crate::backend::{BackendEvent, TranscriptionBackend};
use crate::defaults;
use crate::error::{Result, VoxdError};
use crate::session::SessionConfig;
use crate::stt::Transcriber;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Don't attempt a partial pass on less than this much audio.
const MIN_PARTIAL_SAMPLES: usize = (defaults::SAMPLE_RATE / 2) as usize;

enum WorkerControl {
    Flush,
    Cancel,
}

pub struct LocalBackend {
    transcriber: Arc<dyn Transcriber>,
    events: Option<Sender<BackendEvent>>,
    partial_interval: Duration,
    generation: Arc<AtomicU64>,
    session: Option<ActiveSession>,
}

struct ActiveSession {
    buffer: Arc<Mutex<Vec<i16>>>,
    control: Sender<WorkerControl>,
}

impl LocalBackend {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            transcriber,
            events: None,
            partial_interval: defaults::PARTIAL_INTERVAL,
            generation: Arc::new(AtomicU64::new(0)),
            session: None,
        }
    }

    pub fn with_partial_interval(mut self, interval: Duration) -> Self {
        self.partial_interval = interval;
        self
    }

    fn send(&self, event: BackendEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

impl TranscriptionBackend for LocalBackend {
    fn is_ready(&self) -> bool {
        self.transcriber.is_ready()
    }

    fn set_event_sender(&mut self, events: Sender<BackendEvent>) {
        self.events = Some(events);
    }

    fn start_session(&mut self, _config: &SessionConfig) -> Result<()> {
        if self.session.is_some() {
            return Err(VoxdError::Backend {
                message: "a backend session is already active".to_string(),
            });
        }
        if !self.transcriber.is_ready() {
            self.send(BackendEvent::SessionStarted {
                ok: false,
                message: Some(format!(
                    "engine {} is not ready",
                    self.transcriber.model_name()
                )),
            });
            return Ok(());
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (control_tx, control_rx) = bounded(1);

        if let Some(events) = &self.events {
            spawn_worker(WorkerContext {
                transcriber: Arc::clone(&self.transcriber),
                buffer: Arc::clone(&buffer),
                events: events.clone(),
                control: control_rx,
                current_generation: Arc::clone(&self.generation),
                generation,
                partial_interval: self.partial_interval,
            });
        }

        self.session = Some(ActiveSession {
            buffer,
            control: control_tx,
        });
        self.send(BackendEvent::SessionStarted {
            ok: true,
            message: None,
        });
        Ok(())
    }

    fn feed_audio(&mut self, samples: &[i16]) -> Result<()> {
        let session = self.session.as_ref().ok_or_else(|| VoxdError::Backend {
            message: "no backend session is active".to_string(),
        })?;
        let mut buffer = session.buffer.lock().map_err(|_| VoxdError::Backend {
            message: "audio buffer lock poisoned".to_string(),
        })?;
        buffer.extend_from_slice(samples);
        Ok(())
    }

    fn flush_and_stop(&mut self) -> Result<()> {
        let session = self.session.take().ok_or_else(|| VoxdError::Backend {
            message: "no backend session is active".to_string(),
        })?;
        // The worker runs the final pass and exits on its own.
        let _ = session.control.send(WorkerControl::Flush);
        Ok(())
    }

    fn stop_immediately(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            // Bump first so a pass already in flight is dropped.
            self.generation.fetch_add(1, Ordering::SeqCst);
            let _ = session.control.send(WorkerControl::Cancel);
        }
        Ok(())
    }
}

struct WorkerContext {
    transcriber: Arc<dyn Transcriber>,
    buffer: Arc<Mutex<Vec<i16>>>,
    events: Sender<BackendEvent>,
    control: Receiver<WorkerControl>,
    current_generation: Arc<AtomicU64>,
    generation: u64,
    partial_interval: Duration,
}

impl WorkerContext {
    fn is_current(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    fn snapshot(&self) -> Vec<i16> {
        self.buffer
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }
}

fn spawn_worker(ctx: WorkerContext) {
    thread::spawn(move || {
        let mut last_len = 0usize;
        loop {
            match ctx.control.recv_timeout(ctx.partial_interval) {
                Ok(WorkerControl::Flush) => {
                    let audio = ctx.snapshot();
                    if !ctx.is_current() {
                        return;
                    }
                    let event = match ctx.transcriber.transcribe(&audio) {
                        Ok(text) => BackendEvent::Final(text),
                        Err(e) => BackendEvent::Error(e.to_string()),
                    };
                    if ctx.is_current() {
                        let _ = ctx.events.send(event);
                    }
                    return;
                }
                Ok(WorkerControl::Cancel) => return,
                Err(RecvTimeoutError::Timeout) => {
                    let audio = ctx.snapshot();
                    if audio.len() <= last_len || audio.len() < MIN_PARTIAL_SAMPLES {
                        continue;
                    }
                    last_len = audio.len();
                    if !ctx.is_current() {
                        return;
                    }
                    // Partial pass failures are not fatal; the final
                    // pass reports them if they persist.
                    if let Ok(text) = ctx.transcriber.transcribe(&audio)
                        && !text.is_empty()
                        && ctx.is_current()
                    {
                        let _ = ctx.events.send(BackendEvent::Partial(text));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    });
}
