//! Capture pump: the worker loop shared by live audio sources.
//!
//! Polls a sample provider at ~60Hz, forwards chunks in capture order,
//! computes telemetry per chunk, ticks the silence watchdog, and emits
//! the `Flushed` marker after the provider has been drained following a
//! stop request. Because a single thread sends every event on one
//! channel, chunk order and the flush guarantee need no locking.

use crate::audio::meter::SignalMeter;
use crate::audio::silence::SilenceWatchdog;
use crate::audio::source::AudioEvent;
use crate::defaults;
use crate::session::TelemetrySample;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// State shared between a source and its pump thread.
#[derive(Debug)]
pub(crate) struct PumpShared {
    stop: AtomicBool,
    watchdog: Mutex<Option<SilenceWatchdog>>,
}

impl PumpShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            stop: AtomicBool::new(false),
            watchdog: Mutex::new(None),
        })
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub(crate) fn arm_watchdog(&self, threshold: f32, duration: std::time::Duration) {
        if let Ok(mut guard) = self.watchdog.lock() {
            *guard = Some(SilenceWatchdog::new(threshold, duration));
        }
    }

    pub(crate) fn disarm_watchdog(&self) {
        if let Ok(mut guard) = self.watchdog.lock() {
            *guard = None;
        }
    }
}

/// Spawn the pump thread.
///
/// `provider` returns the samples captured since the last poll; `None`
/// means the underlying stream is exhausted (finite sources). For live
/// sources an empty read is normal and simply skipped.
pub(crate) fn spawn_pump<P>(
    mut provider: P,
    shared: Arc<PumpShared>,
    events: Sender<AudioEvent>,
    speech_threshold: f32,
) -> JoinHandle<()>
where
    P: FnMut() -> Option<Vec<i16>> + Send + 'static,
{
    thread::spawn(move || {
        let mut meter = SignalMeter::new(speech_threshold);
        let mut exhausted = false;

        loop {
            if shared.stop.load(Ordering::SeqCst) {
                // Drain whatever the provider still holds before
                // signalling the flush.
                while let Some(samples) = provider() {
                    if samples.is_empty() {
                        break;
                    }
                    if events.send(AudioEvent::Chunk(samples)).is_err() {
                        break;
                    }
                }
                let _ = events.send(AudioEvent::Flushed);
                return;
            }

            let samples = if exhausted { Vec::new() } else { match provider() {
                Some(samples) => samples,
                None => {
                    exhausted = true;
                    Vec::new()
                }
            }};

            let now = Instant::now();
            if samples.is_empty() {
                // Silence from the watchdog's point of view; an
                // exhausted file behaves like a speaker who stopped.
                tick_watchdog(&shared, &events, 0.0, now);
                thread::sleep(defaults::CAPTURE_POLL_INTERVAL);
                continue;
            }

            let reading = meter.observe(&samples);

            if events.send(AudioEvent::Chunk(samples)).is_err() {
                // Subscriber is gone; nothing left to flush to.
                return;
            }

            let silence = tick_watchdog(&shared, &events, reading.volume, now);
            let _ = events.send(AudioEvent::Telemetry(TelemetrySample {
                volume: reading.volume,
                snr: reading.snr,
                silence,
            }));

            thread::sleep(defaults::CAPTURE_POLL_INTERVAL);
        }
    })
}

/// Tick the armed watchdog (if any); returns trailing silence for
/// telemetry and emits `SilenceElapsed` on first expiry.
fn tick_watchdog(
    shared: &PumpShared,
    events: &Sender<AudioEvent>,
    level: f32,
    now: Instant,
) -> std::time::Duration {
    let Ok(mut guard) = shared.watchdog.lock() else {
        return std::time::Duration::ZERO;
    };
    let Some(watchdog) = guard.as_mut() else {
        return std::time::Duration::ZERO;
    };
    if watchdog.observe(level, now) {
        let _ = events.send(AudioEvent::SilenceElapsed);
    }
    watchdog.trailing_silence(now)
}
