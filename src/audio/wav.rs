//! WAV file audio source for `voxd run --input`.

use crate::audio::pump::{self, PumpShared};
use crate::audio::source::{AudioEvent, AudioSource};
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, VoxdError};
use crossbeam_channel::Sender;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Samples handed to the pump per poll. 100ms at 16kHz.
const CHUNK_SIZE: usize = 1600;

/// Audio source backed by pre-decoded WAV data. Accepts arbitrary
/// sample rates and channel counts, normalizing to 16kHz mono.
pub struct WavSource {
    samples: Vec<i16>,
    speech_threshold: f32,
    shared: Option<Arc<PumpShared>>,
    worker: Option<JoinHandle<()>>,
    pending_silence: Option<(f32, Duration)>,
}

impl WavSource {
    /// Decode from any reader.
    pub fn from_reader(reader: Box<dyn Read + Send>, speech_threshold: f32) -> Result<Self> {
        let mut wav_reader = hound::WavReader::new(reader).map_err(|e| VoxdError::AudioCapture {
            message: format!("failed to parse WAV data: {}", e),
        })?;

        let spec = wav_reader.spec();
        let raw_samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VoxdError::AudioCapture {
                message: format!("failed to read WAV samples: {}", e),
            })?;

        let mono_samples = if spec.channels == 2 {
            raw_samples
                .chunks_exact(2)
                .map(|pair| {
                    let left = pair[0] as i32;
                    let right = pair[1] as i32;
                    ((left + right) / 2) as i16
                })
                .collect()
        } else {
            raw_samples
        };

        let samples = if spec.sample_rate != SAMPLE_RATE {
            resample(&mono_samples, spec.sample_rate, SAMPLE_RATE)
        } else {
            mono_samples
        };

        Ok(Self {
            samples,
            speech_threshold,
            shared: None,
            worker: None,
            pending_silence: None,
        })
    }

    pub fn from_path(path: &Path, speech_threshold: f32) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| VoxdError::AudioCapture {
            message: format!("failed to open {}: {}", path.display(), e),
        })?;
        Self::from_reader(Box::new(file), speech_threshold)
    }

    /// Decode from stdin. The whole stream is buffered up front because
    /// `StdinLock` is not `Send`.
    pub fn from_stdin(speech_threshold: f32) -> Result<Self> {
        use std::io::Cursor;

        let mut buffer = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut buffer)
            .map_err(|e| VoxdError::AudioCapture {
                message: format!("failed to read from stdin: {}", e),
            })?;

        Self::from_reader(Box::new(Cursor::new(buffer)), speech_threshold)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / SAMPLE_RATE as f64)
    }
}

impl AudioSource for WavSource {
    fn prepare(&mut self) -> Result<()> {
        if self.samples.is_empty() {
            return Err(VoxdError::AudioCapture {
                message: "WAV input contains no samples".to_string(),
            });
        }
        Ok(())
    }

    fn start_capture(&mut self, events: Sender<AudioEvent>) {
        let _ = events.send(AudioEvent::CaptureStarted {
            ok: true,
            message: None,
        });

        let shared = PumpShared::new();
        if let Some((threshold, duration)) = self.pending_silence.take() {
            shared.arm_watchdog(threshold, duration);
        }

        let mut remaining = std::mem::take(&mut self.samples);
        let provider = move || {
            if remaining.is_empty() {
                return None;
            }
            let take = remaining.len().min(CHUNK_SIZE);
            let chunk: Vec<i16> = remaining.drain(..take).collect();
            Some(chunk)
        };

        self.worker = Some(pump::spawn_pump(
            provider,
            shared.clone(),
            events,
            self.speech_threshold,
        ));
        self.shared = Some(shared);
    }

    fn stop_capture(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.request_stop();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn enable_silence_detection(&mut self, threshold: f32, duration: Duration) {
        match &self.shared {
            Some(shared) => shared.arm_watchdog(threshold, duration),
            None => self.pending_silence = Some((threshold, duration)),
        }
    }

    fn disable_silence_detection(&mut self) {
        self.pending_silence = None;
        if let Some(shared) = &self.shared {
            shared.disarm_watchdog();
        }
    }
}

/// Linear interpolation resampling.
pub(crate) fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}
