//! Signal telemetry: RMS volume, ambient-noise tracking, SNR estimate.
//!
//! The ambient level is a smoothed running average updated only during
//! quiet chunks, so the SNR estimate compares current energy against the
//! learned noise floor rather than against a fixed constant.

/// Per-chunk signal meter.
#[derive(Debug)]
pub struct SignalMeter {
    /// Running average of ambient noise level.
    ambient: f32,
    /// Smoothing factor for ambient level (0-1, higher = more smoothing).
    smoothing: f32,
    /// Quiet/loud split used for ambient tracking.
    speech_threshold: f32,
    /// Number of chunks processed.
    chunk_count: u64,
}

/// One meter reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReading {
    /// RMS level, 0.0 to 1.0.
    pub volume: f32,
    /// Estimated signal-to-noise ratio in dB, clamped to [0, 60].
    pub snr: f32,
}

impl SignalMeter {
    pub fn new(speech_threshold: f32) -> Self {
        Self {
            ambient: 0.01,
            smoothing: 0.95,
            speech_threshold,
            chunk_count: 0,
        }
    }

    /// Process one chunk and return its reading.
    pub fn observe(&mut self, samples: &[i16]) -> MeterReading {
        let volume = rms(samples);
        self.chunk_count += 1;

        // Only update ambient level during non-speech chunks; learn
        // faster during the first chunks so the floor settles quickly.
        if volume < self.speech_threshold && self.chunk_count > 10 {
            let alpha = if self.chunk_count < 100 {
                0.1
            } else {
                1.0 - self.smoothing
            };
            self.ambient = self.ambient * (1.0 - alpha) + volume * alpha;
        }

        let floor = self.ambient.max(1e-5);
        let snr = (20.0 * (volume.max(1e-5) / floor).log10()).clamp(0.0, 60.0);

        MeterReading { volume, snr }
    }

    /// Current ambient noise floor estimate.
    pub fn ambient(&self) -> f32 {
        self.ambient
    }
}

/// Normalized RMS of a 16-bit PCM chunk, 0.0 to 1.0.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = s as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();
    ((sum_sq / samples.len() as f64) as f32).sqrt()
}
