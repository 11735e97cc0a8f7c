//! Default configuration constants for voxd.
//!
//! Shared constants used across configuration types to keep the audio,
//! backend, and session layers in agreement.

use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Default amplitude threshold below which a chunk counts as silence.
///
/// RMS-based threshold (0.0 to 1.0) tuned for typical microphone input
/// levels; loud enough to ignore ambient noise, low enough to catch
/// quiet speakers.
pub const SILENCE_THRESHOLD: f32 = 0.02;

/// Default trailing-silence duration before a free-speak session
/// auto-stops.
pub const SILENCE_DURATION: Duration = Duration::from_millis(1500);

/// Default recovery window after flush completes.
///
/// If the backend never delivers the final fragment within this window,
/// the session is forced back to idle so the user is never stuck.
/// Override in `[session]`.
pub const RECOVERY_WINDOW: Duration = Duration::from_secs(5);

/// Default bounded wait for the backend to acknowledge `start_session`.
pub const START_ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Default interval between refining partial results from the local
/// backend.
pub const PARTIAL_INTERVAL: Duration = Duration::from_millis(1200);

/// Capture worker poll interval (~60Hz).
pub const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Default language code for transcription.
///
/// "auto" lets the model detect the spoken language.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Default address for the remote streaming backend.
pub const REMOTE_ADDR: &str = "127.0.0.1:7700";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_is_speech_standard() {
        assert_eq!(SAMPLE_RATE, 16000);
    }

    #[test]
    fn recovery_window_exceeds_start_ack() {
        // A backend slow enough to miss the start ack should not get a
        // shorter grace period for its final result.
        assert!(RECOVERY_WINDOW >= START_ACK_TIMEOUT);
    }

    #[test]
    fn silence_threshold_in_unit_range() {
        assert!(SILENCE_THRESHOLD > 0.0 && SILENCE_THRESHOLD < 1.0);
    }
}
