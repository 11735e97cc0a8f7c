//! Trailing-silence watchdog.
//!
//! Independent of telemetry: armed with a threshold and a duration, it
//! reports once when trailing silence exceeds the duration, then stays
//! quiet until disarmed and re-armed.

use std::time::{Duration, Instant};

/// Watchdog over trailing silence in a capture stream.
#[derive(Debug)]
pub struct SilenceWatchdog {
    threshold: f32,
    duration: Duration,
    silence_since: Option<Instant>,
    fired: bool,
}

impl SilenceWatchdog {
    pub fn new(threshold: f32, duration: Duration) -> Self {
        Self {
            threshold,
            duration,
            silence_since: None,
            fired: false,
        }
    }

    /// Observe one chunk's level at `now`. Returns true exactly once per
    /// armed period, when trailing silence first exceeds the duration.
    pub fn observe(&mut self, level: f32, now: Instant) -> bool {
        if level >= self.threshold {
            self.silence_since = None;
            return false;
        }

        let since = *self.silence_since.get_or_insert(now);
        if !self.fired && now.duration_since(since) >= self.duration {
            self.fired = true;
            return true;
        }
        false
    }

    /// Trailing silence observed so far.
    pub fn trailing_silence(&self, now: Instant) -> Duration {
        self.silence_since
            .map(|since| now.duration_since(since))
            .unwrap_or(Duration::ZERO)
    }

    /// Re-arm so the watchdog may fire again.
    pub fn rearm(&mut self) {
        self.fired = false;
        self.silence_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: f32 = 0.001;
    const LOUD: f32 = 0.5;

    #[test]
    fn fires_after_duration_of_silence() {
        let mut watchdog = SilenceWatchdog::new(0.02, Duration::from_secs(2));
        let t0 = Instant::now();

        assert!(!watchdog.observe(QUIET, t0));
        assert!(!watchdog.observe(QUIET, t0 + Duration::from_secs(1)));
        assert!(watchdog.observe(QUIET, t0 + Duration::from_secs(2)));
    }

    #[test]
    fn fires_at_most_once_per_armed_period() {
        let mut watchdog = SilenceWatchdog::new(0.02, Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(!watchdog.observe(QUIET, t0));
        assert!(watchdog.observe(QUIET, t0 + Duration::from_secs(1)));
        assert!(!watchdog.observe(QUIET, t0 + Duration::from_secs(5)));
        assert!(!watchdog.observe(QUIET, t0 + Duration::from_secs(10)));
    }

    #[test]
    fn speech_resets_the_silence_window() {
        let mut watchdog = SilenceWatchdog::new(0.02, Duration::from_secs(2));
        let t0 = Instant::now();

        assert!(!watchdog.observe(QUIET, t0));
        assert!(!watchdog.observe(LOUD, t0 + Duration::from_secs(1)));
        // Window restarted: 2s from the new silence onset, not from t0.
        assert!(!watchdog.observe(QUIET, t0 + Duration::from_secs(2)));
        assert!(!watchdog.observe(QUIET, t0 + Duration::from_secs(3)));
        assert!(watchdog.observe(QUIET, t0 + Duration::from_secs(4)));
    }

    #[test]
    fn rearm_allows_firing_again() {
        let mut watchdog = SilenceWatchdog::new(0.02, Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(!watchdog.observe(QUIET, t0));
        assert!(watchdog.observe(QUIET, t0 + Duration::from_secs(1)));

        watchdog.rearm();
        let t1 = t0 + Duration::from_secs(2);
        assert!(!watchdog.observe(QUIET, t1));
        assert!(watchdog.observe(QUIET, t1 + Duration::from_secs(1)));
    }

    #[test]
    fn trailing_silence_reports_window() {
        let mut watchdog = SilenceWatchdog::new(0.02, Duration::from_secs(10));
        let t0 = Instant::now();

        assert_eq!(watchdog.trailing_silence(t0), Duration::ZERO);
        watchdog.observe(QUIET, t0);
        assert_eq!(
            watchdog.trailing_silence(t0 + Duration::from_secs(3)),
            Duration::from_secs(3)
        );
        watchdog.observe(LOUD, t0 + Duration::from_secs(4));
        assert_eq!(
            watchdog.trailing_silence(t0 + Duration::from_secs(5)),
            Duration::ZERO
        );
    }
}
