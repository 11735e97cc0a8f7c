//! Audio capture layer.
//!
//! One capability interface ([`source::AudioSource`]) with two live
//! implementations (microphone and system loop-back, both cpal-backed)
//! plus a finite WAV-file source for pipe mode and tests. Telemetry
//! (volume, SNR) and the trailing-silence watchdog live beside it.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod meter;
pub(crate) mod pump;
pub mod silence;
pub mod source;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use capture::{CpalSource, list_input_devices, suppress_audio_warnings};
pub use meter::SignalMeter;
pub use silence::SilenceWatchdog;
pub use source::{AudioEvent, AudioSource, MockAudioSource, NullSource};
pub use wav::WavSource;
