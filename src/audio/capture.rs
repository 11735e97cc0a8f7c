//! Live audio capture using CPAL, for microphone and system loop-back.

use crate::audio::pump::{self, PumpShared};
use crate::audio::source::{AudioEvent, AudioSource};
use crate::defaults;
use crate::error::{Result, VoxdError};
use crate::session::CaptureSource;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// Suppresses the ALSA/JACK/PipeWire chatter CPAL triggers while probing
/// backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Quiet the JACK/ALSA/PipeWire probing noise before any capture starts.
///
/// # Safety
/// Modifies environment variables, which is safe when called before
/// spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are never useful for voice input.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// Monitor sources expose played-back system audio as capture input.
/// PulseAudio and PipeWire name them `<sink>.monitor`.
fn is_monitor_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("monitor") || lower.contains("loopback")
}

/// List available input devices, annotated for the `devices` subcommand.
///
/// Preferred devices are marked `[recommended]`, monitor sources are
/// marked `[system-audio]`, and obviously unusable outputs (surround
/// channels, HDMI) are filtered out.
///
/// # Errors
/// Returns `VoxdError::AudioCapture` if device enumeration fails.
pub fn list_input_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| VoxdError::AudioCapture {
        message: format!("failed to enumerate input devices: {}", e),
    })?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_monitor_device(&name) {
                names.push(format!("{} [system-audio]", name));
            } else if is_preferred_device(&name) {
                names.push(format!("{} [recommended]", name));
            } else {
                names.push(name);
            }
        }
    }

    Ok(names)
}

/// Resolve the capture device for a role.
///
/// Microphone: an explicitly named device, else a preferred PipeWire/
/// PulseAudio device, else the system default. Monitor sources are
/// never picked implicitly for the microphone role.
///
/// System audio: an explicitly named device, else the first monitor
/// source the host exposes.
fn resolve_device(role: CaptureSource, device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let devices = host.input_devices().map_err(|e| VoxdError::AudioCapture {
                message: format!("failed to enumerate devices: {}", e),
            })?;
            for device in devices {
                if let Ok(dev_name) = device.name()
                    && dev_name == name
                {
                    return Ok(device);
                }
            }
            return Err(VoxdError::AudioDeviceNotFound {
                device: name.to_string(),
            });
        }

        match role {
            CaptureSource::Microphone => {
                if let Ok(devices) = host.input_devices() {
                    for device in devices {
                        if let Ok(name) = device.name()
                            && is_preferred_device(&name)
                            && !is_monitor_device(&name)
                        {
                            return Ok(device);
                        }
                    }
                }
                host.default_input_device()
                    .ok_or_else(|| VoxdError::AudioDeviceNotFound {
                        device: "default".to_string(),
                    })
            }
            CaptureSource::SystemAudio => {
                if let Ok(devices) = host.input_devices() {
                    for device in devices {
                        if let Ok(name) = device.name()
                            && is_monitor_device(&name)
                        {
                            return Ok(device);
                        }
                    }
                }
                Err(VoxdError::AudioDeviceNotFound {
                    device: "monitor".to_string(),
                })
            }
        }
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched from the thread that owns the
/// `CpalSource`; it never crosses thread boundaries while alive.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Live capture source producing 16-bit PCM at 16kHz mono.
///
/// Tries the preferred format first (i16/16kHz/mono), then f32, then
/// falls back to the device's native config with software conversion.
/// The same type serves both roles: a microphone or a monitor source
/// carrying system playback.
pub struct CpalSource {
    role: CaptureSource,
    device_name: Option<String>,
    device: Option<cpal::Device>,
    stream: Option<SendableStream>,
    buffer: Arc<Mutex<Vec<i16>>>,
    callback_count: Arc<AtomicU64>,
    sample_rate: u32,
    speech_threshold: f32,
    shared: Option<Arc<PumpShared>>,
    worker: Option<JoinHandle<()>>,
    pending_silence: Option<(f32, Duration)>,
}

impl CpalSource {
    pub fn new(role: CaptureSource, device_name: Option<&str>, speech_threshold: f32) -> Self {
        Self {
            role,
            device_name: device_name.map(str::to_string),
            device: None,
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            callback_count: Arc::new(AtomicU64::new(0)),
            sample_rate: defaults::SAMPLE_RATE,
            speech_threshold,
            shared: None,
            worker: None,
            pending_silence: None,
        }
    }

    /// Build the input stream with the configured format, trying in
    /// order: i16/16kHz/mono, f32/16kHz/mono, then the device's native
    /// config with software conversion.
    fn build_stream(&self, device: &cpal::Device) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("voxd: audio stream error: {}", err);
        };

        // i16/16kHz/mono works with PipeWire/PulseAudio, which convert
        // transparently.
        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend(
                        data.iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                    );
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Some PipeWire-ALSA setups accept non-native configs but never
        // fire the data callback, so capture natively and convert.
        self.build_stream_native(device)
    }

    /// Build a stream at the device's native config, mixing channels and
    /// resampling to 16kHz in software.
    fn build_stream_native(&self, device: &cpal::Device) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            device
                .default_input_config()
                .map_err(|e| VoxdError::AudioCapture {
                    message: format!("failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;

        let stream_config: cpal::StreamConfig = default_config.clone().into();

        let err_callback = |err| {
            eprintln!("voxd: audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);

        match default_config.sample_format() {
            SampleFormat::I16 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let converted =
                            convert_to_mono_16khz(data, native_channels, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoxdError::AudioCapture {
                    message: format!("failed to build native i16 stream: {}", e),
                }),
            SampleFormat::F32 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let i16_data: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect();
                        let converted = convert_to_mono_16khz(
                            &i16_data,
                            native_channels,
                            native_rate,
                            target_rate,
                        );
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoxdError::AudioCapture {
                    message: format!("failed to build native f32 stream: {}", e),
                }),
            fmt => Err(VoxdError::AudioCapture {
                message: format!(
                    "unsupported native sample format {:?}; try an explicit device in the config",
                    fmt
                ),
            }),
        }
    }

    /// Start the stream and verify the data callback actually fires.
    fn open_stream(&mut self) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| VoxdError::AudioCapture {
                message: "capture device not prepared".to_string(),
            })?;

        // Baseline before play: the counter carries over from earlier
        // capture periods on this source, so an absolute zero check
        // would only ever catch a dead config on the first session.
        let baseline = self.callback_count.load(Ordering::Relaxed);

        let stream = self.build_stream(device)?;
        stream.play().map_err(|e| VoxdError::AudioCapture {
            message: format!("failed to start audio stream: {}", e),
        })?;

        // Give the callback a moment before deciding the config is dead.
        std::thread::sleep(Duration::from_millis(200));

        let final_stream = if !callback_fired(&self.callback_count, baseline) {
            drop(stream);
            if let Ok(mut buf) = self.buffer.lock() {
                buf.clear();
            }

            let native_stream = self.build_stream_native(device)?;
            native_stream.play().map_err(|e| VoxdError::AudioCapture {
                message: format!("failed to start native audio stream: {}", e),
            })?;
            native_stream
        } else {
            stream
        };

        self.stream = Some(SendableStream(final_stream));
        Ok(())
    }
}

/// Whether the data callback ran since `baseline` was recorded.
fn callback_fired(count: &AtomicU64, baseline: u64) -> bool {
    count.load(Ordering::Relaxed) > baseline
}

/// Mix multi-channel audio to mono and resample to the target rate.
fn convert_to_mono_16khz(
    samples: &[i16],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Vec<i16> {
    let mono: Vec<i16> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    if source_rate == target_rate {
        mono
    } else {
        crate::audio::wav::resample(&mono, source_rate, target_rate)
    }
}

impl AudioSource for CpalSource {
    fn prepare(&mut self) -> Result<()> {
        if self.device.is_none() {
            self.device = Some(resolve_device(self.role, self.device_name.as_deref())?);
        }
        Ok(())
    }

    fn start_capture(&mut self, events: Sender<AudioEvent>) {
        if let Err(e) = self.open_stream() {
            let _ = events.send(AudioEvent::CaptureStarted {
                ok: false,
                message: Some(e.to_string()),
            });
            return;
        }

        let _ = events.send(AudioEvent::CaptureStarted {
            ok: true,
            message: None,
        });

        let shared = PumpShared::new();
        if let Some((threshold, duration)) = self.pending_silence.take() {
            shared.arm_watchdog(threshold, duration);
        }

        let buffer = Arc::clone(&self.buffer);
        let provider = move || match buffer.lock() {
            Ok(mut buf) => Some(std::mem::take(&mut *buf)),
            Err(_) => None,
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
        // Pause the stream first so the final drain sees every sample
        // the callback delivered.
        if let Some(stream) = self.stream.take() {
            let _ = stream.0.pause();
        }
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
