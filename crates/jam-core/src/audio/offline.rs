//! Device-less backend driven by the caller
//!
//! [`OfflineBackend`] satisfies the [`AudioBackend`] contract without touching
//! hardware. Once started, the paired [`OfflineDriver`] plays the role of the
//! hardware clock: [`OfflineDriver::push_input`] runs the capture callback and
//! [`OfflineDriver::render`] runs the render callback, each on the caller's
//! thread. Used by tests and for faster-than-realtime rendering.

use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{AudioBackend, CaptureCallback, NegotiatedFormats, RenderCallback, StreamHandle};
use super::config::{AudioConfig, DEFAULT_BUFFER_SIZE};
use super::error::{AudioError, AudioResult};
use crate::types::{AudioFormat, Sample};

struct Running {
    formats: NegotiatedFormats,
    capture: Option<Box<dyn CaptureCallback>>,
    render: Box<dyn RenderCallback>,
}

type Slot = Arc<Mutex<Option<Running>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<Running>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Simulated audio host
pub struct OfflineBackend {
    input: Option<AudioFormat>,
    output: AudioFormat,
    buffer_size: u32,
    deny_permission: bool,
    slot: Slot,
}

impl OfflineBackend {
    /// Stereo output with an input of `input` format at the same rate
    pub fn new(input: AudioFormat) -> Self {
        Self {
            input: Some(input),
            output: AudioFormat::stereo(input.sample_rate),
            buffer_size: DEFAULT_BUFFER_SIZE,
            deny_permission: false,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Simulate a machine with no capture device
    pub fn without_input(mut self) -> Self {
        self.input = None;
        self
    }

    /// Simulate the host refusing capture access
    pub fn with_permission_denied(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    pub fn with_output(mut self, output: AudioFormat) -> Self {
        self.output = output;
        self
    }

    pub fn with_buffer_size(mut self, frames: u32) -> Self {
        self.buffer_size = frames;
        self
    }

    /// The clock driving this backend's callbacks once started
    pub fn driver(&self) -> OfflineDriver {
        OfflineDriver {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl AudioBackend for OfflineBackend {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn request_capture_permission(&mut self) -> AudioResult<()> {
        if self.deny_permission {
            return Err(AudioError::PermissionDenied);
        }
        Ok(())
    }

    fn negotiate(&mut self, config: &AudioConfig) -> AudioResult<NegotiatedFormats> {
        if let Some(rate) = config.sample_rate {
            if rate != self.output.sample_rate {
                return Err(AudioError::ConfigError(format!(
                    "offline output runs at {}Hz, {}Hz requested",
                    self.output.sample_rate, rate
                )));
            }
        }
        if let Some(input) = self.input {
            if input.sample_rate != self.output.sample_rate {
                return Err(AudioError::SampleRateMismatch {
                    input: input.sample_rate,
                    output: self.output.sample_rate,
                });
            }
        }
        Ok(NegotiatedFormats {
            input: self.input,
            output: self.output,
            buffer_size: self.buffer_size,
        })
    }

    fn start(
        &mut self,
        formats: NegotiatedFormats,
        capture: Option<Box<dyn CaptureCallback>>,
        render: Box<dyn RenderCallback>,
    ) -> AudioResult<StreamHandle> {
        let mut running = lock(&self.slot);
        if running.is_some() {
            return Err(AudioError::StreamPlayError(
                "offline backend already running".to_string(),
            ));
        }
        *running = Some(Running {
            formats,
            capture,
            render,
        });
        log::debug!("Offline streams started at {}", formats.output);

        Ok(StreamHandle::Offline(OfflineStreamHandle {
            formats,
            slot: Arc::clone(&self.slot),
        }))
    }
}

/// Keeps offline streams "running"; dropping it detaches the callbacks
pub struct OfflineStreamHandle {
    formats: NegotiatedFormats,
    slot: Slot,
}

impl OfflineStreamHandle {
    pub fn formats(&self) -> NegotiatedFormats {
        self.formats
    }
}

impl Drop for OfflineStreamHandle {
    fn drop(&mut self) {
        // Callbacks are dropped outside the lock
        let running = lock(&self.slot).take();
        drop(running);
    }
}

/// Caller-side clock for an [`OfflineBackend`]
#[derive(Clone)]
pub struct OfflineDriver {
    slot: Slot,
}

impl OfflineDriver {
    /// Whether the backend currently has streams attached
    pub fn is_running(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Deliver one interleaved capture buffer
    ///
    /// Returns false when nothing is listening (not started, or no input).
    pub fn push_input(&self, input: &[Sample]) -> bool {
        match lock(&self.slot).as_mut().and_then(|r| r.capture.as_mut()) {
            Some(capture) => {
                capture.process(input);
                true
            }
            None => false,
        }
    }

    /// Pull `frames` frames of interleaved output
    ///
    /// Returns silence when the backend is not running.
    pub fn render(&self, frames: usize) -> Vec<Sample> {
        let mut guard = lock(&self.slot);
        let channels = guard
            .as_ref()
            .map(|r| r.formats.output.channels as usize)
            .unwrap_or(2);
        let mut output = vec![0.0; frames * channels];
        if let Some(running) = guard.as_mut() {
            running.render.process(&mut output);
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCapture(Arc<AtomicUsize>);

    impl CaptureCallback for CountingCapture {
        fn process(&mut self, input: &[Sample]) {
            self.0.fetch_add(input.len(), Ordering::SeqCst);
        }
    }

    struct ConstantRender(f32);

    impl RenderCallback for ConstantRender {
        fn process(&mut self, output: &mut [Sample]) {
            output.fill(self.0);
        }
    }

    #[test]
    fn test_offline_drives_callbacks() {
        let mut backend = OfflineBackend::new(AudioFormat::mono(48000));
        let driver = backend.driver();
        let formats = backend.negotiate(&AudioConfig::default()).unwrap();
        assert_eq!(formats.input, Some(AudioFormat::mono(48000)));

        assert!(!driver.push_input(&[0.0; 4]));
        assert_eq!(driver.render(2), vec![0.0; 4]);

        let seen = Arc::new(AtomicUsize::new(0));
        let handle = backend
            .start(
                formats,
                Some(Box::new(CountingCapture(Arc::clone(&seen)))),
                Box::new(ConstantRender(0.5)),
            )
            .unwrap();

        assert!(driver.push_input(&[0.1; 8]));
        assert_eq!(seen.load(Ordering::SeqCst), 8);
        assert_eq!(driver.render(3), vec![0.5; 6]);

        drop(handle);
        assert!(!driver.is_running());
        assert_eq!(driver.render(1), vec![0.0; 2]);
    }

    #[test]
    fn test_offline_permission_and_rate_checks() {
        let mut denied = OfflineBackend::new(AudioFormat::mono(48000)).with_permission_denied();
        assert!(matches!(
            denied.request_capture_permission(),
            Err(AudioError::PermissionDenied)
        ));

        let mut mismatched = OfflineBackend::new(AudioFormat::mono(44100))
            .with_output(AudioFormat::stereo(48000));
        assert!(matches!(
            mismatched.negotiate(&AudioConfig::default()),
            Err(AudioError::SampleRateMismatch { input: 44100, output: 48000 })
        ));

        let mut no_input = OfflineBackend::new(AudioFormat::mono(48000)).without_input();
        assert_eq!(no_input.negotiate(&AudioConfig::default()).unwrap().input, None);
    }
}
