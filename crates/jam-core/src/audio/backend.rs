//! Audio backend trait for platform-specific implementations
//!
//! A backend owns the hardware side of the engine: it negotiates capture and
//! playback formats, then drives two callbacks from its own clock:
//!
//! - **Capture callback**: receives every interleaved input buffer
//! - **Render callback**: fills every interleaved output buffer
//!
//! Backends:
//! - [`CpalBackend`](super::CpalBackend): platform devices through CPAL
//! - [`OfflineBackend`](super::OfflineBackend): device-less, driven by the caller

use crate::types::{AudioFormat, Sample};

use super::config::AudioConfig;
use super::cpal_backend::CpalStreamHandle;
use super::error::AudioResult;
use super::offline::OfflineStreamHandle;

/// Receives interleaved capture buffers on the backend's capture thread
pub trait CaptureCallback: Send + 'static {
    fn process(&mut self, input: &[Sample]);
}

/// Fills interleaved output buffers on the backend's render thread
pub trait RenderCallback: Send + 'static {
    fn process(&mut self, output: &mut [Sample]);
}

/// Formats agreed with the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormats {
    /// Capture format; None when no input device is present
    pub input: Option<AudioFormat>,
    /// Playback format
    pub output: AudioFormat,
    /// Nominal callback size in frames
    pub buffer_size: u32,
}

impl NegotiatedFormats {
    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate
    }

    /// Output latency in milliseconds (one-way)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.output.sample_rate as f32) * 1000.0
    }

    /// Channel count of the capture side (0 without an input device)
    pub fn input_channels(&self) -> u16 {
        self.input.map(|f| f.channels).unwrap_or(0)
    }
}

/// A hardware (or simulated) audio host
pub trait AudioBackend: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Acquire the capture permission if the host requires one
    fn request_capture_permission(&mut self) -> AudioResult<()> {
        Ok(())
    }

    /// Pick devices and agree on formats without starting anything
    fn negotiate(&mut self, config: &AudioConfig) -> AudioResult<NegotiatedFormats>;

    /// Start the streams; they run until the returned handle is dropped
    ///
    /// `capture` is None when `formats.input` is None.
    fn start(
        &mut self,
        formats: NegotiatedFormats,
        capture: Option<Box<dyn CaptureCallback>>,
        render: Box<dyn RenderCallback>,
    ) -> AudioResult<StreamHandle>;
}

/// Handle to running streams
///
/// Keeps the streams alive. Drop this to stop audio.
pub enum StreamHandle {
    Cpal(CpalStreamHandle),
    Offline(OfflineStreamHandle),
}

impl StreamHandle {
    pub fn formats(&self) -> NegotiatedFormats {
        match self {
            StreamHandle::Cpal(h) => h.formats(),
            StreamHandle::Offline(h) => h.formats(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.formats().sample_rate()
    }

    pub fn latency_ms(&self) -> f32 {
        self.formats().latency_ms()
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            StreamHandle::Cpal(_) => "Cpal",
            StreamHandle::Offline(_) => "Offline",
        };
        f.debug_struct("StreamHandle")
            .field("backend", &kind)
            .field("formats", &self.formats())
            .finish()
    }
}
