//! Audio backends for jam-core
//!
//! The engine talks to hardware through the [`AudioBackend`] trait:
//! - **CpalBackend**: platform devices (ALSA/JACK/PulseAudio, CoreAudio, WASAPI)
//! - **OfflineBackend**: no devices; the caller drives capture and render
//!
//! # Architecture
//!
//! The audio system follows a lock-free design for real-time safety:
//!
//! - **Control Thread**: mutates the engine, sends render commands via ringbuffer
//! - **Capture Thread**: dispatches input buffers to registered consumers
//! - **Render Thread**: owns the track chains exclusively, mixes to the output
//! - **Atomics**: parameter cells are plain atomic stores (no locks)
//!
//! # Example Usage
//!
//! ```ignore
//! use jam_core::audio::CpalBackend;
//! use jam_core::{EngineConfig, LoopEngine};
//!
//! let engine = LoopEngine::new(EngineConfig::default(), Box::new(CpalBackend::new()))?;
//! engine.start()?;
//! ```

mod backend;
mod config;
mod cpal_backend;
mod device;
mod error;
mod offline;

pub use backend::{AudioBackend, CaptureCallback, NegotiatedFormats, RenderCallback, StreamHandle};
pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE,
    LOW_LATENCY_BUFFER_SIZE, MAX_BUFFER_SIZE,
};
pub use cpal_backend::{CpalBackend, CpalStreamHandle};
pub use device::{default_device, find_device, get_devices, AudioDevice, Direction};
pub use error::{AudioError, AudioResult};
pub use offline::{OfflineBackend, OfflineDriver, OfflineStreamHandle};
