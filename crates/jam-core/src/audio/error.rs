//! Audio backend error types

use thiserror::Error;

use crate::node::NodeError;

/// Errors that can occur while acquiring devices or running streams
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio output devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Stream error during playback
    #[error("Audio stream error: {0}")]
    StreamError(String),

    /// Unsupported sample format
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Input and output run at different rates (no rate conversion)
    #[error("Sample rate mismatch: input={input}Hz, output={output}Hz")]
    SampleRateMismatch { input: u32, output: u32 },

    /// The host refused access to the capture device
    #[error("Audio capture permission denied")]
    PermissionDenied,

    /// Wiring Input -> Mixer -> Output failed
    #[error("Base graph wiring failed: {0}")]
    FormatNegotiation(#[from] NodeError),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
