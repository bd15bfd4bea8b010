//! Control-surface error types

use thiserror::Error;

use crate::audio::AudioError;
use crate::node::{FormatNegotiationError, NodeError};
use crate::types::TrackId;

/// Failures of the capture write path and loop read-back
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("capture file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("capture writer thread panicked")]
    WriterPanicked,

    #[error("capture writer stopped before the recording ended")]
    WriterStopped,
}

/// Errors returned by every control-surface operation
///
/// All of them are recoverable at the call site; none reach the audio threads.
#[derive(Error, Debug)]
pub enum EngineError {
    /// No usable input (no device, or zero channels)
    #[error("no usable input device")]
    DeviceUnavailable,

    #[error("already recording")]
    AlreadyRecording,

    #[error("not recording")]
    NotRecording,

    #[error("track '{0}' already exists")]
    DuplicateTrack(TrackId),

    #[error("track '{0}' not found")]
    TrackNotFound(TrackId),

    #[error("format negotiation failed: {0}")]
    FormatNegotiation(#[from] FormatNegotiationError),

    #[error("engine failed to start: {0}")]
    EngineStart(#[from] AudioError),

    #[error("capture storage failed: {0}")]
    StorageIo(#[from] StorageError),

    /// The recording finished without a single frame
    #[error("captured recording is empty")]
    EmptyCapture,

    #[error("engine is not running")]
    NotRunning,

    #[error("consumer key '{0}' is reserved")]
    ReservedConsumerKey(String),

    #[error("track limit of {0} reached")]
    TrackLimit(usize),

    #[error("render command queue is full")]
    CommandQueueFull,

    #[error("node error: {0}")]
    Node(NodeError),
}

impl From<NodeError> for EngineError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Negotiation(e) => EngineError::FormatNegotiation(e),
            other => EngineError::Node(other),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::StorageIo(StorageError::Io(e))
    }
}

impl From<hound::Error> for EngineError {
    fn from(e: hound::Error) -> Self {
        EngineError::StorageIo(StorageError::Wav(e))
    }
}

/// Result type for control-surface operations
pub type EngineResult<T> = Result<T, EngineError>;
