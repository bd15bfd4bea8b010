//! Jam Core - real-time looping engine
//!
//! Records the live input into loops, plays any number of them back through
//! per-track reverb and delay, and fans every captured buffer out to other
//! in-process consumers (transcription, metering).

pub mod audio;
pub mod config;
pub mod engine;
pub mod hub;
pub mod node;
pub mod types;

pub use config::EngineConfig;
pub use engine::{Action, EngineError, EngineResult, LoopEngine, RecordingState, TrackParameters};
pub use hub::{AudioConsumer, ConsumerError, InputBuffer};
pub use types::*;
