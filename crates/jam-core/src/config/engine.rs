//! Engine configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;

/// Default number of simultaneously loaded tracks
pub const DEFAULT_MAX_TRACKS: usize = 64;

/// Default settle delay before a new loop starts sounding (ms)
pub const DEFAULT_SETTLE_DELAY_MS: u32 = 100;

/// Default capture handoff capacity (seconds of audio)
pub const DEFAULT_CAPTURE_QUEUE_SECONDS: f32 = 4.0;

/// Default render command ring size
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 256;

/// Tuning and device selection for a [`LoopEngine`](crate::engine::LoopEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Device and buffer selection
    pub audio: AudioConfig,

    /// Track chains the render thread pre-allocates room for
    pub max_tracks: usize,

    /// Delay between a loop's creation and its first audible frame
    pub settle_delay_ms: u32,

    /// Bounded handoff between the capture thread and the capture writer
    pub capture_queue_seconds: f32,

    /// Directory for temporary capture files (None = system temp dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_dir: Option<PathBuf>,

    /// Route the live input to the output
    pub monitor_input: bool,

    /// Monitor gain (0.0-1.0)
    pub monitor_gain: f32,

    /// Render command ring size
    pub command_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            max_tracks: DEFAULT_MAX_TRACKS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            capture_queue_seconds: DEFAULT_CAPTURE_QUEUE_SECONDS,
            capture_dir: None,
            monitor_input: true,
            monitor_gain: 1.0,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn with_audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_max_tracks(mut self, max_tracks: usize) -> Self {
        self.max_tracks = max_tracks;
        self
    }

    pub fn with_settle_delay_ms(mut self, ms: u32) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    pub fn with_capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = Some(dir.into());
        self
    }

    pub fn with_capture_queue_seconds(mut self, seconds: f32) -> Self {
        self.capture_queue_seconds = seconds;
        self
    }

    pub fn with_monitoring(mut self, enabled: bool, gain: f32) -> Self {
        self.monitor_input = enabled;
        self.monitor_gain = gain;
        self
    }

    /// Capture queue capacity in frames at `sample_rate`
    pub fn capture_queue_frames(&self, sample_rate: u32) -> usize {
        ((self.capture_queue_seconds.max(0.1) * sample_rate as f32) as usize).max(1)
    }

    /// Settle delay in seconds
    pub fn settle_delay_secs(&self) -> f32 {
        self.settle_delay_ms as f32 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, save_config};

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_tracks, 64);
        assert_eq!(config.settle_delay_ms, 100);
        assert!(config.monitor_input);
        assert_eq!(config.capture_queue_frames(48000), 192000);
        assert!((config.settle_delay_secs() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: EngineConfig =
            serde_yaml::from_str("max_tracks: 8\nmonitor_input: false\n").unwrap();
        assert_eq!(config.max_tracks, 8);
        assert!(!config.monitor_input);
        assert_eq!(config.settle_delay_ms, DEFAULT_SETTLE_DELAY_MS);
        assert_eq!(config.audio, AudioConfig::default());
    }

    #[test]
    fn test_yaml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        let config = EngineConfig::default()
            .with_max_tracks(12)
            .with_capture_dir(dir.path())
            .with_monitoring(true, 0.5);

        save_config(&config, &path).unwrap();
        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded, config);
    }
}
