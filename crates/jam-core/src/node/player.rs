//! Looping buffer player
//!
//! Plays a fully loaded buffer round and round until told to stop. There is no
//! end trigger: a started loop sounds until its `Playing` cell is cleared.

use std::sync::Arc;

use super::{AudioNode, FormatSupport, NodeKind, NodeParam, NodeParams};
use crate::types::{AudioFormat, Sample, StereoBuffer, StereoSample, MAX_NODE_CHANNELS};

/// Audio loaded into memory for looping playback
///
/// Frames are stored as stereo; `format` records the source format
/// (mono sources are duplicated to both sides).
#[derive(Debug, Clone)]
pub struct LoopBuffer {
    samples: Vec<StereoSample>,
    format: AudioFormat,
}

impl LoopBuffer {
    /// Build a loop from interleaved samples in `format`
    pub fn from_interleaved(data: &[Sample], format: AudioFormat) -> Self {
        let buffer = StereoBuffer::from_interleaved(data, format.channels as usize);
        Self {
            samples: buffer.as_slice().to_vec(),
            format,
        }
    }

    /// Build a loop from already converted stereo frames
    pub fn from_frames(samples: Vec<StereoSample>, format: AudioFormat) -> Self {
        Self { samples, format }
    }

    /// A silent loop, mostly useful in tests
    pub fn silence(frames: usize, format: AudioFormat) -> Self {
        Self {
            samples: vec![StereoSample::silence(); frames],
            format,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.format.sample_rate.max(1) as f64
    }

    pub fn frames_slice(&self) -> &[StereoSample] {
        &self.samples
    }
}

/// Loop player node
///
/// Parameters:
/// - Volume: linear gain (0.0-1.0, default 1.0)
/// - Playing: 1.0 while the loop sounds (default 0.0)
/// - StartDelay: seconds of silence before the next start sounds; consumed
///   by that start
///
/// Every start rewinds to the first frame.
pub struct LoopPlayer {
    params: Arc<NodeParams>,
    buffer: LoopBuffer,
    position: usize,
    was_playing: bool,
    pending_frames: usize,
}

impl LoopPlayer {
    pub fn new(buffer: LoopBuffer) -> Self {
        let params = NodeParams::new(
            NodeKind::LoopPlayer,
            &[
                (NodeParam::Volume, 1.0),
                (NodeParam::Playing, 0.0),
                (NodeParam::StartDelay, 0.0),
            ],
        );
        Self {
            params,
            buffer,
            position: 0,
            was_playing: false,
            pending_frames: 0,
        }
    }

    pub fn buffer(&self) -> &LoopBuffer {
        &self.buffer
    }

    /// Current playhead in frames
    pub fn position(&self) -> usize {
        self.position
    }
}

impl AudioNode for LoopPlayer {
    fn kind(&self) -> NodeKind {
        NodeKind::LoopPlayer
    }

    fn output_format(&self) -> AudioFormat {
        let source = self.buffer.format();
        AudioFormat::new(
            source.sample_rate,
            source.channels.clamp(1, MAX_NODE_CHANNELS),
        )
    }

    fn input_support(&self) -> FormatSupport {
        FormatSupport::none(self.buffer.format().sample_rate)
    }

    fn params(&self) -> &Arc<NodeParams> {
        &self.params
    }

    fn process(&mut self, buffer: &mut StereoBuffer) {
        let playing = self.params.value(NodeParam::Playing) >= 0.5;

        if !playing || self.buffer.is_empty() {
            self.was_playing = playing;
            buffer.fill_silence();
            return;
        }

        if !self.was_playing {
            self.was_playing = true;
            self.position = 0;
            let delay_secs = self.params.take(NodeParam::StartDelay).max(0.0);
            self.pending_frames =
                (delay_secs * self.buffer.format().sample_rate as f32).round() as usize;
        }

        let volume = self.params.value(NodeParam::Volume);
        let frames = self.buffer.frames_slice();

        for out in buffer.iter_mut() {
            if self.pending_frames > 0 {
                self.pending_frames -= 1;
                *out = StereoSample::silence();
                continue;
            }
            *out = frames[self.position] * volume;
            self.position += 1;
            if self.position >= frames.len() {
                self.position = 0;
            }
        }
    }

    fn reset(&mut self) {
        self.position = 0;
        self.pending_frames = 0;
        self.was_playing = false;
    }
}
