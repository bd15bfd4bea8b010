//! Stereo delay unit
//!
//! A feedback delay line with:
//! - Delay time in seconds
//! - Feedback percentage
//! - Dry/wet mix percentage

use std::sync::Arc;

use super::{AudioNode, FormatSupport, NodeKind, NodeParam, NodeParams};
use crate::types::{AudioFormat, StereoBuffer};

/// Maximum delay time in seconds
const MAX_DELAY_SECONDS: f32 = 2.0;

/// Default delay time in seconds
const DEFAULT_DELAY_SECONDS: f32 = 1.0;

/// Default feedback in percent
const DEFAULT_FEEDBACK: f32 = 50.0;

/// Feedback ceiling (fraction) to keep the loop stable
const MAX_FEEDBACK: f32 = 0.95;

struct DelayLine {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self {
            buffer_l: vec![0.0; len],
            buffer_r: vec![0.0; len],
            write_pos: 0,
        }
    }

    #[inline]
    fn read(&self, delay: usize) -> (f32, f32) {
        let len = self.buffer_l.len();
        let read_pos = (self.write_pos + len - delay) % len;
        (self.buffer_l[read_pos], self.buffer_r[read_pos])
    }

    /// Process one frame through the line, returning the delayed frame
    #[inline]
    fn process(&mut self, left: f32, right: f32, delay: usize, feedback: f32) -> (f32, f32) {
        let (delayed_l, delayed_r) = self.read(delay);

        self.buffer_l[self.write_pos] = left + delayed_l * feedback;
        self.buffer_r[self.write_pos] = right + delayed_r * feedback;
        self.write_pos = (self.write_pos + 1) % self.buffer_l.len();

        (delayed_l, delayed_r)
    }

    fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

/// Delay node of a track chain
///
/// Parameters:
/// - WetDryMix: percent wet, 0-100 (default 0, fully dry)
/// - DelayTime: seconds, up to 2.0 (default 1.0)
/// - Feedback: percent, 0-100 (default 50)
///
/// The line is allocated once for the maximum delay time.
pub struct DelayUnit {
    params: Arc<NodeParams>,
    sample_rate: u32,
    line: DelayLine,
}

impl DelayUnit {
    pub fn new(sample_rate: u32) -> Self {
        let params = NodeParams::new(
            NodeKind::DelayUnit,
            &[
                (NodeParam::WetDryMix, 0.0),
                (NodeParam::DelayTime, DEFAULT_DELAY_SECONDS),
                (NodeParam::Feedback, DEFAULT_FEEDBACK),
            ],
        );
        let max_samples = (sample_rate as f32 * MAX_DELAY_SECONDS) as usize + 1;
        Self {
            params,
            sample_rate,
            line: DelayLine::new(max_samples),
        }
    }

    fn delay_samples(&self) -> usize {
        let secs = self.params.value(NodeParam::DelayTime).clamp(0.0, MAX_DELAY_SECONDS);
        ((secs * self.sample_rate as f32).round() as usize).clamp(1, self.line.buffer_l.len() - 1)
    }
}

impl AudioNode for DelayUnit {
    fn kind(&self) -> NodeKind {
        NodeKind::DelayUnit
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::stereo(self.sample_rate)
    }

    fn input_support(&self) -> FormatSupport {
        FormatSupport::up_to_stereo(self.sample_rate)
    }

    fn params(&self) -> &Arc<NodeParams> {
        &self.params
    }

    fn process(&mut self, buffer: &mut StereoBuffer) {
        let mix = (self.params.value(NodeParam::WetDryMix) / 100.0).clamp(0.0, 1.0);
        let feedback = (self.params.value(NodeParam::Feedback) / 100.0).clamp(0.0, MAX_FEEDBACK);
        let delay = self.delay_samples();
        let dry = 1.0 - mix;

        // The line keeps running while dry so raising the mix picks up a warm line
        for sample in buffer.iter_mut() {
            let (delayed_l, delayed_r) = self.line.process(sample.left, sample.right, delay, feedback);
            sample.left = sample.left * dry + delayed_l * mix;
            sample.right = sample.right * dry + delayed_r * mix;
        }
    }

    fn reset(&mut self) {
        self.line.reset();
    }
}
