//! Stereo reverb unit
//!
//! A Freeverb-style algorithmic reverb:
//! - Parallel comb filters for the decaying tail
//! - Series all-pass filters for diffusion
//! - Room size and damping cells alongside the wet/dry mix

use std::sync::Arc;

use super::{AudioNode, FormatSupport, NodeKind, NodeParam, NodeParams};
use crate::types::{AudioFormat, StereoBuffer};

/// Comb filter delay line lengths (in samples at 44.1kHz)
/// These are prime-ish numbers to avoid resonances
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass filter delay line lengths (in samples at 44.1kHz)
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];

/// Stereo spread offset for the right channel (in samples at 44.1kHz)
const STEREO_SPREAD: usize = 23;

const ALLPASS_FEEDBACK: f32 = 0.5;

/// Gain compensation for comb filter summing
const COMB_GAIN: f32 = 0.2;

fn scaled_len(length: usize, sample_rate: u32) -> usize {
    ((length as f32 * sample_rate as f32 / 44100.0) as usize).max(1)
}

struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.pos];

        // One-pole lowpass in the feedback path
        self.filter_state = output * (1.0 - damp) + self.filter_state * damp;

        self.buffer[self.pos] = input + self.filter_state * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();

        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = -input + buffered;
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Per-channel filter bank
struct Channel {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Channel {
    fn new(sample_rate: u32, spread: usize) -> Self {
        Self {
            combs: COMB_LENGTHS
                .iter()
                .map(|&len| CombFilter::new(scaled_len(len + spread, sample_rate)))
                .collect(),
            allpasses: ALLPASS_LENGTHS
                .iter()
                .map(|&len| AllpassFilter::new(scaled_len(len + spread, sample_rate)))
                .collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let mut out = 0.0f32;
        for comb in &mut self.combs {
            out += comb.process(input, feedback, damp);
        }
        out *= COMB_GAIN;
        for ap in &mut self.allpasses {
            out = ap.process(out);
        }
        out
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::reset);
        self.allpasses.iter_mut().for_each(AllpassFilter::reset);
    }
}

/// Reverb node of a track chain
///
/// Parameters:
/// - WetDryMix: percent wet, 0-100 (default 0, fully dry)
/// - RoomSize: decay, 0.0-1.0 (default 0.5)
/// - Damping: 0.0 = bright, 1.0 = dark (default 0.5)
pub struct ReverbUnit {
    params: Arc<NodeParams>,
    sample_rate: u32,
    left: Channel,
    right: Channel,
}

impl ReverbUnit {
    pub fn new(sample_rate: u32) -> Self {
        let params = NodeParams::new(
            NodeKind::ReverbUnit,
            &[
                (NodeParam::WetDryMix, 0.0),
                (NodeParam::RoomSize, 0.5),
                (NodeParam::Damping, 0.5),
            ],
        );
        Self {
            params,
            sample_rate,
            left: Channel::new(sample_rate, 0),
            right: Channel::new(sample_rate, STEREO_SPREAD),
        }
    }
}

impl AudioNode for ReverbUnit {
    fn kind(&self) -> NodeKind {
        NodeKind::ReverbUnit
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
        let wet = (self.params.value(NodeParam::WetDryMix) / 100.0).clamp(0.0, 1.0);
        if wet <= 0.0 {
            // Fully dry: keep the tail from ringing into the next wet change
            return;
        }
        let dry = 1.0 - wet;
        // Scale to a usable feedback range (0.7-0.98)
        let feedback = 0.7 + self.params.value(NodeParam::RoomSize).clamp(0.0, 1.0) * 0.28;
        let damp = self.params.value(NodeParam::Damping).clamp(0.0, 1.0);

        for sample in buffer.iter_mut() {
            let input = (sample.left + sample.right) * 0.5;
            let out_l = self.left.process(input, feedback, damp);
            let out_r = self.right.process(input, feedback, damp);

            sample.left = out_l * wet + sample.left * dry;
            sample.right = out_r * wet + sample.right * dry;
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}
