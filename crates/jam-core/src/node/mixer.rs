//! Main mixer node
//!
//! Every track chain and the monitored input are summed into the mixer's bus;
//! the mixer applies the master volume before the bus reaches the output sink.

use std::sync::Arc;

use super::{AudioNode, FormatSupport, NodeKind, NodeParam, NodeParams};
use crate::types::{AudioFormat, StereoBuffer};

/// Summing mixer with a master volume (0.0-1.0, default 1.0)
pub struct MixerNode {
    params: Arc<NodeParams>,
    sample_rate: u32,
}

impl MixerNode {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            params: NodeParams::new(NodeKind::Mixer, &[(NodeParam::Volume, 1.0)]),
            sample_rate,
        }
    }

    /// Sum one input into the bus
    #[inline]
    pub fn mix_into(&self, bus: &mut StereoBuffer, input: &StereoBuffer) {
        bus.add_scaled(input, 1.0);
    }
}

impl AudioNode for MixerNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Mixer
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

    /// Apply the master volume to the summed bus
    fn process(&mut self, buffer: &mut StereoBuffer) {
        let volume = self.params.value(NodeParam::Volume);
        if volume != 1.0 {
            buffer.scale(volume);
        }
    }
}
