//! Node abstraction layer - uniform audio processing units
//!
//! Every primitive the engine orchestrates (input source, output sink, mixer,
//! looped player, reverb, delay) implements [`AudioNode`]. A node is split in two:
//!
//! - **DSP body**: the `AudioNode` value itself, moved onto the render thread
//!   and processed there exclusively.
//! - **Parameter cells**: an `Arc<NodeParams>` shared with the control side.
//!   Writes are single atomic stores observed on the next processing quantum.
//!
//! The control-side [`NodeGraph`] records which nodes are attached and how
//! they are connected, and negotiates a format for every connection.
//!
//! ```text
//! InputSource ──► Mixer ──► OutputSink
//!                   ▲
//! LoopPlayer ──► Reverb ──► Delay ──┘   (one chain per track)
//! ```

mod delay;
mod graph;
mod io;
mod mixer;
mod player;
mod reverb;

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::types::{AudioFormat, StereoBuffer, MAX_NODE_CHANNELS};

pub use delay::DelayUnit;
pub use graph::{Connection, FormatNegotiationError, NodeError, NodeGraph, NodeId, NodeRef};
pub use io::{InputSource, MonitorFeed, OutputSink};
pub use mixer::MixerNode;
pub use player::{LoopBuffer, LoopPlayer};
pub use reverb::ReverbUnit;

/// The node variants the engine knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    InputSource,
    OutputSink,
    Mixer,
    LoopPlayer,
    ReverbUnit,
    DelayUnit,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::InputSource => "input",
            NodeKind::OutputSink => "output",
            NodeKind::Mixer => "mixer",
            NodeKind::LoopPlayer => "player",
            NodeKind::ReverbUnit => "reverb",
            NodeKind::DelayUnit => "delay",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named node parameters
///
/// Ranges are documented per node; the layer stores whatever it is given,
/// callers clamp before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeParam {
    /// Linear gain, 0.0-1.0
    Volume,
    /// 1.0 = playing, 0.0 = stopped
    Playing,
    /// Delay before a newly started player sounds, in seconds
    StartDelay,
    /// Dry/wet balance, 0-100 (percent wet)
    WetDryMix,
    /// Reverb decay, 0.0-1.0
    RoomSize,
    /// Reverb high-frequency damping, 0.0-1.0
    Damping,
    /// Delay line length in seconds
    DelayTime,
    /// Delay feedback, 0-100 (percent)
    Feedback,
}

impl NodeParam {
    pub fn name(&self) -> &'static str {
        match self {
            NodeParam::Volume => "volume",
            NodeParam::Playing => "playing",
            NodeParam::StartDelay => "startDelay",
            NodeParam::WetDryMix => "wetDryMix",
            NodeParam::RoomSize => "roomSize",
            NodeParam::Damping => "damping",
            NodeParam::DelayTime => "delayTime",
            NodeParam::Feedback => "feedback",
        }
    }
}

impl fmt::Display for NodeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single lock-free f32 parameter cell
struct ParamCell {
    param: NodeParam,
    bits: AtomicU32,
}

/// Lock-free parameter storage shared between a node and its control handle
///
/// The parameter set is fixed at construction; reads and writes are single
/// atomic operations, so the render thread never waits on the control side.
/// No transactional ordering exists across parameters: last write wins.
pub struct NodeParams {
    kind: NodeKind,
    cells: Vec<ParamCell>,
}

impl NodeParams {
    /// Create the parameter set for a node with the given defaults
    pub fn new(kind: NodeKind, defaults: &[(NodeParam, f32)]) -> Arc<Self> {
        Arc::new(Self {
            kind,
            cells: defaults
                .iter()
                .map(|&(param, value)| ParamCell {
                    param,
                    bits: AtomicU32::new(value.to_bits()),
                })
                .collect(),
        })
    }

    /// Kind of the node owning these parameters
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Write a parameter (any thread)
    pub fn set(&self, param: NodeParam, value: f32) -> Result<(), NodeError> {
        let cell = self
            .cell(param)
            .ok_or(NodeError::UnknownParameter { kind: self.kind, param })?;
        cell.bits.store(value.to_bits(), Ordering::Release);
        Ok(())
    }

    /// Read a parameter (any thread)
    pub fn get(&self, param: NodeParam) -> Option<f32> {
        self.cell(param)
            .map(|cell| f32::from_bits(cell.bits.load(Ordering::Acquire)))
    }

    /// Read a parameter and reset it to zero in one atomic step
    pub(crate) fn take(&self, param: NodeParam) -> f32 {
        self.cell(param)
            .map(|cell| f32::from_bits(cell.bits.swap(0.0f32.to_bits(), Ordering::AcqRel)))
            .unwrap_or(0.0)
    }

    /// Read a parameter the node is known to carry (render thread)
    #[inline]
    pub(crate) fn value(&self, param: NodeParam) -> f32 {
        self.get(param).unwrap_or(0.0)
    }

    /// Parameters this node exposes
    pub fn params(&self) -> impl Iterator<Item = NodeParam> + '_ {
        self.cells.iter().map(|c| c.param)
    }

    #[inline]
    fn cell(&self, param: NodeParam) -> Option<&ParamCell> {
        self.cells.iter().find(|c| c.param == param)
    }
}

impl fmt::Debug for NodeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for cell in &self.cells {
            map.entry(
                &cell.param.name(),
                &f32::from_bits(cell.bits.load(Ordering::Relaxed)),
            );
        }
        map.finish()
    }
}

/// Which formats a node accepts on its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSupport {
    /// Required sample rate (no implicit rate conversion exists)
    pub sample_rate: u32,
    /// Largest channel count accepted; 0 means the node has no input
    pub max_channels: u16,
}

impl FormatSupport {
    /// Accepts mono or stereo at the given rate
    pub fn up_to_stereo(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            max_channels: MAX_NODE_CHANNELS,
        }
    }

    /// A pure source (no input bus)
    pub fn none(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            max_channels: 0,
        }
    }

    /// Whether this input accepts `format` as-is
    pub fn accepts(&self, format: &AudioFormat) -> bool {
        format.sample_rate == self.sample_rate
            && format.channels > 0
            && format.channels <= self.max_channels
    }
}

/// The core node trait - implemented by every audio processing unit
///
/// Processing happens on the render thread only: implementations must not
/// allocate, lock or block inside [`AudioNode::process`].
pub trait AudioNode: Send {
    /// Which primitive this node is
    fn kind(&self) -> NodeKind;

    /// Format produced on the output bus
    fn output_format(&self) -> AudioFormat;

    /// Formats accepted on the input bus
    fn input_support(&self) -> FormatSupport;

    /// Shared parameter cells (cloned into the control-side graph on attach)
    fn params(&self) -> &Arc<NodeParams>;

    /// Process one quantum in place
    ///
    /// Sources overwrite the buffer, effects transform it.
    fn process(&mut self, buffer: &mut StereoBuffer);

    /// Set a parameter through the shared cells
    ///
    /// The layer does not re-validate ranges; callers clamp first.
    fn set_parameter(&self, param: NodeParam, value: f32) -> Result<(), NodeError> {
        self.params().set(param, value)
    }

    /// Clear internal state (delay lines, playheads)
    fn reset(&mut self) {}
}
