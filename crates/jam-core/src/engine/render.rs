//! Render-thread side of the engine
//!
//! The render callback owns every DSP body exclusively. The control side never
//! touches them; it only:
//! - writes parameter cells (atomics, observed next quantum)
//! - pushes [`RenderCommand`]s into a pre-allocated `rtrb` ring, drained at the
//!   start of every callback
//!
//! Per quantum:
//!
//! ```text
//!   commands ──► add/remove chains
//!   InputSource ─────────────────────────────┐
//!   chain 0: LoopPlayer ─► Reverb ─► Delay ──┤
//!   chain N: LoopPlayer ─► Reverb ─► Delay ──┼──► Mixer (master) ──► OutputSink
//! ```
//!
//! Large callbacks are processed in `MAX_BUFFER_SIZE` slices so the working
//! buffers, sized once at construction, are never grown.

use basedrop::Owned;

use crate::audio::{RenderCallback, MAX_BUFFER_SIZE};
use crate::node::{AudioNode, DelayUnit, InputSource, LoopPlayer, MixerNode, OutputSink, ReverbUnit};
use crate::types::{Sample, StereoBuffer};

/// One track's processing chain as owned by the render thread
pub struct RenderChain {
    key: u64,
    player: LoopPlayer,
    reverb: ReverbUnit,
    delay: DelayUnit,
    scratch: StereoBuffer,
}

impl RenderChain {
    pub fn new(key: u64, player: LoopPlayer, reverb: ReverbUnit, delay: DelayUnit) -> Self {
        Self {
            key,
            player,
            reverb,
            delay,
            scratch: StereoBuffer::with_capacity(MAX_BUFFER_SIZE),
        }
    }

    /// Identifies the chain in [`RenderCommand::RemoveChain`]
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Run player → reverb → delay for `frames` frames
    #[inline]
    fn render(&mut self, frames: usize) -> &StereoBuffer {
        self.scratch.set_len_from_capacity(frames);
        self.player.process(&mut self.scratch);
        self.reverb.process(&mut self.scratch);
        self.delay.process(&mut self.scratch);
        &self.scratch
    }
}

/// Structural changes sent from the control thread
///
/// Chains travel boxed in `basedrop::Owned`: when the render thread drops one
/// the deallocation is deferred to the collector thread.
pub enum RenderCommand {
    /// Start mixing a new track chain
    AddChain(Owned<RenderChain>),
    /// Stop mixing and release the chain with this key
    RemoveChain { key: u64 },
}

/// Create the control → render command ring
pub fn command_channel(
    capacity: usize,
) -> (rtrb::Producer<RenderCommand>, rtrb::Consumer<RenderCommand>) {
    rtrb::RingBuffer::new(capacity.max(1))
}

/// The render callback: mixes live input and every track chain to the output
pub struct RenderProcessor {
    commands: rtrb::Consumer<RenderCommand>,
    /// Capacity fixed at construction; never grown on the render thread
    chains: Vec<Owned<RenderChain>>,
    input: Option<InputSource>,
    input_buffer: StereoBuffer,
    mixer: MixerNode,
    output: OutputSink,
    bus: StereoBuffer,
}

impl RenderProcessor {
    pub fn new(
        commands: rtrb::Consumer<RenderCommand>,
        max_chains: usize,
        input: Option<InputSource>,
        mixer: MixerNode,
        output: OutputSink,
    ) -> Self {
        Self {
            commands,
            chains: Vec::with_capacity(max_chains),
            input,
            input_buffer: StereoBuffer::with_capacity(MAX_BUFFER_SIZE),
            mixer,
            output,
            bus: StereoBuffer::with_capacity(MAX_BUFFER_SIZE),
        }
    }

    /// Number of chains currently mixed
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                RenderCommand::AddChain(chain) => {
                    // The registry enforces the limit; a chain past capacity is
                    // released rather than growing the Vec here
                    if self.chains.len() < self.chains.capacity() {
                        self.chains.push(chain);
                    }
                }
                RenderCommand::RemoveChain { key } => {
                    if let Some(index) = self.chains.iter().position(|c| c.key() == key) {
                        // Dropping the Owned defers the free to the collector
                        self.chains.swap_remove(index);
                    }
                }
            }
        }
    }

    fn render_slice(&mut self, output: &mut [Sample], channels: usize) {
        let frames = output.len() / channels;
        self.bus.set_len_from_capacity(frames);
        self.bus.fill_silence();

        if let Some(input) = self.input.as_mut() {
            self.input_buffer.set_len_from_capacity(frames);
            input.process(&mut self.input_buffer);
            self.mixer.mix_into(&mut self.bus, &self.input_buffer);
        }

        for chain in self.chains.iter_mut() {
            let rendered = chain.render(frames);
            self.mixer.mix_into(&mut self.bus, rendered);
        }

        self.mixer.process(&mut self.bus);
        self.output.write(&self.bus, output);
    }
}

impl RenderCallback for RenderProcessor {
    fn process(&mut self, output: &mut [Sample]) {
        self.process_commands();

        let channels = (self.output.device_format().channels as usize).max(1);
        for slice in output.chunks_mut(MAX_BUFFER_SIZE * channels) {
            self.render_slice(slice, channels);
        }
    }
}
