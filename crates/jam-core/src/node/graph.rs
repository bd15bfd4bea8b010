//! Control-side node graph: attachment, connections and format negotiation
//!
//! The graph never touches audio. It tracks which nodes the engine owns, how
//! they are wired, and the format agreed for each connection. DSP bodies live
//! on the render thread; the graph keeps a [`NodeRef`] (id + parameter cells)
//! for every attached node.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::{AudioNode, FormatSupport, NodeKind, NodeParam, NodeParams};
use crate::types::AudioFormat;

/// Arena-style identifier of an attached node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Why two endpoints could not agree on a format
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatNegotiationError {
    #[error("sample rate mismatch: {from}Hz source cannot feed {to}Hz input (no rate conversion)")]
    SampleRate { from: u32, to: u32 },

    #[error("{kind} accepts at most {max} channels, {requested} requested")]
    Channels {
        kind: NodeKind,
        requested: u16,
        max: u16,
    },

    #[error("{0} has no input bus")]
    NoInput(NodeKind),

    #[error("requested format {requested} does not match source format {source_format}")]
    Incompatible {
        requested: AudioFormat,
        source_format: AudioFormat,
    },
}

/// Node-layer misuse
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("{0} is not attached")]
    NotAttached(NodeId),

    #[error("{kind} node has no parameter '{param}'")]
    UnknownParameter { kind: NodeKind, param: NodeParam },

    #[error("cannot connect {0} to itself")]
    SelfConnection(NodeId),

    #[error("format negotiation failed: {0}")]
    Negotiation(#[from] FormatNegotiationError),
}

/// Control-side handle to an attached node
#[derive(Debug, Clone)]
pub struct NodeRef {
    pub id: NodeId,
    pub kind: NodeKind,
    pub params: Arc<NodeParams>,
}

impl NodeRef {
    /// Write a parameter on the attached node (observed next render quantum)
    pub fn set(&self, param: NodeParam, value: f32) -> Result<(), NodeError> {
        self.params.set(param, value)
    }

    /// Read back a parameter value
    pub fn get(&self, param: NodeParam) -> Option<f32> {
        self.params.get(param)
    }
}

/// A live edge of the graph with its negotiated format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
    pub format: AudioFormat,
}

struct Slot {
    kind: NodeKind,
    output: AudioFormat,
    input: FormatSupport,
    params: Arc<NodeParams>,
}

/// Registry of attached nodes and their connections
#[derive(Default)]
pub struct NodeGraph {
    nodes: HashMap<NodeId, Slot>,
    connections: Vec<Connection>,
    next_id: u32,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node, returning its control handle
    pub fn attach(&mut self, node: &dyn AudioNode) -> NodeRef {
        let id = NodeId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        let params = Arc::clone(node.params());
        self.nodes.insert(
            id,
            Slot {
                kind: node.kind(),
                output: node.output_format(),
                input: node.input_support(),
                params: Arc::clone(&params),
            },
        );
        log::debug!("Attached {} node as {}", node.kind(), id);

        NodeRef {
            id,
            kind: node.kind(),
            params,
        }
    }

    /// Connect `from`'s output to `to`'s input
    ///
    /// With `format = None` the graph negotiates: the sample rate must match
    /// on both ends, and the channel count is the source's, down-mixed to what
    /// the destination accepts. An explicit format must carry the source rate
    /// and a channel count the destination accepts (up/down-mix is implicit).
    pub fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        format: Option<AudioFormat>,
    ) -> Result<AudioFormat, NodeError> {
        if from == to {
            return Err(NodeError::SelfConnection(from));
        }
        let source = self.slot(from)?;
        let dest = self.slot(to)?;
        let agreed = negotiate(source.output, dest.kind, dest.input, format)?;

        self.connections.retain(|c| !(c.from == from && c.to == to));
        self.connections.push(Connection {
            from,
            to,
            format: agreed,
        });
        log::debug!("Connected {} -> {} at {}", from, to, agreed);
        Ok(agreed)
    }

    /// Remove a single connection; returns whether it existed
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| !(c.from == from && c.to == to));
        before != self.connections.len()
    }

    /// Detach a node and every connection touching it
    pub fn detach(&mut self, id: NodeId) -> Result<(), NodeError> {
        let slot = self.nodes.remove(&id).ok_or(NodeError::NotAttached(id))?;
        self.connections.retain(|c| c.from != id && c.to != id);
        log::debug!("Detached {} node {}", slot.kind, id);
        Ok(())
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn connection(&self, from: NodeId, to: NodeId) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.from == from && c.to == to)
    }

    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.connection(from, to).is_some()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Parameter cells of an attached node
    pub fn params(&self, id: NodeId) -> Result<&Arc<NodeParams>, NodeError> {
        self.slot(id).map(|s| &s.params)
    }

    /// Drop everything (engine stop)
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
    }

    fn slot(&self, id: NodeId) -> Result<&Slot, NodeError> {
        self.nodes.get(&id).ok_or(NodeError::NotAttached(id))
    }
}

fn negotiate(
    source: AudioFormat,
    dest_kind: NodeKind,
    dest: FormatSupport,
    requested: Option<AudioFormat>,
) -> Result<AudioFormat, FormatNegotiationError> {
    if dest.max_channels == 0 {
        return Err(FormatNegotiationError::NoInput(dest_kind));
    }
    if source.sample_rate != dest.sample_rate {
        return Err(FormatNegotiationError::SampleRate {
            from: source.sample_rate,
            to: dest.sample_rate,
        });
    }

    match requested {
        Some(format) => {
            if format.sample_rate != source.sample_rate || format.channels == 0 {
                return Err(FormatNegotiationError::Incompatible {
                    requested: format,
                    source_format: source,
                });
            }
            if format.channels > dest.max_channels {
                return Err(FormatNegotiationError::Channels {
                    kind: dest_kind,
                    requested: format.channels,
                    max: dest.max_channels,
                });
            }
            Ok(format)
        }
        None => Ok(AudioFormat::new(
            source.sample_rate,
            source.channels.clamp(1, dest.max_channels),
        )),
    }
}
