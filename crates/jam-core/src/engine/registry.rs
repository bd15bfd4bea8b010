//! Track registry - track id → chain handles and cached parameters
//!
//! The registry is control-side only. For each track it keeps the graph
//! handles of the three chain nodes and the last values written through the
//! control surface. The DSP bodies themselves are handed to the render thread
//! as a [`RenderChain`] when the track is created.
//!
//! A track is in the registry exactly when its player, reverb and delay are
//! attached to the graph and connected player → reverb → delay → mixer.

use std::collections::HashMap;

use serde::Serialize;

use super::error::{EngineError, EngineResult};
use super::render::RenderChain;
use crate::node::{DelayUnit, LoopBuffer, LoopPlayer, NodeGraph, NodeId, NodeRef, ReverbUnit};
use crate::types::TrackId;

/// Cached per-track control values
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackParameters {
    /// Linear gain, 0.0-1.0
    pub volume: f32,
    /// Reverb wet mix, 0-100
    pub reverb_mix: f32,
    /// Delay wet mix, 0-100
    pub delay_mix: f32,
}

impl Default for TrackParameters {
    fn default() -> Self {
        Self {
            volume: 1.0,
            reverb_mix: 0.0,
            delay_mix: 0.0,
        }
    }
}

/// Graph handles of one track's nodes
#[derive(Debug, Clone)]
pub struct TrackChain {
    pub id: TrackId,
    pub player: NodeRef,
    pub reverb: NodeRef,
    pub delay: NodeRef,
    /// Render-side key of the chain
    pub key: u64,
    /// Loop length in frames
    pub frames: usize,
}

impl TrackChain {
    fn node_ids(&self) -> [NodeId; 3] {
        [self.player.id, self.reverb.id, self.delay.id]
    }
}

/// A registered track
#[derive(Debug, Clone)]
pub struct TrackEntry {
    pub chain: TrackChain,
    pub params: TrackParameters,
}

/// Owner of the track id → chain mapping
#[derive(Debug)]
pub struct TrackRegistry {
    tracks: HashMap<TrackId, TrackEntry>,
    capacity: usize,
    next_key: u64,
}

impl TrackRegistry {
    /// Registry holding at most `capacity` tracks
    pub fn new(capacity: usize) -> Self {
        Self {
            tracks: HashMap::with_capacity(capacity),
            capacity,
            next_key: 0,
        }
    }

    /// Build, attach and connect a chain for `id` looping `buffer`
    ///
    /// Returns the render-side chain; the caller hands it to the render
    /// thread. Nothing stays attached when this fails.
    pub fn create_track(
        &mut self,
        id: TrackId,
        buffer: LoopBuffer,
        graph: &mut NodeGraph,
        mixer: NodeId,
        sample_rate: u32,
    ) -> EngineResult<RenderChain> {
        self.check_can_create(&id)?;

        let frames = buffer.frames();
        let player = LoopPlayer::new(buffer);
        let reverb = ReverbUnit::new(sample_rate);
        let delay = DelayUnit::new(sample_rate);

        let player_ref = graph.attach(&player);
        let reverb_ref = graph.attach(&reverb);
        let delay_ref = graph.attach(&delay);

        let wired = graph
            .connect(player_ref.id, reverb_ref.id, None)
            .and_then(|_| graph.connect(reverb_ref.id, delay_ref.id, None))
            .and_then(|_| graph.connect(delay_ref.id, mixer, None));

        if let Err(e) = wired {
            for node in [player_ref.id, reverb_ref.id, delay_ref.id] {
                let _ = graph.detach(node);
            }
            return Err(e.into());
        }

        let key = self.next_key;
        self.next_key += 1;

        let chain = TrackChain {
            id: id.clone(),
            player: player_ref,
            reverb: reverb_ref,
            delay: delay_ref,
            key,
            frames,
        };
        self.tracks.insert(
            id.clone(),
            TrackEntry {
                chain,
                params: TrackParameters::default(),
            },
        );
        log::info!("Created track '{}' ({} frames)", id, frames);

        Ok(RenderChain::new(key, player, reverb, delay))
    }

    /// Fail fast when `id` could not be created right now
    pub fn check_can_create(&self, id: &TrackId) -> EngineResult<()> {
        if self.tracks.contains_key(id) {
            return Err(EngineError::DuplicateTrack(id.clone()));
        }
        if self.tracks.len() >= self.capacity {
            return Err(EngineError::TrackLimit(self.capacity));
        }
        Ok(())
    }

    /// Detach and forget a track; no-op if absent
    ///
    /// Returns the removed chain so the caller can release its render side.
    pub fn remove_track(&mut self, id: &TrackId, graph: &mut NodeGraph) -> Option<TrackChain> {
        let entry = self.tracks.remove(id)?;
        for node in entry.chain.node_ids() {
            let _ = graph.detach(node);
        }
        log::info!("Removed track '{}'", id);
        Some(entry.chain)
    }

    /// Run `f` against the entry for `id`
    pub fn with_track<R>(
        &mut self,
        id: &TrackId,
        f: impl FnOnce(&mut TrackEntry) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let entry = self
            .tracks
            .get_mut(id)
            .ok_or_else(|| EngineError::TrackNotFound(id.clone()))?;
        f(entry)
    }

    pub fn get(&self, id: &TrackId) -> Option<&TrackEntry> {
        self.tracks.get(id)
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.tracks.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackEntry> {
        self.tracks.values()
    }

    /// Track ids, sorted
    pub fn ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.tracks.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every track (engine stop; the graph is cleared separately)
    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}
