//! Transport and parameter control surface
//!
//! Every operation here is a control-thread call: it takes the control lock,
//! validates, then either writes parameter cells (single atomic stores, seen
//! by the render thread on its next quantum) or queues a render command.
//! Values are clamped before they reach a node; NaN counts as the minimum.
//!
//! Failures are returned and logged at `warn`; none of them is fatal.

use std::path::Path;

use basedrop::Owned;

use super::engine::{ControlState, LoopEngine, Running};
use super::error::{EngineError, EngineResult};
use super::recorder::{read_loop_file, RecordingState};
use super::registry::{TrackEntry, TrackRegistry};
use super::render::RenderCommand;
use crate::node::{LoopBuffer, NodeGraph, NodeParam};
use crate::types::TrackId;

/// Clamp to the 0.0-1.0 gain range
fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Clamp to the 0-100 percent range
fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn warn_on_err<T>(operation: &str, result: EngineResult<T>) -> EngineResult<T> {
    if let Err(e) = &result {
        log::warn!("{} failed: {}", operation, e);
    }
    result
}

impl LoopEngine {
    /// Begin capturing the live input
    ///
    /// Fails with `AlreadyRecording` (state unchanged) when a capture is in
    /// flight and with `DeviceUnavailable` when there is no usable input. A
    /// previous capture whose writer failed is released first and its
    /// `StorageIo` error returned.
    pub fn start_recording(&self) -> EngineResult<()> {
        let mut control = self.lock();
        let result = (|| -> EngineResult<()> {
            if control.running.is_none() {
                return Err(EngineError::NotRunning);
            }
            let input = control.running.as_ref().and_then(|r| r.formats.input);
            control.recorder.start(input, &self.hub)
        })();
        warn_on_err("start_recording", result)
    }

    /// Finish the capture and turn it into a new looping track `id`
    ///
    /// The new loop starts after the configured settle delay. A duplicate id
    /// or a full registry is rejected up front and the recording continues.
    pub fn stop_recording_and_create_loop(&self, id: impl Into<TrackId>) -> EngineResult<()> {
        let id = id.into();
        let mut control = self.lock();
        let result = self.stop_recording_locked(&mut control, id);
        warn_on_err("stop_recording_and_create_loop", result)
    }

    fn stop_recording_locked(&self, control: &mut ControlState, id: TrackId) -> EngineResult<()> {
        control.recorder.reap_failed(&self.hub)?;
        if control.recorder.state() != RecordingState::Recording {
            return Err(EngineError::NotRecording);
        }
        control.registry.check_can_create(&id)?;
        if !control.running_mut()?.has_command_slot() {
            return Err(EngineError::CommandQueueFull);
        }

        let ControlState {
            graph,
            registry,
            recorder,
            running,
            ..
        } = control;
        let running = running.as_mut().ok_or(EngineError::NotRunning)?;

        recorder.finalize(&self.hub, |buffer| {
            self.install_chain(graph, registry, running, id, buffer)
        })
    }

    /// Load a WAV file as a new looping track `id`
    ///
    /// The file must be at the engine's sample rate. The loop starts after
    /// the settle delay, like a recorded one.
    pub fn add_track_from_file(
        &self,
        id: impl Into<TrackId>,
        path: impl AsRef<Path>,
    ) -> EngineResult<()> {
        let id = id.into();
        let path = path.as_ref();
        let mut control = self.lock();
        let result = (|| -> EngineResult<()> {
            control.registry.check_can_create(&id)?;
            control.running_mut()?;
            let buffer = read_loop_file(path)?;
            if buffer.is_empty() {
                return Err(EngineError::EmptyCapture);
            }
            self.install_track(&mut control, id.clone(), buffer)
        })();
        if result.is_ok() {
            log::info!("Loaded track '{}' from {}", id, path.display());
        }
        warn_on_err("add_track_from_file", result)
    }

    fn install_track(
        &self,
        control: &mut ControlState,
        id: TrackId,
        buffer: LoopBuffer,
    ) -> EngineResult<()> {
        let ControlState {
            graph,
            registry,
            running,
            ..
        } = control;
        let running = running.as_mut().ok_or(EngineError::NotRunning)?;
        self.install_chain(graph, registry, running, id, buffer)
    }

    /// Build the chain for `id`, arm it and hand it to the render thread
    ///
    /// The new loop starts after the settle delay. Nothing stays registered
    /// when any step fails.
    fn install_chain(
        &self,
        graph: &mut NodeGraph,
        registry: &mut TrackRegistry,
        running: &mut Running,
        id: TrackId,
        buffer: LoopBuffer,
    ) -> EngineResult<()> {
        if !running.has_command_slot() {
            return Err(EngineError::CommandQueueFull);
        }

        let render = registry.create_track(
            id.clone(),
            buffer,
            graph,
            running.mixer.id,
            running.formats.sample_rate(),
        )?;
        let handed_over = start_after(registry.get(&id), self.config.settle_delay_secs())
            .and_then(|()| running.send(RenderCommand::AddChain(Owned::new(self.gc(), render))));
        if let Err(e) = handed_over {
            registry.remove_track(&id, graph);
            return Err(e);
        }
        Ok(())
    }

    /// Remove a track and release its nodes; no-op if absent
    pub fn remove_track(&self, id: impl Into<TrackId>) -> EngineResult<()> {
        let id = id.into();
        let mut control = self.lock();
        let result = (|| -> EngineResult<()> {
            if !control.registry.contains(&id) {
                return Ok(());
            }
            let ControlState {
                graph,
                registry,
                running,
                ..
            } = &mut *control;
            let running = running.as_mut().ok_or(EngineError::NotRunning)?;
            if !running.has_command_slot() {
                return Err(EngineError::CommandQueueFull);
            }
            if let Some(chain) = registry.remove_track(&id, graph) {
                running.send(RenderCommand::RemoveChain { key: chain.key })?;
            }
            Ok(())
        })();
        warn_on_err("remove_track", result)
    }

    /// Start every loaded loop from its first frame
    pub fn play_all(&self) -> EngineResult<()> {
        self.set_all_playing(true)
    }

    /// Stop every loaded loop
    pub fn stop_all(&self) -> EngineResult<()> {
        self.set_all_playing(false)
    }

    fn set_all_playing(&self, playing: bool) -> EngineResult<()> {
        let operation = if playing { "play_all" } else { "stop_all" };
        let control = self.lock();
        if control.running.is_none() {
            return warn_on_err(operation, Err(EngineError::NotRunning));
        }

        let value = if playing { 1.0 } else { 0.0 };
        for entry in control.registry.iter() {
            entry.chain.player.set(NodeParam::Playing, value)?;
        }
        log::debug!("{}: {} tracks", operation, control.registry.len());
        Ok(())
    }

    /// Set a track's volume (clamped to 0.0-1.0)
    pub fn set_volume(&self, id: impl Into<TrackId>, volume: f32) -> EngineResult<()> {
        let volume = clamp_unit(volume);
        self.with_track("set_volume", id.into(), |entry| {
            entry.chain.player.set(NodeParam::Volume, volume)?;
            entry.params.volume = volume;
            Ok(())
        })
    }

    /// Silence a track (volume 0)
    ///
    /// The previous volume is not remembered; pass it back to
    /// [`unmute_track`](Self::unmute_track).
    pub fn mute_track(&self, id: impl Into<TrackId>) -> EngineResult<()> {
        self.set_volume(id, 0.0)
    }

    /// Restore a muted track to `volume` (clamped to 0.0-1.0)
    pub fn unmute_track(&self, id: impl Into<TrackId>, volume: f32) -> EngineResult<()> {
        self.set_volume(id, volume)
    }

    /// Set a track's reverb wet mix (clamped to 0-100)
    pub fn set_reverb(&self, id: impl Into<TrackId>, mix: f32) -> EngineResult<()> {
        let mix = clamp_percent(mix);
        self.with_track("set_reverb", id.into(), |entry| {
            entry.chain.reverb.set(NodeParam::WetDryMix, mix)?;
            entry.params.reverb_mix = mix;
            Ok(())
        })
    }

    /// Set a track's delay wet mix (clamped to 0-100)
    pub fn set_delay(&self, id: impl Into<TrackId>, mix: f32) -> EngineResult<()> {
        let mix = clamp_percent(mix);
        self.with_track("set_delay", id.into(), |entry| {
            entry.chain.delay.set(NodeParam::WetDryMix, mix)?;
            entry.params.delay_mix = mix;
            Ok(())
        })
    }

    /// Set the master output volume (clamped to 0.0-1.0)
    pub fn set_master_volume(&self, volume: f32) -> EngineResult<()> {
        let volume = clamp_unit(volume);
        let mut control = self.lock();
        let result = control
            .running_mut()
            .and_then(|running| Ok(running.mixer.set(NodeParam::Volume, volume)?));
        warn_on_err("set_master_volume", result)
    }

    /// Master output volume (None when stopped)
    pub fn master_volume(&self) -> Option<f32> {
        self.lock()
            .running
            .as_ref()
            .and_then(|running| running.mixer.get(NodeParam::Volume))
    }

    fn with_track(
        &self,
        operation: &str,
        id: TrackId,
        f: impl FnOnce(&mut TrackEntry) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let mut control = self.lock();
        let result = control.registry.with_track(&id, f);
        warn_on_err(operation, result)
    }
}

/// Arm a freshly created player: silent for `settle` seconds, then looping
fn start_after(entry: Option<&TrackEntry>, settle: f32) -> EngineResult<()> {
    if let Some(entry) = entry {
        entry.chain.player.set(NodeParam::StartDelay, settle.max(0.0))?;
        entry.chain.player.set(NodeParam::Playing, 1.0)?;
    }
    Ok(())
}
