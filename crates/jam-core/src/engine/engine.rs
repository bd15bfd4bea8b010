//! Engine lifecycle manager
//!
//! [`LoopEngine`] is the explicitly constructed owner of everything: the
//! backend, the fan-out hub, the control-side node graph, the track registry
//! and the recorder. It is `Send + Sync`; control calls may come from any
//! number of threads and are serialized by one control lock that the audio
//! threads never take.

use std::sync::{Arc, Mutex, MutexGuard};

use basedrop::Handle;

use super::capture::CaptureProcessor;
use super::error::{EngineError, EngineResult};
use super::reclaim::Reclaimer;
use super::recorder::{Recorder, RecordingState, RecordingStatus, RECORDER_CONSUMER_KEY};
use super::registry::{TrackParameters, TrackRegistry};
use super::render::{command_channel, RenderCommand, RenderProcessor};
use crate::audio::{
    AudioBackend, AudioError, CaptureCallback, NegotiatedFormats, StreamHandle, DEFAULT_SAMPLE_RATE,
};
use crate::config::EngineConfig;
use crate::hub::{AudioConsumer, FanOutHub};
use crate::node::{InputSource, MixerNode, NodeGraph, NodeParam, NodeRef, OutputSink};
use crate::types::{AudioFormat, TrackId};

/// Monitor ring size in input buffers
const MONITOR_RING_BUFFERS: usize = 4;

/// State that only exists while the streams run
pub(super) struct Running {
    pub(super) formats: NegotiatedFormats,
    pub(super) commands: rtrb::Producer<RenderCommand>,
    pub(super) mixer: NodeRef,
    pub(super) stream: StreamHandle,
}

impl Running {
    /// Hand a command to the render thread without blocking
    pub(super) fn send(&mut self, command: RenderCommand) -> EngineResult<()> {
        self.commands
            .push(command)
            .map_err(|_| EngineError::CommandQueueFull)
    }

    pub(super) fn has_command_slot(&self) -> bool {
        self.commands.slots() > 0
    }
}

/// Everything behind the control lock
pub(super) struct ControlState {
    pub(super) backend: Box<dyn AudioBackend>,
    pub(super) graph: NodeGraph,
    pub(super) registry: TrackRegistry,
    pub(super) recorder: Recorder,
    pub(super) running: Option<Running>,
}

impl ControlState {
    pub(super) fn running_mut(&mut self) -> EngineResult<&mut Running> {
        self.running.as_mut().ok_or(EngineError::NotRunning)
    }
}

/// The looping engine
pub struct LoopEngine {
    pub(super) config: EngineConfig,
    pub(super) hub: Arc<FanOutHub>,
    pub(super) recording: RecordingStatus,
    pub(super) control: Mutex<ControlState>,
    gc: Handle,
    // Declared last: dropped after everything holding deferred allocations
    _reclaimer: Reclaimer,
}

impl LoopEngine {
    /// Create an idle engine; nothing touches the hardware until [`start`](Self::start)
    pub fn new(config: EngineConfig, backend: Box<dyn AudioBackend>) -> EngineResult<Self> {
        let (reclaimer, gc) = Reclaimer::spawn().map_err(|e| {
            EngineError::EngineStart(AudioError::StreamBuildError(format!(
                "spawn audio GC thread: {}",
                e
            )))
        })?;

        let hub = Arc::new(FanOutHub::new(gc.clone()));
        let recorder = Recorder::new(
            config.capture_dir.clone(),
            config.capture_queue_frames(DEFAULT_SAMPLE_RATE),
        );
        let recording = recorder.status();

        log::debug!("Loop engine created with {} backend", backend.name());
        Ok(Self {
            hub,
            recording,
            control: Mutex::new(ControlState {
                backend,
                graph: NodeGraph::new(),
                registry: TrackRegistry::new(config.max_tracks),
                recorder,
                running: None,
            }),
            config,
            gc,
            _reclaimer: reclaimer,
        })
    }

    /// Acquire permission, negotiate formats, wire the base graph and start
    /// the streams
    ///
    /// Starting a running engine is a no-op. On failure the engine stays idle.
    pub fn start(&self) -> EngineResult<()> {
        let mut control = self.lock();
        if control.running.is_some() {
            log::debug!("Engine already running");
            return Ok(());
        }

        match self.start_locked(&mut control) {
            Ok(running) => {
                log::info!(
                    "Engine started: output {}, input {}, {:.1}ms latency",
                    running.formats.output,
                    running
                        .formats
                        .input
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    running.formats.latency_ms()
                );
                control.running = Some(running);
                Ok(())
            }
            Err(e) => {
                control.graph.clear();
                log::error!("Engine failed to start: {}", e);
                Err(EngineError::EngineStart(e))
            }
        }
    }

    fn start_locked(&self, control: &mut ControlState) -> Result<Running, AudioError> {
        control.backend.request_capture_permission()?;
        let formats = control.backend.negotiate(&self.config.audio)?;
        let sample_rate = formats.sample_rate();

        control
            .recorder
            .set_queue_frames(self.config.capture_queue_frames(sample_rate));

        let mixer = MixerNode::new(sample_rate);
        let output = OutputSink::new(formats.output);

        control.graph.clear();
        let mixer_ref = control.graph.attach(&mixer);
        let output_ref = control.graph.attach(&output);
        control.graph.connect(mixer_ref.id, output_ref.id, None)?;

        let input_format = formats.input.filter(|f| f.channels > 0);
        let (input, feed) = match input_format {
            Some(format) => {
                let gain = if self.config.monitor_input {
                    self.config.monitor_gain.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let capacity = formats.buffer_size as usize * MONITOR_RING_BUFFERS;
                let (source, feed) = InputSource::new(format, capacity, gain);
                let input_ref = control.graph.attach(&source);
                control.graph.connect(input_ref.id, mixer_ref.id, None)?;
                let feed = if self.config.monitor_input { Some(feed) } else { None };
                (Some(source), feed)
            }
            None => (None, None),
        };

        let capture: Option<Box<dyn CaptureCallback>> = input_format.map(|format| {
            Box::new(CaptureProcessor::new(Arc::clone(&self.hub), format, feed))
                as Box<dyn CaptureCallback>
        });

        let (commands, rx) = command_channel(self.config.command_queue_capacity);
        let render = RenderProcessor::new(rx, self.config.max_tracks, input, mixer, output);

        let stream = control.backend.start(formats, capture, Box::new(render))?;

        Ok(Running {
            formats,
            commands,
            mixer: mixer_ref,
            stream,
        })
    }

    /// Stop the streams and release every attached node
    ///
    /// Always safe; stopping an idle engine does nothing. An in-flight
    /// recording is discarded. Consumer registrations survive a restart.
    pub fn stop(&self) {
        let mut control = self.lock();
        let Some(running) = control.running.take() else {
            return;
        };

        control.recorder.abort(&self.hub);
        drop(running.stream);
        control.registry.clear();
        control.graph.clear();
        log::info!("Engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    /// Current recording state (lock-free)
    pub fn recording_state(&self) -> RecordingState {
        self.recording.get()
    }

    /// Formats agreed with the hardware (None when stopped)
    pub fn formats(&self) -> Option<NegotiatedFormats> {
        self.lock().running.as_ref().map(|r| r.formats)
    }

    /// Sample rate of the running engine
    pub fn sample_rate(&self) -> Option<u32> {
        self.formats().map(|f| f.sample_rate())
    }

    /// Input format of the running engine (None without an input device)
    pub fn input_format(&self) -> Option<AudioFormat> {
        self.formats().and_then(|f| f.input)
    }

    /// Ids of all loaded tracks, sorted
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.lock().registry.ids()
    }

    pub fn track_count(&self) -> usize {
        self.lock().registry.len()
    }

    /// Cached parameters of a track
    pub fn track_parameters(&self, id: &TrackId) -> EngineResult<TrackParameters> {
        self.lock()
            .registry
            .get(id)
            .map(|entry| entry.params)
            .ok_or_else(|| EngineError::TrackNotFound(id.clone()))
    }

    /// Whether a track's player is set to play
    pub fn is_track_playing(&self, id: &TrackId) -> EngineResult<bool> {
        self.lock()
            .registry
            .get(id)
            .map(|entry| entry.chain.player.get(NodeParam::Playing).unwrap_or(0.0) >= 0.5)
            .ok_or_else(|| EngineError::TrackNotFound(id.clone()))
    }

    /// Subscribe to the live input
    ///
    /// Replaces any consumer under the same key, effective from the next
    /// buffer. The consumer runs on the capture thread and must not allocate,
    /// lock or block. Returns true when a registration was replaced.
    pub fn register_audio_consumer(
        &self,
        key: impl Into<String>,
        consumer: impl AudioConsumer,
    ) -> EngineResult<bool> {
        let key = key.into();
        if key == RECORDER_CONSUMER_KEY {
            log::warn!("Refusing to register consumer under reserved key '{}'", key);
            return Err(EngineError::ReservedConsumerKey(key));
        }
        Ok(self.hub.register_boxed(key, Box::new(consumer)))
    }

    /// Unsubscribe; no-op if `key` is not registered
    ///
    /// On return the consumer receives no further buffers. Safe to call from
    /// inside a consumer.
    pub fn unregister_audio_consumer(&self, key: &str) -> EngineResult<bool> {
        if key == RECORDER_CONSUMER_KEY {
            log::warn!("Refusing to unregister reserved consumer '{}'", key);
            return Err(EngineError::ReservedConsumerKey(key.to_string()));
        }
        Ok(self.hub.unregister(key))
    }

    /// Keys of the registered consumers, sorted
    pub fn consumer_keys(&self) -> Vec<String> {
        let mut keys = self.hub.keys();
        keys.sort();
        keys
    }

    /// Buffers a consumer failed on (error or panic) since registration
    pub fn consumer_failures(&self, key: &str) -> Option<u64> {
        self.hub.failures(key)
    }

    /// Collector handle for deferred render-side drops
    pub(super) fn gc(&self) -> &Handle {
        &self.gc
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for LoopEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for LoopEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopEngine")
            .field("running", &self.is_running())
            .field("recording", &self.recording_state())
            .field("tracks", &self.track_ids())
            .field("consumers", &self.consumer_keys())
            .finish()
    }
}
