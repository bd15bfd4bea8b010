//! CPAL audio backend implementation
//!
//! Capture and playback run as two CPAL streams, possibly on different devices
//! of the same host:
//!
//! ```text
//!   ┌──────────────────┐  interleaved   ┌───────────────────────┐
//!   │  Input Stream    │───────────────►│   CaptureCallback     │ fan-out hub,
//!   │ (hardware clock) │                │                       │ monitor ring
//!   └──────────────────┘                └───────────────────────┘
//!   ┌──────────────────┐   fills        ┌───────────────────────┐
//!   │  Output Stream   │◄───────────────│   RenderCallback      │ track chains,
//!   │ (hardware clock) │                │                       │ mixer
//!   └──────────────────┘                └───────────────────────┘
//! ```
//!
//! CPAL streams are not `Send` on every platform, so they are built, played and
//! dropped on a dedicated "audio-streams" thread. The [`CpalStreamHandle`] only
//! holds a stop channel and the join handle.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::backend::{AudioBackend, CaptureCallback, NegotiatedFormats, RenderCallback, StreamHandle};
use super::config::{
    AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, LOW_LATENCY_BUFFER_SIZE, MAX_BUFFER_SIZE,
};
use super::device::{default_device, find_device, Direction};
use super::error::{AudioError, AudioResult};
use crate::types::AudioFormat;

/// Backend using the platform's audio devices
#[derive(Debug, Default)]
pub struct CpalBackend {
    config: AudioConfig,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

/// CPAL-specific stream handle
///
/// Dropping it stops both streams and joins the stream thread.
pub struct CpalStreamHandle {
    formats: NegotiatedFormats,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalStreamHandle {
    pub fn formats(&self) -> NegotiatedFormats {
        self.formats
    }
}

impl Drop for CpalStreamHandle {
    fn drop(&mut self) {
        // Dropping the sender wakes the stream thread as well
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Audio stream thread panicked during shutdown");
            }
        }
        log::info!("Audio streams stopped");
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn negotiate(&mut self, config: &AudioConfig) -> AudioResult<NegotiatedFormats> {
        self.config = config.clone();

        let output_device = resolve_output(config)?;
        log::info!(
            "Output device: {}",
            output_device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        let output = output_config(&output_device, config.preferred_sample_rate())?;
        let sample_rate = output.sample_rate().0;

        let input = match resolve_input(config)? {
            Some(device) => {
                log::info!(
                    "Input device: {}",
                    device.name().unwrap_or_else(|_| "Unknown".to_string())
                );
                let input = input_config(&device, sample_rate)?;
                Some(AudioFormat::new(input.sample_rate().0, input.channels()))
            }
            None => {
                log::warn!("No input device available; recording will be unavailable");
                None
            }
        };

        let buffer_size = select_buffer_size(config.buffer_size);
        let formats = NegotiatedFormats {
            input,
            output: AudioFormat::new(sample_rate, output.channels()),
            buffer_size,
        };

        log::info!(
            "Audio config: input {}, output {}, {} frames (~{:.1}ms latency)",
            formats
                .input
                .map(|f| f.to_string())
                .unwrap_or_else(|| "none".to_string()),
            formats.output,
            buffer_size,
            formats.latency_ms()
        );
        Ok(formats)
    }

    fn start(
        &mut self,
        formats: NegotiatedFormats,
        capture: Option<Box<dyn CaptureCallback>>,
        render: Box<dyn RenderCallback>,
    ) -> AudioResult<StreamHandle> {
        let config = self.config.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<AudioResult<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("audio-streams".to_string())
            .spawn(move || {
                let streams = match open_streams(&config, formats, capture, render) {
                    Ok(streams) => {
                        let _ = ready_tx.send(Ok(()));
                        streams
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until stopped (message or sender dropped)
                let _ = stop_rx.recv();
                drop(streams);
            })
            .map_err(|e| AudioError::StreamBuildError(format!("spawn stream thread: {}", e)))?;

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err(AudioError::StreamBuildError(
                "stream thread exited before reporting".to_string(),
            ))
        });

        if let Err(e) = started {
            let _ = thread.join();
            return Err(e);
        }

        log::info!("Audio streams started");
        Ok(StreamHandle::Cpal(CpalStreamHandle {
            formats,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }))
    }
}

/// Streams owned by the stream thread
struct OpenStreams {
    _input: Option<Stream>,
    _output: Stream,
}

fn open_streams(
    config: &AudioConfig,
    formats: NegotiatedFormats,
    capture: Option<Box<dyn CaptureCallback>>,
    render: Box<dyn RenderCallback>,
) -> AudioResult<OpenStreams> {
    let output_device = resolve_output(config)?;
    let output = build_output_stream(&output_device, &stream_config(formats.output, formats.buffer_size), render)?;

    let input = match (formats.input, capture) {
        (Some(format), Some(capture)) => {
            let device = resolve_input(config)?.ok_or_else(|| {
                AudioError::DeviceNotFound("input device disappeared".to_string())
            })?;
            Some(build_input_stream(&device, &stream_config(format, formats.buffer_size), capture)?)
        }
        _ => None,
    };

    // Start output first so monitored input always has somewhere to go
    output
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Output: {}", e)))?;
    if let Some(input) = &input {
        input
            .play()
            .map_err(|e| AudioError::StreamPlayError(format!("Input: {}", e)))?;
    }

    Ok(OpenStreams {
        _input: input,
        _output: output,
    })
}

fn resolve_output(config: &AudioConfig) -> AudioResult<cpal::Device> {
    match &config.output_device {
        Some(id) => find_device(id, Direction::Output),
        None => default_device(Direction::Output)?
            .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string())),
    }
}

fn resolve_input(config: &AudioConfig) -> AudioResult<Option<cpal::Device>> {
    match &config.input_device {
        Some(id) => find_device(id, Direction::Input).map(Some),
        None => default_device(Direction::Input),
    }
}

fn stream_config(format: AudioFormat, buffer_size: u32) -> StreamConfig {
    StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    }
}

/// Map our buffer preference to a concrete frame count
fn select_buffer_size(preference: BufferSize) -> u32 {
    let frames = match preference {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        BufferSize::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE as u32),
        BufferSize::LowLatency => LOW_LATENCY_BUFFER_SIZE,
    };
    log::debug!("Selected buffer size: {} frames for {:?}", frames, preference);
    frames
}

fn rate_in_range(range: &cpal::SupportedStreamConfigRange, rate: u32) -> bool {
    rate >= range.min_sample_rate().0 && rate <= range.max_sample_rate().0
}

/// Best f32 output config, preferring stereo at the target rate
fn output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    if supported.is_empty() {
        return Err(AudioError::UnsupportedFormat(
            "output device offers no f32 configuration".to_string(),
        ));
    }

    let best = supported
        .iter()
        .find(|c| c.channels() >= 2 && rate_in_range(c, target_rate))
        .or_else(|| supported.iter().find(|c| rate_in_range(c, target_rate)))
        .or_else(|| supported.iter().find(|c| c.channels() >= 2))
        .unwrap_or(&supported[0]);

    let rate = if rate_in_range(best, target_rate) {
        cpal::SampleRate(target_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Output device doesn't support {}Hz, falling back to {}Hz",
            target_rate,
            fallback.0
        );
        fallback
    };

    Ok(best.clone().with_sample_rate(rate))
}

/// Best f32 input config at exactly the output rate
fn input_config(
    device: &cpal::Device,
    output_rate: u32,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    if supported.is_empty() {
        return Err(AudioError::UnsupportedFormat(
            "input device offers no f32 configuration".to_string(),
        ));
    }

    // Fewest channels wins: mono/stereo mics are the common case
    let best = supported
        .iter()
        .filter(|c| rate_in_range(c, output_rate))
        .min_by_key(|c| c.channels())
        .ok_or_else(|| AudioError::SampleRateMismatch {
            input: supported[0].max_sample_rate().0,
            output: output_rate,
        })?;

    Ok(best.clone().with_sample_rate(cpal::SampleRate(output_rate)))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut render: Box<dyn RenderCallback>,
) -> AudioResult<Stream> {
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                render.process(data);
            },
            move |err| {
                log::error!("Output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("Output: {}", e)))
}

fn build_input_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut capture: Box<dyn CaptureCallback>,
) -> AudioResult<Stream> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                capture.process(data);
            },
            move |err| {
                log::error!("Input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(format!("Input: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_selection() {
        assert_eq!(select_buffer_size(BufferSize::Default), DEFAULT_BUFFER_SIZE);
        assert_eq!(select_buffer_size(BufferSize::Fixed(16)), 64);
        assert_eq!(select_buffer_size(BufferSize::Fixed(100_000)), MAX_BUFFER_SIZE as u32);
        assert_eq!(select_buffer_size(BufferSize::LowLatency), LOW_LATENCY_BUFFER_SIZE);
    }

    #[test]
    fn test_stream_config_mapping() {
        let config = stream_config(AudioFormat::mono(44100), 256);
        assert_eq!(config.channels, 1);
        assert_eq!(config.sample_rate.0, 44100);
        assert_eq!(config.buffer_size, CpalBufferSize::Fixed(256));
    }
}
