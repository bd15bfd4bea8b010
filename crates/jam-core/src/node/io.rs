//! Device-facing nodes: live input source and output sink
//!
//! Capture and render run in separate callbacks (often separate threads), so
//! the input source is fed through an `rtrb` ring: the capture side pushes
//! frames with a [`MonitorFeed`], the render side pops them in
//! [`InputSource::process`]. Neither side blocks; overflow drops frames and
//! underflow plays silence.

use std::sync::Arc;

use super::{AudioNode, FormatSupport, NodeKind, NodeParam, NodeParams};
use crate::types::{AudioFormat, Sample, StereoBuffer, StereoSample, MAX_NODE_CHANNELS};

/// Live input node (monitor path of the hardware input)
///
/// Parameters:
/// - Volume: monitor gain (0.0-1.0)
pub struct InputSource {
    params: Arc<NodeParams>,
    device_format: AudioFormat,
    ring: rtrb::Consumer<StereoSample>,
}

/// Capture-side producer of an [`InputSource`]
pub struct MonitorFeed {
    ring: rtrb::Producer<StereoSample>,
    dropped: u64,
}

impl InputSource {
    /// Create the node plus the feed handle for the capture callback
    ///
    /// `capacity` is the ring size in frames.
    pub fn new(device_format: AudioFormat, capacity: usize, gain: f32) -> (Self, MonitorFeed) {
        let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
        let params = NodeParams::new(NodeKind::InputSource, &[(NodeParam::Volume, gain)]);
        (
            Self {
                params,
                device_format,
                ring: consumer,
            },
            MonitorFeed {
                ring: producer,
                dropped: 0,
            },
        )
    }

    /// Format of the hardware input this node mirrors
    pub fn device_format(&self) -> AudioFormat {
        self.device_format
    }
}

impl AudioNode for InputSource {
    fn kind(&self) -> NodeKind {
        NodeKind::InputSource
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::new(
            self.device_format.sample_rate,
            self.device_format.channels.clamp(1, MAX_NODE_CHANNELS),
        )
    }

    fn input_support(&self) -> FormatSupport {
        FormatSupport::none(self.device_format.sample_rate)
    }

    fn params(&self) -> &Arc<NodeParams> {
        &self.params
    }

    fn process(&mut self, buffer: &mut StereoBuffer) {
        // Keep monitor latency bounded: never lag more than two quanta behind
        let backlog = self.ring.slots();
        let limit = buffer.len() * 2;
        if backlog > limit {
            if let Ok(chunk) = self.ring.read_chunk(backlog - limit) {
                chunk.commit_all();
            }
        }

        let gain = self.params.value(NodeParam::Volume);
        for out in buffer.iter_mut() {
            *out = match self.ring.pop() {
                Ok(frame) => frame * gain,
                Err(_) => StereoSample::silence(),
            };
        }
    }

    fn reset(&mut self) {
        let pending = self.ring.slots();
        if let Ok(chunk) = self.ring.read_chunk(pending) {
            chunk.commit_all();
        }
    }
}

impl MonitorFeed {
    /// Push an interleaved capture buffer (any channel count)
    ///
    /// Returns the number of frames dropped because the ring was full.
    pub fn push_interleaved(&mut self, data: &[Sample], channels: usize) -> usize {
        let mut dropped = 0;
        for frame in data.chunks_exact(channels.max(1)) {
            if self.ring.push(StereoSample::from_frame(frame)).is_err() {
                dropped += 1;
            }
        }
        self.dropped += dropped as u64;
        dropped
    }

    /// Total frames dropped since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Hardware output node
///
/// Has no parameters; it converts the mixer bus to the device layout.
pub struct OutputSink {
    params: Arc<NodeParams>,
    device_format: AudioFormat,
}

impl OutputSink {
    pub fn new(device_format: AudioFormat) -> Self {
        Self {
            params: NodeParams::new(NodeKind::OutputSink, &[]),
            device_format,
        }
    }

    /// Write the mixer bus into the interleaved device buffer
    #[inline]
    pub fn write(&self, bus: &StereoBuffer, output: &mut [Sample]) {
        bus.write_interleaved(output, self.device_format.channels as usize);
    }

    pub fn device_format(&self) -> AudioFormat {
        self.device_format
    }
}

impl AudioNode for OutputSink {
    fn kind(&self) -> NodeKind {
        NodeKind::OutputSink
    }

    fn output_format(&self) -> AudioFormat {
        self.device_format
    }

    fn input_support(&self) -> FormatSupport {
        FormatSupport::up_to_stereo(self.device_format.sample_rate)
    }

    fn params(&self) -> &Arc<NodeParams> {
        &self.params
    }

    fn process(&mut self, _buffer: &mut StereoBuffer) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_source_pulls_from_feed() {
        let (mut source, mut feed) = InputSource::new(AudioFormat::mono(48000), 64, 1.0);
        assert_eq!(source.output_format(), AudioFormat::mono(48000));

        assert_eq!(feed.push_interleaved(&[0.1, 0.2, 0.3], 1), 0);

        let mut buffer = StereoBuffer::silence(4);
        source.process(&mut buffer);
        assert_eq!(buffer[0], StereoSample::mono(0.1));
        assert_eq!(buffer[2], StereoSample::mono(0.3));
        assert_eq!(buffer[3], StereoSample::silence(), "underflow plays silence");
    }

    #[test]
    fn test_feed_overflow_counts_drops() {
        let (_source, mut feed) = InputSource::new(AudioFormat::stereo(48000), 2, 1.0);
        let dropped = feed.push_interleaved(&[0.0; 8], 2);
        assert_eq!(dropped, 2);
        assert_eq!(feed.dropped(), 2);
    }

    #[test]
    fn test_input_backlog_is_trimmed() {
        let (mut source, mut feed) = InputSource::new(AudioFormat::mono(48000), 64, 0.5);
        let data: Vec<f32> = (0..10).map(|i| i as f32).collect();
        feed.push_interleaved(&data, 1);

        // Quantum of 2 keeps at most 4 frames of backlog: frames 6.. remain
        let mut buffer = StereoBuffer::silence(2);
        source.process(&mut buffer);
        assert_eq!(buffer[0], StereoSample::mono(3.0));
        assert_eq!(buffer[1], StereoSample::mono(3.5));
    }

    #[test]
    fn test_output_sink_writes_device_layout() {
        let sink = OutputSink::new(AudioFormat::new(48000, 1));
        let bus = StereoBuffer::from_vec(vec![StereoSample::new(1.0, 0.0); 2]);
        let mut out = [0.0f32; 2];
        sink.write(&bus, &mut out);
        assert_eq!(out, [0.5, 0.5]);
    }
}
