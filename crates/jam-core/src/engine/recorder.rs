//! Recording state machine and capture write path
//!
//! ```text
//!   Idle ──start()──► Recording ──finalize()──► Finalizing ──► Idle
//! ```
//!
//! While recording, a consumer registered with the fan-out hub copies every
//! input frame into a bounded lock-free queue. It never blocks or touches the
//! filesystem: when the queue is full the frame is dropped and counted.
//!
//! ```text
//!   capture thread                 "capture-writer" thread
//!   ──────────────                 ───────────────────────
//!   hub.dispatch()                 loop:
//!     CaptureConsumer ──ArrayQueue──►  pop frames → hound WavWriter (temp file)
//!                                    stop flag seen → drain rest, finalize
//! ```
//!
//! Finalizing unregisters the consumer (which waits out any in-flight
//! dispatch), stops the writer, which drains everything already queued, then
//! reads the finished file back into a [`LoopBuffer`]. The temporary file is
//! deleted once the loop has been built.
//!
//! A write error aborts the capture on the spot: the writer flags the queue,
//! the consumer stops accepting frames and the state drops back to Idle. The
//! next `start` or [`Recorder::reap_failed`] releases the capture and returns
//! the error.

use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use serde::Serialize;
use tempfile::NamedTempFile;

use super::error::{EngineError, EngineResult, StorageError};
use crate::hub::{AudioConsumer, ConsumerError, FanOutHub, InputBuffer};
use crate::node::LoopBuffer;
use crate::types::{AudioFormat, Sample, StereoSample, MAX_NODE_CHANNELS};

/// Hub key of the recording consumer; callers cannot register under it
pub const RECORDER_CONSUMER_KEY: &str = "jam.recorder";

/// How long the writer sleeps when the queue is empty
const WRITER_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Lifecycle of a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Recording,
    Finalizing,
}

impl RecordingState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RecordingState::Recording,
            2 => RecordingState::Finalizing,
            _ => RecordingState::Idle,
        }
    }
}

/// Recording state readable from any thread without the engine lock
#[derive(Debug, Clone, Default)]
pub struct RecordingStatus(Arc<AtomicU8>);

impl RecordingStatus {
    pub fn get(&self) -> RecordingState {
        RecordingState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: RecordingState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Recording → Idle, leaving any other state alone
    fn abandon(&self) {
        let _ = self.0.compare_exchange(
            RecordingState::Recording as u8,
            RecordingState::Idle as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// Totals reported by the writer when a capture is closed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_written: u64,
    pub frames_dropped: u64,
}

struct CaptureQueue {
    frames: ArrayQueue<StereoSample>,
    dropped: AtomicU64,
    /// Set by the writer when the file can no longer be written
    failed: AtomicBool,
}

impl CaptureQueue {
    fn new(capacity: usize) -> Self {
        Self {
            frames: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
            failed: AtomicBool::new(false),
        }
    }
}

/// Hub consumer feeding the capture queue (capture thread)
struct CaptureConsumer {
    queue: Arc<CaptureQueue>,
}

impl AudioConsumer for CaptureConsumer {
    fn consume(&self, buffer: &InputBuffer<'_>) -> Result<(), ConsumerError> {
        if self.queue.failed.load(Ordering::Acquire) {
            return Err(ConsumerError("capture writer failed"));
        }
        let mut overflow = 0u64;
        for frame in buffer.frames_iter() {
            if self.queue.frames.push(StereoSample::from_frame(frame)).is_err() {
                overflow += 1;
            }
        }
        if overflow > 0 {
            self.queue.dropped.fetch_add(overflow, Ordering::Relaxed);
            return Err(ConsumerError("capture queue full"));
        }
        Ok(())
    }
}

/// The single in-flight capture: temp file, queue and writer thread
struct CapturedRecording {
    format: AudioFormat,
    file: NamedTempFile,
    queue: Arc<CaptureQueue>,
    stop: Arc<AtomicBool>,
    writer: Option<JoinHandle<Result<u64, StorageError>>>,
}

impl CapturedRecording {
    /// Create the temp file and start the writer
    ///
    /// `format` is the input format; the file keeps at most two channels.
    fn open(
        format: AudioFormat,
        dir: Option<&Path>,
        queue_frames: usize,
        status: RecordingStatus,
    ) -> Result<Self, StorageError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("jam-capture-").suffix(".wav");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let sink = BufWriter::new(file.reopen()?);
        Self::with_sink(format, file, sink, queue_frames, status)
    }

    /// Start a writer encoding into `sink`; `file` is what gets read back
    fn with_sink<W>(
        format: AudioFormat,
        file: NamedTempFile,
        sink: W,
        queue_frames: usize,
        status: RecordingStatus,
    ) -> Result<Self, StorageError>
    where
        W: Write + Seek + Send + 'static,
    {
        let format = AudioFormat::new(
            format.sample_rate,
            format.channels.clamp(1, MAX_NODE_CHANNELS),
        );
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::new(sink, spec)?;

        let queue = Arc::new(CaptureQueue::new(queue_frames));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            let channels = format.channels;
            thread::Builder::new()
                .name("capture-writer".to_string())
                .spawn(move || {
                    let result = write_capture(writer, &queue, &stop, channels);
                    if let Err(e) = &result {
                        log::warn!("Capture writer failed, recording aborted: {}", e);
                        queue.failed.store(true, Ordering::SeqCst);
                        status.abandon();
                    }
                    result
                })?
        };

        log::debug!("Capture file {} opened at {}", file.path().display(), format);
        Ok(Self {
            format,
            file,
            queue,
            stop,
            writer: Some(thread),
        })
    }

    /// Whether the writer gave up on the file
    fn failed(&self) -> bool {
        self.queue.failed.load(Ordering::SeqCst)
    }

    fn consumer(&self) -> CaptureConsumer {
        CaptureConsumer {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Stop the writer after it drained the queue; flushes and finalizes the file
    fn close(&mut self) -> Result<CaptureStats, StorageError> {
        self.stop.store(true, Ordering::Release);
        let frames_written = match self.writer.take() {
            Some(thread) => thread.join().map_err(|_| StorageError::WriterPanicked)??,
            None => 0,
        };
        Ok(CaptureStats {
            frames_written,
            frames_dropped: self.queue.dropped.load(Ordering::Relaxed),
        })
    }

    /// Close the capture and read it back as a loop
    fn into_loop(mut self) -> EngineResult<LoopBuffer> {
        let stats = self.close()?;
        if stats.frames_dropped > 0 {
            log::warn!(
                "Capture dropped {} frames (writer could not keep up)",
                stats.frames_dropped
            );
        }
        log::debug!("Capture closed: {} frames at {}", stats.frames_written, self.format);

        let buffer = read_loop_file(self.file.path())?;
        if buffer.is_empty() {
            return Err(EngineError::EmptyCapture);
        }
        Ok(buffer)
    }
}

impl Drop for CapturedRecording {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.close() {
                log::warn!("Discarded capture failed to close: {}", e);
            }
        }
    }
}

/// Writer thread body: drain the queue into the WAV file until stopped
fn write_capture<W: std::io::Write + std::io::Seek>(
    mut writer: hound::WavWriter<W>,
    queue: &CaptureQueue,
    stop: &AtomicBool,
    channels: u16,
) -> Result<u64, StorageError> {
    let mut frames = 0u64;
    loop {
        // Read the flag first: frames queued before it was raised are drained below
        let stopping = stop.load(Ordering::Acquire);

        let mut wrote = false;
        while let Some(frame) = queue.frames.pop() {
            if channels == 1 {
                writer.write_sample(frame.left)?;
            } else {
                writer.write_sample(frame.left)?;
                writer.write_sample(frame.right)?;
            }
            frames += 1;
            wrote = true;
        }

        if stopping {
            break;
        }
        if !wrote {
            thread::sleep(WRITER_POLL_INTERVAL);
        }
    }

    writer.finalize()?;
    Ok(frames)
}

/// Load a WAV file (float or integer PCM) into a loop buffer
pub fn read_loop_file(path: &Path) -> Result<LoopBuffer, StorageError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let data: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let format = AudioFormat::new(spec.sample_rate, spec.channels);
    Ok(LoopBuffer::from_interleaved(&data, format))
}

/// The recording state machine
///
/// At most one capture exists at a time.
pub struct Recorder {
    status: RecordingStatus,
    active: Option<CapturedRecording>,
    capture_dir: Option<PathBuf>,
    queue_frames: usize,
}

impl Recorder {
    /// `queue_frames` bounds the capture → writer handoff
    pub fn new(capture_dir: Option<PathBuf>, queue_frames: usize) -> Self {
        Self {
            status: RecordingStatus::default(),
            active: None,
            capture_dir,
            queue_frames,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.status.get()
    }

    /// Resize the handoff queue used by the next capture
    pub fn set_queue_frames(&mut self, frames: usize) {
        self.queue_frames = frames;
    }

    /// Shared view of the state for lock-free queries
    pub fn status(&self) -> RecordingStatus {
        self.status.clone()
    }

    /// Idle → Recording
    ///
    /// `input` is the negotiated capture format (None without an input device).
    pub fn start(&mut self, input: Option<AudioFormat>, hub: &FanOutHub) -> EngineResult<()> {
        self.reap_failed(hub)?;
        if self.active.is_some() {
            return Err(EngineError::AlreadyRecording);
        }
        let format = input
            .filter(|f| f.channels > 0)
            .ok_or(EngineError::DeviceUnavailable)?;

        let capture = CapturedRecording::open(
            format,
            self.capture_dir.as_deref(),
            self.queue_frames,
            self.status(),
        )?;
        self.install(capture, hub);
        log::info!("Recording started ({})", format);
        Ok(())
    }

    fn install(&mut self, capture: CapturedRecording, hub: &FanOutHub) {
        hub.register(RECORDER_CONSUMER_KEY, capture.consumer());
        self.status.set(RecordingState::Recording);
        // The writer may have failed before the state said Recording
        if capture.failed() {
            self.status.abandon();
        }
        self.active = Some(capture);
    }

    /// Release a capture whose writer failed, surfacing its error
    ///
    /// Ok when there is no capture or the capture is healthy.
    pub fn reap_failed(&mut self, hub: &FanOutHub) -> EngineResult<()> {
        if !self.active.as_ref().is_some_and(|capture| capture.failed()) {
            return Ok(());
        }
        let Some(mut capture) = self.active.take() else {
            return Ok(());
        };

        hub.unregister(RECORDER_CONSUMER_KEY);
        let error = match capture.close() {
            Err(e) => e,
            Ok(_) => StorageError::WriterStopped,
        };
        drop(capture);
        self.status.set(RecordingState::Idle);
        Err(EngineError::StorageIo(error))
    }

    /// Recording → Finalizing → Idle
    ///
    /// Closes the capture, reads it back and hands the loop to `build`. The
    /// state is Idle again when this returns, whatever the outcome.
    pub fn finalize<R>(
        &mut self,
        hub: &FanOutHub,
        build: impl FnOnce(LoopBuffer) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let capture = self.active.take().ok_or(EngineError::NotRecording)?;
        self.status.set(RecordingState::Finalizing);

        hub.unregister(RECORDER_CONSUMER_KEY);
        let result = capture.into_loop().and_then(build);

        self.status.set(RecordingState::Idle);
        match &result {
            Ok(_) => log::info!("Recording finalized"),
            Err(e) => log::warn!("Recording finalization failed: {}", e),
        }
        result
    }

    /// Drop an in-flight capture without building a loop (engine stop)
    pub fn abort(&mut self, hub: &FanOutHub) {
        if let Some(capture) = self.active.take() {
            hub.unregister(RECORDER_CONSUMER_KEY);
            drop(capture);
            self.status.set(RecordingState::Idle);
            log::info!("Recording discarded");
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.status.set(RecordingState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Collector;

    fn recorder(dir: &Path) -> Recorder {
        Recorder::new(Some(dir.to_path_buf()), 48000)
    }

    #[test]
    fn test_round_trip_preserves_samples() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let mut recorder = recorder(dir.path());

        recorder.start(Some(AudioFormat::stereo(48000)), &hub).unwrap();
        assert_eq!(recorder.state(), RecordingState::Recording);
        assert!(hub.contains(RECORDER_CONSUMER_KEY));

        let data: Vec<f32> = (0..256).map(|i| i as f32 / 256.0).collect();
        for chunk in data.chunks(64) {
            hub.dispatch(AudioFormat::stereo(48000), chunk);
        }

        let buffer = recorder.finalize(&hub, Ok).unwrap();
        assert_eq!(recorder.state(), RecordingState::Idle);
        assert!(!hub.contains(RECORDER_CONSUMER_KEY));
        assert_eq!(buffer.frames(), 128);
        assert_eq!(buffer.format(), AudioFormat::stereo(48000));
        assert_eq!(buffer.frames_slice()[1], StereoSample::new(2.0 / 256.0, 3.0 / 256.0));

        // Temp file is gone once the loop is built
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_mono_capture_is_stored_mono() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let mut recorder = recorder(dir.path());

        recorder.start(Some(AudioFormat::mono(44100)), &hub).unwrap();
        hub.dispatch(AudioFormat::mono(44100), &[0.5, -0.5, 0.25]);
        let buffer = recorder.finalize(&hub, Ok).unwrap();

        assert_eq!(buffer.format(), AudioFormat::mono(44100));
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.frames_slice()[1], StereoSample::mono(-0.5));
    }

    #[test]
    fn test_second_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let mut recorder = recorder(dir.path());

        recorder.start(Some(AudioFormat::mono(48000)), &hub).unwrap();
        let err = recorder.start(Some(AudioFormat::mono(48000)), &hub).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRecording));
        assert_eq!(recorder.state(), RecordingState::Recording);
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_start_without_input_is_device_unavailable() {
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let mut recorder = Recorder::new(None, 1024);

        assert!(matches!(
            recorder.start(None, &hub),
            Err(EngineError::DeviceUnavailable)
        ));
        assert!(matches!(
            recorder.start(Some(AudioFormat::new(48000, 0)), &hub),
            Err(EngineError::DeviceUnavailable)
        ));
        assert_eq!(recorder.state(), RecordingState::Idle);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_finalize_when_idle_is_not_recording() {
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let mut recorder = Recorder::new(None, 1024);
        let result = recorder.finalize(&hub, Ok);
        assert!(matches!(result, Err(EngineError::NotRecording)));
    }

    #[test]
    fn test_empty_capture_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let mut recorder = recorder(dir.path());

        recorder.start(Some(AudioFormat::mono(48000)), &hub).unwrap();
        let result = recorder.finalize(&hub, Ok);
        assert!(matches!(result, Err(EngineError::EmptyCapture)));
        assert_eq!(recorder.state(), RecordingState::Idle);
    }

    #[test]
    fn test_queue_overflow_is_a_consumer_failure() {
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let queue = Arc::new(CaptureQueue::new(4));
        hub.register(
            RECORDER_CONSUMER_KEY,
            CaptureConsumer {
                queue: Arc::clone(&queue),
            },
        );

        hub.dispatch(AudioFormat::mono(48000), &[0.1; 3]);
        assert_eq!(hub.failures(RECORDER_CONSUMER_KEY), Some(0));

        hub.dispatch(AudioFormat::mono(48000), &[0.1; 3]);
        assert_eq!(hub.failures(RECORDER_CONSUMER_KEY), Some(1));
        assert_eq!(queue.frames.len(), 4);
        assert_eq!(queue.dropped.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_abort_discards_capture() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let mut recorder = recorder(dir.path());

        recorder.start(Some(AudioFormat::mono(48000)), &hub).unwrap();
        hub.dispatch(AudioFormat::mono(48000), &[0.1; 32]);
        recorder.abort(&hub);

        assert_eq!(recorder.state(), RecordingState::Idle);
        assert!(hub.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_read_loop_file_scales_integer_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(16384i16).unwrap();
        writer.write_sample(-32768i16).unwrap();
        writer.finalize().unwrap();

        let buffer = read_loop_file(&path).unwrap();
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.frames_slice()[0], StereoSample::mono(0.5));
        assert_eq!(buffer.frames_slice()[1], StereoSample::mono(-1.0));
    }

    #[test]
    fn test_read_missing_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_loop_file(&dir.path().join("missing.wav")).unwrap_err();
        assert!(matches!(err, StorageError::Wav(_)));
    }

    /// Accepts `limit` bytes, then fails every write
    struct FailingSink {
        written: u64,
        limit: u64,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.written + buf.len() as u64 > self.limit {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "device full"));
            }
            self.written += buf.len() as u64;
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FailingSink {
        fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> {
            Ok(self.written)
        }
    }

    /// Install a capture whose sink fails after the WAV header
    fn start_failing(recorder: &mut Recorder, hub: &FanOutHub, dir: &Path) {
        let file = tempfile::Builder::new().tempfile_in(dir).unwrap();
        let sink = FailingSink {
            written: 0,
            limit: 128,
        };
        let capture = CapturedRecording::with_sink(
            AudioFormat::mono(48000),
            file,
            sink,
            4096,
            recorder.status(),
        )
        .unwrap();
        recorder.install(capture, hub);
    }

    fn wait_for_idle(recorder: &Recorder) {
        for _ in 0..200 {
            if recorder.state() == RecordingState::Idle {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("recorder stuck in {:?}", recorder.state());
    }

    #[test]
    fn test_write_failure_aborts_recording() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let mut recorder = recorder(dir.path());

        start_failing(&mut recorder, &hub, dir.path());
        assert_eq!(recorder.state(), RecordingState::Recording);
        hub.dispatch(AudioFormat::mono(48000), &[0.1; 256]);

        // The writer drops the state without any control call
        wait_for_idle(&recorder);

        // Frames are refused rather than piling up in the queue
        hub.dispatch(AudioFormat::mono(48000), &[0.1; 256]);
        assert_eq!(hub.failures(RECORDER_CONSUMER_KEY), Some(1));

        let err = recorder.start(Some(AudioFormat::mono(48000)), &hub).unwrap_err();
        assert!(matches!(err, EngineError::StorageIo(StorageError::Wav(_))));
        assert_eq!(recorder.state(), RecordingState::Idle);
        assert!(!hub.contains(RECORDER_CONSUMER_KEY));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // Reported once; the next recording starts normally
        recorder.start(Some(AudioFormat::mono(48000)), &hub).unwrap();
        assert_eq!(recorder.state(), RecordingState::Recording);
    }

    #[test]
    fn test_reap_failed_capture() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let mut recorder = recorder(dir.path());

        assert!(recorder.reap_failed(&hub).is_ok());

        start_failing(&mut recorder, &hub, dir.path());
        hub.dispatch(AudioFormat::mono(48000), &[0.1; 256]);
        wait_for_idle(&recorder);

        assert!(matches!(
            recorder.reap_failed(&hub),
            Err(EngineError::StorageIo(_))
        ));
        assert!(recorder.reap_failed(&hub).is_ok());
        assert!(matches!(
            recorder.finalize(&hub, Ok),
            Err(EngineError::NotRecording)
        ));
    }

    #[test]
    fn test_healthy_capture_is_not_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new();
        let hub = FanOutHub::new(collector.handle());
        let mut recorder = recorder(dir.path());

        recorder.start(Some(AudioFormat::mono(48000)), &hub).unwrap();
        hub.dispatch(AudioFormat::mono(48000), &[0.1; 64]);
        assert!(recorder.reap_failed(&hub).is_ok());
        assert_eq!(recorder.state(), RecordingState::Recording);

        let buffer = recorder.finalize(&hub, Ok).unwrap();
        assert_eq!(buffer.frames(), 64);
    }
}
