//! Looping engine: lifecycle, recording, track registry and control surface
//!
//! # Threads
//!
//! ```text
//!   control (any thread) ──lock──► LoopEngine ──rtrb──► render thread
//!          │                           │                   track chains, mixer
//!          │                           └─ params (atomics) ─┘
//!          └── hub.register/unregister (snapshot swap) ──► capture thread
//!                                                          fan-out, monitor ring
//!   "audio-gc"        frees chains and consumer snapshots dropped by audio threads
//!   "capture-writer"  drains the recording queue into a temporary WAV file
//! ```
//!
//! The audio threads never take the control lock, never allocate and never do
//! I/O. Everything they need is either handed over through a command ring or
//! read from a published snapshot.

mod action;
mod capture;
#[allow(clippy::module_inception)]
mod engine;
mod error;
mod reclaim;
mod recorder;
mod registry;
mod render;
mod transport;

pub use action::Action;
pub use capture::CaptureProcessor;
pub use engine::LoopEngine;
pub use error::{EngineError, EngineResult, StorageError};
pub use reclaim::Reclaimer;
pub use recorder::{
    read_loop_file, CaptureStats, Recorder, RecordingState, RecordingStatus, RECORDER_CONSUMER_KEY,
};
pub use registry::{TrackChain, TrackEntry, TrackParameters, TrackRegistry};
pub use render::{command_channel, RenderChain, RenderCommand, RenderProcessor};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioError, OfflineBackend, OfflineDriver};
    use crate::config::EngineConfig;
    use crate::hub::{ConsumerError, InputBuffer};
    use crate::types::{AudioFormat, TrackId};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const RATE: u32 = 48000;
    const BUFFER: usize = 64;

    fn config(dir: &Path) -> EngineConfig {
        EngineConfig::default()
            .with_capture_dir(dir)
            .with_settle_delay_ms(0)
            .with_monitoring(false, 0.0)
    }

    fn start_engine(config: EngineConfig, backend: OfflineBackend) -> (LoopEngine, OfflineDriver) {
        let driver = backend.driver();
        let engine = LoopEngine::new(config, Box::new(backend)).unwrap();
        engine.start().unwrap();
        (engine, driver)
    }

    fn mono_engine(dir: &Path) -> (LoopEngine, OfflineDriver) {
        start_engine(
            config(dir),
            OfflineBackend::new(AudioFormat::mono(RATE)).with_buffer_size(BUFFER as u32),
        )
    }

    /// Record `buffers` buffers of constant `value` into track `id`
    fn record_loop(engine: &LoopEngine, driver: &OfflineDriver, id: &str, value: f32, buffers: usize) {
        engine.start_recording().unwrap();
        for _ in 0..buffers {
            assert!(driver.push_input(&[value; BUFFER]));
        }
        engine.stop_recording_and_create_loop(id).unwrap();
    }

    fn assert_all_near(samples: &[f32], expected: f32) {
        for (i, s) in samples.iter().enumerate() {
            assert!(
                (s - expected).abs() < 1e-5,
                "sample {} is {}, expected {}",
                i,
                s,
                expected
            );
        }
    }

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LoopEngine>();
    }

    #[test]
    fn test_start_and_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());

        assert!(engine.is_running());
        assert!(driver.is_running());
        let formats = engine.formats().unwrap();
        assert_eq!(formats.output, AudioFormat::stereo(RATE));
        assert_eq!(engine.input_format(), Some(AudioFormat::mono(RATE)));

        // Starting twice is harmless
        engine.start().unwrap();

        engine.stop();
        assert!(!engine.is_running());
        assert!(!driver.is_running());
        assert_eq!(engine.formats(), None);

        // Idempotent
        engine.stop();

        engine.start().unwrap();
        assert!(engine.is_running());
    }

    #[test]
    fn test_permission_denied_keeps_engine_idle() {
        let dir = tempfile::tempdir().unwrap();
        let backend = OfflineBackend::new(AudioFormat::mono(RATE)).with_permission_denied();
        let engine = LoopEngine::new(config(dir.path()), Box::new(backend)).unwrap();

        let err = engine.start().unwrap_err();
        assert!(matches!(
            err,
            EngineError::EngineStart(AudioError::PermissionDenied)
        ));
        assert!(!engine.is_running());
        assert!(matches!(engine.start_recording(), Err(EngineError::NotRunning)));
        assert!(matches!(engine.play_all(), Err(EngineError::NotRunning)));
    }

    #[test]
    fn test_rate_mismatch_is_engine_start_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = OfflineBackend::new(AudioFormat::mono(44100))
            .with_output(AudioFormat::stereo(RATE));
        let engine = LoopEngine::new(config(dir.path()), Box::new(backend)).unwrap();

        assert!(matches!(
            engine.start(),
            Err(EngineError::EngineStart(AudioError::SampleRateMismatch { .. }))
        ));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_record_round_trip_creates_looping_track() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());

        record_loop(&engine, &driver, "track_1", 0.5, 4);

        assert_eq!(engine.recording_state(), RecordingState::Idle);
        assert_eq!(engine.track_ids(), vec![TrackId::from("track_1")]);
        assert!(engine.is_track_playing(&"track_1".into()).unwrap());

        // Loops far past its 256 captured frames
        let output = driver.render(1000);
        assert_all_near(&output, 0.5);

        // Capture file is discarded after conversion
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_play_all_then_stop_all() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());
        record_loop(&engine, &driver, "a", 0.25, 2);
        record_loop(&engine, &driver, "b", 0.25, 3);

        engine.stop_all().unwrap();
        for id in engine.track_ids() {
            assert!(!engine.is_track_playing(&id).unwrap());
        }
        assert_all_near(&driver.render(256), 0.0);

        engine.play_all().unwrap();
        for id in engine.track_ids() {
            assert!(engine.is_track_playing(&id).unwrap());
        }
        assert_all_near(&driver.render(256), 0.5);

        engine.stop_all().unwrap();
        for id in engine.track_ids() {
            assert!(!engine.is_track_playing(&id).unwrap());
        }
    }

    #[test]
    fn test_settle_delay_defers_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = start_engine(
            config(dir.path()).with_settle_delay_ms(10),
            OfflineBackend::new(AudioFormat::mono(RATE)).with_buffer_size(BUFFER as u32),
        );
        record_loop(&engine, &driver, "t", 0.5, 2);

        let output = driver.render(1000);
        // 10ms at 48kHz = 480 silent frames
        assert_all_near(&output[..480 * 2], 0.0);
        assert_all_near(&output[480 * 2..], 0.5);
    }

    #[test]
    fn test_second_start_recording_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());

        engine.start_recording().unwrap();
        driver.push_input(&[0.1; BUFFER]);
        assert!(matches!(
            engine.start_recording(),
            Err(EngineError::AlreadyRecording)
        ));
        assert_eq!(engine.recording_state(), RecordingState::Recording);

        // The first capture is intact
        driver.push_input(&[0.1; BUFFER]);
        engine.stop_recording_and_create_loop("t1").unwrap();
        assert_eq!(engine.track_count(), 1);
    }

    #[test]
    fn test_stop_when_not_recording_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _driver) = mono_engine(dir.path());

        assert!(matches!(
            engine.stop_recording_and_create_loop("t1"),
            Err(EngineError::NotRecording)
        ));
        assert_eq!(engine.track_count(), 0);
        assert_eq!(engine.recording_state(), RecordingState::Idle);
    }

    #[test]
    fn test_empty_recording_creates_no_track() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _driver) = mono_engine(dir.path());

        engine.start_recording().unwrap();
        assert!(matches!(
            engine.stop_recording_and_create_loop("t1"),
            Err(EngineError::EmptyCapture)
        ));
        assert_eq!(engine.track_count(), 0);
        assert_eq!(engine.recording_state(), RecordingState::Idle);
    }

    #[test]
    fn test_duplicate_track_id_keeps_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());
        record_loop(&engine, &driver, "t1", 0.1, 1);

        engine.start_recording().unwrap();
        driver.push_input(&[0.2; BUFFER]);
        assert!(matches!(
            engine.stop_recording_and_create_loop("t1"),
            Err(EngineError::DuplicateTrack(_))
        ));
        assert_eq!(engine.recording_state(), RecordingState::Recording);

        engine.stop_recording_and_create_loop("t2").unwrap();
        assert_eq!(engine.track_count(), 2);
    }

    #[test]
    fn test_recording_without_input_device() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = start_engine(
            config(dir.path()),
            OfflineBackend::new(AudioFormat::mono(RATE)).without_input(),
        );

        assert!(engine.is_running());
        assert!(!driver.push_input(&[0.0; BUFFER]));
        assert!(matches!(
            engine.start_recording(),
            Err(EngineError::DeviceUnavailable)
        ));
        assert_eq!(engine.recording_state(), RecordingState::Idle);
    }

    #[test]
    fn test_unknown_track_operations_have_no_effect() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());
        record_loop(&engine, &driver, "known", 0.5, 1);
        let before = engine.track_parameters(&"known".into()).unwrap();

        let missing = || TrackId::from("missing");
        assert!(matches!(engine.set_volume(missing(), 0.5), Err(EngineError::TrackNotFound(_))));
        assert!(matches!(engine.mute_track(missing()), Err(EngineError::TrackNotFound(_))));
        assert!(matches!(
            engine.unmute_track(missing(), 0.5),
            Err(EngineError::TrackNotFound(_))
        ));
        assert!(matches!(engine.set_reverb(missing(), 50.0), Err(EngineError::TrackNotFound(_))));
        assert!(matches!(engine.set_delay(missing(), 50.0), Err(EngineError::TrackNotFound(_))));
        assert!(matches!(
            engine.track_parameters(&missing()),
            Err(EngineError::TrackNotFound(_))
        ));

        assert_eq!(engine.track_ids(), vec![TrackId::from("known")]);
        assert_eq!(engine.track_parameters(&"known".into()).unwrap(), before);
    }

    #[test]
    fn test_setters_clamp_to_range() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());
        record_loop(&engine, &driver, "t", 0.5, 1);
        let id = TrackId::from("t");

        engine.set_volume("t", 5.0).unwrap();
        engine.set_reverb("t", -10.0).unwrap();
        engine.set_delay("t", 250.0).unwrap();
        let params = engine.track_parameters(&id).unwrap();
        assert_eq!(params.volume, 1.0);
        assert_eq!(params.reverb_mix, 0.0);
        assert_eq!(params.delay_mix, 100.0);

        engine.set_volume("t", f32::NAN).unwrap();
        assert_eq!(engine.track_parameters(&id).unwrap().volume, 0.0);
    }

    #[test]
    fn test_mute_and_unmute() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());
        record_loop(&engine, &driver, "t", 0.5, 2);
        let id = TrackId::from("t");

        engine.set_volume("t", 0.6).unwrap();
        engine.mute_track("t").unwrap();
        assert_eq!(engine.track_parameters(&id).unwrap().volume, 0.0);
        assert_all_near(&driver.render(128), 0.0);

        // The caller supplies the volume to restore
        engine.unmute_track("t", 0.6).unwrap();
        assert_eq!(engine.track_parameters(&id).unwrap().volume, 0.6);
        assert_all_near(&driver.render(128), 0.3);
    }

    #[test]
    fn test_master_volume() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());
        record_loop(&engine, &driver, "t", 0.5, 2);

        engine.set_master_volume(0.5).unwrap();
        assert_eq!(engine.master_volume(), Some(0.5));
        assert_all_near(&driver.render(128), 0.25);

        engine.set_master_volume(-3.0).unwrap();
        assert_eq!(engine.master_volume(), Some(0.0));

        engine.stop();
        assert!(matches!(engine.set_master_volume(1.0), Err(EngineError::NotRunning)));
    }

    #[test]
    fn test_consumers_each_see_every_buffer_once() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());
        let seen = Arc::new(Mutex::new(Vec::new()));

        for key in ["speech", "meter"] {
            let seen = Arc::clone(&seen);
            engine
                .register_audio_consumer(key, move |buf: &InputBuffer<'_>| -> Result<(), ConsumerError> {
                    let sum: f32 = buf.data.iter().sum();
                    seen.lock().unwrap().push((key, buf.sequence, sum));
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(engine.consumer_keys(), vec!["meter".to_string(), "speech".to_string()]);

        driver.push_input(&[0.25; BUFFER]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0].0, seen[1].0);
        assert_eq!(seen[0].1, seen[1].1);
        assert_eq!(seen[0].2, seen[1].2);
        assert!((seen[0].2 - 16.0).abs() < 1e-4);
    }

    #[test]
    fn test_unregistered_consumer_receives_nothing_further() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            engine
                .register_audio_consumer("speech", move |_buf: &InputBuffer<'_>| -> Result<(), ConsumerError> {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        driver.push_input(&[0.0; BUFFER]);
        driver.push_input(&[0.0; BUFFER]);
        assert!(engine.unregister_audio_consumer("speech").unwrap());
        driver.push_input(&[0.0; BUFFER]);

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!engine.unregister_audio_consumer("speech").unwrap());
    }

    #[test]
    fn test_reserved_consumer_key() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _driver) = mono_engine(dir.path());

        let result = engine.register_audio_consumer(
            RECORDER_CONSUMER_KEY,
            |_buf: &InputBuffer<'_>| -> Result<(), ConsumerError> { Ok(()) },
        );
        assert!(matches!(result, Err(EngineError::ReservedConsumerKey(_))));

        engine.start_recording().unwrap();
        assert!(matches!(
            engine.unregister_audio_consumer(RECORDER_CONSUMER_KEY),
            Err(EngineError::ReservedConsumerKey(_))
        ));
        assert_eq!(engine.recording_state(), RecordingState::Recording);
    }

    #[test]
    fn test_broken_consumers_do_not_disturb_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());
        engine
            .register_audio_consumer("panicky", |_buf: &InputBuffer<'_>| -> Result<(), ConsumerError> {
                panic!("transcriber bug")
            })
            .unwrap();
        engine
            .register_audio_consumer("failing", |_buf: &InputBuffer<'_>| -> Result<(), ConsumerError> {
                Err(ConsumerError("offline"))
            })
            .unwrap();

        record_loop(&engine, &driver, "t", 0.5, 3);

        assert_eq!(engine.consumer_failures("panicky"), Some(3));
        assert_eq!(engine.consumer_failures("failing"), Some(3));
        assert_eq!(engine.track_count(), 1);
        assert_all_near(&driver.render(256), 0.5);
    }

    #[test]
    fn test_monitored_input_reaches_output() {
        let dir = tempfile::tempdir().unwrap();
        let (_engine, driver) = start_engine(
            config(dir.path()).with_monitoring(true, 1.0),
            OfflineBackend::new(AudioFormat::mono(RATE)).with_buffer_size(BUFFER as u32),
        );

        driver.push_input(&[0.3; BUFFER]);
        assert_all_near(&driver.render(BUFFER), 0.3);
    }

    #[test]
    fn test_add_and_remove_track_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());

        let path = dir.path().join("pad.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: RATE,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(0.2f32).unwrap();
            writer.write_sample(0.4f32).unwrap();
        }
        writer.finalize().unwrap();

        engine.add_track_from_file("pad", &path).unwrap();
        assert!(engine.is_track_playing(&"pad".into()).unwrap());
        let output = driver.render(300);
        for frame in output.chunks(2) {
            assert!((frame[0] - 0.2).abs() < 1e-6);
            assert!((frame[1] - 0.4).abs() < 1e-6);
        }

        engine.remove_track("pad").unwrap();
        assert_eq!(engine.track_count(), 0);
        assert_all_near(&driver.render(64), 0.0);

        // Idempotent
        engine.remove_track("pad").unwrap();
    }

    #[test]
    fn test_file_at_foreign_rate_fails_negotiation() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _driver) = mono_engine(dir.path());

        let path = dir.path().join("cd.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(1000i16).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            engine.add_track_from_file("cd", &path),
            Err(EngineError::FormatNegotiation(_))
        ));
        assert_eq!(engine.track_count(), 0);
    }

    #[test]
    fn test_failed_install_leaves_id_free_for_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());

        let path = dir.path().join("foreign.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.9f32).unwrap();
        writer.finalize().unwrap();

        assert!(engine.add_track_from_file("lead", &path).is_err());
        assert_eq!(engine.track_count(), 0);

        record_loop(&engine, &driver, "lead", 0.5, 2);
        assert_eq!(engine.track_ids(), vec![TrackId::from("lead")]);
        assert_all_near(&driver.render(256), 0.5);
    }

    #[test]
    fn test_track_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = start_engine(
            config(dir.path()).with_max_tracks(1),
            OfflineBackend::new(AudioFormat::mono(RATE)),
        );
        record_loop(&engine, &driver, "one", 0.1, 1);

        engine.start_recording().unwrap();
        driver.push_input(&[0.1; BUFFER]);
        assert!(matches!(
            engine.stop_recording_and_create_loop("two"),
            Err(EngineError::TrackLimit(1))
        ));
        assert_eq!(engine.recording_state(), RecordingState::Recording);
    }

    #[test]
    fn test_stop_discards_recording_and_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());
        record_loop(&engine, &driver, "t", 0.5, 1);

        engine.start_recording().unwrap();
        driver.push_input(&[0.5; BUFFER]);
        engine.stop();

        assert_eq!(engine.recording_state(), RecordingState::Idle);
        assert_eq!(engine.track_count(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        engine.start().unwrap();
        assert!(matches!(
            engine.stop_recording_and_create_loop("t"),
            Err(EngineError::NotRecording)
        ));
    }

    #[test]
    fn test_apply_actions() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, driver) = mono_engine(dir.path());

        engine.apply(Action::StartRecording).unwrap();
        driver.push_input(&[0.5; BUFFER]);
        engine
            .apply(Action::StopRecordingAndCreateLoop {
                track_id: "track_0".into(),
            })
            .unwrap();

        let action: Action = serde_json::from_str(
            r#"{"action": "set_reverb", "track_id": "track_0", "value": 140}"#,
        )
        .unwrap();
        engine.apply(action).unwrap();
        assert_eq!(
            engine.track_parameters(&"track_0".into()).unwrap().reverb_mix,
            100.0
        );

        engine.apply(Action::StopAll).unwrap();
        assert!(!engine.is_track_playing(&"track_0".into()).unwrap());
        assert!(matches!(
            engine.apply(Action::MuteTrack {
                track_id: "nope".into()
            }),
            Err(EngineError::TrackNotFound(_))
        ));
    }
}
