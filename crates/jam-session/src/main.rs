//! Jam Session - console host for the looping engine
//!
//! Starts the engine on the system audio devices, then reads one JSON action
//! per line from stdin and answers with one JSON line on stdout:
//!
//! ```text
//! > {"action": "start_recording"}
//! < {"ok":true}
//! > {"action": "stop_recording_and_create_loop", "track_id": "track_0"}
//! < {"ok":true}
//! > status
//! < {"ok":true,"status":{...}}
//! ```
//!
//! ## Command line flags
//!
//! - `--config <path>`: engine YAML config (default: platform config dir)
//! - `--list-devices`: print capture and playback devices, then exit

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::json;

use jam_core::audio::{get_devices, CpalBackend, Direction};
use jam_core::config::{default_config_path, load_config};
use jam_core::{
    Action, ConsumerError, EngineConfig, InputBuffer, LoopEngine, RecordingState, TrackId,
    TrackParameters,
};

/// Hub key of the input level meter
const METER_KEY: &str = "session.meter";

struct Args {
    config: Option<PathBuf>,
    list_devices: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        list_devices: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--list-devices" => args.list_devices = true,
            "-h" | "--help" => {
                println!("usage: jam-session [--config <path>] [--list-devices]");
                std::process::exit(0);
            }
            other => bail!("unknown argument '{}'", other),
        }
    }
    Ok(args)
}

fn list_devices() -> Result<()> {
    for direction in [Direction::Input, Direction::Output] {
        for device in get_devices(direction)? {
            println!("{}", device);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct TrackStatus {
    id: TrackId,
    playing: bool,
    #[serde(flatten)]
    params: TrackParameters,
}

#[derive(Serialize)]
struct SessionStatus {
    running: bool,
    recording: RecordingState,
    sample_rate: Option<u32>,
    master_volume: Option<f32>,
    input_peak: f32,
    tracks: Vec<TrackStatus>,
}

fn status(engine: &LoopEngine, peak: &AtomicU32) -> SessionStatus {
    let tracks = engine
        .track_ids()
        .into_iter()
        .filter_map(|id| {
            let params = engine.track_parameters(&id).ok()?;
            let playing = engine.is_track_playing(&id).unwrap_or(false);
            Some(TrackStatus {
                id,
                playing,
                params,
            })
        })
        .collect();

    SessionStatus {
        running: engine.is_running(),
        recording: engine.recording_state(),
        sample_rate: engine.sample_rate(),
        master_volume: engine.master_volume(),
        input_peak: f32::from_bits(peak.swap(0, Ordering::Relaxed)),
        tracks,
    }
}

/// Keep the loudest sample seen since the last status query
fn register_meter(engine: &LoopEngine) -> Result<Arc<AtomicU32>> {
    let peak = Arc::new(AtomicU32::new(0));
    let meter = Arc::clone(&peak);
    engine.register_audio_consumer(
        METER_KEY,
        move |buffer: &InputBuffer<'_>| -> Result<(), ConsumerError> {
            let level = buffer.data.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
            // Non-negative floats order the same as their bit patterns
            meter.fetch_max(level.to_bits(), Ordering::Relaxed);
            Ok(())
        },
    )?;
    Ok(peak)
}

fn respond(out: &mut impl Write, value: serde_json::Value) -> Result<()> {
    writeln!(out, "{}", value)?;
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = parse_args()?;

    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if args.list_devices {
        return list_devices();
    }

    let config_path = args
        .config
        .unwrap_or_else(|| default_config_path("engine.yaml"));
    let config: EngineConfig = load_config(&config_path);

    log::info!("jam-session starting up");
    let engine = LoopEngine::new(config, Box::new(CpalBackend::new()))?;
    engine.start().context("Audio engine failed to start")?;
    let peak = register_meter(&engine)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "quit" | "exit" => break,
            "status" => {
                let status = serde_json::to_value(status(&engine, &peak))?;
                respond(&mut stdout, json!({ "ok": true, "status": status }))?;
            }
            _ => {
                let reply = match serde_json::from_str::<Action>(line) {
                    Ok(action) => match engine.apply(action) {
                        Ok(()) => json!({ "ok": true }),
                        Err(e) => json!({ "ok": false, "error": e.to_string() }),
                    },
                    Err(e) => json!({ "ok": false, "error": format!("invalid action: {}", e) }),
                };
                respond(&mut stdout, reply)?;
            }
        }
    }

    engine.stop();
    log::info!("jam-session shut down");
    Ok(())
}
