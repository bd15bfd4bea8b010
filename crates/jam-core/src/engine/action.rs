//! The closed set of action primitives
//!
//! Remote collaborators (a command interpreter, a UI) drive the engine with
//! small JSON objects tagged by `action`:
//!
//! ```json
//! {"action": "start_recording"}
//! {"action": "stop_recording_and_create_loop", "track_id": "track_1"}
//! {"action": "set_volume", "track_id": "track_1", "volume": 0.8}
//! {"action": "set_reverb", "track_id": "track_1", "value": 40}
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::engine::LoopEngine;
use super::error::EngineResult;
use crate::types::TrackId;

/// One control-surface operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    StartRecording,
    StopRecordingAndCreateLoop {
        track_id: TrackId,
    },
    PlayAll,
    StopAll,
    SetVolume {
        track_id: TrackId,
        volume: f32,
    },
    MuteTrack {
        track_id: TrackId,
    },
    UnmuteTrack {
        track_id: TrackId,
        volume: f32,
    },
    SetReverb {
        track_id: TrackId,
        value: f32,
    },
    SetDelay {
        track_id: TrackId,
        value: f32,
    },
    SetMasterVolume {
        volume: f32,
    },
    #[serde(alias = "add_new_track")]
    AddTrackFromFile {
        track_id: TrackId,
        path: PathBuf,
    },
    RemoveTrack {
        track_id: TrackId,
    },
}

impl Action {
    /// Wire name of the action
    pub fn name(&self) -> &'static str {
        match self {
            Action::StartRecording => "start_recording",
            Action::StopRecordingAndCreateLoop { .. } => "stop_recording_and_create_loop",
            Action::PlayAll => "play_all",
            Action::StopAll => "stop_all",
            Action::SetVolume { .. } => "set_volume",
            Action::MuteTrack { .. } => "mute_track",
            Action::UnmuteTrack { .. } => "unmute_track",
            Action::SetReverb { .. } => "set_reverb",
            Action::SetDelay { .. } => "set_delay",
            Action::SetMasterVolume { .. } => "set_master_volume",
            Action::AddTrackFromFile { .. } => "add_track_from_file",
            Action::RemoveTrack { .. } => "remove_track",
        }
    }
}

impl LoopEngine {
    /// Run one action against the engine
    pub fn apply(&self, action: Action) -> EngineResult<()> {
        log::debug!("Applying {:?}", action);
        match action {
            Action::StartRecording => self.start_recording(),
            Action::StopRecordingAndCreateLoop { track_id } => {
                self.stop_recording_and_create_loop(track_id)
            }
            Action::PlayAll => self.play_all(),
            Action::StopAll => self.stop_all(),
            Action::SetVolume { track_id, volume } => self.set_volume(track_id, volume),
            Action::MuteTrack { track_id } => self.mute_track(track_id),
            Action::UnmuteTrack { track_id, volume } => self.unmute_track(track_id, volume),
            Action::SetReverb { track_id, value } => self.set_reverb(track_id, value),
            Action::SetDelay { track_id, value } => self.set_delay(track_id, value),
            Action::SetMasterVolume { volume } => self.set_master_volume(volume),
            Action::AddTrackFromFile { track_id, path } => self.add_track_from_file(track_id, path),
            Action::RemoveTrack { track_id } => self.remove_track(track_id),
        }
    }
}
