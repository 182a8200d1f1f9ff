//! Read-only view of the controller state.

use crate::equalizer::EqualizerConfig;
use crate::models::{CrossfadeSettings, LoopMode, PlaybackState, Track};
use serde::Serialize;
use std::time::Duration;

/// Progress of an in-flight crossfade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CrossfadePhase {
    #[default]
    None,
    /// The next track is loading at volume zero.
    Preloading,
    /// Both tracks are audible and volumes are moving.
    Mixing,
}

/// Immutable snapshot published after every command the controller handles.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub state: PlaybackState,
    pub current_track: Option<Track>,
    pub position: Duration,
    pub duration: Option<Duration>,
    /// Queue contents in insertion order.
    pub queue: Vec<Track>,
    /// Insertion indices in effective play order.
    pub play_order: Vec<usize>,
    /// Position of the current track within `play_order`.
    pub current_index: Option<usize>,
    pub shuffle: bool,
    pub loop_mode: LoopMode,
    pub crossfade: CrossfadeSettings,
    pub crossfade_phase: CrossfadePhase,
    pub equalizer: EqualizerConfig,
    pub listening_seconds: u64,
    /// Bumped whenever a persisted field changes.
    pub revision: u64,
}

impl PlayerSnapshot {
    pub fn is_playing(&self) -> bool {
        self.state.is_active()
    }

    /// Presence line broadcast to other listeners.
    pub fn presence_text(&self) -> String {
        match (&self.current_track, self.is_playing()) {
            (Some(track), true) => format!("Playing {} by {}", track.title, track.artist),
            _ => "Idle".to_string(),
        }
    }
}
