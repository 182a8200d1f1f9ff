//! # Playback Configuration
//!
//! Tuning knobs for the playback session controller.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the playback session controller.
///
/// # Example
///
/// ```rust
/// use core_playback::config::PlaybackConfig;
/// use std::time::Duration;
///
/// let config = PlaybackConfig {
///     load_timeout: Duration::from_secs(5),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    /// How long a load may take to produce its first frame before the
    /// controller gives up with a timeout error.
    #[serde(default = "default_load_timeout")]
    pub load_timeout: Duration,

    /// Listening time between two persisted position checkpoints.
    #[serde(default = "default_position_persist_interval")]
    pub position_persist_interval: Duration,

    /// Number of volume steps in a crossfade.
    #[serde(default = "default_crossfade_steps")]
    pub crossfade_steps: u32,

    /// Largest position jump that still counts as listening time. Larger
    /// jumps are seeks or clock glitches.
    #[serde(default = "default_max_position_gap")]
    pub max_position_gap: Duration,

    /// Capacity of the event bus created by the engine.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Feed position reports into the listening-time counter.
    #[serde(default = "default_track_listening")]
    pub track_listening: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            load_timeout: default_load_timeout(),
            position_persist_interval: default_position_persist_interval(),
            crossfade_steps: default_crossfade_steps(),
            max_position_gap: default_max_position_gap(),
            event_buffer: default_event_buffer(),
            track_listening: default_track_listening(),
        }
    }
}

impl PlaybackConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.load_timeout.is_zero() {
            return Err(PlaybackError::InvalidArgument(
                "load_timeout must be > 0".to_string(),
            ));
        }

        if self.position_persist_interval.is_zero() {
            return Err(PlaybackError::InvalidArgument(
                "position_persist_interval must be > 0".to_string(),
            ));
        }

        if self.crossfade_steps == 0 {
            return Err(PlaybackError::InvalidArgument(
                "crossfade_steps must be > 0".to_string(),
            ));
        }

        if self.max_position_gap.is_zero() {
            return Err(PlaybackError::InvalidArgument(
                "max_position_gap must be > 0".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(PlaybackError::InvalidArgument(
                "event_buffer must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_load_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_position_persist_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_crossfade_steps() -> u32 {
    20
}

fn default_max_position_gap() -> Duration {
    Duration::from_secs(5)
}

fn default_event_buffer() -> usize {
    256
}

fn default_track_listening() -> bool {
    true
}
