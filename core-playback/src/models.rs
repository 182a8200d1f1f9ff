//! # Domain Models
//!
//! Tracks, play-order policy and the playback state machine's states.

use crate::error::PlaybackError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Opaque track identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A playable track as fetched from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Remote audio URI. Empty when the backend has no stream for the track.
    #[serde(default)]
    pub audio_url: String,
    /// Authoritative once known.
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub liked: bool,
}

impl Track {
    pub fn new(
        id: impl Into<TrackId>,
        title: impl Into<String>,
        artist: impl Into<String>,
        audio_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            cover_url: None,
            audio_url: audio_url.into(),
            duration_secs: None,
            liked: false,
        }
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_cover(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(|secs| Duration::from_secs(secs as u64))
    }
}

// ============================================================================
// Play-order Policy
// ============================================================================

/// What happens when navigation runs past either end of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Off,
    One,
    All,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::One => "one",
            LoopMode::All => "all",
        }
    }
}

impl FromStr for LoopMode {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(LoopMode::Off),
            "one" => Ok(LoopMode::One),
            "all" => Ok(LoopMode::All),
            other => Err(PlaybackError::InvalidArgument(format!(
                "unknown loop mode: {}",
                other
            ))),
        }
    }
}

/// Crossfade policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossfadeSettings {
    pub enabled: bool,
    pub duration_secs: u8,
}

impl CrossfadeSettings {
    pub const MIN_DURATION_SECS: u8 = 1;
    pub const MAX_DURATION_SECS: u8 = 12;

    /// Build settings with the duration clamped to the supported range.
    pub fn new(enabled: bool, duration_secs: u32) -> Self {
        let clamped = duration_secs.clamp(
            Self::MIN_DURATION_SECS as u32,
            Self::MAX_DURATION_SECS as u32,
        ) as u8;
        Self {
            enabled,
            duration_secs: clamped,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs as u64)
    }
}

impl Default for CrossfadeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_secs: 6,
        }
    }
}

// ============================================================================
// Playback State
// ============================================================================

/// Why playback ended up in the error state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum ErrorReason {
    /// The load produced no first frame in time.
    Timeout,
    SourceUnavailable(String),
    Network(String),
    Session(String),
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorReason::Timeout => write!(f, "load timed out"),
            ErrorReason::SourceUnavailable(msg) => write!(f, "source unavailable: {}", msg),
            ErrorReason::Network(msg) => write!(f, "network error: {}", msg),
            ErrorReason::Session(msg) => write!(f, "audio session error: {}", msg),
        }
    }
}

impl From<&PlaybackError> for ErrorReason {
    fn from(error: &PlaybackError) -> Self {
        match error {
            PlaybackError::Timeout(_) => ErrorReason::Timeout,
            PlaybackError::SourceResolution(msg) => ErrorReason::SourceUnavailable(msg.clone()),
            PlaybackError::Network(msg) => ErrorReason::Network(msg.clone()),
            other => ErrorReason::Session(other.to_string()),
        }
    }
}

/// The controller's playback state. Exactly one is active at any time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    /// Output stalled while playing; returns to `Playing` on its own.
    Buffering,
    Error(ErrorReason),
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Error(_) => "error",
        }
    }

    /// Returns `true` while audio is (or is about to be) audible.
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Buffering)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PlaybackState::Error(_))
    }
}
