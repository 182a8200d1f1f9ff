//! # Playback & Offline Engine
//!
//! Queue, transport and offline storage for a streaming music client.
//!
//! ## Overview
//!
//! This crate handles:
//! - The playback session controller: queue, play-order policy, crossfade and
//!   the state machine driving the platform audio session
//! - The background event adapter that feeds platform callbacks back in
//! - Offline downloads with resumable, retrying transfers
//! - The equalizer configuration store and listening-time counter
//! - Persistence of all of the above, merged with the backend's settings
//!
//! Platform capabilities (audio output, files, HTTP, settings storage) come
//! in through the `bridge-traits` seams so the engine itself is host-agnostic.

pub mod background;
pub mod config;
pub mod controller;
pub mod download;
pub mod equalizer;
pub mod error;
pub mod listening;
pub mod models;
pub mod persistence;
pub mod queue;

pub use background::BackgroundEventAdapter;
pub use config::PlaybackConfig;
pub use controller::{
    ControllerDeps, CrossfadePhase, InitialState, OfflineSource, PlaybackController,
    PlaybackHandle, PlayerSnapshot,
};
pub use download::{DownloadConfig, DownloadManager, DownloadRecord, DownloadStatus};
pub use equalizer::{EqPreset, EqualizerConfig};
pub use error::{PlaybackError, Result};
pub use listening::ListeningTimeCounter;
pub use models::{CrossfadeSettings, ErrorReason, LoopMode, PlaybackState, Track, TrackId};
pub use persistence::{PersistedState, PersistenceBridge, PersistenceWriter, PlaybackPrefs};
pub use queue::Queue;
