//! # Event Bus System
//!
//! Provides an event-driven architecture for the playback engine using
//! `tokio::sync::broadcast`. Modules publish typed events; UI layers,
//! lock-screen integrations and the persistence bridge subscribe
//! independently.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   emit   ┌───────────┐
//! │ Playback        ├─────────>│           │   subscribe   ┌────────────┐
//! │ controller      │          │ EventBus  ├──────────────>│ UI         │
//! └─────────────────┘          │ (broadcast│               └────────────┘
//! ┌─────────────────┐   emit   │  channel) │   subscribe   ┌────────────┐
//! │ Download        ├─────────>│           ├──────────────>│ Persistence│
//! │ manager         │          │           │               └────────────┘
//! └─────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Download(DownloadEvent::Started {
//!         track_id: "t1".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Download(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Non-fatal; current state is always available from the engine snapshot.
//! - **`RecvError::Closed`**: All senders have been dropped. Treat as shutdown.
//!
//! `emit` returns an error when nobody is subscribed; publishers ignore it.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Playback(PlaybackEvent),
    Download(DownloadEvent),
    Settings(SettingsEvent),
}

impl CoreEvent {
    /// Short human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Settings(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Settings(SettingsEvent::SaveFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Settings(SettingsEvent::RemoteSyncFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Playback(PlaybackEvent::Interrupted { .. }) => EventSeverity::Info,
            CoreEvent::Download(DownloadEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The playback state machine moved to a new state.
    StateChanged {
        track_id: Option<String>,
        state: String,
    },
    /// The current track pointer changed (`None` when the queue ran out).
    TrackChanged { track_id: Option<String> },
    /// First frame of a newly loaded track.
    Started { track_id: String, title: String },
    Paused { track_id: String, position_ms: u64 },
    Resumed { track_id: String, position_ms: u64 },
    Stopped { track_id: Option<String> },
    /// A track played to its end.
    Completed { track_id: String },
    PositionChanged {
        track_id: String,
        position_ms: u64,
        duration_ms: Option<u64>,
    },
    /// Queue contents or play-order policy changed.
    QueueChanged {
        length: usize,
        current_index: Option<usize>,
        shuffle: bool,
        loop_mode: String,
    },
    CrossfadeStarted {
        from_track_id: String,
        to_track_id: String,
    },
    CrossfadeCompleted { track_id: String },
    /// The platform took audio focus away.
    Interrupted { kind: String },
    Error {
        track_id: Option<String>,
        message: String,
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::StateChanged { .. } => "Playback state changed",
            PlaybackEvent::TrackChanged { .. } => "Current track changed",
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Stopped { .. } => "Playback stopped",
            PlaybackEvent::Completed { .. } => "Track completed",
            PlaybackEvent::PositionChanged { .. } => "Playback position changed",
            PlaybackEvent::QueueChanged { .. } => "Queue changed",
            PlaybackEvent::CrossfadeStarted { .. } => "Crossfade started",
            PlaybackEvent::CrossfadeCompleted { .. } => "Crossfade completed",
            PlaybackEvent::Interrupted { .. } => "Playback interrupted",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Download Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    Started { track_id: String },
    /// Progress update; `percent` never decreases for a running download.
    Progress {
        track_id: String,
        percent: u8,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },
    /// A failed attempt is being retried.
    Retrying {
        track_id: String,
        attempt: u32,
        message: String,
    },
    Completed { track_id: String, bytes: u64 },
    Failed {
        track_id: String,
        message: String,
        recoverable: bool,
    },
    Cancelled { track_id: String },
    Deleted { track_id: String },
    /// Removed to keep the offline cache under its size limit.
    Evicted { track_id: String },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Started { .. } => "Download started",
            DownloadEvent::Progress { .. } => "Download in progress",
            DownloadEvent::Retrying { .. } => "Retrying download",
            DownloadEvent::Completed { .. } => "Download completed",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Cancelled { .. } => "Download cancelled",
            DownloadEvent::Deleted { .. } => "Offline copy deleted",
            DownloadEvent::Evicted { .. } => "Offline copy evicted",
        }
    }

    /// Track the event refers to.
    pub fn track_id(&self) -> &str {
        match self {
            DownloadEvent::Started { track_id }
            | DownloadEvent::Progress { track_id, .. }
            | DownloadEvent::Retrying { track_id, .. }
            | DownloadEvent::Completed { track_id, .. }
            | DownloadEvent::Failed { track_id, .. }
            | DownloadEvent::Cancelled { track_id }
            | DownloadEvent::Deleted { track_id }
            | DownloadEvent::Evicted { track_id } => track_id,
        }
    }

    /// Returns `true` when the record reached a state that must be persisted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Completed { .. }
                | DownloadEvent::Failed { .. }
                | DownloadEvent::Cancelled { .. }
                | DownloadEvent::Deleted { .. }
                | DownloadEvent::Evicted { .. }
        )
    }
}

// ============================================================================
// Settings Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SettingsEvent {
    /// Persisted state was loaded, optionally merged with the backend copy.
    Loaded { merged_remote: bool },
    Saved,
    SaveFailed { message: String },
    RemoteSyncFailed { message: String },
}

impl SettingsEvent {
    fn description(&self) -> &str {
        match self {
            SettingsEvent::Loaded { .. } => "Settings loaded",
            SettingsEvent::Saved => "Settings saved",
            SettingsEvent::SaveFailed { .. } => "Settings save failed",
            SettingsEvent::RemoteSyncFailed { .. } => "Remote settings sync failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
