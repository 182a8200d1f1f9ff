//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the playback engine and
//! platform-specific implementations. Each trait represents a capability the
//! engine requires but that must be implemented differently per platform
//! (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Audio
//! - [`AudioSession`](playback::AudioSession) - Platform media session that renders tracks
//! - [`SessionListener`](playback::SessionListener) - Callback sink for session, interruption and remote-control events
//! - [`MediaNotification`](media::MediaNotification) - Lock-screen / notification "now playing" display
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP with resumable download streams
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O for offline audio
//!
//! ### Settings
//! - [`SettingsStore`](storage::SettingsStore) - Durable key-value storage with transactions
//! - [`RemoteSettingsApi`](settings::RemoteSettingsApi) - Backend user-settings endpoint
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Files, HTTP, settings |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//!
//! The desktop crate has no audio output; hosts always inject an
//! [`AudioSession`](playback::AudioSession).
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Report transport failures as `BridgeError::Network` so callers can retry
//! - Report disk-full or read-only failures as `BridgeError::Storage`
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod error;
pub mod http;
pub mod media;
pub mod playback;
pub mod settings;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{DownloadStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use media::{MediaNotification, NowPlayingInfo};
pub use playback::{
    AudioSession, AudioSource, BandGain, EqualizerCurve, InterruptionKind, PlaybackMetadata,
    PlaybackOptions, PlaybackRequest, RemoteCommand, SessionEvent, SessionId, SessionListener,
};
pub use settings::RemoteSettingsApi;
pub use storage::{FileMetadata, FileSystemAccess, SettingsStore, SettingsTransaction};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
