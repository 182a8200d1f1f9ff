//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (audio session,
//! filesystem, HTTP, settings store) into the playback and offline engine.
//! Desktop hosts typically enable the `desktop-shims` feature, which lets
//! [`CoreConfig`] fall back to the adapters from `bridge-desktop` for every
//! bridge except the audio session.
//!
//! ```rust,ignore
//! use core_service::{CoreConfig, DownloadConfig, Engine, PlaybackConfig};
//!
//! let config = CoreConfig::builder()
//!     .data_dir(data_dir)
//!     .audio_session(session)
//!     .enable_offline_downloads(true)
//!     .build()
//!     .await?;
//! let engine = Engine::start(config, PlaybackConfig::default(), DownloadConfig::default()).await?;
//! ```

pub mod engine;
pub mod error;

pub use engine::Engine;
pub use error::{CoreError, Result};

pub use core_playback::download::{DownloadConfig, DownloadManager, DownloadRecord, DownloadStatus};
pub use core_playback::{
    EqPreset, EqualizerConfig, LoopMode, PlaybackConfig, PlaybackHandle, PlaybackState,
    PlayerSnapshot, Track, TrackId,
};
pub use core_runtime::config::{CoreConfig, CoreConfigBuilder, FeatureFlags};
pub use core_runtime::events::{CoreEvent, DownloadEvent, PlaybackEvent, SettingsEvent};
pub use core_runtime::logging::{init_logging, LoggingConfig};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop;
