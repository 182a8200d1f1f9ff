//! # Offline Downloads
//!
//! Stores tracks in the app's data directory for offline playback.
//!
//! ## Overview
//!
//! - [`DownloadManager`] runs one worker per requested track, bounded by a
//!   concurrency cap, with resumable transfers and automatic retries.
//! - [`DownloadRecord`] is the per-track status the UI renders.
//! - [`DownloadStats`] / [`DownloadProgress`] summarize usage and speed.
//!
//! Completed copies are only ever removed through [`DownloadManager::delete`],
//! [`DownloadManager::enforce_cache_limit`] or [`DownloadManager::clear_cache`].

pub mod config;
pub mod manager;
pub mod record;
pub mod stats;

pub use config::DownloadConfig;
pub use manager::DownloadManager;
pub use record::{DownloadRecord, DownloadStatus};
pub use stats::{DownloadProgress, DownloadStats};
