//! # Core Configuration Module
//!
//! Provides configuration management for the playback engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all host bridges and feature flags. It enforces
//! fail-fast validation so a missing capability is reported at startup rather
//! than on first use.
//!
//! ## Required Dependencies
//!
//! - `AudioSession` - Always required; there is no desktop default
//! - `SettingsStore` - Durable settings (desktop default: SQLite)
//! - `FileSystemAccess` - Offline audio storage (desktop default: tokio fs)
//! - `HttpClient` - Required when offline downloads are enabled (desktop default: reqwest)
//!
//! ## Optional Dependencies
//!
//! - `RemoteSettingsApi` - Backend settings endpoint (required when remote sync is enabled)
//! - `MediaNotification` - Lock-screen "now playing" display
//! - `Clock` - Time source (defaults to the system clock)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected for the storage and network bridges if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/path/to/app/data")
//!     .audio_session(Arc::new(MyAudioSession::new()))
//!     .enable_remote_settings_sync(true)
//!     .remote_settings(Arc::new(MySettingsEndpoint::new(api)))
//!     .build()
//!     .await?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    AudioSession, Clock, FileSystemAccess, HttpClient, MediaNotification, RemoteSettingsApi,
    SettingsStore, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Core configuration for the playback engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Root directory for engine data (settings database, offline audio)
    pub data_dir: PathBuf,

    /// Platform audio session (required)
    pub audio_session: Arc<dyn AudioSession>,

    /// Durable key-value settings (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// File system access for offline audio (required)
    pub file_system: Arc<dyn FileSystemAccess>,

    /// HTTP client for downloads (required when offline downloads are enabled)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Backend settings endpoint (optional)
    pub remote_settings: Option<Arc<dyn RemoteSettingsApi>>,

    /// OS now-playing display (optional)
    pub media_notification: Option<Arc<dyn MediaNotification>>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Feature flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field("audio_session", &"AudioSession { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "remote_settings",
                &self
                    .remote_settings
                    .as_ref()
                    .map(|_| "RemoteSettingsApi { ... }"),
            )
            .field(
                "media_notification",
                &self
                    .media_notification
                    .as_ref()
                    .map(|_| "MediaNotification { ... }"),
            )
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Enable the offline download manager
    pub enable_offline_downloads: bool,

    /// Merge and push settings with the backend (requires RemoteSettingsApi)
    pub enable_remote_settings_sync: bool,

    /// Accumulate and persist listening time
    pub enable_listening_stats: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_offline_downloads: true,
            enable_remote_settings_sync: false,
            enable_listening_stats: true,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Path of the default SQLite settings database.
    pub fn settings_db_path(&self) -> PathBuf {
        default_settings_db_path(&self.data_dir)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The data directory is not empty
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        if self.features.enable_remote_settings_sync && self.remote_settings.is_none() {
            return Err(Error::Config(
                "Remote settings sync enabled but no RemoteSettingsApi provided. \
                 Disable the feature or inject a RemoteSettingsApi implementation."
                    .to_string(),
            ));
        }

        if self.features.enable_offline_downloads && self.http_client.is_none() {
            return Err(http_client_missing_error());
        }

        Ok(())
    }
}

fn default_settings_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.db")
}

fn audio_session_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "AudioSession".to_string(),
        message: "An AudioSession implementation is required to render audio. \
                 iOS: wrap AVAudioSession/AVPlayer. Android: wrap the media session service. \
                 Desktop: inject the host's output backend."
            .to_string(),
    }
}

fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "Offline downloads are enabled but no HttpClient was provided. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Mobile: inject the platform HTTP stack, or disable offline downloads."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for persisted engine state. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default SqliteSettingsStore. \
                 Mobile: inject platform-native settings (UserDefaults/DataStore)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required for offline audio. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use TokioFileSystem. \
                 Mobile: inject the sandboxed app directory accessor."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
async fn provide_default_settings_store(data_dir: &Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;

    let store = SqliteSettingsStore::new(default_settings_db_path(data_dir)).await?;

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
async fn provide_default_settings_store(_data_dir: &Path) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(data_dir: &Path) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn FileSystemAccess> =
        Arc::new(TokioFileSystem::with_data_directory(data_dir));
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_data_dir: &Path) -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    let client: Arc<dyn HttpClient> = Arc::new(bridge_desktop::ReqwestHttpClient::new());
    Some(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    None
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Set options incrementally and call [`build()`](CoreConfigBuilder::build).
/// `build` is async because the default SQLite settings store opens its
/// database on the caller's runtime.
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    audio_session: Option<Arc<dyn AudioSession>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    http_client: Option<Arc<dyn HttpClient>>,
    remote_settings: Option<Arc<dyn RemoteSettingsApi>>,
    media_notification: Option<Arc<dyn MediaNotification>>,
    clock: Option<Arc<dyn Clock>>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the root directory for engine data.
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Sets the platform audio session.
    pub fn audio_session(mut self, session: Arc<dyn AudioSession>) -> Self {
        self.audio_session = Some(session);
        self
    }

    /// Sets a custom settings store.
    ///
    /// If not provided and `desktop-shims` is enabled, a SQLite store is
    /// opened at `<data_dir>/settings.db`.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets a custom file system implementation.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets a custom HTTP client.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the backend settings endpoint.
    pub fn remote_settings(mut self, api: Arc<dyn RemoteSettingsApi>) -> Self {
        self.remote_settings = Some(api);
        self
    }

    /// Sets the OS now-playing display.
    pub fn media_notification(mut self, notification: Arc<dyn MediaNotification>) -> Self {
        self.media_notification = Some(notification);
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn enable_offline_downloads(mut self, enabled: bool) -> Self {
        self.features.enable_offline_downloads = enabled;
        self
    }

    pub fn enable_remote_settings_sync(mut self, enabled: bool) -> Self {
        self.features.enable_remote_settings_sync = enabled;
        self
    }

    pub fn enable_listening_stats(mut self, enabled: bool) -> Self {
        self.features.enable_listening_stats = enabled;
        self
    }

    /// Replaces all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if:
    /// - `data_dir` or `audio_session` is missing
    /// - A required bridge is missing and no desktop default is available
    /// - Feature flags are inconsistent with available bridges
    pub async fn build(self) -> Result<CoreConfig> {
        let data_dir = self.data_dir.ok_or_else(|| {
            Error::Config("Data directory is required. Use .data_dir() to set it.".to_string())
        })?;

        let audio_session = self.audio_session.ok_or_else(audio_session_missing_error)?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(&data_dir)?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&data_dir).await?,
        };

        let http_client = self.http_client.or_else(|| {
            if self.features.enable_offline_downloads {
                provide_default_http_client()
            } else {
                None
            }
        });

        let config = CoreConfig {
            data_dir,
            audio_session,
            settings_store,
            file_system,
            http_client,
            remote_settings: self.remote_settings,
            media_notification: self.media_notification,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::playback::{EqualizerCurve, PlaybackRequest, SessionId, SessionListener};
    use bridge_traits::storage::{FileMetadata, SettingsTransaction};
    use bytes::Bytes;
    use std::time::Duration;

    struct SilentSession;

    #[async_trait]
    impl AudioSession for SilentSession {
        fn set_listener(&self, _listener: Arc<dyn SessionListener>) {}
        async fn load(&self, _request: PlaybackRequest) -> BridgeResult<SessionId> {
            Ok(SessionId::new())
        }
        async fn play(&self, _session: SessionId) -> BridgeResult<()> {
            Ok(())
        }
        async fn pause(&self, _session: SessionId) -> BridgeResult<()> {
            Ok(())
        }
        async fn stop(&self, _session: SessionId) -> BridgeResult<()> {
            Ok(())
        }
        async fn seek(&self, _session: SessionId, _position: Duration) -> BridgeResult<()> {
            Ok(())
        }
        async fn set_volume(&self, _session: SessionId, _volume: f32) -> BridgeResult<()> {
            Ok(())
        }
        async fn set_equalizer(&self, _curve: EqualizerCurve) -> BridgeResult<()> {
            Ok(())
        }
        async fn unload(&self, _session: SessionId) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NullSettings;

    #[async_trait]
    impl SettingsStore for NullSettings {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }
        async fn begin_transaction(&self) -> BridgeResult<Box<dyn SettingsTransaction + Send>> {
            Err(bridge_traits::BridgeError::NotAvailable("transactions".into()))
        }
    }

    struct NullFs;

    #[async_trait]
    impl FileSystemAccess for NullFs {
        async fn get_data_directory(&self) -> BridgeResult<PathBuf> {
            Ok(PathBuf::from("/data"))
        }
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn metadata(&self, _path: &Path) -> BridgeResult<FileMetadata> {
            Err(bridge_traits::BridgeError::NotAvailable("metadata".into()))
        }
        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn write_file(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }
        async fn rename(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn open_write_stream(
            &self,
            _path: &Path,
            _append: bool,
        ) -> BridgeResult<Box<dyn tokio::io::AsyncWrite + Send + Unpin>> {
            Ok(Box::new(tokio::io::sink()))
        }
    }

    fn injected() -> CoreConfigBuilder {
        CoreConfig::builder()
            .data_dir("/tmp/engine")
            .audio_session(Arc::new(SilentSession))
            .settings_store(Arc::new(NullSettings))
            .file_system(Arc::new(NullFs))
    }

    #[tokio::test]
    async fn test_missing_data_dir_is_config_error() {
        let result = CoreConfig::builder()
            .audio_session(Arc::new(SilentSession))
            .build()
            .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_audio_session_is_capability_error() {
        let result = CoreConfig::builder().data_dir("/tmp/engine").build().await;
        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "AudioSession")
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_remote_sync_requires_remote_settings() {
        let result = injected()
            .enable_offline_downloads(false)
            .enable_remote_settings_sync(true)
            .build()
            .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_downloads_disabled_does_not_need_http() {
        let config = injected()
            .enable_offline_downloads(false)
            .build()
            .await
            .unwrap();

        assert!(config.http_client.is_none());
        assert!(!config.features.enable_offline_downloads);
        assert!(config.features.enable_listening_stats);
        assert_eq!(config.settings_db_path(), PathBuf::from("/tmp/engine/settings.db"));
    }

    #[test]
    fn test_feature_flag_defaults() {
        let flags = FeatureFlags::default();
        assert!(flags.enable_offline_downloads);
        assert!(!flags.enable_remote_settings_sync);
        assert!(flags.enable_listening_stats);
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[tokio::test]
    async fn test_downloads_without_http_client_fail_fast() {
        let result = injected().build().await;
        assert!(matches!(result, Err(Error::CapabilityMissing { .. })));
    }

    #[cfg(feature = "desktop-shims")]
    #[tokio::test]
    async fn test_desktop_defaults_are_injected() {
        let data_dir = std::env::temp_dir().join(format!("engine-config-{}", uuid::Uuid::new_v4()));

        let config = CoreConfig::builder()
            .data_dir(&data_dir)
            .audio_session(Arc::new(SilentSession))
            .build()
            .await
            .unwrap();

        assert!(config.http_client.is_some());
        config
            .settings_store
            .set_string("engine.listening", "{}")
            .await
            .unwrap();

        let _ = std::fs::remove_dir_all(&data_dir);
    }
}
