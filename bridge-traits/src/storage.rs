//! Durable storage seams: the offline file area and the settings store.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    /// Unix seconds, when the platform reports it.
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// Sandboxed file access for offline downloads.
///
/// Paths handed back by the engine always live under
/// [`get_data_directory`](Self::get_data_directory). On iOS and Android that
/// is the app's documents/files area, which survives low-storage purges.
///
/// ```ignore
/// async fn store_cover(fs: &dyn FileSystemAccess, cover: Bytes) -> Result<()> {
///     let offline = fs.get_data_directory().await?.join("offline");
///     fs.create_dir_all(&offline).await?;
///     fs.write_file(&offline.join("t1.cover"), cover).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    async fn get_data_directory(&self) -> Result<PathBuf>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Fails with [`BridgeError::Io`](crate::BridgeError::Io) if `path` is missing.
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Create or replace `path` with `data`.
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Move `from` over `to`. Completed downloads are published this way, so
    /// a reader never sees a half-written file.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Writer for a download in progress. `append` continues a `.part` file
    /// after a ranged resume; otherwise the file starts empty.
    async fn open_write_stream(
        &self,
        path: &Path,
        append: bool,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>;
}

/// String key-value store backing the persisted engine state.
///
/// UserDefaults on iOS, DataStore on Android, a SQLite table on desktop.
/// The engine keeps one JSON document per key and writes all of them in a
/// single transaction:
///
/// ```ignore
/// let mut tx = store.begin_transaction().await?;
/// tx.set_string("engine.equalizer", &equalizer_json).await?;
/// tx.set_string("engine.playback", &playback_json).await?;
/// tx.commit().await?;
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Writes made through the transaction become visible together on
    /// `commit`. Dropping it uncommitted discards them.
    async fn begin_transaction(&self) -> Result<Box<dyn SettingsTransaction + Send>>;
}

#[async_trait]
pub trait SettingsTransaction: Send {
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
