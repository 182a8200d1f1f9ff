//! Offline download manager implementation

use super::config::DownloadConfig;
use super::record::{DownloadRecord, DownloadStatus};
use super::stats::{DownloadProgress, DownloadStats};
use crate::controller::OfflineSource;
use crate::error::{PlaybackError, Result};
use crate::models::{Track, TrackId};
use bridge_traits::{Clock, FileSystemAccess, HttpClient, HttpRequest};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_runtime::logging::{redact_url, strip_path};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const CHUNK_SIZE: usize = 64 * 1024;

/// Bookkeeping for a running worker.
struct ActiveDownload {
    cancel: CancellationToken,
    /// Cancelled by the worker when it has fully finished.
    done: CancellationToken,
    progress: DownloadProgress,
}

enum Outcome {
    Completed {
        bytes: u64,
        cover_path: Option<PathBuf>,
    },
    Failed(PlaybackError),
    Cancelled,
}

/// Downloads tracks for offline playback.
///
/// Each download runs on its own worker task; a semaphore caps how many
/// transfer at once. At most one worker exists per track. Bytes stream into
/// `<id>.part` and are renamed to `<id>.audio` on completion, so a partial
/// file left by a network failure can be resumed with a range request.
#[derive(Clone)]
pub struct DownloadManager {
    config: DownloadConfig,
    fs: Arc<dyn FileSystemAccess>,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    records: Arc<RwLock<HashMap<TrackId, DownloadRecord>>>,
    active_downloads: Arc<Mutex<HashMap<TrackId, ActiveDownload>>>,
    download_semaphore: Arc<Semaphore>,
    base_path: Arc<RwLock<Option<PathBuf>>>,
}

impl DownloadManager {
    /// Create a new download manager.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use core_playback::download::{DownloadConfig, DownloadManager};
    ///
    /// let manager = DownloadManager::new(DownloadConfig::default(), fs, http_client, clock)
    ///     .with_event_bus(event_bus);
    /// manager.initialize().await?;
    /// manager.download(&track, &track.audio_url).await?;
    /// ```
    pub fn new(
        config: DownloadConfig,
        fs: Arc<dyn FileSystemAccess>,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let download_semaphore = Arc::new(Semaphore::new(config.max_concurrent_downloads));

        Self {
            config,
            fs,
            http_client,
            clock,
            event_bus: None,
            records: Arc::new(RwLock::new(HashMap::new())),
            active_downloads: Arc::new(Mutex::new(HashMap::new())),
            download_semaphore,
            base_path: Arc::new(RwLock::new(None)),
        }
    }

    /// Set event bus for progress events.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Create the download directory.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing offline download manager");

        self.config
            .validate()
            .map_err(PlaybackError::InvalidArgument)?;

        let data_dir = self.fs.get_data_directory().await?;
        let base_path = data_dir.join(&self.config.download_directory);
        self.fs.create_dir_all(&base_path).await?;

        info!("Download manager initialized at {:?}", base_path);
        *self.base_path.write() = Some(base_path);
        Ok(())
    }

    /// Reconcile records persisted by a previous run against the filesystem.
    ///
    /// A completed record whose file is gone, and a record that was still
    /// downloading when the app died, both come back as not downloaded.
    /// Returns the number of records corrected.
    #[instrument(skip(self, persisted), fields(count = persisted.len()))]
    pub async fn load_persisted(&self, persisted: Vec<DownloadRecord>) -> Result<usize> {
        let mut corrected = 0;
        let mut restored = Vec::new();

        for record in persisted {
            match &record.status {
                DownloadStatus::Completed { local_path } => {
                    if self.fs.exists(local_path).await.unwrap_or(false) {
                        restored.push(record);
                    } else {
                        warn!(
                            "Offline file for track {} is missing; marking not downloaded",
                            record.track_id
                        );
                        corrected += 1;
                    }
                }
                DownloadStatus::Downloading { .. } => {
                    debug!("Download of {} was interrupted", record.track_id);
                    corrected += 1;
                }
                DownloadStatus::Failed { .. } => restored.push(record),
                DownloadStatus::NotDownloaded => {}
            }
        }

        let active = self.active_downloads.lock();
        let mut records = self.records.write();
        for record in restored {
            if !active.contains_key(&record.track_id) {
                records.insert(record.track_id.clone(), record);
            }
        }
        drop(records);
        drop(active);

        info!("Restored download records ({} corrected)", corrected);
        Ok(corrected)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Returns `true` if a completed offline copy exists.
    pub fn is_downloaded(&self, track_id: &TrackId) -> bool {
        self.records
            .read()
            .get(track_id)
            .is_some_and(DownloadRecord::is_completed)
    }

    /// Local file of a completed download.
    pub fn local_path(&self, track_id: &TrackId) -> Option<PathBuf> {
        self.records
            .read()
            .get(track_id)
            .and_then(|record| record.local_path().map(Path::to_path_buf))
    }

    /// Record for a track; tracks never requested report not-downloaded.
    pub fn record(&self, track_id: &TrackId) -> DownloadRecord {
        self.records
            .read()
            .get(track_id)
            .cloned()
            .unwrap_or_else(|| DownloadRecord::new(track_id.clone(), self.clock.unix_timestamp()))
    }

    /// All known records, ordered by track id.
    pub fn records(&self) -> Vec<DownloadRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.track_id.cmp(&b.track_id));
        records
    }

    /// Records worth persisting: completed and failed.
    pub fn persisted_records(&self) -> Vec<DownloadRecord> {
        self.records()
            .into_iter()
            .filter(|record| {
                matches!(
                    record.status,
                    DownloadStatus::Completed { .. } | DownloadStatus::Failed { .. }
                )
            })
            .collect()
    }

    /// Progress of every running download.
    pub fn active_downloads(&self) -> Vec<DownloadProgress> {
        self.active_downloads
            .lock()
            .values()
            .map(|active| active.progress.clone())
            .collect()
    }

    pub fn stats(&self) -> DownloadStats {
        let records = self.records.read();
        let mut stats = DownloadStats {
            total_records: records.len(),
            calculated_at: self.clock.unix_timestamp(),
            ..Default::default()
        };

        for record in records.values() {
            match record.status {
                DownloadStatus::Completed { .. } => {
                    stats.completed_tracks += 1;
                    stats.total_bytes += record.bytes_downloaded;
                }
                DownloadStatus::Downloading { .. } => stats.downloading_tracks += 1,
                DownloadStatus::Failed { .. } => stats.failed_tracks += 1,
                DownloadStatus::NotDownloaded => {}
            }
        }

        stats
    }

    // ========================================================================
    // Download
    // ========================================================================

    /// Start downloading `track` from `source_uri`.
    ///
    /// Returns once the worker is spawned. Rejects with
    /// [`PlaybackError::AlreadyDownloading`] if the track is already in
    /// flight; a completed track is left alone.
    #[instrument(skip(self, track, source_uri), fields(track_id = %track.id))]
    pub async fn download(&self, track: &Track, source_uri: &str) -> Result<()> {
        if self.base_path.read().is_none() {
            return Err(PlaybackError::InvalidState(
                "download manager is not initialized".to_string(),
            ));
        }
        if source_uri.is_empty() {
            return Err(PlaybackError::SourceResolution(track.id.to_string()));
        }

        let track_id = track.id.clone();
        let now = self.clock.unix_timestamp();
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        {
            let mut active = self.active_downloads.lock();
            if active.contains_key(&track_id) {
                warn!("Track {} is already downloading", track_id);
                return Err(PlaybackError::AlreadyDownloading(track_id.to_string()));
            }
            if self.is_downloaded(&track_id) {
                info!("Track {} is already available offline", track_id);
                return Ok(());
            }

            active.insert(
                track_id.clone(),
                ActiveDownload {
                    cancel: cancel.clone(),
                    done: done.clone(),
                    progress: DownloadProgress::new(track_id.to_string(), now),
                },
            );
            let mut records = self.records.write();
            let record = records
                .entry(track_id.clone())
                .or_insert_with(|| DownloadRecord::new(track_id.clone(), now));
            record.status = DownloadStatus::Downloading { progress: 0 };
            record.bytes_downloaded = 0;
            record.updated_at = now;
        }

        info!("Starting download for track {} from {}", track_id, redact_url(source_uri));
        self.emit(DownloadEvent::Started {
            track_id: track_id.to_string(),
        });

        let worker = self.clone();
        let track = track.clone();
        let source_uri = source_uri.to_string();
        tokio::spawn(async move {
            let _done = done.drop_guard();
            worker.run_download(track, source_uri, cancel).await;
        });

        Ok(())
    }

    async fn run_download(&self, track: Track, source_uri: String, cancel: CancellationToken) {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Outcome::Cancelled,
            outcome = self.fetch_all(&track, &source_uri) => outcome,
        };

        match outcome {
            Outcome::Completed { bytes, cover_path } => {
                self.finish_completed(&track, bytes, cover_path).await
            }
            Outcome::Failed(e) => self.finish_failed(&track.id, e).await,
            Outcome::Cancelled => self.finish_cancelled(&track.id).await,
        }
    }

    /// Audio first, then the cover. Runs under the worker's cancel token.
    async fn fetch_all(&self, track: &Track, source_uri: &str) -> Outcome {
        let bytes = match self.acquire_and_transfer(track, source_uri).await {
            Ok(bytes) => bytes,
            Err(e) => return Outcome::Failed(e),
        };

        let cover_path = if self.config.fetch_cover_art {
            self.fetch_cover(track).await
        } else {
            None
        };

        Outcome::Completed { bytes, cover_path }
    }

    async fn acquire_and_transfer(&self, track: &Track, source_uri: &str) -> Result<u64> {
        let _permit = self
            .download_semaphore
            .acquire()
            .await
            .map_err(|_| PlaybackError::InvalidState("download slots closed".to_string()))?;

        self.download_with_retry(track, source_uri).await
    }

    /// Download with automatic retry logic.
    async fn download_with_retry(&self, track: &Track, source_uri: &str) -> Result<u64> {
        let policy = self.config.retry_policy();
        let mut last_error = None;

        for attempt in 1..=self.config.max_retry_attempts {
            debug!(
                "Download attempt {}/{} for track {}",
                attempt, self.config.max_retry_attempts, track.id
            );

            match timeout(
                self.config.download_timeout,
                self.transfer(&track.id, source_uri),
            )
            .await
            {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(e)) if !e.is_recoverable() => {
                    warn!("Download attempt {} failed permanently: {}", attempt, e);
                    return Err(e);
                }
                Ok(Err(e)) => {
                    warn!("Download attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!("Download attempt {} timed out", attempt);
                    last_error = Some(PlaybackError::Timeout(format!(
                        "download exceeded {:?}",
                        self.config.download_timeout
                    )));
                }
            }

            if attempt < self.config.max_retry_attempts {
                let message = last_error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                self.emit(DownloadEvent::Retrying {
                    track_id: track.id.to_string(),
                    attempt: attempt + 1,
                    message,
                });
                sleep(policy.delay_for(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PlaybackError::Network("Download failed after all retries".to_string())
        }))
    }

    /// One transfer attempt, resuming from any partial file.
    async fn transfer(&self, track_id: &TrackId, source_uri: &str) -> Result<u64> {
        let part_path = self.part_path(track_id)?;
        let audio_path = self.audio_path(track_id)?;

        let offset = if self.fs.exists(&part_path).await? {
            self.fs.metadata(&part_path).await?.size
        } else {
            0
        };

        let request = HttpRequest::get(source_uri).resume_from(offset);
        let mut stream = self.http_client.download_stream(request).await?;

        let append = offset > 0 && stream.is_partial();
        if offset > 0 && !append {
            debug!("Server ignored range request for {}; restarting", track_id);
        } else if append {
            debug!("Resuming {} at byte {}", track_id, offset);
        }

        let mut written = if append { offset } else { 0 };
        let total = stream.content_length.map(|len| len + written);
        let mut writer = self.fs.open_write_stream(&part_path, append).await?;
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let read = stream
                .reader
                .read(&mut buffer)
                .await
                .map_err(|e| PlaybackError::Network(format!("stream interrupted: {}", e)))?;
            if read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..read])
                .await
                .map_err(|e| PlaybackError::Storage(e.to_string()))?;
            written += read as u64;
            self.report_progress(track_id, written, total);
        }

        writer
            .shutdown()
            .await
            .map_err(|e| PlaybackError::Storage(e.to_string()))?;

        if let Some(expected) = total {
            if written < expected {
                return Err(PlaybackError::Network(format!(
                    "stream ended after {} of {} bytes",
                    written, expected
                )));
            }
        }

        self.fs.rename(&part_path, &audio_path).await?;
        Ok(written)
    }

    fn report_progress(&self, track_id: &TrackId, written: u64, total: Option<u64>) {
        let now = self.clock.unix_timestamp();
        let event = {
            let mut active = self.active_downloads.lock();
            let Some(entry) = active.get_mut(track_id) else {
                return;
            };
            let before = entry.progress.progress_percent;
            entry.progress.update(written, total, now);
            let progress = entry.progress.clone();

            if let Some(record) = self.records.write().get_mut(track_id) {
                record.bytes_downloaded = progress.downloaded_bytes;
                record.total_bytes = progress.total_bytes;
                record.status = DownloadStatus::Downloading {
                    progress: progress.progress_percent,
                };
            }

            (progress.progress_percent != before).then(|| DownloadEvent::Progress {
                track_id: track_id.to_string(),
                percent: progress.progress_percent,
                bytes_downloaded: progress.downloaded_bytes,
                total_bytes: progress.total_bytes,
            })
        };

        if let Some(event) = event {
            self.emit(event);
        }
    }

    async fn finish_completed(&self, track: &Track, bytes: u64, cover_path: Option<PathBuf>) {
        let local_path = match self.audio_path(&track.id) {
            Ok(path) => path,
            Err(e) => return self.finish_failed(&track.id, e).await,
        };
        let now = self.clock.unix_timestamp();

        {
            let mut active = self.active_downloads.lock();
            if let Some(record) = self.records.write().get_mut(&track.id) {
                record.status = DownloadStatus::Completed {
                    local_path: local_path.clone(),
                };
                record.bytes_downloaded = bytes;
                record.total_bytes = Some(bytes);
                record.cover_path = cover_path;
                record.updated_at = now;
            }
            active.remove(&track.id);
        }

        info!(
            track_id = %track.id,
            file = strip_path(&local_path.to_string_lossy()),
            bytes,
            "Successfully downloaded track"
        );
        self.emit(DownloadEvent::Completed {
            track_id: track.id.to_string(),
            bytes,
        });

        if let Err(e) = self.enforce_cache_limit().await {
            warn!("Failed to enforce offline cache limit: {}", e);
        }
    }

    /// Best effort; a missing or slow cover never fails the download.
    /// Bounded by `download_timeout`.
    async fn fetch_cover(&self, track: &Track) -> Option<PathBuf> {
        let url = track.cover_url.as_deref()?;
        let path = self.cover_path(&track.id).ok()?;
        let limit = self.config.download_timeout;
        let request = HttpRequest::get(url).timeout(limit);

        let Ok(result) = timeout(limit, self.http_client.execute(request)).await else {
            warn!("Cover art for {} timed out after {:?}", track.id, limit);
            return None;
        };

        match result {
            Ok(response) if response.is_success() => {
                match self.fs.write_file(&path, response.body).await {
                    Ok(()) => Some(path),
                    Err(e) => {
                        warn!("Failed to store cover art for {}: {}", track.id, e);
                        None
                    }
                }
            }
            Ok(response) => {
                warn!("Cover art for {} returned HTTP {}", track.id, response.status);
                None
            }
            Err(e) => {
                warn!("Failed to fetch cover art for {}: {}", track.id, e);
                None
            }
        }
    }

    async fn finish_failed(&self, track_id: &TrackId, e: PlaybackError) {
        let recoverable = e.is_recoverable();
        error!("Download failed for track {}: {}", track_id, e);

        // network failures keep the partial file for a ranged resume
        if !recoverable {
            self.remove_partial(track_id).await;
        }

        {
            let mut active = self.active_downloads.lock();
            if let Some(record) = self.records.write().get_mut(track_id) {
                record.status = DownloadStatus::Failed {
                    reason: e.to_string(),
                };
                record.updated_at = self.clock.unix_timestamp();
            }
            active.remove(track_id);
        }

        self.emit(DownloadEvent::Failed {
            track_id: track_id.to_string(),
            message: e.to_string(),
            recoverable,
        });
    }

    async fn finish_cancelled(&self, track_id: &TrackId) {
        // the audio may already be in place if the cover fetch was interrupted
        self.remove_partial(track_id).await;
        for path in [self.audio_path(track_id), self.cover_path(track_id)]
            .into_iter()
            .flatten()
        {
            self.remove_if_exists(&path).await;
        }

        {
            let mut active = self.active_downloads.lock();
            self.records.write().remove(track_id);
            active.remove(track_id);
        }

        info!("Download cancelled for track {}", track_id);
        self.emit(DownloadEvent::Cancelled {
            track_id: track_id.to_string(),
        });
    }

    // ========================================================================
    // Cancel / Delete / Eviction
    // ========================================================================

    /// Stop an in-flight download and discard its partial bytes. Waits for
    /// the worker to finish. Returns `false` if nothing was running.
    #[instrument(skip(self))]
    pub async fn cancel(&self, track_id: &TrackId) -> Result<bool> {
        let done = {
            let active = self.active_downloads.lock();
            match active.get(track_id) {
                Some(entry) => {
                    entry.cancel.cancel();
                    entry.done.clone()
                }
                None => return Ok(false),
            }
        };

        done.cancelled().await;
        Ok(true)
    }

    /// Remove a track's offline copy.
    ///
    /// A running download is cancelled first. Afterwards the record is
    /// not-downloaded; tracks without a completed copy are left alone.
    #[instrument(skip(self))]
    pub async fn delete(&self, track_id: &TrackId) -> Result<()> {
        if self.cancel(track_id).await? {
            info!("Cancelled in-flight download of {} for delete", track_id);
        }

        let removed = {
            let mut records = self.records.write();
            match records.get(track_id) {
                Some(record) if record.is_completed() => records.remove(track_id),
                _ => None,
            }
        };

        if let Some(record) = removed {
            self.remove_files(&record).await;
            info!("Deleted offline copy of {}", track_id);
            self.emit(DownloadEvent::Deleted {
                track_id: track_id.to_string(),
            });
        }

        Ok(())
    }

    /// Evict the oldest completed copies until usage is under the limit.
    /// Running downloads are never touched.
    #[instrument(skip(self))]
    pub async fn enforce_cache_limit(&self) -> Result<usize> {
        let stats = self.stats();
        let bytes_needed = stats.space_needed(self.config.max_cache_size_bytes);
        if bytes_needed == 0 {
            return Ok(0);
        }

        info!("Evicting tracks to free {} bytes", bytes_needed);

        let mut candidates: Vec<DownloadRecord> = self
            .records
            .read()
            .values()
            .filter(|record| record.is_completed())
            .cloned()
            .collect();
        candidates.sort_by_key(|record| record.updated_at);

        let mut freed = 0u64;
        let mut evicted = 0;
        for record in candidates {
            if freed >= bytes_needed {
                break;
            }

            let removed = self.records.write().remove(&record.track_id);
            if let Some(record) = removed {
                self.remove_files(&record).await;
                freed += record.bytes_downloaded;
                evicted += 1;
                self.emit(DownloadEvent::Evicted {
                    track_id: record.track_id.to_string(),
                });
            }
        }

        info!("Evicted {} tracks, freed {} bytes", evicted, freed);
        Ok(evicted)
    }

    /// Cancel everything and remove every offline copy. Returns the number
    /// of completed copies removed.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<usize> {
        info!("Clearing all offline copies");

        let running: Vec<TrackId> = self.active_downloads.lock().keys().cloned().collect();
        for track_id in running {
            self.cancel(&track_id).await?;
        }

        let records: Vec<DownloadRecord> = self.records.write().drain().map(|(_, r)| r).collect();
        let mut cleared = 0;
        for record in records {
            if record.is_completed() {
                cleared += 1;
                self.emit(DownloadEvent::Deleted {
                    track_id: record.track_id.to_string(),
                });
            }
            self.remove_files(&record).await;
            self.remove_partial(&record.track_id).await;
        }

        info!("Cleared {} tracks from offline storage", cleared);
        Ok(cleared)
    }

    // ========================================================================
    // Files
    // ========================================================================

    fn base_path(&self) -> Result<PathBuf> {
        self.base_path.read().clone().ok_or_else(|| {
            PlaybackError::InvalidState("download manager is not initialized".to_string())
        })
    }

    fn file_path(&self, track_id: &TrackId, extension: &str) -> Result<PathBuf> {
        Ok(self
            .base_path()?
            .join(format!("{}.{}", file_stem(track_id), extension)))
    }

    fn audio_path(&self, track_id: &TrackId) -> Result<PathBuf> {
        self.file_path(track_id, "audio")
    }

    fn part_path(&self, track_id: &TrackId) -> Result<PathBuf> {
        self.file_path(track_id, "part")
    }

    fn cover_path(&self, track_id: &TrackId) -> Result<PathBuf> {
        self.file_path(track_id, "cover")
    }

    async fn remove_files(&self, record: &DownloadRecord) {
        let paths = record
            .local_path()
            .map(Path::to_path_buf)
            .into_iter()
            .chain(record.cover_path.clone());

        for path in paths {
            if let Err(e) = self.fs.delete_file(&path).await {
                warn!("Failed to delete offline file {:?}: {}", path, e);
            }
        }
    }

    async fn remove_partial(&self, track_id: &TrackId) {
        if let Ok(part_path) = self.part_path(track_id) {
            self.remove_if_exists(&part_path).await;
        }
    }

    async fn remove_if_exists(&self, path: &Path) {
        if self.fs.exists(path).await.unwrap_or(false) {
            if let Err(e) = self.fs.delete_file(path).await {
                warn!("Failed to delete offline file {:?}: {}", path, e);
            }
        }
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(event_bus) = &self.event_bus {
            let _ = event_bus.emit(CoreEvent::Download(event));
        }
    }
}

impl OfflineSource for DownloadManager {
    fn local_path(&self, track_id: &TrackId) -> Option<PathBuf> {
        DownloadManager::local_path(self, track_id)
    }
}

/// File name for a track id: the hex SHA-256 of the id.
fn file_stem(track_id: &TrackId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(track_id.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}
