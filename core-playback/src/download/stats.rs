//! Download statistics and progress tracking

use serde::{Deserialize, Serialize};

/// Statistics about offline copies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadStats {
    /// Number of tracks with a record (any status except not-downloaded)
    pub total_records: usize,

    /// Number of completed offline copies
    pub completed_tracks: usize,

    /// Number of tracks currently downloading
    pub downloading_tracks: usize,

    /// Number of failed downloads
    pub failed_tracks: usize,

    /// Total bytes used by completed copies
    pub total_bytes: u64,

    /// Timestamp when stats were calculated
    pub calculated_at: i64,
}

impl DownloadStats {
    /// Bytes that must be freed to get back under `max_size`.
    pub fn space_needed(&self, max_size: u64) -> u64 {
        self.total_bytes.saturating_sub(max_size)
    }
}

/// Progress of one running download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Track identifier
    pub track_id: String,

    /// Total file size in bytes, once the server announced it
    pub total_bytes: Option<u64>,

    /// Bytes downloaded so far
    pub downloaded_bytes: u64,

    /// Download progress percentage (0-100)
    pub progress_percent: u8,

    /// Current download speed in bytes/second
    pub speed_bytes_per_sec: u64,

    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,

    /// Download started timestamp
    pub started_at: i64,

    /// Last update timestamp
    pub updated_at: i64,
}

impl DownloadProgress {
    /// Create new download progress tracker.
    pub fn new(track_id: String, started_at: i64) -> Self {
        Self {
            track_id,
            total_bytes: None,
            downloaded_bytes: 0,
            progress_percent: 0,
            speed_bytes_per_sec: 0,
            eta_seconds: None,
            started_at,
            updated_at: started_at,
        }
    }

    /// Record bytes written so far.
    ///
    /// Reported bytes and percent never go backwards, even when a transfer
    /// restarts from zero because the server ignored a range request.
    pub fn update(&mut self, downloaded_bytes: u64, total_bytes: Option<u64>, now: i64) {
        let elapsed = (now - self.started_at).max(1) as u64;

        self.downloaded_bytes = self.downloaded_bytes.max(downloaded_bytes);
        if total_bytes.is_some() {
            self.total_bytes = total_bytes;
        }
        self.updated_at = now;

        if let Some(total) = self.total_bytes.filter(|&total| total > 0) {
            let percent = (self.downloaded_bytes as f64 / total as f64) * 100.0;
            self.progress_percent = self.progress_percent.max(percent.min(100.0) as u8);
        }

        self.speed_bytes_per_sec = self.downloaded_bytes / elapsed;

        self.eta_seconds = match self.total_bytes {
            Some(total) if self.speed_bytes_per_sec > 0 => {
                Some(total.saturating_sub(self.downloaded_bytes) / self.speed_bytes_per_sec)
            }
            _ => None,
        };
    }
}
