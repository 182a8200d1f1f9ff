//! Per-track download records.

use crate::models::TrackId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle of one track's offline copy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DownloadStatus {
    #[default]
    NotDownloaded,
    /// Percent complete, 0-100. Never decreases while downloading.
    Downloading { progress: u8 },
    Completed {
        #[serde(rename = "localPath")]
        local_path: PathBuf,
    },
    Failed { reason: String },
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::NotDownloaded => "not_downloaded",
            DownloadStatus::Downloading { .. } => "downloading",
            DownloadStatus::Completed { .. } => "completed",
            DownloadStatus::Failed { .. } => "failed",
        }
    }
}

/// Download bookkeeping for one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub track_id: TrackId,
    pub status: DownloadStatus,
    pub bytes_downloaded: u64,
    #[serde(default)]
    pub total_bytes: Option<u64>,
    #[serde(default)]
    pub cover_path: Option<PathBuf>,
    /// Unix timestamp (seconds) of the last status change.
    pub updated_at: i64,
}

impl DownloadRecord {
    pub fn new(track_id: TrackId, updated_at: i64) -> Self {
        Self {
            track_id,
            status: DownloadStatus::NotDownloaded,
            bytes_downloaded: 0,
            total_bytes: None,
            cover_path: None,
            updated_at,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, DownloadStatus::Completed { .. })
    }

    pub fn is_downloading(&self) -> bool {
        matches!(self.status, DownloadStatus::Downloading { .. })
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.status {
            DownloadStatus::Completed { local_path } => Some(local_path),
            _ => None,
        }
    }

    /// Percent complete for display.
    pub fn progress_percent(&self) -> u8 {
        match self.status {
            DownloadStatus::Completed { .. } => 100,
            DownloadStatus::Downloading { progress } => progress,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_with_camel_case_fields() {
        let record = DownloadRecord {
            status: DownloadStatus::Completed {
                local_path: PathBuf::from("/data/offline/t1.audio"),
            },
            bytes_downloaded: 42,
            ..DownloadRecord::new(TrackId::new("t1"), 1_700_000_000)
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["trackId"], "t1");
        assert_eq!(json["status"]["state"], "completed");
        assert_eq!(json["status"]["localPath"], "/data/offline/t1.audio");
        assert_eq!(json["bytesDownloaded"], 42);
    }

    #[test]
    fn test_record_helpers() {
        let mut record = DownloadRecord::new(TrackId::new("t1"), 0);
        assert_eq!(record.progress_percent(), 0);
        assert!(record.local_path().is_none());

        record.status = DownloadStatus::Downloading { progress: 40 };
        assert!(record.is_downloading());
        assert_eq!(record.progress_percent(), 40);

        record.status = DownloadStatus::Completed {
            local_path: PathBuf::from("t1.audio"),
        };
        assert!(record.is_completed());
        assert_eq!(record.progress_percent(), 100);
        assert_eq!(record.status.as_str(), "completed");
    }
}
