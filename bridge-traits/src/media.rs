//! OS "now playing" display (lock screen, notification shade, Control Center).

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Snapshot rendered by the platform's now-playing surface.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NowPlayingInfo {
    pub title: String,
    pub artist: String,
    pub artwork_url: Option<String>,
    pub is_playing: bool,
    pub position: Duration,
    pub duration: Option<Duration>,
}

#[async_trait]
pub trait MediaNotification: Send + Sync {
    /// Show or refresh the notification.
    async fn update(&self, info: NowPlayingInfo) -> Result<()>;

    /// Remove the notification.
    async fn clear(&self) -> Result<()>;
}
