//! Download manager configuration

use bridge_traits::RetryPolicy;
use std::time::Duration;

/// Configuration for the offline download manager.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Number of concurrent downloads allowed (default: 2)
    pub max_concurrent_downloads: usize,

    /// Time bound for a single transfer attempt (default: 300s)
    pub download_timeout: Duration,

    /// Attempts per download before it is marked failed (default: 3)
    pub max_retry_attempts: u32,

    /// Delay before the first retry; doubles for each further one (default: 200ms)
    pub retry_base_delay: Duration,

    /// Maximum size of completed offline copies in bytes (default: 5GB)
    pub max_cache_size_bytes: u64,

    /// Directory for offline files (relative to app data dir)
    pub download_directory: String,

    /// Fetch cover art after the audio completes (default: true)
    pub fetch_cover_art: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 2,
            download_timeout: Duration::from_secs(300),
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
            max_cache_size_bytes: 5 * 1024 * 1024 * 1024, // 5GB
            download_directory: "offline".to_string(),
            fetch_cover_art: true,
        }
    }
}

impl DownloadConfig {
    /// Create a new download configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum cache size.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_cache_size_bytes = bytes;
        self
    }

    /// Set per-attempt download timeout.
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Set maximum concurrent downloads.
    pub fn with_max_concurrent_downloads(mut self, count: usize) -> Self {
        self.max_concurrent_downloads = count;
        self
    }

    /// Set retry attempts and the first backoff delay.
    pub fn with_retries(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.max_retry_attempts = attempts;
        self.retry_base_delay = base_delay;
        self
    }

    /// Set download directory name.
    pub fn with_download_directory(mut self, dir: impl Into<String>) -> Self {
        self.download_directory = dir.into();
        self
    }

    /// Enable or disable cover art downloads.
    pub fn with_cover_art(mut self, enabled: bool) -> Self {
        self.fetch_cover_art = enabled;
        self
    }

    /// Backoff schedule between attempts.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay: self.retry_base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_cache_size_bytes == 0 {
            return Err("max_cache_size_bytes must be greater than 0".to_string());
        }

        if self.max_concurrent_downloads == 0 {
            return Err("max_concurrent_downloads must be at least 1".to_string());
        }

        if self.max_retry_attempts == 0 {
            return Err("max_retry_attempts must be at least 1".to_string());
        }

        if self.download_timeout.is_zero() {
            return Err("download_timeout must be greater than 0".to_string());
        }

        if self.download_directory.is_empty() {
            return Err("download_directory cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.max_cache_size_bytes, 5 * 1024 * 1024 * 1024);
        assert_eq!(config.max_concurrent_downloads, 2);
        assert_eq!(config.max_retry_attempts, 3);
        assert!(config.fetch_cover_art);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = DownloadConfig::new()
            .with_max_size(1024 * 1024 * 1024)
            .with_max_concurrent_downloads(4)
            .with_cover_art(false)
            .with_download_directory("songs");

        assert_eq!(config.max_cache_size_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.max_concurrent_downloads, 4);
        assert!(!config.fetch_cover_art);
        assert_eq!(config.download_directory, "songs");
    }

    #[test]
    fn test_config_validation() {
        assert!(DownloadConfig::default().with_max_size(0).validate().is_err());
        assert!(DownloadConfig::default()
            .with_max_concurrent_downloads(0)
            .validate()
            .is_err());
        assert!(DownloadConfig::default()
            .with_download_directory("")
            .validate()
            .is_err());
        assert!(DownloadConfig::default()
            .with_retries(0, Duration::from_millis(10))
            .validate()
            .is_err());
    }

    #[test]
    fn test_retry_policy_follows_config() {
        let policy = DownloadConfig::default()
            .with_retries(4, Duration::from_millis(200))
            .retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }
}
