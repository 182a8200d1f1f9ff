//! # Playback Error Types
//!
//! Error taxonomy shared by the playback controller, the download manager and
//! the persistence bridge.

use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors that can occur in the playback and offline engine.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// Neither an offline copy nor a remote URI is available for the track.
    #[error("No playable source for track: {0}")]
    SourceResolution(String),

    // ========================================================================
    // Transfer Errors
    // ========================================================================
    /// Download or stream failure. Retryable.
    #[error("Network error: {0}")]
    Network(String),

    /// An operation exceeded its time bound. Retryable.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Disk full, read-only or otherwise unwritable.
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // Caller Errors
    // ========================================================================
    /// The operation is not valid in the current state (e.g. seek with no
    /// current track).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An argument was outside its accepted range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A download for this track is already running.
    #[error("Track is already downloading: {0}")]
    AlreadyDownloading(String),

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// The platform audio session rejected a command.
    #[error("Audio session error: {0}")]
    Session(String),

    /// The controller task has shut down.
    #[error("Playback engine is not running")]
    EngineStopped,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bridge failure that has no more specific classification.
    #[error("Bridge error: {0}")]
    Bridge(BridgeError),
}

impl PlaybackError {
    /// Returns `true` for failures that may succeed when retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlaybackError::Network(_) | PlaybackError::Timeout(_))
    }

    /// Returns `true` if this is a network-related error.
    pub fn is_network_error(&self) -> bool {
        matches!(self, PlaybackError::Network(_))
    }
}

impl From<BridgeError> for PlaybackError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Network(msg) => PlaybackError::Network(msg),
            BridgeError::Storage(msg) => PlaybackError::Storage(msg),
            BridgeError::Io(e) => PlaybackError::Storage(e.to_string()),
            other => PlaybackError::Bridge(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(PlaybackError::Network("reset".into()).is_recoverable());
        assert!(PlaybackError::Timeout("load".into()).is_recoverable());
        assert!(!PlaybackError::Storage("disk full".into()).is_recoverable());
        assert!(!PlaybackError::InvalidState("no track".into()).is_recoverable());
    }

    #[test]
    fn test_bridge_errors_are_classified() {
        let err: PlaybackError = BridgeError::Network("HTTP 503".into()).into();
        assert!(err.is_network_error());

        let err: PlaybackError = BridgeError::Storage("read-only".into()).into();
        assert!(matches!(err, PlaybackError::Storage(_)));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: PlaybackError = BridgeError::Io(io).into();
        assert!(matches!(err, PlaybackError::Storage(_)));

        let err: PlaybackError = BridgeError::OperationFailed("HTTP 404".into()).into();
        assert!(matches!(err, PlaybackError::Bridge(_)));
    }

    #[test]
    fn test_error_display() {
        let err = PlaybackError::AlreadyDownloading("t1".into());
        assert_eq!(err.to_string(), "Track is already downloading: t1");
    }
}
