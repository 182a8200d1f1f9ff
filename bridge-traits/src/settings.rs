//! Backend user-settings endpoint.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// REST-style settings endpoint owned by the backend.
///
/// The document is a JSON object whose top-level keys are `equalizer`,
/// `playback` and `listening`. Hosts wrap their authenticated API client in
/// this trait; the engine never sees tokens or URLs.
#[async_trait]
pub trait RemoteSettingsApi: Send + Sync {
    /// Fetch the user's settings document. `Ok(None)` means the user has never
    /// saved settings on the backend.
    async fn fetch(&self) -> Result<Option<Value>>;

    /// Replace the remote document.
    async fn push(&self, document: Value) -> Result<()>;
}
