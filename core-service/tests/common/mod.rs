//! Test doubles for engine tests.
//!
//! The engine runs against the real desktop filesystem and SQLite settings
//! store in a scratch directory; only the audio session and HTTP are faked.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AudioSession, AudioSource, BridgeError, DownloadStream, EqualizerCurve, HttpClient,
    HttpRequest, HttpResponse, PlaybackRequest, SessionEvent, SessionId, SessionListener,
    SettingsStore,
};
use core_service::{CoreConfig, CoreConfigBuilder, PlayerSnapshot, Track};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub fn track(id: &str) -> Track {
    Track::new(
        id,
        format!("Song {}", id),
        "The Band",
        format!("https://cdn.example.com/{}.mp3", id),
    )
    .with_duration(180)
}

// ============================================================================
// Scratch Directory
// ============================================================================

/// Unique directory under the system temp dir, removed on drop.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("engine-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn settings_store(&self) -> Arc<SqliteSettingsStore> {
        Arc::new(
            SqliteSettingsStore::new(self.path.join("settings.db"))
                .await
                .unwrap(),
        )
    }

    pub fn file_system(&self) -> Arc<TokioFileSystem> {
        Arc::new(TokioFileSystem::with_data_directory(self.path.join("data")))
    }

    /// Builder with every bridge pointed at this directory.
    pub async fn config_builder(
        &self,
        session: Arc<FakeAudioSession>,
        http: Arc<StaticHttpClient>,
    ) -> CoreConfigBuilder {
        CoreConfig::builder()
            .data_dir(self.path.join("data"))
            .audio_session(session)
            .file_system(self.file_system())
            .settings_store(self.settings_store().await)
            .http_client(http)
    }

    pub async fn config(
        &self,
        session: Arc<FakeAudioSession>,
        http: Arc<StaticHttpClient>,
    ) -> CoreConfig {
        self.config_builder(session, http)
            .await
            .build()
            .await
            .unwrap()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

// ============================================================================
// Audio Session
// ============================================================================

/// Reports a first frame for every load and remembers what it played.
#[derive(Default)]
pub struct FakeAudioSession {
    listener: Mutex<Option<Arc<dyn SessionListener>>>,
    sources: Mutex<Vec<AudioSource>>,
}

impl FakeAudioSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, event: SessionEvent) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_event(event);
        }
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    pub fn sources(&self) -> Vec<AudioSource> {
        self.sources.lock().clone()
    }
}

#[async_trait]
impl AudioSession for FakeAudioSession {
    fn set_listener(&self, listener: Arc<dyn SessionListener>) {
        *self.listener.lock() = Some(listener);
    }

    async fn load(&self, request: PlaybackRequest) -> BridgeResult<SessionId> {
        let session = SessionId::new();
        self.sources.lock().push(request.source);
        self.emit(SessionEvent::FirstFrame {
            session,
            duration: None,
        });
        Ok(session)
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

// ============================================================================
// HTTP
// ============================================================================

/// Serves fixed bodies by URL; anything else is a connection failure.
#[derive(Default)]
pub struct StaticHttpClient {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
}

impl StaticHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: &[u8]) {
        self.bodies.lock().insert(url.to_string(), body.to_vec());
    }
}

#[async_trait]
impl HttpClient for StaticHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        match self.bodies.lock().get(&request.url) {
            Some(body) => Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: body.clone().into(),
            }),
            None => Err(BridgeError::Network(format!("unreachable: {}", request.url))),
        }
    }

    async fn download_stream(&self, request: HttpRequest) -> BridgeResult<DownloadStream> {
        let body = self
            .bodies
            .lock()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| BridgeError::Network(format!("unreachable: {}", request.url)))?;
        Ok(DownloadStream {
            status: 200,
            content_length: Some(body.len() as u64),
            reader: Box::new(io::Cursor::new(body)),
        })
    }
}

// ============================================================================
// Waiting
// ============================================================================

pub async fn wait_for_snapshot(
    mut rx: watch::Receiver<PlayerSnapshot>,
    predicate: impl FnMut(&PlayerSnapshot) -> bool,
) -> PlayerSnapshot {
    let snapshot = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("controller stopped");
    (*snapshot).clone()
}

/// Poll a settings key until `predicate` accepts its JSON value.
pub async fn wait_for_setting(
    store: &dyn SettingsStore,
    key: &str,
    mut predicate: impl FnMut(&serde_json::Value) -> bool,
) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        if let Some(raw) = store.get_string(key).await.unwrap() {
            if let Ok(value) = serde_json::from_str(&raw) {
                if predicate(&value) {
                    return value;
                }
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            key
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
