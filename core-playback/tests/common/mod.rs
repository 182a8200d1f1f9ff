//! Shared fakes for the integration suites.
//!
//! Every bridge the engine consumes has an in-memory stand-in here:
//! - `FakeAudioSession`: records calls, optionally reports a first frame on load
//! - `MemoryFileSystem`: files kept in a map, writes can be made to fail
//! - `ScriptedHttpClient`: per-URL queue of canned responses
//! - `MemorySettingsStore`: transactional key-value map
//! - `ManualClock` and `RecordingNotification`

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AudioSession, AudioSource, BridgeError, Clock, DownloadStream, EqualizerCurve,
    FileMetadata, FileSystemAccess, HttpClient, HttpRequest, HttpResponse, MediaNotification,
    NowPlayingInfo, PlaybackRequest, SessionEvent, SessionId, SessionListener, SettingsStore,
    SettingsTransaction,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_playback::{
    ControllerDeps, InitialState, OfflineSource, PlaybackConfig, PlaybackController,
    PlaybackHandle, PlayerSnapshot, Track, TrackId,
};
use core_runtime::events::{CoreEvent, EventBus};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::sync::broadcast;

pub fn track(id: &str) -> Track {
    Track::new(
        id,
        format!("Song {}", id),
        "The Band",
        format!("https://cdn.example.com/{}.mp3", id),
    )
    .with_duration(180)
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| track(id)).collect()
}

// ============================================================================
// Audio Session
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Load {
        session: SessionId,
        source: AudioSource,
        start: Duration,
        volume: f32,
    },
    Play(SessionId),
    Pause(SessionId),
    Stop(SessionId),
    Seek(SessionId, Duration),
    Volume(SessionId, f32),
    Equalizer(EqualizerCurve),
    Unload(SessionId),
}

pub struct FakeAudioSession {
    calls: Mutex<Vec<SessionCall>>,
    listener: Mutex<Option<Arc<dyn SessionListener>>>,
    auto_start: AtomicBool,
    fail_loads: AtomicBool,
}

impl FakeAudioSession {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            auto_start: AtomicBool::new(true),
            fail_loads: AtomicBool::new(false),
        }
    }

    /// When set, every load reports its first frame straight away.
    pub fn set_auto_start(&self, enabled: bool) {
        self.auto_start.store(enabled, Ordering::SeqCst);
    }

    pub fn set_fail_loads(&self, enabled: bool) {
        self.fail_loads.store(enabled, Ordering::SeqCst);
    }

    /// Deliver a platform callback through the registered listener.
    pub fn emit(&self, event: SessionEvent) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_event(event);
        }
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().clone()
    }

    pub fn loads(&self) -> Vec<SessionCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, SessionCall::Load { .. }))
            .collect()
    }

    pub fn load_count(&self) -> usize {
        self.loads().len()
    }

    pub fn last_session(&self) -> SessionId {
        self.calls()
            .iter()
            .rev()
            .find_map(|call| match call {
                SessionCall::Load { session, .. } => Some(*session),
                _ => None,
            })
            .expect("no session loaded")
    }

    pub fn last_equalizer(&self) -> Option<EqualizerCurve> {
        self.calls().into_iter().rev().find_map(|call| match call {
            SessionCall::Equalizer(curve) => Some(curve),
            _ => None,
        })
    }

    fn record(&self, call: SessionCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl AudioSession for FakeAudioSession {
    fn set_listener(&self, listener: Arc<dyn SessionListener>) {
        *self.listener.lock() = Some(listener);
    }

    async fn load(&self, request: PlaybackRequest) -> BridgeResult<SessionId> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("unsupported source".into()));
        }

        let session = SessionId::new();
        self.record(SessionCall::Load {
            session,
            source: request.source,
            start: request.options.start_position,
            volume: request.options.initial_volume,
        });

        if self.auto_start.load(Ordering::SeqCst) {
            self.emit(SessionEvent::FirstFrame {
                session,
                duration: None,
            });
        }
        Ok(session)
    }

    async fn play(&self, session: SessionId) -> BridgeResult<()> {
        self.record(SessionCall::Play(session));
        Ok(())
    }

    async fn pause(&self, session: SessionId) -> BridgeResult<()> {
        self.record(SessionCall::Pause(session));
        Ok(())
    }

    async fn stop(&self, session: SessionId) -> BridgeResult<()> {
        self.record(SessionCall::Stop(session));
        Ok(())
    }

    async fn seek(&self, session: SessionId, position: Duration) -> BridgeResult<()> {
        self.record(SessionCall::Seek(session, position));
        Ok(())
    }

    async fn set_volume(&self, session: SessionId, volume: f32) -> BridgeResult<()> {
        self.record(SessionCall::Volume(session, volume));
        Ok(())
    }

    async fn set_equalizer(&self, curve: EqualizerCurve) -> BridgeResult<()> {
        self.record(SessionCall::Equalizer(curve));
        Ok(())
    }

    async fn unload(&self, session: SessionId) -> BridgeResult<()> {
        self.record(SessionCall::Unload(session));
        Ok(())
    }
}

// ============================================================================
// Media Notification
// ============================================================================

#[derive(Default)]
pub struct RecordingNotification {
    updates: Mutex<Vec<Option<NowPlayingInfo>>>,
}

impl RecordingNotification {
    pub fn updates(&self) -> Vec<Option<NowPlayingInfo>> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl MediaNotification for RecordingNotification {
    async fn update(&self, info: NowPlayingInfo) -> BridgeResult<()> {
        self.updates.lock().push(Some(info));
        Ok(())
    }

    async fn clear(&self) -> BridgeResult<()> {
        self.updates.lock().push(None);
        Ok(())
    }
}

// ============================================================================
// Offline Lookup
// ============================================================================

#[derive(Default)]
pub struct StaticOffline {
    paths: HashMap<TrackId, PathBuf>,
}

impl StaticOffline {
    pub fn with(mut self, track_id: &str, path: &str) -> Self {
        self.paths.insert(TrackId::new(track_id), PathBuf::from(path));
        self
    }
}

impl OfflineSource for StaticOffline {
    fn local_path(&self, track_id: &TrackId) -> Option<PathBuf> {
        self.paths.get(track_id).cloned()
    }
}

// ============================================================================
// Player Harness
// ============================================================================

pub struct Player {
    pub handle: PlaybackHandle,
    pub session: Arc<FakeAudioSession>,
    pub notification: Arc<RecordingNotification>,
    pub events: broadcast::Receiver<CoreEvent>,
}

pub fn spawn_player(
    config: PlaybackConfig,
    initial: InitialState,
    offline: Option<Arc<dyn OfflineSource>>,
) -> Player {
    let session = Arc::new(FakeAudioSession::new());
    let notification = Arc::new(RecordingNotification::default());
    let event_bus = EventBus::new(1024);
    let events = event_bus.subscribe();

    let deps = ControllerDeps {
        session: session.clone(),
        offline,
        notification: Some(notification.clone()),
        event_bus,
    };
    let (handle, _task) = PlaybackController::spawn(config, deps, initial);
    session.set_listener(Arc::new(handle.session_listener()));

    Player {
        handle,
        session,
        notification,
        events,
    }
}

impl Player {
    pub fn new() -> Self {
        spawn_player(PlaybackConfig::default(), InitialState::default(), None)
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&PlayerSnapshot) -> bool,
    ) -> PlayerSnapshot {
        let mut rx = self.handle.subscribe();
        let snapshot = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(predicate))
            .await
            .expect("timed out waiting for snapshot")
            .expect("controller stopped");
        (*snapshot).clone()
    }

    pub async fn wait_for_track(&self, id: &str) -> PlayerSnapshot {
        self.wait_for(|s| {
            s.is_playing() && s.current_track.as_ref().map(|t| t.id.as_str()) == Some(id)
        })
        .await
    }

    /// Drain every event published so far.
    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

// ============================================================================
// Clock
// ============================================================================

pub struct ManualClock {
    seconds: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            seconds: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.seconds.load(Ordering::SeqCst), 0).unwrap_or_default()
    }
}

// ============================================================================
// File System
// ============================================================================

type Files = Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>;

pub struct MemoryFileSystem {
    files: Files,
    dirs: Mutex<Vec<PathBuf>>,
    fail_writes: AtomicBool,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            dirs: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Simulate a full disk.
    pub fn set_fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    pub fn put(&self, path: &Path, data: &[u8]) {
        self.files.lock().insert(path.to_path_buf(), data.to_vec());
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn check_writable(&self) -> BridgeResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(BridgeError::Storage("no space left on device".into()))
        } else {
            Ok(())
        }
    }

    fn missing(path: &Path) -> BridgeError {
        BridgeError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        ))
    }
}

struct MemoryWriter {
    files: Files,
    path: PathBuf,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.files
            .lock()
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl FileSystemAccess for MemoryFileSystem {
    async fn get_data_directory(&self) -> BridgeResult<PathBuf> {
        Ok(PathBuf::from("/app/data"))
    }

    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        Ok(self.files.lock().contains_key(path) || self.dirs.lock().iter().any(|d| d == path))
    }

    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        let size = self
            .files
            .lock()
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| Self::missing(path))?;
        Ok(FileMetadata {
            size,
            created_at: None,
            modified_at: None,
            is_directory: false,
        })
    }

    async fn create_dir_all(&self, path: &Path) -> BridgeResult<()> {
        self.dirs.lock().push(path.to_path_buf());
        Ok(())
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()> {
        self.check_writable()?;
        self.put(path, &data);
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> BridgeResult<()> {
        let mut files = self.files.lock();
        let data = files.remove(from).ok_or_else(|| Self::missing(from))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
        self.files
            .lock()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Self::missing(path))
    }

    async fn open_write_stream(
        &self,
        path: &Path,
        append: bool,
    ) -> BridgeResult<Box<dyn AsyncWrite + Send + Unpin>> {
        self.check_writable()?;
        let mut files = self.files.lock();
        let entry = files.entry(path.to_path_buf()).or_default();
        if !append {
            entry.clear();
        }
        Ok(Box::new(MemoryWriter {
            files: self.files.clone(),
            path: path.to_path_buf(),
        }))
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// One canned answer for a URL.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Serve the body, honouring `Range` with a `206`.
    Body(Vec<u8>),
    /// Serve the full body with `200`, ignoring `Range`.
    IgnoreRange(Vec<u8>),
    /// Send `n` bytes of the body, then drop the connection.
    CutAfter(Vec<u8>, usize),
    /// Open the stream but never deliver a byte; a buffered request never
    /// answers.
    Stall,
    /// Fail before any byte with a retryable error.
    NetworkDown,
    /// Fail with a non-retryable HTTP status.
    Status(u16),
}

#[derive(Default)]
pub struct ScriptedHttpClient {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies for `url`. The last one repeats once the queue drains.
    pub fn script(&self, url: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .insert(url.to_string(), replies.into_iter().collect());
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, url: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url == url)
            .collect()
    }

    fn next_reply(&self, request: &HttpRequest) -> Option<Reply> {
        self.requests.lock().push(request.clone());
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(&request.url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

fn range_start(request: &HttpRequest) -> u64 {
    request
        .headers
        .get("Range")
        .and_then(|value| value.strip_prefix("bytes="))
        .and_then(|value| value.strip_suffix('-'))
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

struct StalledReader;

impl AsyncRead for StalledReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )))
    }
}

fn stream(status: u16, content_length: u64, reader: impl AsyncRead + Send + Unpin + 'static) -> DownloadStream {
    DownloadStream {
        status,
        content_length: Some(content_length),
        reader: Box::new(reader),
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        match self.next_reply(&request) {
            Some(Reply::Body(body)) | Some(Reply::IgnoreRange(body)) => Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from(body),
            }),
            Some(Reply::Status(status)) => Ok(HttpResponse {
                status,
                headers: HashMap::new(),
                body: Bytes::new(),
            }),
            Some(Reply::Stall) => std::future::pending().await,
            _ => Err(BridgeError::Network(format!("no route to {}", request.url))),
        }
    }

    async fn download_stream(&self, request: HttpRequest) -> BridgeResult<DownloadStream> {
        let offset = range_start(&request);
        match self.next_reply(&request) {
            Some(Reply::Body(body)) => {
                let offset = (offset as usize).min(body.len());
                let status = if offset > 0 { 206 } else { 200 };
                let rest = body[offset..].to_vec();
                Ok(stream(status, rest.len() as u64, io::Cursor::new(rest)))
            }
            Some(Reply::IgnoreRange(body)) => {
                Ok(stream(200, body.len() as u64, io::Cursor::new(body)))
            }
            Some(Reply::CutAfter(body, cut)) => {
                let offset = (offset as usize).min(body.len());
                let status = if offset > 0 { 206 } else { 200 };
                let total = (body.len() - offset) as u64;
                let end = (offset + cut).min(body.len());
                let head = io::Cursor::new(body[offset..end].to_vec());
                Ok(stream(status, total, head.chain(BrokenReader)))
            }
            Some(Reply::Stall) => Ok(stream(200, 1024, StalledReader)),
            Some(Reply::Status(status)) => Err(BridgeError::OperationFailed(format!(
                "HTTP {} for {}",
                status, request.url
            ))),
            Some(Reply::NetworkDown) | None => {
                Err(BridgeError::Network(format!("connection refused: {}", request.url)))
            }
        }
    }
}

// ============================================================================
// Settings Store
// ============================================================================

#[derive(Default)]
pub struct MemorySettingsStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    fail_key: Arc<Mutex<Option<String>>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    pub fn json(&self, key: &str) -> Option<serde_json::Value> {
        self.value(key)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Make transactional writes of `key` fail.
    pub fn fail_writes_to(&self, key: &str) {
        *self.fail_key.lock() = Some(key.to_string());
    }
}

struct MemoryTransaction {
    values: Arc<Mutex<HashMap<String, String>>>,
    fail_key: Option<String>,
    pending: Vec<(String, String)>,
}

#[async_trait]
impl SettingsTransaction for MemoryTransaction {
    async fn set_string(&mut self, key: &str, value: &str) -> BridgeResult<()> {
        if self.fail_key.as_deref() == Some(key) {
            return Err(BridgeError::Storage(format!("cannot write {}", key)));
        }
        self.pending.push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> BridgeResult<()> {
        let mut values = self.values.lock();
        for (key, value) in self.pending {
            values.insert(key, value);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> BridgeResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.insert(key, value);
        Ok(())
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.value(key))
    }

    async fn begin_transaction(&self) -> BridgeResult<Box<dyn SettingsTransaction + Send>> {
        Ok(Box::new(MemoryTransaction {
            values: self.values.clone(),
            fail_key: self.fail_key.lock().clone(),
            pending: Vec::new(),
        }))
    }
}
