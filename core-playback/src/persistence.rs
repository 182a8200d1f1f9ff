//! # Persistence Bridge
//!
//! Saves and restores the durable slices of engine state: equalizer, play
//! order policy with the last selected track, completed downloads and the
//! listening-time total.
//!
//! Every field is read independently. A missing, corrupt or mistyped field
//! falls back to its default with a warning, so a damaged settings row never
//! stops the engine from starting.

use crate::download::DownloadRecord;
use crate::equalizer::{clamp_gain, BandTable, EqPreset, EqualizerConfig, BAND_COUNT};
use crate::error::Result;
use crate::listening::ListeningTimeCounter;
use crate::models::{CrossfadeSettings, LoopMode, Track};
use bridge_traits::{RemoteSettingsApi, SettingsStore};
use core_runtime::events::{CoreEvent, EventBus, SettingsEvent};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub const EQUALIZER_KEY: &str = "engine.equalizer";
pub const PLAYBACK_KEY: &str = "engine.playback";
pub const DOWNLOADS_KEY: &str = "engine.downloads";
pub const LISTENING_KEY: &str = "engine.listening";

/// Play-order policy and the last selection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackPrefs {
    pub shuffle: bool,
    pub loop_mode: LoopMode,
    pub crossfade: CrossfadeSettings,
    pub last_track: Option<Track>,
    pub last_position_secs: u64,
}

impl PlaybackPrefs {
    pub fn last_position(&self) -> Duration {
        Duration::from_secs(self.last_position_secs)
    }
}

/// Everything the engine persists across restarts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PersistedState {
    pub equalizer: EqualizerConfig,
    pub playback: PlaybackPrefs,
    /// Completed and failed records only.
    pub downloads: Vec<DownloadRecord>,
    pub listening_seconds: u64,
}

/// Reads and writes [`PersistedState`] through the host settings store,
/// merging with the backend's copy when one is configured.
#[derive(Clone)]
pub struct PersistenceBridge {
    store: Arc<dyn SettingsStore>,
    remote: Option<Arc<dyn RemoteSettingsApi>>,
    event_bus: Option<EventBus>,
}

impl PersistenceBridge {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            remote: None,
            event_bus: None,
        }
    }

    /// Enable merge-on-load and push-on-save against the backend.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteSettingsApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Load local state and merge the backend's settings over it.
    ///
    /// Never fails because of stored content; only a settings store that
    /// cannot be read at all is reported as an error.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<PersistedState> {
        let mut state = PersistedState {
            equalizer: parse_equalizer(&self.read_slice(EQUALIZER_KEY).await?),
            playback: parse_playback(&self.read_slice(PLAYBACK_KEY).await?),
            downloads: parse_downloads(&self.read_slice(DOWNLOADS_KEY).await?),
            listening_seconds: parse_listening(&self.read_slice(LISTENING_KEY).await?),
        };

        let mut merged_remote = false;
        if let Some(remote) = &self.remote {
            match remote.fetch().await {
                Ok(Some(document)) => {
                    merge_remote(&mut state, &document);
                    merged_remote = true;
                }
                Ok(None) => debug!("Backend has no stored settings"),
                Err(e) => {
                    warn!("Failed to fetch remote settings: {}", e);
                    self.emit(SettingsEvent::RemoteSyncFailed {
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            merged_remote,
            downloads = state.downloads.len(),
            "Loaded persisted engine state"
        );
        self.emit(SettingsEvent::Loaded { merged_remote });
        Ok(state)
    }

    /// Write every slice in one transaction, then push the remote-visible
    /// fields to the backend.
    #[instrument(skip(self, state))]
    pub async fn save(&self, state: &PersistedState) -> Result<()> {
        let slices = [
            (EQUALIZER_KEY, equalizer_document(&state.equalizer)),
            (PLAYBACK_KEY, playback_document(&state.playback)),
            (DOWNLOADS_KEY, serde_json::to_value(&state.downloads)?),
            (
                LISTENING_KEY,
                json!({ "totalSeconds": state.listening_seconds }),
            ),
        ];

        let mut tx = self.store.begin_transaction().await?;
        for (key, value) in &slices {
            if let Err(e) = tx.set_string(key, &value.to_string()).await {
                warn!("Failed to write {}; rolling back: {}", key, e);
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback failed: {}", rollback);
                }
                return Err(e.into());
            }
        }
        tx.commit().await?;
        debug!("Persisted engine state");

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.push(remote_document(state)).await {
                warn!("Failed to push settings to backend: {}", e);
                self.emit(SettingsEvent::RemoteSyncFailed {
                    message: e.to_string(),
                });
            }
        }

        Ok(())
    }

    async fn read_slice(&self, key: &str) -> Result<Value> {
        let Some(raw) = self.store.get_string(key).await? else {
            return Ok(Value::Null);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("Stored {} is not valid JSON; using defaults: {}", key, e);
                Ok(Value::Null)
            }
        }
    }

    fn emit(&self, event: SettingsEvent) {
        if let Some(event_bus) = &self.event_bus {
            let _ = event_bus.emit(CoreEvent::Settings(event));
        }
    }
}

// ============================================================================
// Field Extraction
// ============================================================================

/// Read `name` from an object. Absent fields are `None`; present fields of
/// the wrong shape are `None` with a warning.
fn field<T: DeserializeOwned>(document: &Value, slice: &str, name: &str) -> Option<T> {
    let value = document.as_object()?.get(name)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Ignoring invalid {}.{}: {}", slice, name, e);
            None
        }
    }
}

fn parse_bands(document: &Value, slice: &str) -> Option<BandTable> {
    let gains: Vec<f32> = field(document, slice, "customBands")?;
    if gains.len() != BAND_COUNT {
        warn!(
            "Ignoring {}.customBands with {} bands (expected {})",
            slice,
            gains.len(),
            BAND_COUNT
        );
        return None;
    }

    let mut table = [0i8; BAND_COUNT];
    for (slot, gain) in table.iter_mut().zip(gains) {
        *slot = clamp_gain(gain);
    }
    Some(table)
}

fn parse_crossfade(document: &Value, slice: &str) -> Option<CrossfadeSettings> {
    let crossfade = document.as_object()?.get("crossfade")?;
    let defaults = CrossfadeSettings::default();
    let enabled = field(crossfade, slice, "enabled").unwrap_or(defaults.enabled);
    let duration =
        field::<u32>(crossfade, slice, "durationSecs").unwrap_or(defaults.duration_secs as u32);
    Some(CrossfadeSettings::new(enabled, duration))
}

fn parse_equalizer(document: &Value) -> EqualizerConfig {
    let mut config = EqualizerConfig::default();
    apply_equalizer(&mut config, document);
    config
}

fn apply_equalizer(config: &mut EqualizerConfig, document: &Value) {
    const SLICE: &str = "equalizer";
    if let Some(enabled) = field(document, SLICE, "enabled") {
        config.enabled = enabled;
    }
    if let Some(preset) = field::<EqPreset>(document, SLICE, "preset") {
        config.preset = preset;
    }
    if let Some(bands) = parse_bands(document, SLICE) {
        config.custom_bands = bands;
    }
}

fn parse_playback(document: &Value) -> PlaybackPrefs {
    const SLICE: &str = "playback";
    let mut prefs = PlaybackPrefs::default();
    apply_playback_policy(&mut prefs, document);
    prefs.last_track = field(document, SLICE, "lastTrack");
    prefs.last_position_secs = field(document, SLICE, "lastPositionSecs").unwrap_or(0);
    prefs
}

fn apply_playback_policy(prefs: &mut PlaybackPrefs, document: &Value) {
    const SLICE: &str = "playback";
    if let Some(shuffle) = field(document, SLICE, "shuffle") {
        prefs.shuffle = shuffle;
    }
    if let Some(loop_mode) = field(document, SLICE, "loopMode") {
        prefs.loop_mode = loop_mode;
    }
    if let Some(crossfade) = parse_crossfade(document, SLICE) {
        prefs.crossfade = crossfade;
    }
}

fn parse_downloads(document: &Value) -> Vec<DownloadRecord> {
    let Some(entries) = document.as_array() else {
        if !document.is_null() {
            warn!("Stored downloads are not a list; ignoring");
        }
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring invalid download record: {}", e);
                None
            }
        })
        .collect()
}

fn parse_listening(document: &Value) -> u64 {
    field(document, "listening", "totalSeconds").unwrap_or(0)
}

/// Backend fields win where present; listening time never regresses.
fn merge_remote(state: &mut PersistedState, document: &Value) {
    if let Some(equalizer) = document.get("equalizer") {
        apply_equalizer(&mut state.equalizer, equalizer);
    }
    if let Some(playback) = document.get("playback") {
        apply_playback_policy(&mut state.playback, playback);
    }
    if let Some(listening) = document.get("listening") {
        let mut counter = ListeningTimeCounter::new(state.listening_seconds);
        counter.reconcile(parse_listening(listening));
        state.listening_seconds = counter.total_seconds();
    }
}

// ============================================================================
// Documents
// ============================================================================

fn equalizer_document(config: &EqualizerConfig) -> Value {
    json!({
        "enabled": config.enabled,
        "preset": config.preset,
        "customBands": config.custom_bands,
    })
}

fn policy_document(prefs: &PlaybackPrefs) -> Map<String, Value> {
    let mut document = Map::new();
    document.insert("shuffle".into(), json!(prefs.shuffle));
    document.insert("loopMode".into(), json!(prefs.loop_mode));
    document.insert(
        "crossfade".into(),
        json!({
            "enabled": prefs.crossfade.enabled,
            "durationSecs": prefs.crossfade.duration_secs,
        }),
    );
    document
}

fn playback_document(prefs: &PlaybackPrefs) -> Value {
    let mut document = policy_document(prefs);
    document.insert("lastTrack".into(), json!(prefs.last_track));
    document.insert("lastPositionSecs".into(), json!(prefs.last_position_secs));
    Value::Object(document)
}

fn remote_document(state: &PersistedState) -> Value {
    json!({
        "equalizer": equalizer_document(&state.equalizer),
        "playback": Value::Object(policy_document(&state.playback)),
        "listening": { "totalSeconds": state.listening_seconds },
    })
}

// ============================================================================
// Background Writer
// ============================================================================

/// Runs saves on its own task. Only the latest submitted state is written,
/// so a burst of changes costs one save.
pub struct PersistenceWriter {
    latest: watch::Sender<Option<PersistedState>>,
    task: JoinHandle<()>,
}

impl PersistenceWriter {
    pub fn spawn(bridge: PersistenceBridge) -> Self {
        let (latest, mut rx) = watch::channel(None::<PersistedState>);

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(state) = rx.borrow_and_update().clone() else {
                    continue;
                };
                match bridge.save(&state).await {
                    Ok(()) => bridge.emit(SettingsEvent::Saved),
                    Err(e) => {
                        warn!("Failed to persist engine state: {}", e);
                        bridge.emit(SettingsEvent::SaveFailed {
                            message: e.to_string(),
                        });
                    }
                }
            }
            debug!("Persistence writer stopped");
        });

        Self { latest, task }
    }

    /// Queue `state` for writing without waiting for it.
    pub fn submit(&self, state: PersistedState) {
        self.latest.send_replace(Some(state));
    }

    /// Write any pending state and stop the writer.
    pub async fn finish(self) {
        drop(self.latest);
        if let Err(e) = self.task.await {
            warn!("Persistence writer panicked: {}", e);
        }
    }
}
