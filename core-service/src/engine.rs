//! Engine bootstrap and lifecycle.
//!
//! [`Engine::start`] restores the persisted state, brings up the download
//! manager and the playback controller, and keeps the settings store in step
//! with both for as long as the engine runs.

use crate::error::{CoreError, Result};
use core_playback::download::{DownloadConfig, DownloadManager, DownloadRecord};
use core_playback::{
    ControllerDeps, InitialState, OfflineSource, PersistedState, PersistenceBridge,
    PersistenceWriter, PlaybackConfig, PlaybackController, PlaybackHandle, PlaybackPrefs,
    PlayerSnapshot, TrackId,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Running playback and offline engine.
///
/// # Example
///
/// ```rust,ignore
/// let config = CoreConfig::builder()
///     .data_dir("/path/to/data")
///     .audio_session(session)
///     .build()
///     .await?;
///
/// let engine = Engine::start(config, PlaybackConfig::default(), DownloadConfig::default()).await?;
/// engine.playback().set_queue(tracks, Some(0)).await?;
/// println!("{}", engine.presence_text());
/// engine.shutdown().await?;
/// ```
pub struct Engine {
    playback: PlaybackHandle,
    downloads: Option<DownloadManager>,
    event_bus: EventBus,
    controller_task: JoinHandle<()>,
    sync_stop: CancellationToken,
    sync_task: JoinHandle<PersistenceWriter>,
    state: StateSource,
}

impl Engine {
    /// Restore persisted state and start every engine task.
    #[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
    pub async fn start(
        config: CoreConfig,
        mut playback_config: PlaybackConfig,
        download_config: DownloadConfig,
    ) -> Result<Self> {
        config.validate()?;
        playback_config.validate()?;
        playback_config.track_listening &= config.features.enable_listening_stats;

        let event_bus = EventBus::new(playback_config.event_buffer);

        let mut bridge = PersistenceBridge::new(Arc::clone(&config.settings_store))
            .with_event_bus(event_bus.clone());
        if config.features.enable_remote_settings_sync {
            if let Some(remote) = &config.remote_settings {
                bridge = bridge.with_remote(Arc::clone(remote));
            }
        }
        let persisted = bridge.load().await?;

        let mut corrected = 0;
        let downloads = if config.features.enable_offline_downloads {
            let http_client = config.http_client.clone().ok_or_else(|| {
                CoreError::CapabilityMissing {
                    capability: "HttpClient".to_string(),
                    message: "Offline downloads need an HTTP client.".to_string(),
                }
            })?;
            let manager = DownloadManager::new(
                download_config,
                Arc::clone(&config.file_system),
                http_client,
                Arc::clone(&config.clock),
            )
            .with_event_bus(event_bus.clone());
            manager.initialize().await?;
            corrected = manager.load_persisted(persisted.downloads.clone()).await?;
            Some(manager)
        } else {
            None
        };

        let state = StateSource {
            downloads: downloads.clone(),
            // kept verbatim so a run without downloads does not erase them
            retained_downloads: if downloads.is_some() {
                Vec::new()
            } else {
                persisted.downloads.clone()
            },
        };

        let deps = ControllerDeps {
            session: Arc::clone(&config.audio_session),
            offline: downloads
                .clone()
                .map(|manager| Arc::new(manager) as Arc<dyn OfflineSource>),
            notification: config.media_notification.clone(),
            event_bus: event_bus.clone(),
        };
        let (playback, controller_task) =
            PlaybackController::spawn(playback_config, deps, initial_state(&persisted));
        config
            .audio_session
            .set_listener(Arc::new(playback.session_listener()));

        let writer = PersistenceWriter::spawn(bridge);
        if corrected > 0 {
            writer.submit(state.capture(&playback.snapshot()));
        }

        let sync_stop = CancellationToken::new();
        let sync_task = tokio::spawn(run_sync(
            state.clone(),
            playback.subscribe(),
            event_bus.subscribe(),
            writer,
            sync_stop.clone(),
        ));

        info!(
            offline_downloads = downloads.is_some(),
            restored_track = persisted.playback.last_track.is_some(),
            listening_seconds = persisted.listening_seconds,
            "Engine started"
        );

        Ok(Self {
            playback,
            downloads,
            event_bus,
            controller_task,
            sync_stop,
            sync_task,
            state,
        })
    }

    /// Transport, queue and equalizer commands.
    pub fn playback(&self) -> &PlaybackHandle {
        &self.playback
    }

    /// Offline downloads, when enabled in the feature flags.
    pub fn downloads(&self) -> Option<&DownloadManager> {
        self.downloads.as_ref()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.playback.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.playback.subscribe()
    }

    /// Playback, download and settings events.
    pub fn events(&self) -> broadcast::Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// `Playing {title} by {artist}` while audio is active, else `Idle`.
    pub fn presence_text(&self) -> String {
        self.playback.snapshot().presence_text()
    }

    /// Stop playback and downloads, then write the final state.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down engine");

        if let Some(downloads) = &self.downloads {
            for progress in downloads.active_downloads() {
                let track_id = TrackId::new(progress.track_id);
                if let Err(e) = downloads.cancel(&track_id).await {
                    warn!(%track_id, error = %e, "Failed to cancel download");
                }
            }
        }

        if let Err(e) = self.playback.shutdown().await {
            debug!(error = %e, "Controller already stopped");
        }
        if let Err(e) = self.controller_task.await {
            warn!("Playback controller panicked: {}", e);
        }

        self.sync_stop.cancel();
        let writer = self
            .sync_task
            .await
            .map_err(|e| CoreError::Internal(format!("persistence sync task failed: {e}")))?;
        writer.submit(self.state.capture(&self.playback.snapshot()));
        writer.finish().await;

        info!("Engine stopped");
        Ok(())
    }
}

fn initial_state(persisted: &PersistedState) -> InitialState {
    InitialState {
        equalizer: persisted.equalizer.clone(),
        shuffle: persisted.playback.shuffle,
        loop_mode: persisted.playback.loop_mode,
        crossfade: persisted.playback.crossfade,
        listening_seconds: persisted.listening_seconds,
        last_track: persisted.playback.last_track.clone(),
        last_position: persisted.playback.last_position(),
    }
}

/// Assembles the persisted state from the live components.
#[derive(Clone)]
struct StateSource {
    downloads: Option<DownloadManager>,
    retained_downloads: Vec<DownloadRecord>,
}

impl StateSource {
    fn capture(&self, snapshot: &PlayerSnapshot) -> PersistedState {
        let downloads = match &self.downloads {
            Some(manager) => manager.persisted_records(),
            None => self.retained_downloads.clone(),
        };

        PersistedState {
            equalizer: snapshot.equalizer.clone(),
            playback: PlaybackPrefs {
                shuffle: snapshot.shuffle,
                loop_mode: snapshot.loop_mode,
                crossfade: snapshot.crossfade,
                last_track: snapshot.current_track.clone(),
                last_position_secs: snapshot.position.as_secs(),
            },
            downloads,
            listening_seconds: snapshot.listening_seconds,
        }
    }
}

/// Submits a save whenever a persisted field changes. Hands the writer back
/// on stop so the caller can flush the final state.
async fn run_sync(
    state: StateSource,
    mut snapshots: watch::Receiver<PlayerSnapshot>,
    mut events: broadcast::Receiver<CoreEvent>,
    writer: PersistenceWriter,
    stop: CancellationToken,
) -> PersistenceWriter {
    let mut revision = snapshots.borrow_and_update().revision;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.revision != revision {
                    revision = snapshot.revision;
                    writer.submit(state.capture(&snapshot));
                }
            }
            event = events.recv() => match event {
                Ok(CoreEvent::Download(event)) if event.is_terminal() => {
                    debug!(track_id = event.track_id(), "Download records changed");
                    writer.submit(state.capture(&snapshots.borrow()));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Persistence sync lagged behind the event bus");
                    writer.submit(state.capture(&snapshots.borrow()));
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    writer
}
