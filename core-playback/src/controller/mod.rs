//! # Playback Session Controller
//!
//! Owns the queue, position and play-order policy, and drives the platform
//! audio session.
//!
//! ## Overview
//!
//! All state lives in one tokio task. UI calls, remote-control buttons,
//! interruptions and audio session callbacks are serialized into a single
//! command stream, so there is never more than one writer:
//!
//! - [`PlaybackHandle`] sends requests and awaits their outcome.
//! - [`BackgroundEventAdapter`](crate::background::BackgroundEventAdapter)
//!   forwards platform callbacks into the same stream.
//! - Load timeouts and crossfade ticks are timer tasks posting back into it.
//!
//! Observers read [`PlayerSnapshot`]s through a `watch` channel and typed
//! [`PlaybackEvent`](core_runtime::events::PlaybackEvent)s from the event bus.
//!
//! ## Usage
//!
//! ```ignore
//! let (handle, _task) = PlaybackController::spawn(config, deps, InitialState::default());
//! session.set_listener(Arc::new(handle.session_listener()));
//!
//! handle.set_queue(tracks, Some(0)).await?;
//! handle.next().await?;
//! println!("{}", handle.snapshot().presence_text());
//! ```

mod actor;
mod command;
mod snapshot;

pub use snapshot::{CrossfadePhase, PlayerSnapshot};

use crate::background::BackgroundEventAdapter;
use crate::config::PlaybackConfig;
use crate::equalizer::{EqPreset, EqualizerConfig};
use crate::error::{PlaybackError, Result};
use crate::listening::ListeningTimeCounter;
use crate::models::{CrossfadeSettings, LoopMode, Track, TrackId};
use crate::queue::Queue;
use actor::PlayerActor;
use bridge_traits::{AudioSession, MediaNotification, NowPlayingInfo};
pub(crate) use command::Command;
use command::Request;
use core_runtime::events::EventBus;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::warn;

/// Lookup of offline copies, consulted before falling back to streaming.
pub trait OfflineSource: Send + Sync {
    /// Local file of a completed download.
    fn local_path(&self, track_id: &TrackId) -> Option<PathBuf>;
}

/// Collaborators injected into the controller.
#[derive(Clone)]
pub struct ControllerDeps {
    pub session: Arc<dyn AudioSession>,
    pub offline: Option<Arc<dyn OfflineSource>>,
    pub notification: Option<Arc<dyn MediaNotification>>,
    pub event_bus: EventBus,
}

/// State restored from the previous run.
#[derive(Debug, Clone, Default)]
pub struct InitialState {
    pub equalizer: EqualizerConfig,
    pub shuffle: bool,
    pub loop_mode: LoopMode,
    pub crossfade: CrossfadeSettings,
    pub listening_seconds: u64,
    /// Selected but not playing; the first `resume()` loads it.
    pub last_track: Option<Track>,
    pub last_position: Duration,
}

pub struct PlaybackController;

impl PlaybackController {
    /// Spawn the controller task on the current tokio runtime.
    pub fn spawn(
        config: PlaybackConfig,
        deps: ControllerDeps,
        initial: InitialState,
    ) -> (PlaybackHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(PlayerSnapshot::default());
        let (now_playing_tx, now_playing_rx) = watch::channel(None);

        let mut queue = Queue::new();
        queue.set_shuffle(initial.shuffle);
        queue.set_loop_mode(initial.loop_mode);
        queue.set_crossfade(initial.crossfade);
        let mut position = Duration::ZERO;
        if let Some(track) = initial.last_track {
            queue.push(track);
            let _ = queue.select(0);
            position = initial.last_position;
        }

        if let Some(notification) = deps.notification {
            tokio::spawn(run_notifier(notification, now_playing_rx));
        }

        let actor = PlayerActor::new(
            config,
            deps.session,
            deps.offline,
            deps.event_bus,
            command_tx.downgrade(),
            snapshot_tx,
            now_playing_tx,
            queue,
            initial.equalizer,
            ListeningTimeCounter::new(initial.listening_seconds),
            position,
        );
        let task = tokio::spawn(actor.run(command_rx));

        let handle = PlaybackHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
        };
        (handle, task)
    }
}

/// Mirrors the now-playing info onto the OS notification. Runs off the
/// command stream so a slow platform call never delays playback commands.
async fn run_notifier(
    notification: Arc<dyn MediaNotification>,
    mut info: watch::Receiver<Option<NowPlayingInfo>>,
) {
    while info.changed().await.is_ok() {
        let latest = info.borrow_and_update().clone();
        let result = match latest {
            Some(now_playing) => notification.update(now_playing).await,
            None => notification.clear().await,
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to update now-playing notification");
        }
    }
}

/// Cloneable front door to the controller task.
#[derive(Clone)]
pub struct PlaybackHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<PlayerSnapshot>,
}

impl PlaybackHandle {
    async fn request(&self, request: Request) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Request(request, reply_tx))
            .map_err(|_| PlaybackError::EngineStopped)?;
        reply_rx.await.map_err(|_| PlaybackError::EngineStopped)?
    }

    // ------------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------------

    /// Replace the queue and start playing at `start_index` (insertion order).
    pub async fn set_queue(&self, tracks: Vec<Track>, start_index: Option<usize>) -> Result<()> {
        self.request(Request::SetQueue {
            tracks,
            start: start_index,
        })
        .await
    }

    pub async fn enqueue(&self, track: Track) -> Result<()> {
        self.request(Request::Enqueue(track)).await
    }

    /// Remove a track that is not the current one.
    pub async fn remove(&self, track_id: TrackId) -> Result<()> {
        self.request(Request::Remove(track_id)).await
    }

    pub async fn clear_queue(&self) -> Result<()> {
        self.request(Request::ClearQueue).await
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    /// Play `track`, appending it to the queue if needed. Returns once the
    /// load has been issued; the first frame arrives asynchronously.
    pub async fn play(&self, track: Track) -> Result<()> {
        self.request(Request::Play(track)).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(Request::Resume).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(Request::Pause).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(Request::Stop).await
    }

    pub async fn next(&self) -> Result<()> {
        self.request(Request::Next).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.request(Request::Previous).await
    }

    /// Seek within the current track; clamped to its duration.
    pub async fn seek(&self, position: Duration) -> Result<()> {
        self.request(Request::Seek(position)).await
    }

    // ------------------------------------------------------------------------
    // Policy
    // ------------------------------------------------------------------------

    pub async fn set_shuffle(&self, enabled: bool) -> Result<()> {
        self.request(Request::SetShuffle(enabled)).await
    }

    pub async fn set_loop(&self, mode: LoopMode) -> Result<()> {
        self.request(Request::SetLoop(mode)).await
    }

    /// Duration is clamped to 1..=12 seconds.
    pub async fn set_crossfade(&self, enabled: bool, duration_secs: u32) -> Result<()> {
        self.request(Request::SetCrossfade {
            enabled,
            duration_secs,
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Equalizer
    // ------------------------------------------------------------------------

    pub async fn set_eq_enabled(&self, enabled: bool) -> Result<()> {
        self.request(Request::SetEqEnabled(enabled)).await
    }

    pub async fn set_eq_preset(&self, preset: EqPreset) -> Result<()> {
        self.request(Request::SetEqPreset(preset)).await
    }

    pub async fn set_band_value(&self, band: usize, db: f32) -> Result<()> {
        self.request(Request::SetBandValue { band, db }).await
    }

    pub async fn reset_custom_bands(&self) -> Result<()> {
        self.request(Request::ResetCustomBands).await
    }

    pub async fn set_liked(&self, track_id: TrackId, liked: bool) -> Result<()> {
        self.request(Request::SetLiked { track_id, liked }).await
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshot.clone()
    }

    /// Listener to register with the audio session.
    pub fn session_listener(&self) -> BackgroundEventAdapter {
        BackgroundEventAdapter::new(self.commands.clone())
    }

    /// Stop playback, release the session and end the controller task.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(reply_tx))
            .map_err(|_| PlaybackError::EngineStopped)?;
        reply_rx.await.map_err(|_| PlaybackError::EngineStopped)
    }
}
