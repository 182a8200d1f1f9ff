//! The controller task: sole owner of queue, playback state and policy.

use super::command::{Command, Request};
use super::snapshot::{CrossfadePhase, PlayerSnapshot};
use super::OfflineSource;
use crate::config::PlaybackConfig;
use crate::equalizer::EqualizerConfig;
use crate::error::{PlaybackError, Result};
use crate::listening::ListeningTimeCounter;
use crate::models::{CrossfadeSettings, ErrorReason, PlaybackState, Track};
use crate::queue::{Queue, Step, StepCause};
use bridge_traits::{
    AudioSession, AudioSource, BridgeError, InterruptionKind, NowPlayingInfo, PlaybackMetadata,
    PlaybackOptions, PlaybackRequest, RemoteCommand, SessionEvent, SessionId,
};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The track instance currently loaded in the audio session.
struct ActiveTrack {
    session: SessionId,
    track: Track,
    /// First frame seen.
    started: bool,
    /// End-of-track already handled.
    ended: bool,
    crossfade_attempted: bool,
    load_timeout: CancellationToken,
}

/// Incoming side of a crossfade. The queue pointer only moves once the mix
/// completes.
struct Crossfade {
    incoming: SessionId,
    /// Insertion index the queue moves to on completion.
    target: usize,
    track: Track,
    mixing: bool,
    ticker: CancellationToken,
}

pub(crate) struct PlayerActor {
    config: PlaybackConfig,
    session: Arc<dyn AudioSession>,
    offline: Option<Arc<dyn OfflineSource>>,
    event_bus: EventBus,
    commands: mpsc::WeakUnboundedSender<Command>,
    snapshot_tx: watch::Sender<PlayerSnapshot>,
    now_playing_tx: watch::Sender<Option<NowPlayingInfo>>,

    queue: Queue,
    equalizer: EqualizerConfig,
    listening: ListeningTimeCounter,
    state: PlaybackState,
    active: Option<ActiveTrack>,
    crossfade: Option<Crossfade>,
    position: Duration,
    duration: Option<Duration>,
    pause_after_load: bool,
    listened_since_checkpoint: Duration,
    revision: u64,
}

fn session_error(error: BridgeError) -> PlaybackError {
    match error {
        BridgeError::Network(msg) => PlaybackError::Network(msg),
        other => PlaybackError::Session(other.to_string()),
    }
}

impl PlayerActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: PlaybackConfig,
        session: Arc<dyn AudioSession>,
        offline: Option<Arc<dyn OfflineSource>>,
        event_bus: EventBus,
        commands: mpsc::WeakUnboundedSender<Command>,
        snapshot_tx: watch::Sender<PlayerSnapshot>,
        now_playing_tx: watch::Sender<Option<NowPlayingInfo>>,
        queue: Queue,
        equalizer: EqualizerConfig,
        listening: ListeningTimeCounter,
        position: Duration,
    ) -> Self {
        let mut actor = Self {
            config,
            session,
            offline,
            event_bus,
            commands,
            snapshot_tx,
            now_playing_tx,
            queue,
            equalizer,
            listening,
            state: PlaybackState::Idle,
            active: None,
            crossfade: None,
            position,
            duration: None,
            pause_after_load: false,
            listened_since_checkpoint: Duration::ZERO,
            revision: 0,
        };
        actor.duration = actor.queue.current().and_then(Track::duration);
        actor.publish();
        actor
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.push_equalizer().await;
        info!(
            queued = self.queue.len(),
            restored = self.queue.current().is_some(),
            "Playback controller started"
        );

        while let Some(command) = commands.recv().await {
            match command {
                Command::Request(request, reply) => {
                    let result = self.handle_request(request).await;
                    // callers observe the new snapshot as soon as they resume
                    self.publish();
                    let _ = reply.send(result);
                }
                Command::Session(event) => self.handle_session_event(event).await,
                Command::LoadTimeout(session) => self.on_load_timeout(session).await,
                Command::CrossfadeTick { session, step } => {
                    self.on_crossfade_tick(session, step).await
                }
                Command::Shutdown(reply) => {
                    self.cancel_crossfade().await;
                    self.release_active().await;
                    self.set_state(PlaybackState::Idle);
                    self.publish();
                    let _ = reply.send(());
                    break;
                }
            }
            self.publish();
        }

        info!("Playback controller stopped");
    }

    // ========================================================================
    // Requests
    // ========================================================================

    async fn handle_request(&mut self, request: Request) -> Result<()> {
        match request {
            Request::SetQueue { tracks, start } => self.set_queue(tracks, start).await,
            Request::Enqueue(track) => {
                self.cancel_crossfade().await;
                self.queue.push(track);
                self.emit_queue_changed();
                Ok(())
            }
            Request::Remove(track_id) => {
                let removed = self.queue.remove(&track_id)?;
                if removed > 0 {
                    self.cancel_crossfade().await;
                    self.emit_queue_changed();
                }
                Ok(())
            }
            Request::ClearQueue => {
                self.stop().await;
                self.queue.clear();
                self.emit(PlaybackEvent::TrackChanged { track_id: None });
                self.emit_queue_changed();
                self.mark_dirty();
                Ok(())
            }
            Request::Play(track) => self.play(track).await,
            Request::Resume => self.resume().await,
            Request::Pause => self.pause().await,
            Request::Stop => {
                self.stop().await;
                Ok(())
            }
            Request::Next => self.next().await,
            Request::Previous => self.previous().await,
            Request::Seek(position) => self.seek(position).await,
            Request::SetShuffle(enabled) => {
                if self.queue.shuffle() != enabled {
                    self.cancel_crossfade().await;
                    self.queue.set_shuffle(enabled);
                    self.emit_queue_changed();
                    self.mark_dirty();
                }
                Ok(())
            }
            Request::SetLoop(mode) => {
                if self.queue.loop_mode() != mode {
                    self.cancel_crossfade().await;
                    self.queue.set_loop_mode(mode);
                    self.emit_queue_changed();
                    self.mark_dirty();
                }
                Ok(())
            }
            Request::SetCrossfade {
                enabled,
                duration_secs,
            } => {
                if !enabled {
                    self.cancel_crossfade().await;
                }
                self.queue
                    .set_crossfade(CrossfadeSettings::new(enabled, duration_secs));
                self.mark_dirty();
                Ok(())
            }
            Request::SetEqEnabled(enabled) => {
                self.equalizer.set_enabled(enabled);
                self.equalizer_changed().await;
                Ok(())
            }
            Request::SetEqPreset(preset) => {
                self.equalizer.set_preset(preset);
                self.equalizer_changed().await;
                Ok(())
            }
            Request::SetBandValue { band, db } => {
                self.equalizer.set_band_value(band, db)?;
                self.equalizer_changed().await;
                Ok(())
            }
            Request::ResetCustomBands => {
                self.equalizer.reset_custom_bands();
                self.equalizer_changed().await;
                Ok(())
            }
            Request::SetLiked { track_id, liked } => {
                self.queue.set_liked(&track_id, liked);
                if let Some(active) = self.active.as_mut().filter(|a| a.track.id == track_id) {
                    active.track.liked = liked;
                }
                Ok(())
            }
        }
    }

    async fn set_queue(&mut self, tracks: Vec<Track>, start: Option<usize>) -> Result<()> {
        if let Some(index) = start {
            if index >= tracks.len() {
                return Err(PlaybackError::InvalidArgument(format!(
                    "start index {} out of range for {} tracks",
                    index,
                    tracks.len()
                )));
            }
        }

        self.stop().await;
        self.queue.set_tracks(tracks, start)?;
        self.emit_queue_changed();
        self.mark_dirty();

        match start {
            Some(_) => self.load_current(Duration::ZERO).await,
            None => {
                self.emit(PlaybackEvent::TrackChanged { track_id: None });
                Ok(())
            }
        }
    }

    async fn play(&mut self, track: Track) -> Result<()> {
        if self.current_track_id().as_deref() == Some(track.id.as_str()) {
            return match self.state {
                PlaybackState::Paused => self.resume().await,
                PlaybackState::Loading => {
                    self.pause_after_load = false;
                    Ok(())
                }
                PlaybackState::Playing | PlaybackState::Buffering => Ok(()),
                PlaybackState::Idle | PlaybackState::Error(_) => {
                    let start = self.position;
                    self.load_current(start).await
                }
            };
        }

        let index = match self.queue.position_of(&track.id) {
            Some(index) => index,
            None => {
                let index = self.queue.push(track);
                self.emit_queue_changed();
                index
            }
        };
        self.queue.jump_to(index)?;
        self.load_current(Duration::ZERO).await
    }

    async fn resume(&mut self) -> Result<()> {
        if self.queue.current().is_none() {
            return Err(PlaybackError::InvalidState(
                "no current track to resume".to_string(),
            ));
        }

        match self.state {
            PlaybackState::Paused => {
                let Some(session) = self.active.as_ref().map(|a| a.session) else {
                    let start = self.position;
                    return self.load_current(start).await;
                };
                self.session.play(session).await.map_err(session_error)?;
                self.set_state(PlaybackState::Playing);
                self.emit_with_position(|track_id, position_ms| PlaybackEvent::Resumed {
                    track_id,
                    position_ms,
                });
                Ok(())
            }
            PlaybackState::Loading => {
                self.pause_after_load = false;
                Ok(())
            }
            PlaybackState::Playing | PlaybackState::Buffering => Ok(()),
            PlaybackState::Idle | PlaybackState::Error(_) => {
                let start = self.position;
                self.load_current(start).await
            }
        }
    }

    async fn pause(&mut self) -> Result<()> {
        if self.queue.current().is_none() {
            return Err(PlaybackError::InvalidState(
                "no current track to pause".to_string(),
            ));
        }

        match self.state {
            PlaybackState::Playing | PlaybackState::Buffering => {
                self.cancel_crossfade().await;
                if let Some(session) = self.active.as_ref().map(|a| a.session) {
                    self.session.pause(session).await.map_err(session_error)?;
                }
                self.set_state(PlaybackState::Paused);
                self.emit_with_position(|track_id, position_ms| PlaybackEvent::Paused {
                    track_id,
                    position_ms,
                });
                self.mark_dirty();
                Ok(())
            }
            PlaybackState::Loading => {
                debug!("Pause requested while loading; will hold on first frame");
                self.pause_after_load = true;
                Ok(())
            }
            PlaybackState::Paused | PlaybackState::Idle | PlaybackState::Error(_) => Ok(()),
        }
    }

    /// Stop audio and release the session. The current track stays selected.
    async fn stop(&mut self) {
        self.cancel_crossfade().await;
        let had_session = self.active.is_some();
        self.release_active().await;
        self.pause_after_load = false;
        self.position = Duration::ZERO;

        if had_session || self.state != PlaybackState::Idle {
            self.set_state(PlaybackState::Idle);
            self.emit(PlaybackEvent::Stopped {
                track_id: self.current_track_id(),
            });
            self.mark_dirty();
        }
    }

    async fn next(&mut self) -> Result<()> {
        if self.queue.current().is_none() {
            return Err(PlaybackError::InvalidState("no current track".to_string()));
        }

        if self.crossfade.as_ref().is_some_and(|cf| cf.mixing) {
            debug!("Next during crossfade; completing the mix");
            return self.complete_crossfade().await;
        }
        self.cancel_crossfade().await;

        let step = self.queue.step_forward(StepCause::User);
        self.apply_step(step).await
    }

    async fn previous(&mut self) -> Result<()> {
        if self.queue.current().is_none() {
            return Err(PlaybackError::InvalidState("no current track".to_string()));
        }

        self.cancel_crossfade().await;
        let step = self.queue.step_back();
        self.apply_step(step).await
    }

    async fn apply_step(&mut self, step: Step) -> Result<()> {
        match step {
            Step::Move(index) => {
                self.queue.select(index)?;
                self.load_current(Duration::ZERO).await
            }
            Step::Replay => self.load_current(Duration::ZERO).await,
            Step::Stay => Ok(()),
            Step::Exhausted => {
                info!("Reached the end of the queue");
                self.stop().await;
                self.queue.clear_current();
                self.duration = None;
                self.emit(PlaybackEvent::TrackChanged { track_id: None });
                self.emit_queue_changed();
                self.mark_dirty();
                Ok(())
            }
        }
    }

    async fn seek(&mut self, position: Duration) -> Result<()> {
        let Some(track) = self.queue.current() else {
            return Err(PlaybackError::InvalidState(
                "no current track to seek".to_string(),
            ));
        };

        let limit = self.duration.or_else(|| track.duration());
        let target = limit.map_or(position, |max| position.min(max));

        self.cancel_crossfade().await;
        if let Some(session) = self.active.as_ref().map(|a| a.session) {
            self.session
                .seek(session, target)
                .await
                .map_err(session_error)?;
        }
        self.position = target;
        self.emit_position();
        Ok(())
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load the current queue entry into a fresh session.
    async fn load_current(&mut self, start: Duration) -> Result<()> {
        self.cancel_crossfade().await;
        self.release_active().await;
        self.pause_after_load = false;

        let Some(track) = self.queue.current().cloned() else {
            return Err(PlaybackError::InvalidState("no current track".to_string()));
        };

        // error only leaves through idle
        if self.state.is_error() {
            self.set_state(PlaybackState::Idle);
        }

        self.position = start;
        self.duration = track.duration();
        self.mark_dirty();
        self.emit(PlaybackEvent::TrackChanged {
            track_id: Some(track.id.to_string()),
        });
        self.set_state(PlaybackState::Loading);

        match self.start_session(&track, start, 1.0).await {
            Ok(session) => {
                debug!(track_id = %track.id, %session, "Track loading");
                let load_timeout = self.spawn_load_timeout(session);
                self.active = Some(ActiveTrack {
                    session,
                    track,
                    started: false,
                    ended: false,
                    crossfade_attempted: false,
                    load_timeout,
                });
                Ok(())
            }
            Err(e) => {
                warn!(track_id = %track.id, error = %e, "Failed to load track");
                self.enter_error(&e);
                Err(e)
            }
        }
    }

    async fn start_session(&self, track: &Track, start: Duration, volume: f32) -> Result<SessionId> {
        let source = self.resolve_source(track)?;
        let request = PlaybackRequest::new(source)
            .with_options(PlaybackOptions {
                start_position: start,
                initial_volume: volume,
            })
            .with_metadata(PlaybackMetadata {
                track_id: Some(track.id.to_string()),
                title: Some(track.title.clone()),
                artist: Some(track.artist.clone()),
                artwork_url: track.cover_url.clone(),
            });

        self.session.load(request).await.map_err(session_error)
    }

    /// Offline copy first, then the remote URI.
    fn resolve_source(&self, track: &Track) -> Result<AudioSource> {
        if let Some(path) = self
            .offline
            .as_ref()
            .and_then(|offline| offline.local_path(&track.id))
        {
            debug!(track_id = %track.id, "Playing offline copy");
            return Ok(AudioSource::LocalFile { path });
        }

        if !track.audio_url.is_empty() {
            return Ok(AudioSource::RemoteStream {
                url: track.audio_url.clone(),
                headers: HashMap::new(),
            });
        }

        Err(PlaybackError::SourceResolution(track.id.to_string()))
    }

    fn spawn_load_timeout(&self, session: SessionId) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let commands = self.commands.clone();
        let timeout = self.config.load_timeout;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(commands) = commands.upgrade() {
                        let _ = commands.send(Command::LoadTimeout(session));
                    }
                }
            }
        });

        token
    }

    /// Stop and unload the active session, if any.
    async fn release_active(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.load_timeout.cancel();
        self.release_session(active.session).await;
    }

    async fn release_session(&self, session: SessionId) {
        if let Err(e) = self.session.stop(session).await {
            debug!(%session, error = %e, "Failed to stop session");
        }
        if let Err(e) = self.session.unload(session).await {
            warn!(%session, error = %e, "Failed to unload session");
        }
    }

    // ========================================================================
    // Session Callbacks
    // ========================================================================

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::FirstFrame { session, duration } => {
                self.on_first_frame(session, duration).await
            }
            SessionEvent::Position { session, position } => {
                self.on_position(session, position).await
            }
            SessionEvent::Stalled { session } => {
                if self.is_active_session(session) && self.state == PlaybackState::Playing {
                    self.set_state(PlaybackState::Buffering);
                }
            }
            SessionEvent::Recovered { session } => {
                if self.is_active_session(session) && self.state == PlaybackState::Buffering {
                    self.set_state(PlaybackState::Playing);
                }
            }
            SessionEvent::Ended { session } => self.on_track_ended(session).await,
            SessionEvent::Failed { session, message } => {
                self.on_session_failed(session, message).await
            }
            SessionEvent::Interruption(kind) => self.on_interruption(kind).await,
            SessionEvent::Remote(command) => self.on_remote_command(command).await,
        }
    }

    fn is_active_session(&self, session: SessionId) -> bool {
        self.active.as_ref().is_some_and(|a| a.session == session)
    }

    async fn on_first_frame(&mut self, session: SessionId, duration: Option<Duration>) {
        if self
            .crossfade
            .as_ref()
            .is_some_and(|cf| cf.incoming == session && !cf.mixing)
        {
            self.begin_mixing();
            return;
        }

        let Some(active) = self.active.as_mut().filter(|a| a.session == session) else {
            debug!(%session, "Ignoring first frame of a stale session");
            return;
        };
        if active.started {
            return;
        }
        active.started = true;
        active.load_timeout.cancel();
        let track = active.track.clone();

        if let Some(duration) = duration {
            self.duration = Some(duration);
        }

        if self.pause_after_load {
            self.pause_after_load = false;
            if let Err(e) = self.session.pause(session).await {
                warn!(error = %e, "Failed to hold freshly loaded track");
            }
            self.set_state(PlaybackState::Paused);
            self.emit_with_position(|track_id, position_ms| PlaybackEvent::Paused {
                track_id,
                position_ms,
            });
        } else {
            self.set_state(PlaybackState::Playing);
            self.emit(PlaybackEvent::Started {
                track_id: track.id.to_string(),
                title: track.title,
            });
        }
    }

    async fn on_position(&mut self, session: SessionId, position: Duration) {
        if !self.is_active_session(session) {
            return;
        }

        if self.state == PlaybackState::Playing {
            if let Some(delta) = position.checked_sub(self.position) {
                if !delta.is_zero() && delta <= self.config.max_position_gap {
                    if self.config.track_listening {
                        self.listening.add(delta);
                    }
                    self.listened_since_checkpoint += delta;
                    if self.listened_since_checkpoint >= self.config.position_persist_interval {
                        self.listened_since_checkpoint = Duration::ZERO;
                        self.mark_dirty();
                    }
                }
            }
        }

        self.position = position;
        self.emit_position();
        self.maybe_start_crossfade().await;
    }

    async fn on_track_ended(&mut self, session: SessionId) {
        if self.crossfade.as_ref().is_some_and(|cf| cf.incoming == session) {
            warn!(%session, "Crossfade target ended before the mix finished");
            self.cancel_crossfade().await;
            return;
        }

        let Some(active) = self.active.as_mut().filter(|a| a.session == session) else {
            debug!(%session, "Ignoring end of track for a session that is not current");
            return;
        };
        if active.ended {
            debug!(%session, "Ignoring repeated end of track");
            return;
        }
        active.ended = true;
        let track_id = active.track.id.to_string();
        self.emit(PlaybackEvent::Completed { track_id });

        if self.crossfade.as_ref().is_some_and(|cf| cf.mixing) {
            if let Err(e) = self.complete_crossfade().await {
                warn!(error = %e, "Failed to complete crossfade");
            }
            return;
        }
        self.cancel_crossfade().await;

        let step = self.queue.step_forward(StepCause::TrackEnded);
        if let Err(e) = self.apply_step(step).await {
            warn!(error = %e, "Failed to advance after end of track");
        }
    }

    async fn on_session_failed(&mut self, session: SessionId, message: String) {
        if self.crossfade.as_ref().is_some_and(|cf| cf.incoming == session) {
            warn!(%session, %message, "Crossfade target failed; continuing without it");
            self.cancel_crossfade().await;
            return;
        }
        if !self.is_active_session(session) {
            return;
        }

        warn!(%session, %message, "Audio session failed");
        self.cancel_crossfade().await;
        self.release_active().await;
        self.pause_after_load = false;
        self.enter_error(&PlaybackError::Session(message));
    }

    async fn on_load_timeout(&mut self, session: SessionId) {
        let timed_out = self
            .active
            .as_ref()
            .is_some_and(|a| a.session == session && !a.started);
        if !timed_out {
            return;
        }

        let track_id = self.current_track_id().unwrap_or_default();
        warn!(%track_id, timeout = ?self.config.load_timeout, "Track load timed out");
        self.release_active().await;
        self.pause_after_load = false;
        self.enter_error(&PlaybackError::Timeout(format!(
            "no audio from {} within {:?}",
            track_id, self.config.load_timeout
        )));
    }

    async fn on_interruption(&mut self, kind: InterruptionKind) {
        let label = match kind {
            InterruptionKind::Temporary => "temporary",
            InterruptionKind::Permanent => "permanent",
        };
        info!(kind = label, "Audio interruption");
        self.emit(PlaybackEvent::Interrupted {
            kind: label.to_string(),
        });

        match kind {
            InterruptionKind::Temporary => {
                if self.queue.current().is_some() {
                    if let Err(e) = self.pause().await {
                        warn!(error = %e, "Failed to pause for interruption");
                    }
                }
            }
            InterruptionKind::Permanent => self.stop().await,
        }
    }

    async fn on_remote_command(&mut self, command: RemoteCommand) {
        debug!(?command, "Remote command");
        let result = match command {
            RemoteCommand::Play => self.resume().await,
            RemoteCommand::Pause => self.pause().await,
            RemoteCommand::Stop => {
                self.stop().await;
                Ok(())
            }
            RemoteCommand::Next => self.next().await,
            RemoteCommand::Previous => self.previous().await,
            RemoteCommand::Seek(position) => self.seek(position).await,
        };

        if let Err(e) = result {
            warn!(?command, error = %e, "Remote command rejected");
        }
    }

    // ========================================================================
    // Crossfade
    // ========================================================================

    async fn maybe_start_crossfade(&mut self) {
        let settings = self.queue.crossfade();
        if !settings.enabled || self.crossfade.is_some() || self.state != PlaybackState::Playing {
            return;
        }
        let Some(duration) = self.duration else {
            return;
        };
        let remaining = duration.saturating_sub(self.position);
        if remaining.is_zero() || remaining > settings.duration() {
            return;
        }
        match self.active.as_mut() {
            Some(active) if !active.crossfade_attempted => active.crossfade_attempted = true,
            _ => return,
        }

        let Step::Move(target) = self.queue.step_forward(StepCause::TrackEnded) else {
            return;
        };
        let Some(track) = self.queue.get(target).cloned() else {
            return;
        };

        match self.start_session(&track, Duration::ZERO, 0.0).await {
            Ok(incoming) => {
                debug!(track_id = %track.id, %incoming, "Preloading crossfade target");
                self.crossfade = Some(Crossfade {
                    incoming,
                    target,
                    track,
                    mixing: false,
                    ticker: CancellationToken::new(),
                });
            }
            Err(e) => {
                warn!(track_id = %track.id, error = %e, "Crossfade preload failed; track will cut over");
            }
        }
    }

    fn begin_mixing(&mut self) {
        let from_track_id = self.current_track_id().unwrap_or_default();
        let steps = self.config.crossfade_steps.max(1);
        let interval = self.queue.crossfade().duration() / steps;
        let Some(crossfade) = self.crossfade.as_mut() else {
            return;
        };
        crossfade.mixing = true;

        let session = crossfade.incoming;
        let ticker = crossfade.ticker.clone();
        let to_track_id = crossfade.track.id.to_string();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            for step in 1..=steps {
                tokio::select! {
                    _ = ticker.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                let Some(commands) = commands.upgrade() else {
                    return;
                };
                if commands.send(Command::CrossfadeTick { session, step }).is_err() {
                    return;
                }
            }
        });

        self.emit(PlaybackEvent::CrossfadeStarted {
            from_track_id,
            to_track_id,
        });
    }

    async fn on_crossfade_tick(&mut self, session: SessionId, step: u32) {
        let in_progress = self
            .crossfade
            .as_ref()
            .is_some_and(|cf| cf.incoming == session && cf.mixing);
        if !in_progress {
            return;
        }

        let steps = self.config.crossfade_steps.max(1);
        if step >= steps {
            if let Err(e) = self.complete_crossfade().await {
                warn!(error = %e, "Failed to complete crossfade");
            }
            return;
        }

        let t = step as f32 / steps as f32;
        if let Some(outgoing) = self.active.as_ref().map(|a| a.session) {
            if let Err(e) = self.session.set_volume(outgoing, 1.0 - t).await {
                debug!(error = %e, "Failed to lower outgoing volume");
            }
        }
        if let Err(e) = self.session.set_volume(session, t).await {
            debug!(error = %e, "Failed to raise incoming volume");
        }
    }

    /// Switch the current pointer to the incoming track. The queue advances
    /// exactly once here.
    async fn complete_crossfade(&mut self) -> Result<()> {
        let Some(crossfade) = self.crossfade.take() else {
            return Ok(());
        };
        crossfade.ticker.cancel();
        self.release_active().await;

        if let Err(e) = self.session.set_volume(crossfade.incoming, 1.0).await {
            warn!(error = %e, "Failed to restore incoming volume");
        }

        self.queue.select(crossfade.target)?;
        self.position = Duration::ZERO;
        self.duration = crossfade.track.duration();
        let track_id = crossfade.track.id.to_string();
        let title = crossfade.track.title.clone();
        self.active = Some(ActiveTrack {
            session: crossfade.incoming,
            track: crossfade.track,
            started: true,
            ended: false,
            crossfade_attempted: false,
            load_timeout: CancellationToken::new(),
        });
        self.mark_dirty();

        self.emit(PlaybackEvent::CrossfadeCompleted {
            track_id: track_id.clone(),
        });
        self.emit(PlaybackEvent::TrackChanged {
            track_id: Some(track_id.clone()),
        });
        self.set_state(PlaybackState::Playing);
        self.emit(PlaybackEvent::Started { track_id, title });
        Ok(())
    }

    /// Drop any preloaded or mixing incoming track and restore full volume.
    async fn cancel_crossfade(&mut self) {
        let Some(crossfade) = self.crossfade.take() else {
            return;
        };
        crossfade.ticker.cancel();
        debug!(track_id = %crossfade.track.id, "Crossfade cancelled");
        self.release_session(crossfade.incoming).await;

        if crossfade.mixing {
            if let Some(outgoing) = self.active.as_ref().map(|a| a.session) {
                if let Err(e) = self.session.set_volume(outgoing, 1.0).await {
                    warn!(error = %e, "Failed to restore volume after cancelled crossfade");
                }
            }
        }
    }

    // ========================================================================
    // Equalizer
    // ========================================================================

    async fn equalizer_changed(&mut self) {
        self.mark_dirty();
        self.push_equalizer().await;
    }

    async fn push_equalizer(&self) {
        if let Err(e) = self.session.set_equalizer(self.equalizer.curve()).await {
            warn!(error = %e, "Failed to apply equalizer curve");
        }
    }

    // ========================================================================
    // State and Publication
    // ========================================================================

    fn current_track_id(&self) -> Option<String> {
        self.queue.current().map(|track| track.id.to_string())
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        debug!(from = self.state.as_str(), to = state.as_str(), "Playback state changed");
        self.state = state;
        self.emit(PlaybackEvent::StateChanged {
            track_id: self.current_track_id(),
            state: self.state.as_str().to_string(),
        });
    }

    fn enter_error(&mut self, error: &PlaybackError) {
        self.set_state(PlaybackState::Error(ErrorReason::from(error)));
        self.emit(PlaybackEvent::Error {
            track_id: self.current_track_id(),
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        });
    }

    fn mark_dirty(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.event_bus.emit(CoreEvent::Playback(event));
    }

    fn emit_with_position(&self, build: impl FnOnce(String, u64) -> PlaybackEvent) {
        if let Some(track_id) = self.current_track_id() {
            self.emit(build(track_id, self.position.as_millis() as u64));
        }
    }

    fn emit_position(&self) {
        if let Some(track_id) = self.current_track_id() {
            self.emit(PlaybackEvent::PositionChanged {
                track_id,
                position_ms: self.position.as_millis() as u64,
                duration_ms: self.duration.map(|d| d.as_millis() as u64),
            });
        }
    }

    fn emit_queue_changed(&mut self) {
        let current_index = self.queue.cursor();
        self.emit(PlaybackEvent::QueueChanged {
            length: self.queue.len(),
            current_index,
            shuffle: self.queue.shuffle(),
            loop_mode: self.queue.loop_mode().as_str().to_string(),
        });
    }

    fn crossfade_phase(&self) -> CrossfadePhase {
        match &self.crossfade {
            None => CrossfadePhase::None,
            Some(cf) if cf.mixing => CrossfadePhase::Mixing,
            Some(_) => CrossfadePhase::Preloading,
        }
    }

    fn snapshot(&mut self) -> PlayerSnapshot {
        PlayerSnapshot {
            state: self.state.clone(),
            current_track: self.queue.current().cloned(),
            position: self.position,
            duration: self.duration,
            queue: self.queue.tracks().to_vec(),
            play_order: self.queue.play_order(),
            current_index: self.queue.cursor(),
            shuffle: self.queue.shuffle(),
            loop_mode: self.queue.loop_mode(),
            crossfade: self.queue.crossfade(),
            crossfade_phase: self.crossfade_phase(),
            equalizer: self.equalizer.clone(),
            listening_seconds: self.listening.total_seconds(),
            revision: self.revision,
        }
    }

    fn now_playing(&self) -> Option<NowPlayingInfo> {
        if matches!(self.state, PlaybackState::Idle | PlaybackState::Error(_)) {
            return None;
        }
        let track = self.queue.current()?;
        Some(NowPlayingInfo {
            title: track.title.clone(),
            artist: track.artist.clone(),
            artwork_url: track.cover_url.clone(),
            is_playing: self.state.is_active(),
            position: self.position,
            duration: self.duration,
        })
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        let info = self.now_playing();
        self.now_playing_tx.send_if_modified(|current| {
            if *current == info {
                false
            } else {
                *current = info;
                true
            }
        });
    }
}
