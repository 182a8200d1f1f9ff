//! Audio session bridge traits and supporting types.
//!
//! These abstractions allow the playback controller to drive the platform
//! media/audio session (AVAudioSession, ExoPlayer, a desktop mixer) while
//! keeping an async-first API surface. Hosts report everything the session
//! observes (first frame, position, stalls, end of track, interruptions and
//! remote-control buttons) through a single [`SessionListener`].

use crate::error::Result;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// High-level audio source descriptor provided to the audio session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Local file accessible to the host runtime.
    LocalFile { path: PathBuf },
    /// Remote HTTP(S) stream to be fetched by the host.
    RemoteStream {
        url: String,
        headers: HashMap<String, String>,
    },
}

impl AudioSource {
    /// Determine whether the source represents remote content.
    pub fn is_remote(&self) -> bool {
        matches!(self, AudioSource::RemoteStream { .. })
    }
}

/// Additional playback options supplied alongside a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    /// Initial playback position (defaults to start of stream).
    pub start_position: Duration,
    /// Initial volume (0.0 = muted, 1.0 = unity gain).
    pub initial_volume: f32,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            start_position: Duration::ZERO,
            initial_volume: 1.0,
        }
    }
}

/// Unique identifier for one loaded track instance.
///
/// Every `load` yields a fresh id, so replaying the same track produces a
/// different session and end-of-track signals can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Construct an identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata associated with a playback request. Hosts may use this to
/// enrich platform media sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackMetadata {
    pub track_id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub artwork_url: Option<String>,
}

/// Request describing the track a host session should load.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub source: AudioSource,
    pub options: PlaybackOptions,
    pub metadata: PlaybackMetadata,
}

impl PlaybackRequest {
    pub fn new(source: AudioSource) -> Self {
        Self {
            source,
            options: PlaybackOptions::default(),
            metadata: PlaybackMetadata::default(),
        }
    }

    pub fn with_options(mut self, options: PlaybackOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metadata(mut self, metadata: PlaybackMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Gain applied to one equalizer band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandGain {
    pub frequency_hz: u32,
    pub gain_db: f32,
}

/// Effective equalizer curve pushed to the audio session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EqualizerCurve {
    pub enabled: bool,
    pub bands: Vec<BandGain>,
}

/// Kind of audio focus loss reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionKind {
    /// Another session briefly needs priority (phone call, navigation prompt).
    Temporary,
    /// Audio focus is gone until the user resumes explicitly.
    Permanent,
}

/// Transport command from a lock screen, headset or car head unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    Seek(Duration),
}

/// Callback payload produced by the platform audio session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session produced its first audible frame.
    FirstFrame {
        session: SessionId,
        duration: Option<Duration>,
    },
    /// Periodic playback position report.
    Position {
        session: SessionId,
        position: Duration,
    },
    /// Output starved while playing.
    Stalled { session: SessionId },
    /// Output resumed after a stall.
    Recovered { session: SessionId },
    /// The track played to its end.
    Ended { session: SessionId },
    /// The session failed and cannot continue.
    Failed { session: SessionId, message: String },
    Interruption(InterruptionKind),
    Remote(RemoteCommand),
}

impl SessionEvent {
    /// Session the event refers to, if it is session scoped.
    pub fn session(&self) -> Option<SessionId> {
        match self {
            SessionEvent::FirstFrame { session, .. }
            | SessionEvent::Position { session, .. }
            | SessionEvent::Stalled { session }
            | SessionEvent::Recovered { session }
            | SessionEvent::Ended { session }
            | SessionEvent::Failed { session, .. } => Some(*session),
            SessionEvent::Interruption(_) | SessionEvent::Remote(_) => None,
        }
    }
}

/// Receiver for platform audio session callbacks.
///
/// Called from whatever thread the platform uses, so implementations must not
/// block; the engine's listener only forwards into a channel.
pub trait SessionListener: Send + Sync {
    fn on_event(&self, event: SessionEvent);
}

/// Platform audio/media session.
///
/// Multiple sessions may be loaded at once (crossfade keeps the outgoing and
/// incoming tracks alive together). Control calls address a session by id.
#[async_trait::async_trait]
pub trait AudioSession: Send + Sync {
    /// Register the listener that receives all callbacks. Replaces any
    /// previous listener.
    fn set_listener(&self, listener: Arc<dyn SessionListener>);

    /// Load a track. Playback starts as soon as the source is ready; the host
    /// reports [`SessionEvent::FirstFrame`] when audio is flowing.
    async fn load(&self, request: PlaybackRequest) -> Result<SessionId>;

    /// Resume a paused session.
    async fn play(&self, session: SessionId) -> Result<()>;

    /// Pause without releasing the session.
    async fn pause(&self, session: SessionId) -> Result<()>;

    /// Stop output for the session.
    async fn stop(&self, session: SessionId) -> Result<()>;

    /// Seek to an absolute position within the stream.
    async fn seek(&self, session: SessionId, position: Duration) -> Result<()>;

    /// Adjust volume. Volume is normalized to `0.0..=1.0`.
    async fn set_volume(&self, session: SessionId, volume: f32) -> Result<()>;

    /// Apply an equalizer curve to all output.
    async fn set_equalizer(&self, curve: EqualizerCurve) -> Result<()>;

    /// Release resources associated with a session.
    async fn unload(&self, session: SessionId) -> Result<()>;
}
