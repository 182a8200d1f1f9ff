//! Messages accepted by the controller task.

use crate::equalizer::EqPreset;
use crate::error::Result;
use crate::models::{LoopMode, Track, TrackId};
use bridge_traits::{SessionEvent, SessionId};
use std::time::Duration;
use tokio::sync::oneshot;

pub(crate) type Reply = oneshot::Sender<Result<()>>;

/// Operations issued by the UI or the engine façade.
#[derive(Debug)]
pub(crate) enum Request {
    SetQueue {
        tracks: Vec<Track>,
        start: Option<usize>,
    },
    Enqueue(Track),
    Remove(TrackId),
    ClearQueue,
    Play(Track),
    Resume,
    Pause,
    Stop,
    Next,
    Previous,
    Seek(Duration),
    SetShuffle(bool),
    SetLoop(LoopMode),
    SetCrossfade {
        enabled: bool,
        duration_secs: u32,
    },
    SetEqEnabled(bool),
    SetEqPreset(EqPreset),
    SetBandValue {
        band: usize,
        db: f32,
    },
    ResetCustomBands,
    SetLiked {
        track_id: TrackId,
        liked: bool,
    },
}

/// Everything that flows through the single command stream.
#[derive(Debug)]
pub(crate) enum Command {
    Request(Request, Reply),
    /// Platform callback forwarded by the background adapter.
    Session(SessionEvent),
    LoadTimeout(SessionId),
    CrossfadeTick {
        session: SessionId,
        step: u32,
    },
    Shutdown(oneshot::Sender<()>),
}
