//! # Background Event Adapter
//!
//! Listener registered with the platform audio session. Every callback is
//! re-marshaled into the controller's command stream exactly once.

use crate::controller::Command;
use bridge_traits::{SessionEvent, SessionId, SessionListener};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::debug;

/// Remembered end-of-track sessions.
const ENDED_HISTORY: usize = 32;

/// Forwards platform callbacks into the controller.
///
/// Platforms may report the end of a track from more than one place (a
/// background service and a foreground listener). The adapter drops repeated
/// end signals for the same [`SessionId`].
pub struct BackgroundEventAdapter {
    commands: mpsc::UnboundedSender<Command>,
    ended: Mutex<VecDeque<SessionId>>,
}

impl BackgroundEventAdapter {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            commands,
            ended: Mutex::new(VecDeque::with_capacity(ENDED_HISTORY)),
        }
    }

    fn is_repeat_end(&self, session: SessionId) -> bool {
        let mut ended = self.ended.lock();
        if ended.contains(&session) {
            return true;
        }
        if ended.len() == ENDED_HISTORY {
            ended.pop_front();
        }
        ended.push_back(session);
        false
    }
}

impl SessionListener for BackgroundEventAdapter {
    fn on_event(&self, event: SessionEvent) {
        if let SessionEvent::Ended { session } = &event {
            if self.is_repeat_end(*session) {
                debug!(%session, "Dropping repeated end-of-track signal");
                return;
            }
        }

        if self.commands.send(Command::Session(event)).is_err() {
            debug!("Playback controller stopped; dropping session event");
        }
    }
}
