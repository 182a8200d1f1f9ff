//! Accumulated listening time.

use std::time::Duration;

/// Seconds of audio actually played. Only grows.
///
/// Fed with position deltas reported by the audio session, so pauses, seeks
/// and time spent with the app open but silent never count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListeningTimeCounter {
    total_seconds: u64,
    carry: Duration,
}

impl ListeningTimeCounter {
    pub fn new(total_seconds: u64) -> Self {
        Self {
            total_seconds,
            carry: Duration::ZERO,
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    /// Add played time. Whole seconds move into the total; the remainder is
    /// carried to the next call.
    pub fn add(&mut self, played: Duration) {
        self.carry += played;
        let whole = self.carry.as_secs();
        if whole > 0 {
            self.total_seconds = self.total_seconds.saturating_add(whole);
            self.carry -= Duration::from_secs(whole);
        }
    }

    /// Reconcile with a total reported elsewhere, never regressing.
    pub fn reconcile(&mut self, other_total: u64) {
        self.total_seconds = self.total_seconds.max(other_total);
    }
}
