//! # Play Queue
//!
//! Ordered tracks, the current pointer and the play-order policy (shuffle,
//! loop, crossfade). The queue only answers "where would navigation go"; the
//! controller decides when to actually move.

use crate::error::{PlaybackError, Result};
use crate::models::{CrossfadeSettings, LoopMode, Track, TrackId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Why the queue is being advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCause {
    /// `next()` from the UI or a remote control.
    User,
    /// The current track played to its end.
    TrackEnded,
}

/// Outcome of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Move to the track at this insertion index.
    Move(usize),
    /// Restart the current track.
    Replay,
    /// Nothing to do.
    Stay,
    /// Ran off the end with loop off.
    Exhausted,
}

#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    /// Insertion index of the current track.
    current: Option<usize>,
    /// Shuffle permutation of insertion indices; built on demand.
    order: Option<Vec<usize>>,
    shuffle: bool,
    loop_mode: LoopMode,
    crossfade: CrossfadeSettings,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Contents
    // ------------------------------------------------------------------------

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|index| self.tracks.get(index))
    }

    /// Insertion index of the current track.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn position_of(&self, track_id: &TrackId) -> Option<usize> {
        self.tracks.iter().position(|track| &track.id == track_id)
    }

    /// Replace the contents. `start` is an insertion index.
    pub fn set_tracks(&mut self, tracks: Vec<Track>, start: Option<usize>) -> Result<()> {
        if let Some(index) = start {
            if index >= tracks.len() {
                return Err(PlaybackError::InvalidArgument(format!(
                    "start index {} out of range for {} tracks",
                    index,
                    tracks.len()
                )));
            }
        }
        self.tracks = tracks;
        self.current = start;
        self.order = None;
        Ok(())
    }

    /// Append a track and return its insertion index.
    pub fn push(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.order = None;
        self.tracks.len() - 1
    }

    /// Remove every entry of `track_id`. The current track cannot be removed.
    pub fn remove(&mut self, track_id: &TrackId) -> Result<usize> {
        if self.current().map(|track| &track.id) == Some(track_id) {
            return Err(PlaybackError::InvalidState(format!(
                "cannot remove the current track {}",
                track_id
            )));
        }

        let current_id = self.current;
        let mut removed = 0;
        let mut index = 0;
        let mut new_current = current_id;
        self.tracks.retain(|track| {
            let keep = &track.id != track_id;
            if !keep {
                removed += 1;
                if let Some(current) = current_id {
                    if index < current {
                        new_current = new_current.map(|c| c - 1);
                    }
                }
            }
            index += 1;
            keep
        });

        if removed > 0 {
            self.current = new_current;
            self.order = None;
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = None;
        self.order = None;
    }

    /// Make the track at `index` current.
    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.tracks.len() {
            return Err(PlaybackError::InvalidArgument(format!(
                "index {} out of range for {} tracks",
                index,
                self.tracks.len()
            )));
        }
        self.current = Some(index);
        Ok(())
    }

    /// Make the track at `index` current on the listener's request. With
    /// shuffle on, the play order restarts from it.
    pub fn jump_to(&mut self, index: usize) -> Result<()> {
        self.select(index)?;
        if self.shuffle {
            self.order = None;
        }
        Ok(())
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Update the liked flag on every queued copy. Returns `true` if any
    /// entry matched.
    pub fn set_liked(&mut self, track_id: &TrackId, liked: bool) -> bool {
        let mut found = false;
        for track in self.tracks.iter_mut().filter(|t| &t.id == track_id) {
            track.liked = liked;
            found = true;
        }
        found
    }

    // ------------------------------------------------------------------------
    // Policy
    // ------------------------------------------------------------------------

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Toggle shuffle. The current track stays current; turning shuffle on
    /// rebuilds the permutation with it in the first slot.
    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle = enabled;
        self.order = None;
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    pub fn crossfade(&self) -> CrossfadeSettings {
        self.crossfade
    }

    pub fn set_crossfade(&mut self, settings: CrossfadeSettings) {
        self.crossfade = settings;
    }

    // ------------------------------------------------------------------------
    // Effective play order
    // ------------------------------------------------------------------------

    /// Insertion indices in play order.
    pub fn play_order(&mut self) -> Vec<usize> {
        if !self.shuffle {
            return (0..self.tracks.len()).collect();
        }
        if self.order.as_ref().map(Vec::len) != Some(self.tracks.len()) {
            self.order = Some(self.build_shuffle_order());
        }
        self.order.clone().unwrap_or_default()
    }

    /// Position of the current track within the effective play order.
    pub fn cursor(&mut self) -> Option<usize> {
        let current = self.current?;
        self.play_order().iter().position(|&index| index == current)
    }

    fn build_shuffle_order(&self) -> Vec<usize> {
        let mut hasher = DefaultHasher::new();
        for track in &self.tracks {
            track.id.hash(&mut hasher);
        }
        let mut rng = StdRng::seed_from_u64(hasher.finish());

        let mut rest: Vec<usize> = (0..self.tracks.len())
            .filter(|&index| Some(index) != self.current)
            .collect();
        rest.shuffle(&mut rng);

        self.current.into_iter().chain(rest).collect()
    }

    /// Where `next()` (or the end of the current track) would go.
    pub fn step_forward(&mut self, cause: StepCause) -> Step {
        if cause == StepCause::TrackEnded && self.loop_mode == LoopMode::One {
            return if self.current.is_some() {
                Step::Replay
            } else {
                Step::Exhausted
            };
        }

        let order = self.play_order();
        let Some(cursor) = self.cursor() else {
            return Step::Exhausted;
        };

        if let Some(&index) = order.get(cursor + 1) {
            return Step::Move(index);
        }

        match self.loop_mode {
            LoopMode::All => Step::Move(order[0]),
            LoopMode::One => Step::Replay,
            LoopMode::Off => Step::Exhausted,
        }
    }

    /// Where `previous()` would go.
    pub fn step_back(&mut self) -> Step {
        let order = self.play_order();
        let Some(cursor) = self.cursor() else {
            return Step::Stay;
        };

        if cursor > 0 {
            return Step::Move(order[cursor - 1]);
        }

        match self.loop_mode {
            LoopMode::All => Step::Move(order[order.len() - 1]),
            LoopMode::One => Step::Replay,
            LoopMode::Off => Step::Stay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter()
            .map(|id| Track::new(*id, format!("Title {}", id), "Artist", format!("https://cdn/{}", id)))
            .collect()
    }

    fn advance(queue: &mut Queue) -> Step {
        let step = queue.step_forward(StepCause::User);
        if let Step::Move(index) = step {
            queue.select(index).unwrap();
        }
        step
    }

    #[test]
    fn test_next_runs_off_the_end_with_loop_off() {
        let mut queue = Queue::new();
        queue.set_tracks(tracks(&["a", "b", "c"]), Some(0)).unwrap();

        advance(&mut queue);
        advance(&mut queue);
        assert_eq!(queue.current().unwrap().id.as_str(), "c");
        assert_eq!(advance(&mut queue), Step::Exhausted);
    }

    #[test]
    fn test_loop_all_returns_to_start_after_len_steps() {
        for shuffle in [false, true] {
            for start in 0..5 {
                let mut queue = Queue::new();
                queue
                    .set_tracks(tracks(&["a", "b", "c", "d", "e"]), Some(start))
                    .unwrap();
                queue.set_loop_mode(LoopMode::All);
                queue.set_shuffle(shuffle);

                let original = queue.cursor();
                for _ in 0..queue.len() {
                    advance(&mut queue);
                }
                assert_eq!(queue.cursor(), original);
                assert_eq!(queue.current_index(), Some(start));
            }
        }
    }

    #[test]
    fn test_previous_at_start_is_a_no_op_with_loop_off() {
        let mut queue = Queue::new();
        queue.set_tracks(tracks(&["a", "b"]), Some(0)).unwrap();
        assert_eq!(queue.step_back(), Step::Stay);
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_previous_wraps_with_loop_all_and_replays_with_loop_one() {
        let mut queue = Queue::new();
        queue.set_tracks(tracks(&["a", "b", "c"]), Some(0)).unwrap();
        queue.set_loop_mode(LoopMode::All);
        assert_eq!(queue.step_back(), Step::Move(2));

        queue.set_loop_mode(LoopMode::One);
        assert_eq!(queue.step_back(), Step::Replay);
    }

    #[test]
    fn test_loop_one_replays_on_track_end_but_user_next_moves() {
        let mut queue = Queue::new();
        queue.set_tracks(tracks(&["a", "b"]), Some(0)).unwrap();
        queue.set_loop_mode(LoopMode::One);

        assert_eq!(queue.step_forward(StepCause::TrackEnded), Step::Replay);
        assert_eq!(queue.step_forward(StepCause::User), Step::Move(1));
        queue.select(1).unwrap();
        assert_eq!(queue.step_forward(StepCause::User), Step::Replay);
    }

    #[test]
    fn test_shuffle_keeps_current_track_first() {
        let mut queue = Queue::new();
        queue
            .set_tracks(tracks(&["a", "b", "c", "d", "e", "f"]), Some(3))
            .unwrap();
        queue.set_shuffle(true);

        assert_eq!(queue.current().unwrap().id.as_str(), "d");
        let order = queue.play_order();
        assert_eq!(order[0], 3);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4, 5]);

        queue.set_shuffle(false);
        assert_eq!(queue.current().unwrap().id.as_str(), "d");
    }

    #[test]
    fn test_jump_after_shuffling_without_current_visits_every_track() {
        let mut queue = Queue::new();
        queue
            .set_tracks(tracks(&["a", "b", "c", "d", "e", "f"]), None)
            .unwrap();
        queue.set_shuffle(true);
        assert_eq!(queue.play_order().len(), 6);

        for index in 0..queue.len() {
            queue.jump_to(index).unwrap();
            assert_eq!(queue.cursor(), Some(0));
        }

        let mut visited = vec![queue.current_index().unwrap()];
        while let Step::Move(index) = advance(&mut queue) {
            visited.push(index);
        }
        visited.sort();
        assert_eq!(visited, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_shuffle_order_is_stable_for_same_contents() {
        let mut first = Queue::new();
        first.set_tracks(tracks(&["a", "b", "c", "d", "e"]), Some(0)).unwrap();
        first.set_shuffle(true);

        let mut second = first.clone();
        second.set_shuffle(false);
        second.set_shuffle(true);

        assert_eq!(first.play_order(), second.play_order());
    }

    #[test]
    fn test_remove_adjusts_current_and_protects_it() {
        let mut queue = Queue::new();
        queue.set_tracks(tracks(&["a", "b", "c", "b"]), Some(2)).unwrap();

        assert!(queue.remove(&TrackId::new("c")).is_err());
        assert_eq!(queue.remove(&TrackId::new("b")).unwrap(), 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.current().unwrap().id.as_str(), "c");
        assert_eq!(queue.current_index(), Some(1));
    }

    #[test]
    fn test_set_liked_updates_all_copies() {
        let mut queue = Queue::new();
        queue.set_tracks(tracks(&["a", "b", "a"]), None).unwrap();
        assert!(queue.set_liked(&TrackId::new("a"), true));
        assert!(queue.tracks()[0].liked && queue.tracks()[2].liked);
        assert!(!queue.set_liked(&TrackId::new("zzz"), true));
    }

    #[test]
    fn test_empty_queue_navigation() {
        let mut queue = Queue::new();
        assert_eq!(queue.step_forward(StepCause::User), Step::Exhausted);
        assert_eq!(queue.step_back(), Step::Stay);
        assert!(queue.set_tracks(Vec::new(), Some(0)).is_err());
    }
}
