//! Display state readable without touching the scheduler's lock

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use quadstep_core::{LaneSnapshot, Role, SequenceTrack, Sequencer, TRACKS};

/// Playheads plus the last committed copy of every lane.
///
/// Indices are atomics written by the scheduling thread after each pass. Lane
/// contents only change under a `MutationGuard`, so the editing side refreshes
/// the copies when a guard drops; the scheduling thread never takes their lock.
pub struct PlayheadState {
    indices: [[AtomicU8; 7]; TRACKS],
    sounding: [AtomicBool; TRACKS],
    passes: AtomicU64,
    pub(crate) lanes: Mutex<[[LaneSnapshot; 7]; TRACKS]>,
}

impl PlayheadState {
    fn new() -> Self {
        Self {
            indices: std::array::from_fn(|_| std::array::from_fn(|_| AtomicU8::new(0))),
            sounding: std::array::from_fn(|_| AtomicBool::new(false)),
            passes: AtomicU64::new(0),
            lanes: Mutex::new(std::array::from_fn(|t| {
                Role::ALL.map(|role| SequenceTrack::new(role, t).snapshot())
            })),
        }
    }

    /// Current step of a lane; out-of-range tracks read as 0
    pub fn index(&self, track: usize, role: Role) -> usize {
        self.indices
            .get(track)
            .map(|lanes| lanes[role.index()].load(Ordering::Relaxed) as usize)
            .unwrap_or(0)
    }

    /// Whether the track had a note held at the last pass
    pub fn is_sounding(&self, track: usize) -> bool {
        self.sounding
            .get(track)
            .is_some_and(|s| s.load(Ordering::Relaxed))
    }

    /// Scheduling passes run since the engine was created
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Last committed lane contents with the live playhead
    pub fn lane(&self, track: usize, role: Role) -> Option<LaneSnapshot> {
        let lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = *lanes.get(track)?.get(role.index())?;
        snapshot.index = self.index(track, role);
        Some(snapshot)
    }

    /// Copy every playhead out of the sequencer
    pub(crate) fn publish(&self, sequencer: &Sequencer) {
        for (t, track) in sequencer.tracks().iter().enumerate() {
            for lane in &track.lanes {
                self.indices[t][lane.role.index()].store(lane.index as u8, Ordering::Relaxed);
            }
            self.sounding[t].store(track.runtime.is_sounding(), Ordering::Relaxed);
        }
    }

    /// Refresh the lane copies (editing side only)
    pub(crate) fn publish_lanes(&self, sequencer: &Sequencer) {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        for (copies, track) in lanes.iter_mut().zip(sequencer.tracks()) {
            for (copy, lane) in copies.iter_mut().zip(&track.lanes) {
                *copy = lane.snapshot();
            }
        }
    }

    pub(crate) fn count_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for PlayheadState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_copies_indices() {
        let playheads = PlayheadState::default();
        let mut seq = Sequencer::new();
        seq.lane_mut(2, Role::Velocities).unwrap().index = 11;
        seq.lane_mut(3, Role::Mods).unwrap().index = 4;
        playheads.publish(&seq);

        assert_eq!(playheads.index(2, Role::Velocities), 11);
        assert_eq!(playheads.index(3, Role::Mods), 4);
        assert_eq!(playheads.index(0, Role::Notes), 0);
        assert_eq!(playheads.index(TRACKS, Role::Notes), 0);
        assert!(!playheads.is_sounding(0));
    }

    #[test]
    fn test_lane_copy_pairs_contents_with_live_index() {
        let playheads = PlayheadState::default();
        let mut seq = Sequencer::new();
        let lane = seq.lane_mut(1, Role::Gates).unwrap();
        lane.values[5] = 7;
        lane.last = 9;
        playheads.publish_lanes(&seq);

        seq.lane_mut(1, Role::Gates).unwrap().index = 6;
        playheads.publish(&seq);

        let snap = playheads.lane(1, Role::Gates).unwrap();
        assert_eq!(snap.values[5], 7);
        assert_eq!(snap.last, 9);
        assert_eq!(snap.index, 6);
        assert!(playheads.lane(TRACKS, Role::Gates).is_none());
    }

    #[test]
    fn test_pass_counter() {
        let playheads = PlayheadState::default();
        playheads.count_pass();
        playheads.count_pass();
        assert_eq!(playheads.passes(), 2);
    }
}
