//! Scoped exclusive access to the sequencer from the editing context

use std::ops::{Deref, DerefMut};
use std::sync::MutexGuard;

use quadstep_core::{Result, Role, SequenceTrack, Sequencer, TrackSettings};
use tracing::debug;

use crate::engine::Session;
use crate::playhead::PlayheadState;

/// Holds the sequencer for the editing context.
///
/// While a guard is alive the scheduling thread skips its passes instead of
/// waiting, so no tick ever observes a half-applied edit. Dropping the guard
/// normalizes every lane, refreshes the display copies and lets scheduling
/// resume on the next poll.
pub struct MutationGuard<'a> {
    session: MutexGuard<'a, Session>,
    playheads: &'a PlayheadState,
    edits: usize,
}

impl<'a> MutationGuard<'a> {
    pub(crate) fn new(session: MutexGuard<'a, Session>, playheads: &'a PlayheadState) -> Self {
        Self {
            session,
            playheads,
            edits: 0,
        }
    }

    pub fn lane_mut(&mut self, track: usize, role: Role) -> Result<&mut SequenceTrack> {
        self.edits += 1;
        self.session.sequencer.lane_mut(track, role)
    }

    pub fn settings_mut(&mut self, track: usize) -> Result<&mut TrackSettings> {
        self.edits += 1;
        Ok(&mut self.session.sequencer.track_mut(track)?.settings)
    }
}

impl Deref for MutationGuard<'_> {
    type Target = Sequencer;

    fn deref(&self) -> &Sequencer {
        &self.session.sequencer
    }
}

impl DerefMut for MutationGuard<'_> {
    fn deref_mut(&mut self) -> &mut Sequencer {
        self.edits += 1;
        &mut self.session.sequencer
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        if self.edits > 0 {
            self.session.sequencer.normalize();
            self.playheads.publish(&self.session.sequencer);
            self.playheads.publish_lanes(&self.session.sequencer);
            debug!(edits = self.edits, "Guarded edit committed");
        }
    }
}
