//! Per-lane clocking: count down the divider and move the playhead

use crate::divider;
use crate::lane::{Direction, SequenceTrack, StepMode};
use crate::random::RandomSource;

/// Outcome of clocking a lane once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// Still counting down
    Held,
    /// The divider rolled over and the playhead moved
    Stepped,
}

impl StepEvent {
    pub fn stepped(self) -> bool {
        self == Self::Stepped
    }
}

impl SequenceTrack {
    /// Clock the lane by one master tick.
    ///
    /// On divider rollover the tick counter is reloaded from the divider table
    /// and the playhead moves according to the step mode.
    pub fn advance(&mut self, rng: &mut impl RandomSource) -> StepEvent {
        self.ticks_remaining = self.ticks_remaining.saturating_sub(1);
        if self.ticks_remaining > 0 {
            return StepEvent::Held;
        }

        self.ticks_remaining = divider::ticks(self.divider);
        self.move_playhead(rng);
        StepEvent::Stepped
    }

    fn move_playhead(&mut self, rng: &mut impl RandomSource) {
        let first = self.first as i32;
        let last = self.last as i32;
        let index = self.index as i32;

        let next = match self.step_mode {
            StepMode::Forward => {
                if index + 1 > last { first } else { index + 1 }
            }
            StepMode::Backward => {
                if index - 1 < first { last } else { index - 1 }
            }
            StepMode::PingPong => match self.direction {
                Direction::Forward if index + 1 > last => {
                    self.direction = Direction::Backward;
                    (last - 1).clamp(first, last)
                }
                Direction::Forward => index + 1,
                Direction::Backward if index - 1 < first => {
                    self.direction = Direction::Forward;
                    (first + 1).clamp(first, last)
                }
                Direction::Backward => index - 1,
            },
            StepMode::RandomWalk => (index + rng.range(-1, 2)).clamp(first, last),
            StepMode::Random => rng.range(first, last + 1),
        };

        self.index = next.clamp(first, last) as usize;
    }
}
