//! Sequence lanes: one parameter lane of one musical track

use serde::{Deserialize, Serialize};

use crate::algorithms::euclidean_rhythm;
use crate::divider::{self, DEFAULT_DIVIDER};
use crate::error::{Result, SequencerError};

/// Steps per lane
pub const STEPS: usize = 16;

/// Note offsets span one octave either side of the root
pub const NOTE_RANGE: i16 = 12;
/// Gate length scale, 7 = tied into the next step
pub const GATE_RANGE: i16 = 7;
pub const VELOCITY_RANGE: i16 = 32;
/// Velocity steps are scaled by this to reach MIDI velocity
pub const VELOCITY_SCALE: i16 = 4;
/// Probability in tenths, 9 = always
pub const PROBABILITY_RANGE: i16 = 9;
pub const RATCHET_RANGE: i16 = 3;
pub const MOD_RANGE: i16 = 127;

pub const DEFAULT_ROOT: u8 = 60;
/// Controller number of the first track's mod lane; later tracks count up
pub const DEFAULT_CONTROLLER: u8 = 16;

/// The parameter a lane drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Notes,
    Offsets,
    Gates,
    Ratchets,
    Velocities,
    Probability,
    Mods,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Notes,
        Role::Offsets,
        Role::Gates,
        Role::Ratchets,
        Role::Velocities,
        Role::Probability,
        Role::Mods,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn min_value(self) -> i16 {
        match self {
            Self::Notes | Self::Offsets => -NOTE_RANGE,
            // -1 on a mod step means "send nothing"
            Self::Mods => -1,
            _ => 0,
        }
    }

    pub fn max_value(self) -> i16 {
        match self {
            Self::Notes | Self::Offsets => NOTE_RANGE,
            Self::Gates => GATE_RANGE,
            Self::Ratchets => RATCHET_RANGE,
            Self::Velocities => VELOCITY_RANGE,
            Self::Probability => PROBABILITY_RANGE,
            Self::Mods => MOD_RANGE,
        }
    }

    pub fn default_value(self) -> i16 {
        match self {
            Self::Gates => 3,
            Self::Velocities => 22,
            Self::Probability => PROBABILITY_RANGE,
            Self::Mods => -1,
            _ => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Notes => "Notes",
            Self::Offsets => "Offsets",
            Self::Gates => "Gates",
            Self::Ratchets => "Ratchets",
            Self::Velocities => "Velocities",
            Self::Probability => "Probability",
            Self::Mods => "Mods",
        }
    }
}

/// Per-step activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepState {
    /// Always active, cannot be toggled (gate lanes)
    Locked,
    Off,
    #[default]
    On,
}

impl StepState {
    /// Hardware encoding: -1 locked, 0 off, 1 on
    pub fn flag(self) -> i16 {
        match self {
            Self::Locked => -1,
            Self::Off => 0,
            Self::On => 1,
        }
    }

    pub fn is_active(self) -> bool {
        self != Self::Off
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepMode {
    #[default]
    Forward,
    Backward,
    PingPong,
    RandomWalk,
    /// Jumps anywhere in the window; not every step is guaranteed a visit
    Random,
}

/// Travel direction, only meaningful for ping-pong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// What the lane's auxiliary number means for its role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaneAnchor {
    /// Root note that note offsets are relative to
    Root(u8),
    /// Euclidean rotation for the probability lane
    Rotation(u8),
    /// Controller number sent by the mod lane
    Controller(u8),
}

impl LaneAnchor {
    pub fn for_role(role: Role, track: usize) -> Self {
        match role {
            Role::Probability => Self::Rotation(0),
            Role::Mods => Self::Controller(DEFAULT_CONTROLLER.saturating_add(track as u8).min(127)),
            _ => Self::Root(DEFAULT_ROOT),
        }
    }

    pub fn root(&self) -> Option<u8> {
        match *self {
            Self::Root(root) => Some(root),
            _ => None,
        }
    }

    pub fn rotation(&self) -> u8 {
        match *self {
            Self::Rotation(rotation) => rotation,
            _ => 0,
        }
    }

    pub fn controller(&self) -> Option<u8> {
        match *self {
            Self::Controller(cc) => Some(cc),
            _ => None,
        }
    }
}

/// Read-only copy of the fields the presentation layer draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneSnapshot {
    pub role: Role,
    pub values: [i16; STEPS],
    pub active: [StepState; STEPS],
    pub index: usize,
    pub first: usize,
    pub last: usize,
}

/// One parameter lane of one musical track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceTrack {
    pub role: Role,
    pub values: [i16; STEPS],
    pub active: [StepState; STEPS],
    /// Playhead, always within `first..=last`
    pub index: usize,
    pub step_mode: StepMode,
    pub direction: Direction,
    pub first: usize,
    pub last: usize,
    pub euclidean_length: u8,
    pub euclidean_beats: u8,
    /// Index into the clock divider table
    pub divider: usize,
    pub ticks_remaining: u16,
    pub anchor: LaneAnchor,
}

impl SequenceTrack {
    pub fn new(role: Role, track: usize) -> Self {
        let state = if role == Role::Gates { StepState::Locked } else { StepState::On };
        Self {
            role,
            values: [role.default_value(); STEPS],
            active: [state; STEPS],
            index: 0,
            step_mode: StepMode::Forward,
            direction: Direction::Forward,
            first: 0,
            last: STEPS - 1,
            euclidean_length: STEPS as u8,
            euclidean_beats: 1,
            divider: DEFAULT_DIVIDER,
            ticks_remaining: divider::ticks(DEFAULT_DIVIDER),
            anchor: LaneAnchor::for_role(role, track),
        }
    }

    pub fn max_value(&self) -> i16 {
        self.role.max_value()
    }

    pub fn current_value(&self) -> i16 {
        self.values[self.index]
    }

    pub fn current_state(&self) -> StepState {
        self.active[self.index]
    }

    pub fn window_len(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn value(&self, step: usize) -> Result<i16> {
        check_step(step)?;
        Ok(self.values[step])
    }

    /// Set a step value, clamped to the role's range. Returns the stored value.
    pub fn set_value(&mut self, step: usize, value: i16) -> Result<i16> {
        check_step(step)?;
        let clamped = value.clamp(self.role.min_value(), self.role.max_value());
        self.values[step] = clamped;
        Ok(clamped)
    }

    /// Encoder-style relative edit
    pub fn nudge_value(&mut self, step: usize, delta: i16) -> Result<i16> {
        check_step(step)?;
        self.set_value(step, self.values[step].saturating_add(delta))
    }

    /// Flip a step on or off. Locked steps stay locked.
    pub fn toggle_step(&mut self, step: usize) -> Result<StepState> {
        check_step(step)?;
        let next = match self.active[step] {
            StepState::Locked => StepState::Locked,
            StepState::On => StepState::Off,
            StepState::Off => StepState::On,
        };
        self.active[step] = next;
        Ok(next)
    }

    pub fn set_first(&mut self, step: usize) -> Result<()> {
        check_step(step)?;
        self.first = step;
        self.last = self.last.max(step);
        self.normalize();
        Ok(())
    }

    pub fn set_last(&mut self, step: usize) -> Result<()> {
        check_step(step)?;
        self.last = step;
        self.first = self.first.min(step);
        self.normalize();
        Ok(())
    }

    pub fn set_step_mode(&mut self, mode: StepMode) {
        self.step_mode = mode;
        self.direction = Direction::Forward;
    }

    /// Select a divider; out-of-table indices clamp to the slowest rate
    pub fn set_divider(&mut self, divider: usize) {
        self.divider = divider.min(divider::max_divider());
        self.ticks_remaining = self.ticks_remaining.min(divider::ticks(self.divider));
    }

    pub fn set_euclidean(&mut self, length: u8, beats: u8) -> Result<()> {
        if length == 0 || length as usize > STEPS || beats > length {
            return Err(SequencerError::InvalidEuclidean { length, beats });
        }
        self.euclidean_length = length;
        self.euclidean_beats = beats;
        Ok(())
    }

    pub fn set_anchor(&mut self, anchor: LaneAnchor) {
        self.anchor = anchor;
    }

    /// Rewrite values from the lane's Euclidean settings: pulses become the
    /// role maximum, rests zero, and the window is cut to the pattern length.
    pub fn apply_euclidean(&mut self) {
        let length = self.euclidean_length.clamp(1, STEPS as u8);
        let beats = self.euclidean_beats.min(length);
        let pattern = euclidean_rhythm(length, beats, self.anchor.rotation());

        self.last = length as usize - 1;
        let max = self.role.max_value();
        for (step, value) in self.values.iter_mut().take(length as usize).enumerate() {
            *value = if pattern.is_pulse(step) { max } else { 0 };
        }
        self.normalize();
    }

    /// Move the playhead back to the window start and reload the divider
    pub fn reset_playhead(&mut self) {
        self.index = self.first;
        self.direction = Direction::Forward;
        self.ticks_remaining = divider::ticks(self.divider);
    }

    /// Restore every invariant after an arbitrary edit
    pub fn normalize(&mut self) {
        self.last = self.last.min(STEPS - 1);
        self.first = self.first.min(self.last);
        self.index = self.index.clamp(self.first, self.last);
        self.divider = self.divider.min(divider::max_divider());
        self.ticks_remaining = self.ticks_remaining.min(divider::ticks(self.divider));
        self.euclidean_length = self.euclidean_length.clamp(1, STEPS as u8);
        self.euclidean_beats = self.euclidean_beats.min(self.euclidean_length);

        let (min, max) = (self.role.min_value(), self.role.max_value());
        for value in &mut self.values {
            *value = (*value).clamp(min, max);
        }
        if self.role == Role::Gates {
            self.active = [StepState::Locked; STEPS];
        }
    }

    pub fn snapshot(&self) -> LaneSnapshot {
        LaneSnapshot {
            role: self.role,
            values: self.values,
            active: self.active,
            index: self.index,
            first: self.first,
            last: self.last,
        }
    }
}

fn check_step(step: usize) -> Result<()> {
    if step < STEPS {
        Ok(())
    } else {
        Err(SequencerError::StepOutOfRange(step))
    }
}
