//! quadstep-core: Step sequencer timing and pattern generation

pub mod algorithms;
pub mod divider;
mod error;
pub mod lane;
pub mod midi;
pub mod random;
pub mod scheduler;
mod sequencer;
mod stepper;
mod transport;

pub use algorithms::{
    euclidean_rhythm, quantize_to_scale, EuclideanPattern, NearestDegree, ScaleMode,
    ScaleQuantizer,
};
pub use error::{Result, SequencerError};
pub use lane::{
    Direction, LaneAnchor, LaneSnapshot, Role, SequenceTrack, StepMode, StepState, STEPS,
};
pub use midi::{MidiMessage, MidiOutput};
pub use random::RandomSource;
pub use scheduler::{Pass, TrackRuntime};
pub use sequencer::{Sequencer, Track, TrackSettings, TRACKS};
pub use stepper::StepEvent;
pub use transport::{ClockDriver, TimingMode, Transport, TransportState, WallClock};
