//! quadstep-services: Scheduling thread, guarded editing, MIDI queue and config

pub mod config;
pub mod engine;
pub mod guard;
pub mod midi_out;
pub mod playhead;

pub use config::{
    config_path, load_config, load_config_from, save_config, save_config_to, ConfigError,
    EngineConfig, EuclideanPreset,
};
pub use engine::{EngineError, EngineState, MonotonicClock, PollOutcome, SequencerEngine};
pub use guard::MutationGuard;
pub use midi_out::ChannelOutput;
pub use playhead::PlayheadState;
