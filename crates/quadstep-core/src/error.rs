//! Error types for quadstep

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("Track not found: {0}")]
    TrackNotFound(usize),
    #[error("Step out of range: {0}")]
    StepOutOfRange(usize),
    #[error("Invalid euclidean pattern: length {length}, beats {beats}")]
    InvalidEuclidean { length: u8, beats: u8 },
}

pub type Result<T> = std::result::Result<T, SequencerError>;
