//! Pattern algorithms (Euclidean rhythms, scale quantization)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lane::STEPS;

// ============================================================================
// Euclidean Rhythm Generator
// ============================================================================

/// A generated rhythm of up to `STEPS` bits, step 0 in the most significant position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EuclideanPattern {
    bits: u16,
    len: u8,
}

impl EuclideanPattern {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw bits, `len` wide, MSB = step 0
    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn is_pulse(&self, step: usize) -> bool {
        step < self.len() && (self.bits >> (self.len() - 1 - step)) & 1 == 1
    }

    pub fn pulses(&self) -> u32 {
        self.bits.count_ones()
    }

    pub fn steps(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len()).map(|step| self.is_pulse(step))
    }

    /// Rotate right so that step `i` moves to step `(i + by) % len`
    pub fn rotate_right(self, by: usize) -> Self {
        let n = self.len();
        if n == 0 {
            return self;
        }
        let by = by % n;
        if by == 0 {
            return self;
        }
        let mask = (1u32 << n) - 1;
        let word = self.bits as u32 & mask;
        let rotated = ((word >> by) | (word << (n - by))) & mask;
        Self { bits: rotated as u16, len: self.len }
    }
}

impl fmt::Display for EuclideanPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pulse in self.steps() {
            f.write_str(if pulse { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// A run of bits being merged by the Bjorklund passes
#[derive(Debug, Clone, Copy, Default)]
struct Group {
    bits: u32,
    len: u8,
}

impl Group {
    fn single(pulse: bool) -> Self {
        Self { bits: pulse as u32, len: 1 }
    }

    fn append(&mut self, tail: Group) {
        self.bits = (self.bits << tail.len) | tail.bits;
        self.len += tail.len;
    }
}

/// Generate a Euclidean rhythm pattern
///
/// # Arguments
/// * `length` - Total number of steps, 1..=16
/// * `beats` - Number of pulses to distribute; 0 is treated as 1
/// * `rotation` - Rotate the pattern right by this many steps
///
/// # Example
/// ```
/// use quadstep_core::euclidean_rhythm;
/// let pattern = euclidean_rhythm(8, 3, 0);
/// assert_eq!(pattern.to_string(), "10010010");
/// ```
pub fn euclidean_rhythm(length: u8, beats: u8, rotation: u8) -> EuclideanPattern {
    assert!(
        (1..=STEPS as u8).contains(&length),
        "euclidean length must be within 1..={STEPS}, got {length}"
    );

    let n = length as usize;
    let pulses = beats.clamp(1, length) as usize;

    let mut groups = [Group::default(); STEPS];
    for (i, group) in groups.iter_mut().take(n).enumerate() {
        *group = Group::single(i < pulses);
    }

    // Bjorklund: fold the tail groups onto the head groups until at most one remainder is left
    let mut count = n;
    let mut group_a = pulses;
    let mut group_b = n - pulses;
    while group_b > 1 {
        let pairs = group_a.min(group_b);
        for i in 0..pairs {
            let tail = groups[count - 1 - i];
            groups[i].append(tail);
        }
        count -= pairs;

        if group_a > group_b {
            (group_a, group_b) = (group_b, group_a - group_b);
        } else {
            group_b -= group_a;
        }
    }

    let mut combined = Group { bits: 0, len: 0 };
    for group in &groups[..count] {
        combined.append(*group);
    }

    let pattern = EuclideanPattern { bits: combined.bits as u16, len: combined.len };
    if rotation > 0 {
        pattern.rotate_right(rotation as usize)
    } else {
        pattern
    }
}

// ============================================================================
// Scale Quantization
// ============================================================================

/// Pitch-class sets a track can be locked to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleMode {
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    Pentatonic,
    Blues,
    #[default]
    Chromatic,
}

const fn degree_mask(degrees: &[u8]) -> u16 {
    let mut mask = 0;
    let mut i = 0;
    while i < degrees.len() {
        mask |= 1 << degrees[i];
        i += 1;
    }
    mask
}

impl ScaleMode {
    /// Bit `n` is set when the pitch `n` semitones above the root belongs to the scale
    pub const fn mask(self) -> u16 {
        match self {
            Self::Major => degree_mask(&[0, 2, 4, 5, 7, 9, 11]),
            Self::Minor => degree_mask(&[0, 2, 3, 5, 7, 8, 10]),
            Self::Dorian => degree_mask(&[0, 2, 3, 5, 7, 9, 10]),
            Self::Phrygian => degree_mask(&[0, 1, 3, 5, 7, 8, 10]),
            Self::Lydian => degree_mask(&[0, 2, 4, 6, 7, 9, 11]),
            Self::Mixolydian => degree_mask(&[0, 2, 4, 5, 7, 9, 10]),
            Self::Locrian => degree_mask(&[0, 1, 3, 5, 6, 8, 10]),
            Self::HarmonicMinor => degree_mask(&[0, 2, 3, 5, 7, 8, 11]),
            Self::MelodicMinor => degree_mask(&[0, 2, 3, 5, 7, 9, 11]),
            Self::Pentatonic => degree_mask(&[0, 2, 4, 7, 9]),
            Self::Blues => degree_mask(&[0, 3, 5, 6, 7, 10]),
            Self::Chromatic => 0x0fff,
        }
    }

    /// Whether a pitch `semitones` away from the root (either direction) is in the scale
    pub fn contains(self, semitones: i32) -> bool {
        self.mask() & (1 << semitones.rem_euclid(12)) != 0
    }
}

/// Snap `note` to the closest pitch of `mode` built on `root`.
///
/// The search walks outward from the note itself, so the result never jumps
/// octaves; equal distances resolve downward and the result stays in 0..=127.
pub fn quantize_to_scale(note: u8, root: u8, mode: ScaleMode) -> u8 {
    let relative = note as i32 - root as i32;
    // The root is in every scale, so a degree always lies within a tritone
    let shift = (0..=6)
        .flat_map(|d| [-d, d])
        .find(|d| mode.contains(relative + d))
        .unwrap_or(0);
    (note as i32 + shift).clamp(0, 127) as u8
}

/// Maps a computed note onto the track's scale, called once per note-on
pub trait ScaleQuantizer {
    fn quantize(&self, note: u8, scale: ScaleMode, root: u8) -> u8;
}

/// Nearest-degree quantizer backed by `quantize_to_scale`
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestDegree;

impl ScaleQuantizer for NearestDegree {
    fn quantize(&self, note: u8, scale: ScaleMode, root: u8) -> u8 {
        quantize_to_scale(note, root, scale)
    }
}
