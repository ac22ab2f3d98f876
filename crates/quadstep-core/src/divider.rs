//! Clock divider table at 24 pulses per quarter note

/// Master clock resolution (MIDI clock)
pub const PPQN: u32 = 24;

/// Ticks per step for each divider index, fastest first
pub const DIVIDER_TICKS: [u16; 26] = [
    3, 4, 6, 8, 12, 16, 24, 36, 48, 72, 96, 120, 144, 168, 192, 216, 240, 264, 288, 312, 336,
    360, 384, 768, 1536, 3072,
];

/// Display labels matching `DIVIDER_TICKS`
pub const DIVIDER_LABELS: [&str; 26] = [
    " 8x", " 6x", " 4x", " 3x", " 2x", "1.5x", " 1x", "/1.5", " /2", " /3", " /4", " /5", " /6",
    " /7", " /8", " /9", " /10", " /11", " /12", " /13", " /14", " /15", " /16", " /32", " /64",
    " /128",
];

/// Divider index for one step per quarter note
pub const DEFAULT_DIVIDER: usize = 6;

/// Tick count for a divider index.
///
/// Panics if `divider` is outside the table; callers keep lanes normalized.
pub fn ticks(divider: usize) -> u16 {
    DIVIDER_TICKS[divider]
}

pub fn label(divider: usize) -> &'static str {
    DIVIDER_LABELS[divider]
}

/// Largest valid divider index
pub fn max_divider() -> usize {
    DIVIDER_TICKS.len() - 1
}
