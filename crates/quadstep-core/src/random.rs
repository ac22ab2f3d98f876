//! Randomness source for step modes and probability gating

/// Uniform integer draws over a half-open range
pub trait RandomSource {
    /// Draw from `[min, max)`. Returns `min` when the range is empty.
    fn range(&mut self, min: i32, max: i32) -> i32;
}

impl RandomSource for fastrand::Rng {
    fn range(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        self.i32(min..max)
    }
}
