//! Transport state and the master clock driver

use serde::{Deserialize, Serialize};

use crate::algorithms::ScaleQuantizer;
use crate::divider::PPQN;
use crate::midi::MidiOutput;
use crate::random::RandomSource;
use crate::scheduler::Pass;
use crate::sequencer::Sequencer;

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;

/// Monotonic milliseconds since start
pub trait WallClock {
    fn now_ms(&self) -> u64;
}

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

/// How the clock reference moves when a tick fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimingMode {
    /// Reference jumps to the poll time; jitter accumulates as phase drift
    #[default]
    RebaseToNow,
    /// Reference advances by exactly one period; late polls catch up tick by tick
    FixedPeriod,
}

/// Turns a tempo into 24 PPQN ticks by polling a wall clock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockDriver {
    bpm: f64,
    pub timing: TimingMode,
    last_fire_ms: u64,
}

impl Default for ClockDriver {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl ClockDriver {
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm: bpm.clamp(MIN_BPM, MAX_BPM),
            timing: TimingMode::default(),
            last_fire_ms: 0,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    /// Period of one master tick, truncated to whole milliseconds
    pub fn clock_period_ms(&self) -> u64 {
        ((60.0 / self.bpm / PPQN as f64) * 1000.0) as u64
    }

    pub fn last_fire_ms(&self) -> u64 {
        self.last_fire_ms
    }

    /// Restart timing from `now_ms`
    pub fn reset(&mut self, now_ms: u64) {
        self.last_fire_ms = now_ms;
    }

    /// Returns the clock period when a tick is due
    pub fn poll(&mut self, now_ms: u64) -> Option<u64> {
        let period = self.clock_period_ms();
        if now_ms.saturating_sub(self.last_fire_ms) <= period {
            return None;
        }
        self.last_fire_ms = match self.timing {
            TimingMode::RebaseToNow => now_ms,
            TimingMode::FixedPeriod => self.last_fire_ms + period,
        };
        Some(period)
    }
}

/// Transport controls wrapped around the clock driver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transport {
    pub state: TransportState,
    pub clock: ClockDriver,
}

impl Transport {
    pub fn new(bpm: f64, timing: TimingMode) -> Self {
        let mut clock = ClockDriver::new(bpm);
        clock.timing = timing;
        Self {
            state: TransportState::Stopped,
            clock,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Start from the top: lanes realigned, clock referenced to `now_ms`
    pub fn play(&mut self, sequencer: &mut Sequencer, now_ms: u64) {
        sequencer.sync_sequencers();
        self.clock.reset(now_ms);
        self.state = TransportState::Playing;
    }

    /// Stop and silence every sounding note
    pub fn stop(&mut self, sequencer: &mut Sequencer, output: &mut impl MidiOutput) {
        self.state = TransportState::Stopped;
        sequencer.all_notes_off(output);
    }

    /// Poll the clock and run a scheduling pass when a tick is due.
    /// Returns whether a pass ran.
    pub fn tick<O, R, Q>(
        &mut self,
        now_ms: u64,
        sequencer: &mut Sequencer,
        output: &mut O,
        rng: &mut R,
        quantizer: &Q,
    ) -> bool
    where
        O: MidiOutput,
        R: RandomSource,
        Q: ScaleQuantizer,
    {
        if !self.is_playing() {
            return false;
        }
        let Some(clock_period_ms) = self.clock.poll(now_ms) else {
            return false;
        };
        let mut pass = Pass {
            now_ms,
            clock_period_ms,
            output,
            rng,
            quantizer,
        };
        sequencer.clock_tick(&mut pass);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::NearestDegree;
    use crate::midi::MidiMessage;

    #[test]
    fn test_clock_period() {
        assert_eq!(ClockDriver::new(120.0).clock_period_ms(), 20);
        assert_eq!(ClockDriver::new(60.0).clock_period_ms(), 41);
        assert_eq!(ClockDriver::new(1000.0).bpm(), MAX_BPM);
    }

    #[test]
    fn test_poll_fires_after_a_full_period() {
        let mut clock = ClockDriver::new(120.0);
        clock.reset(100);
        assert_eq!(clock.poll(110), None);
        assert_eq!(clock.poll(120), None);
        assert_eq!(clock.poll(121), Some(20));
        assert_eq!(clock.last_fire_ms(), 121);
        assert_eq!(clock.poll(135), None);
    }

    #[test]
    fn test_rebase_drifts_under_jitter() {
        let mut clock = ClockDriver::new(120.0);
        clock.reset(0);
        // Polled late every time: each tick lands 5ms after the previous
        let mut now = 0;
        for _ in 0..10 {
            now += 25;
            assert!(clock.poll(now).is_some());
        }
        assert_eq!(clock.last_fire_ms(), 250);
    }

    #[test]
    fn test_fixed_period_keeps_phase() {
        let mut clock = ClockDriver::new(120.0);
        clock.timing = TimingMode::FixedPeriod;
        clock.reset(0);
        assert_eq!(clock.poll(25), Some(20));
        assert_eq!(clock.last_fire_ms(), 20);
        assert_eq!(clock.poll(41), Some(20));
        assert_eq!(clock.last_fire_ms(), 40);
    }

    #[test]
    fn test_stopped_transport_does_not_tick() {
        let mut transport = Transport::default();
        let mut seq = Sequencer::new();
        let mut out: Vec<MidiMessage> = Vec::new();
        let mut rng = fastrand::Rng::with_seed(1);
        assert!(!transport.tick(1000, &mut seq, &mut out, &mut rng, &NearestDegree));
    }

    #[test]
    fn test_play_tick_stop() {
        let mut transport = Transport::new(120.0, TimingMode::RebaseToNow);
        let mut seq = Sequencer::new();
        let mut out: Vec<MidiMessage> = Vec::new();
        let mut rng = fastrand::Rng::with_seed(1);

        transport.play(&mut seq, 0);
        let mut now = 0;
        let mut passes = 0;
        while passes < 24 {
            now += 1;
            if transport.tick(now, &mut seq, &mut out, &mut rng, &NearestDegree) {
                passes += 1;
            }
        }
        assert_eq!(now, 24 * 21);
        assert_eq!(out.iter().filter(|m| m.is_note_on()).count(), 4);

        out.clear();
        transport.stop(&mut seq, &mut out);
        assert!(!transport.is_playing());
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|m| m.is_note_off()));
    }
}
