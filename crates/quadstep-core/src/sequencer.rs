//! The sequencer context: every track, its lanes and its playback state

use serde::{Deserialize, Serialize};

use crate::algorithms::{ScaleMode, ScaleQuantizer};
use crate::error::{Result, SequencerError};
use crate::lane::{LaneSnapshot, Role, SequenceTrack};
use crate::midi::MidiOutput;
use crate::random::RandomSource;
use crate::scheduler::{self, Pass, TrackRuntime};

/// Musical tracks on the device
pub const TRACKS: usize = 4;

/// Per-track output routing and switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackSettings {
    pub enabled: bool,
    pub mod_enabled: bool,
    /// 1-based MIDI channel for notes
    pub midi_channel: u8,
    /// 1-based MIDI channel for controller changes
    pub cc_channel: u8,
    pub scale: ScaleMode,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self::for_track(0)
    }
}

impl TrackSettings {
    pub fn for_track(track: usize) -> Self {
        let channel = (track as u8 % 16) + 1;
        Self {
            enabled: true,
            mod_enabled: true,
            midi_channel: channel,
            cc_channel: channel,
            scale: ScaleMode::Chromatic,
        }
    }

    /// 0-indexed note channel as sent on the wire
    pub fn note_channel(&self) -> u8 {
        self.midi_channel.clamp(1, 16) - 1
    }

    /// 0-indexed controller channel as sent on the wire
    pub fn cc_wire_channel(&self) -> u8 {
        self.cc_channel.clamp(1, 16) - 1
    }
}

/// One musical track: a lane per role plus its playback state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub lanes: [SequenceTrack; 7],
    pub settings: TrackSettings,
    pub runtime: TrackRuntime,
}

impl Track {
    pub fn new(index: usize) -> Self {
        Self {
            lanes: Role::ALL.map(|role| SequenceTrack::new(role, index)),
            settings: TrackSettings::for_track(index),
            runtime: TrackRuntime::default(),
        }
    }

    pub fn lane(&self, role: Role) -> &SequenceTrack {
        &self.lanes[role.index()]
    }

    pub fn lane_mut(&mut self, role: Role) -> &mut SequenceTrack {
        &mut self.lanes[role.index()]
    }
}

/// Owns every track; all scheduling and editing goes through here
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequencer {
    tracks: [Track; TRACKS],
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            tracks: std::array::from_fn(Track::new),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn track(&self, track: usize) -> Result<&Track> {
        self.tracks.get(track).ok_or(SequencerError::TrackNotFound(track))
    }

    pub fn track_mut(&mut self, track: usize) -> Result<&mut Track> {
        self.tracks.get_mut(track).ok_or(SequencerError::TrackNotFound(track))
    }

    pub fn lane(&self, track: usize, role: Role) -> Result<&SequenceTrack> {
        Ok(self.track(track)?.lane(role))
    }

    pub fn lane_mut(&mut self, track: usize, role: Role) -> Result<&mut SequenceTrack> {
        Ok(self.track_mut(track)?.lane_mut(role))
    }

    pub fn snapshot(&self, track: usize, role: Role) -> Result<LaneSnapshot> {
        Ok(self.lane(track, role)?.snapshot())
    }

    /// One master clock tick across every track and role
    pub fn clock_tick<O, R, Q>(&mut self, pass: &mut Pass<'_, O, R, Q>)
    where
        O: MidiOutput,
        R: RandomSource,
        Q: ScaleQuantizer,
    {
        for track in &mut self.tracks {
            scheduler::clock_track(track, pass);
        }
    }

    /// Realign every lane to its window start, e.g. after a transport restart
    pub fn sync_sequencers(&mut self) {
        for track in &mut self.tracks {
            for lane in &mut track.lanes {
                lane.reset_playhead();
            }
        }
    }

    /// Note-off for every track's sounding note
    pub fn all_notes_off(&mut self, output: &mut impl MidiOutput) {
        for track in &mut self.tracks {
            scheduler::silence_track(track, output);
        }
    }

    /// Restore lane invariants on every track after an edit
    pub fn normalize(&mut self) {
        for track in &mut self.tracks {
            for lane in &mut track.lanes {
                lane.normalize();
            }
        }
    }

    /// Project the probability lane's Euclidean settings onto its values
    pub fn apply_euclidean(&mut self, track: usize) -> Result<()> {
        self.lane_mut(track, Role::Probability)?.apply_euclidean();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::NearestDegree;
    use crate::midi::MidiMessage;

    fn tick(seq: &mut Sequencer, out: &mut Vec<MidiMessage>, rng: &mut fastrand::Rng, now_ms: u64) {
        let mut pass = Pass {
            now_ms,
            clock_period_ms: 20,
            output: out,
            rng,
            quantizer: &NearestDegree,
        };
        seq.clock_tick(&mut pass);
    }

    #[test]
    fn test_tracks_get_own_channels_and_controllers() {
        let seq = Sequencer::new();
        for (i, track) in seq.tracks().iter().enumerate() {
            assert_eq!(track.settings.note_channel(), i as u8);
            assert_eq!(track.lane(Role::Mods).anchor.controller(), Some(16 + i as u8));
        }
    }

    #[test]
    fn test_missing_track() {
        let mut seq = Sequencer::new();
        assert_eq!(seq.track(TRACKS).err(), Some(SequencerError::TrackNotFound(TRACKS)));
        assert!(seq.lane_mut(9, Role::Gates).is_err());
        assert!(seq.apply_euclidean(7).is_err());
    }

    #[test]
    fn test_all_tracks_fire_on_the_same_tick() {
        let mut seq = Sequencer::new();
        let mut rng = fastrand::Rng::with_seed(11);
        let mut out = Vec::new();
        for pass in 1..=24 {
            tick(&mut seq, &mut out, &mut rng, pass * 20);
        }
        let channels: Vec<u8> = out.iter().map(|m| m.channel()).collect();
        assert_eq!(channels, vec![0, 1, 2, 3]);
        assert!(out.iter().all(|m| m.is_note_on()));
    }

    #[test]
    fn test_sync_realigns_every_role() {
        let mut seq = Sequencer::new();
        let mut rng = fastrand::Rng::with_seed(11);
        let mut out = Vec::new();
        seq.lane_mut(1, Role::Mods).unwrap().first = 3;
        for pass in 1..=100 {
            tick(&mut seq, &mut out, &mut rng, pass * 20);
        }
        seq.sync_sequencers();
        for (t, track) in seq.tracks().iter().enumerate() {
            for lane in &track.lanes {
                let expected = if t == 1 && lane.role == Role::Mods { 3 } else { 0 };
                assert_eq!(lane.index, expected);
                assert_eq!(lane.ticks_remaining, 24);
            }
        }
    }

    #[test]
    fn test_all_notes_off() {
        let mut seq = Sequencer::new();
        let mut rng = fastrand::Rng::with_seed(11);
        let mut out = Vec::new();
        for pass in 1..=24 {
            tick(&mut seq, &mut out, &mut rng, pass * 20);
        }
        out.clear();
        seq.all_notes_off(&mut out);
        assert_eq!(out.len(), TRACKS);
        assert!(out.iter().all(|m| m.is_note_off()));
        assert!(seq.tracks().iter().all(|t| !t.runtime.is_sounding()));

        out.clear();
        seq.all_notes_off(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_apply_euclidean_on_track() {
        let mut seq = Sequencer::new();
        seq.lane_mut(2, Role::Probability).unwrap().set_euclidean(4, 4).unwrap();
        seq.apply_euclidean(2).unwrap();
        let lane = seq.lane(2, Role::Probability).unwrap();
        assert_eq!(lane.last, 3);
        assert_eq!(&lane.values[..4], &[9, 9, 9, 9]);
    }
}
