//! Note scheduling: gates, ratchets, ties and modulation for one track per clock pass

use serde::{Deserialize, Serialize};

use crate::algorithms::ScaleQuantizer;
use crate::lane::{
    Role, DEFAULT_ROOT, GATE_RANGE, PROBABILITY_RANGE, RATCHET_RANGE, VELOCITY_SCALE,
};
use crate::midi::MidiOutput;
use crate::random::RandomSource;
use crate::sequencer::Track;

/// Transient playback state of one musical track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackRuntime {
    /// Note currently sounding, if any
    pub active_note: Option<u8>,
    pub active_velocity: u8,
    /// Length of the note, or of one ratchet half-cycle, in ms
    pub note_length_ms: u64,
    /// A full-length gate is holding the note into the next step
    pub tie: bool,
    /// Counts ratchet half-cycles down to zero; odd counts end a repeat, even counts start one
    pub ratchet_remaining: u8,
    pub note_off_deadline_ms: u64,
    pub last_cc: Option<u8>,
}

impl TrackRuntime {
    pub fn is_sounding(&self) -> bool {
        self.active_note.is_some()
    }

    /// Forget the sounding note; `last_cc` survives so CC dedup keeps working
    pub fn clear_note(&mut self) {
        self.active_note = None;
        self.tie = false;
        self.ratchet_remaining = 0;
    }
}

/// Collaborators and timing for one scheduling pass
pub struct Pass<'a, O, R, Q> {
    pub now_ms: u64,
    pub clock_period_ms: u64,
    pub output: &'a mut O,
    pub rng: &'a mut R,
    pub quantizer: &'a Q,
}

/// Lanes clocked before the gate lane decides whether a note fires
const PRE_GATE_ROLES: [Role; 5] = [
    Role::Notes,
    Role::Offsets,
    Role::Velocities,
    Role::Probability,
    Role::Ratchets,
];

/// Run one clock pass for a track
pub fn clock_track<O, R, Q>(track: &mut Track, pass: &mut Pass<'_, O, R, Q>)
where
    O: MidiOutput,
    R: RandomSource,
    Q: ScaleQuantizer,
{
    for role in PRE_GATE_ROLES {
        track.lane_mut(role).advance(pass.rng);
    }

    if track.lane_mut(Role::Gates).advance(pass.rng).stepped() {
        trigger_step(track, pass);
    }

    release_or_repeat(track, pass);

    if track.lane_mut(Role::Mods).advance(pass.rng).stepped() {
        send_modulation(track, pass);
    }
}

fn trigger_step<O, R, Q>(track: &mut Track, pass: &mut Pass<'_, O, R, Q>)
where
    O: MidiOutput,
    R: RandomSource,
    Q: ScaleQuantizer,
{
    let notes = track.lane(Role::Notes);
    if !notes.current_state().is_active() || !track.settings.enabled {
        return;
    }
    // Draw is 0..=7, so the top two probability levels both always fire
    let probability = track.lane(Role::Probability).current_value();
    if probability <= pass.rng.range(0, PROBABILITY_RANGE as i32 - 1) as i16 {
        return;
    }

    let gates = track.lane(Role::Gates);
    let gate = gates.current_value().max(0) as u64;
    let gate_divider = gates.divider as u64;
    let ratchet = track.lane(Role::Ratchets).current_value().clamp(0, RATCHET_RANGE) as u8;

    let mut note_length = pass.clock_period_ms * gate * gate_divider / GATE_RANGE as u64;
    let mut ratchet_remaining = 0;
    if ratchet > 0 && note_length > 0 {
        // One repeat = on + off half-cycles, counted down to zero
        ratchet_remaining = (ratchet + 1) * 2 - 1;
        note_length = pass.clock_period_ms * gate_divider / (ratchet_remaining as u64 + 1);
    }

    let root = notes.anchor.root().unwrap_or(DEFAULT_ROOT);
    let offsets = track.lane(Role::Offsets);
    let raw_note = notes.current_value() as i32
        + offsets.current_value() as i32 * offsets.current_state().flag() as i32
        + root as i32;
    let velocity = (track.lane(Role::Velocities).current_value() as i32 * VELOCITY_SCALE as i32)
        .clamp(0, 127) as u8;
    let channel = track.settings.note_channel();
    let scale = track.settings.scale;

    let runtime = &mut track.runtime;
    runtime.ratchet_remaining = ratchet_remaining;
    runtime.note_length_ms = note_length;
    runtime.note_off_deadline_ms = pass.now_ms + note_length;

    if note_length > 0 && !runtime.tie {
        let note = pass.quantizer.quantize(raw_note.clamp(0, 127) as u8, scale, root);
        runtime.active_note = Some(note);
        runtime.active_velocity = velocity;
        pass.output.note_on(channel, note, velocity);
    }

    runtime.tie = gate == GATE_RANGE as u64 && ratchet_remaining == 0;
}

fn release_or_repeat<O, R, Q>(track: &mut Track, pass: &mut Pass<'_, O, R, Q>)
where
    O: MidiOutput,
{
    let channel = track.settings.note_channel();
    let runtime = &mut track.runtime;
    if pass.now_ms <= runtime.note_off_deadline_ms {
        return;
    }
    let Some(note) = runtime.active_note else {
        return;
    };

    if !runtime.tie {
        if runtime.ratchet_remaining == 0 {
            pass.output.note_off(channel, note, 0);
            runtime.active_note = None;
        } else {
            if runtime.ratchet_remaining & 1 == 1 {
                pass.output.note_off(channel, note, 0);
            }
            runtime.note_off_deadline_ms = pass.now_ms + runtime.note_length_ms;
        }
    }

    if runtime.ratchet_remaining > 0 && runtime.active_note.is_some() {
        if runtime.ratchet_remaining & 1 == 0 {
            pass.output.note_on(channel, note, runtime.active_velocity);
        }
        runtime.ratchet_remaining -= 1;
        if runtime.ratchet_remaining == 0 {
            runtime.active_note = None;
        }
    }
}

fn send_modulation<O, R, Q>(track: &mut Track, pass: &mut Pass<'_, O, R, Q>)
where
    O: MidiOutput,
{
    if !track.settings.mod_enabled {
        return;
    }
    let mods = track.lane(Role::Mods);
    let value = mods.current_value();
    let Some(controller) = mods.anchor.controller() else {
        return;
    };
    if !(0..=127).contains(&value) || track.runtime.last_cc == Some(value as u8) {
        return;
    }

    let channel = track.settings.cc_wire_channel();
    pass.output.control_change(channel, controller, value as u8);
    track.runtime.last_cc = Some(value as u8);
}

/// Note-off for the track's sounding note, used on abrupt transport stops
pub fn silence_track(track: &mut Track, output: &mut impl MidiOutput) {
    if let Some(note) = track.runtime.active_note {
        output.note_off(track.settings.note_channel(), note, 0);
    }
    track.runtime.clear_note();
}
