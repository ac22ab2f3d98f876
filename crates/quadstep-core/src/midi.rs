//! MIDI messages emitted by the scheduler and the transport seam they go through

use serde::{Deserialize, Serialize};

/// A MIDI message intent. Channels are 0-indexed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiMessage {
    pub fn channel(&self) -> u8 {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::ControlChange { channel, .. } => channel,
        }
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { .. })
    }

    pub fn is_note_off(&self) -> bool {
        matches!(self, Self::NoteOff { .. })
    }
}

/// Fire-and-forget MIDI transport
pub trait MidiOutput {
    fn send(&mut self, message: MidiMessage);

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.send(MidiMessage::NoteOn { channel, note, velocity });
    }

    fn note_off(&mut self, channel: u8, note: u8, velocity: u8) {
        self.send(MidiMessage::NoteOff { channel, note, velocity });
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        self.send(MidiMessage::ControlChange { channel, controller, value });
    }
}

/// Collects messages in order; used by hosts that batch and by tests
impl MidiOutput for Vec<MidiMessage> {
    fn send(&mut self, message: MidiMessage) {
        self.push(message);
    }
}
