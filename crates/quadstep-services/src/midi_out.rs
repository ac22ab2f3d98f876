//! MIDI transport: a bounded channel between the scheduler and the host port

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use quadstep_core::{MidiMessage, MidiOutput};
use tracing::{trace, warn};

/// Fire-and-forget MIDI sink. Never blocks; drops messages when the queue is full.
#[derive(Clone)]
pub struct ChannelOutput {
    tx: Sender<MidiMessage>,
    dropped: Arc<AtomicU64>,
}

impl ChannelOutput {
    /// Create the sink and the receiving end for the host's MIDI port
    pub fn new(capacity: usize) -> (Self, Receiver<MidiMessage>) {
        let (tx, rx) = bounded(capacity.max(1));
        let output = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (output, rx)
    }

    /// Messages lost to a full or disconnected queue
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl MidiOutput for ChannelOutput {
    fn send(&mut self, message: MidiMessage) {
        match self.tx.try_send(message) {
            Ok(()) => trace!(?message, "MIDI out"),
            Err(TrySendError::Full(message)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(?message, dropped, "MIDI queue full, message dropped");
            }
            Err(TrySendError::Disconnected(message)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(?message, "MIDI receiver gone, message dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_arrive_in_order() {
        let (mut out, rx) = ChannelOutput::new(8);
        out.note_on(0, 60, 88);
        out.control_change(1, 16, 40);
        out.note_off(0, 60, 0);

        let received: Vec<MidiMessage> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                MidiMessage::NoteOn { channel: 0, note: 60, velocity: 88 },
                MidiMessage::ControlChange { channel: 1, controller: 16, value: 40 },
                MidiMessage::NoteOff { channel: 0, note: 60, velocity: 0 },
            ]
        );
        assert_eq!(out.dropped(), 0);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (mut out, rx) = ChannelOutput::new(2);
        for note in 0..5 {
            out.note_on(0, note, 100);
        }
        assert_eq!(rx.len(), 2);
        assert_eq!(out.dropped(), 3);
    }

    #[test]
    fn test_disconnected_receiver_counts_drops() {
        let (mut out, rx) = ChannelOutput::new(2);
        drop(rx);
        out.note_off(3, 64, 0);
        assert_eq!(out.dropped(), 1);
    }
}
