// Playing notes - which (channel, pitch) pairs are currently sounding
//
// Written by the audio thread (one store per note-on/note-off), read by the
// UI thread at any time. A flat grid of atomic velocities: no lock, no
// allocation on the writer side.

use crate::midi::event::MidiEvent;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

const CHANNELS: usize = 16;
const PITCHES: usize = 128;

/// Snapshot entry of a sounding note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayingNoteInfo {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
}

#[derive(Debug)]
pub struct PlayingNoteRegistry {
    /// Velocity per (channel, pitch), 0 = not sounding
    slots: Box<[AtomicU8]>,
    sounding: AtomicUsize,
}

impl PlayingNoteRegistry {
    pub fn new() -> Self {
        let slots = (0..CHANNELS * PITCHES)
            .map(|_| AtomicU8::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            sounding: AtomicUsize::new(0),
        }
    }

    fn slot(&self, channel: u8, pitch: u8) -> &AtomicU8 {
        let index = (channel as usize & 0x0F) * PITCHES + (pitch as usize & 0x7F);
        &self.slots[index]
    }

    /// Open (or re-open) the entry for (channel, pitch)
    pub fn open(&self, channel: u8, pitch: u8, velocity: u8) {
        // A zero velocity would read as "silent"
        let velocity = velocity.clamp(1, 127);
        if self.slot(channel, pitch).swap(velocity, Ordering::AcqRel) == 0 {
            self.sounding.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn close(&self, channel: u8, pitch: u8) {
        if self.slot(channel, pitch).swap(0, Ordering::AcqRel) != 0 {
            self.sounding.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(0, Ordering::Release);
        }
        self.sounding.store(0, Ordering::Release);
    }

    /// Apply a MIDI event: note-on opens, note-off (or a zero-velocity
    /// note-on) closes, all-notes-off clears
    pub fn apply(&self, event: &MidiEvent) {
        match *event {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } if velocity > 0 => self.open(channel, note, velocity),
            MidiEvent::NoteOn { channel, note, .. } | MidiEvent::NoteOff { channel, note, .. } => {
                self.close(channel, note)
            }
            _ if event.is_all_notes_off() => self.clear(),
            _ => {}
        }
    }

    pub fn any(&self) -> bool {
        self.sounding.load(Ordering::Acquire) > 0
    }

    pub fn is_playing(&self, channel: u8, pitch: u8) -> bool {
        self.slot(channel, pitch).load(Ordering::Acquire) != 0
    }

    /// Read-only copy for the UI, ordered by channel then pitch
    pub fn snapshot(&self) -> Vec<PlayingNoteInfo> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let velocity = slot.load(Ordering::Acquire);
                (velocity != 0).then(|| PlayingNoteInfo {
                    channel: (index / PITCHES) as u8,
                    pitch: (index % PITCHES) as u8,
                    velocity,
                })
            })
            .collect()
    }
}

impl Default for PlayingNoteRegistry {
    fn default() -> Self {
        Self::new()
    }
}
