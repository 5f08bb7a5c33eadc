// Note representation for the sequencer
// A note is a pitch/velocity pair placed on the tick timeline

use crate::sequencer::timeline::Tick;
use serde::{Deserialize, Serialize};

/// A musical note in a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    /// Start position in ticks
    pub position: Tick,

    /// Duration in ticks (0 = note-off right after the note-on)
    pub length: Tick,

    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,

    /// MIDI velocity (0-127)
    pub velocity: u8,
}

impl Note {
    /// Creates a new note
    pub fn new(position: Tick, length: Tick, pitch: u8, velocity: u8) -> Self {
        assert!(pitch <= 127, "MIDI pitch must be 0-127");
        assert!(velocity <= 127, "MIDI velocity must be 0-127");
        assert!(length >= 0, "Note length must be >= 0");

        Self {
            position,
            length,
            pitch,
            velocity,
        }
    }

    /// Tick at which the note-off is due
    pub fn end(&self) -> Tick {
        self.position + self.length
    }

    /// Check if this note sounds at a given tick
    pub fn contains_tick(&self, tick: Tick) -> bool {
        tick >= self.position && tick < self.end()
    }

    /// Get the note name (e.g., "C4", "A#5")
    pub fn note_name(&self) -> String {
        const NOTE_NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];

        let octave = (self.pitch / 12) as i32 - 1;
        let note_index = (self.pitch % 12) as usize;

        format!("{}{}", NOTE_NAMES[note_index], octave)
    }
}
