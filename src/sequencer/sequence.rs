// Sequence - Ordered collection of notes for one track
//
// Notes are kept sorted by position on insertion, so a range query is two
// binary searches and returns a borrowed slice (no allocation on the
// audio thread).

use crate::sequencer::note::Note;
use crate::sequencer::timeline::Tick;
use serde::{Deserialize, Serialize};

/// A named, position-ordered list of notes played on one MIDI channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Sequence name
    pub name: String,

    /// MIDI channel (0-15) the notes are played on
    channel: u8,

    notes: Vec<Note>,
}

impl Sequence {
    /// Create a new empty sequence on channel 0
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: 0,
            notes: Vec::new(),
        }
    }

    /// Builder: play this sequence on another MIDI channel
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.set_channel(channel);
        self
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Set the MIDI channel; values above 15 are masked into range
    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel & 0x0F;
    }

    /// Get all notes, ordered by position
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Add a note. Notes at the same position keep insertion order.
    pub fn add_note(&mut self, note: Note) {
        let insert_pos = self.notes.partition_point(|n| n.position <= note.position);
        self.notes.insert(insert_pos, note);
    }

    /// Remove the first note equal to `note`
    pub fn remove_note(&mut self, note: &Note) -> bool {
        let first = self.notes.partition_point(|n| n.position < note.position);
        let found = self.notes[first..]
            .iter()
            .take_while(|n| n.position == note.position)
            .position(|n| n == note);

        match found {
            Some(offset) => {
                self.notes.remove(first + offset);
                true
            }
            None => false,
        }
    }

    /// Remove a note by index
    pub fn remove_note_at(&mut self, index: usize) -> Option<Note> {
        if index < self.notes.len() {
            Some(self.notes.remove(index))
        } else {
            None
        }
    }

    /// Every note whose position lies in `[start, end)`, in position order.
    ///
    /// Bounds are fractional ticks so consecutive blocks can query
    /// `[a, b)`, `[b, c)` without rounding: a note is returned by exactly one
    /// of them.
    pub fn notes_in_range(&self, start: f64, end: f64) -> &[Note] {
        if end <= start {
            return &[];
        }
        let first = self.notes.partition_point(|n| (n.position as f64) < start);
        let last = self.notes.partition_point(|n| (n.position as f64) < end);
        &self.notes[first..last.max(first)]
    }

    /// Tick at which the last note ends (0 when empty)
    pub fn end_tick(&self) -> Tick {
        self.notes.iter().map(|n| n.end()).max().unwrap_or(0)
    }

    /// Clear all notes
    pub fn clear(&mut self) {
        self.notes.clear();
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence_with(positions: &[Tick]) -> Sequence {
        let mut seq = Sequence::new("Test");
        for (i, pos) in positions.iter().enumerate() {
            seq.add_note(Note::new(*pos, 120, 60 + i as u8, 100));
        }
        seq
    }

    #[test]
    fn test_notes_sorted_on_insert() {
        let seq = sequence_with(&[960, 0, 480, 480]);
        let positions: Vec<Tick> = seq.notes().iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 480, 480, 960]);

        // Equal positions keep insertion order (pitch 62 then 63)
        assert_eq!(seq.notes()[1].pitch, 62);
        assert_eq!(seq.notes()[2].pitch, 63);
    }

    #[test]
    fn test_notes_in_range_half_open() {
        let seq = sequence_with(&[0, 100, 200, 300]);

        let hits = seq.notes_in_range(100.0, 300.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 100);
        assert_eq!(hits[1].position, 200);

        assert!(seq.notes_in_range(300.5, 1000.0).is_empty());
        assert!(seq.notes_in_range(50.0, 50.0).is_empty());
        assert!(seq.notes_in_range(60.0, 10.0).is_empty());
    }

    #[test]
    fn test_adjacent_ranges_never_duplicate_or_skip() {
        let seq = sequence_with(&[0, 7, 13, 14, 50, 99]);
        let mut seen = 0;
        let mut start = 0.0;
        while start < 120.0 {
            let end = start + 6.37;
            seen += seq.notes_in_range(start, end).len();
            start = end;
        }
        assert_eq!(seen, seq.note_count());
    }

    #[test]
    fn test_remove_note() {
        let mut seq = Sequence::new("Test");
        let a = Note::new(0, 10, 60, 100);
        let b = Note::new(0, 10, 64, 100);
        seq.add_note(a);
        seq.add_note(b);

        assert!(seq.remove_note(&b));
        assert!(!seq.remove_note(&b));
        assert_eq!(seq.notes(), &[a]);

        assert_eq!(seq.remove_note_at(0), Some(a));
        assert_eq!(seq.remove_note_at(0), None);
        assert!(seq.is_empty());
    }

    #[test]
    fn test_channel_masked() {
        let seq = Sequence::new("Bass").with_channel(17);
        assert_eq!(seq.channel(), 1);
    }

    #[test]
    fn test_end_tick() {
        let seq = sequence_with(&[0, 960]);
        assert_eq!(seq.end_tick(), 1080);
        assert_eq!(Sequence::new("Empty").end_tick(), 0);
    }
}
