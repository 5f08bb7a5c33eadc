// MIDI event buffer - fixed capacity, kept ordered by sample offset
//
// Allocated once (engine start); pushes never grow the storage, so the
// buffer is safe to fill on the audio thread.

use super::event::MidiEventTimed;

#[derive(Debug, Clone)]
pub struct MidiEventBuffer {
    events: Vec<MidiEventTimed>,
    capacity: usize,
}

impl MidiEventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn as_slice(&self) -> &[MidiEventTimed] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MidiEventTimed> {
        self.events.iter()
    }

    /// Insert after every event with an offset <= the new one, so events
    /// at equal offsets keep the order they were pushed in.
    /// Returns false (event dropped) when the buffer is full.
    pub fn push_sorted(&mut self, event: MidiEventTimed) -> bool {
        if self.is_full() {
            return false;
        }
        let index = self
            .events
            .partition_point(|e| e.sample_offset <= event.sample_offset);
        self.events.insert(index, event);
        true
    }

    /// Merge already-ordered events, keeping the ordering rule of
    /// [`push_sorted`](Self::push_sorted). Returns the number dropped.
    pub fn merge(&mut self, events: &[MidiEventTimed]) -> usize {
        let mut dropped = 0;
        for event in events {
            if !self.push_sorted(*event) {
                dropped += 1;
            }
        }
        dropped
    }

    /// Copy events with offsets in `[start, start + len)`, rebased so that
    /// `start` becomes offset 0
    pub fn copy_window(&mut self, source: &MidiEventBuffer, start: u32, len: u32) {
        let end = start.saturating_add(len);
        for event in source.iter() {
            if event.sample_offset >= start && event.sample_offset < end {
                let rebased = MidiEventTimed::new(event.event, event.sample_offset - start);
                if !self.push_sorted(rebased) {
                    break;
                }
            }
        }
    }
}

impl Default for MidiEventBuffer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<'a> IntoIterator for &'a MidiEventBuffer {
    type Item = &'a MidiEventTimed;
    type IntoIter = std::slice::Iter<'a, MidiEventTimed>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
