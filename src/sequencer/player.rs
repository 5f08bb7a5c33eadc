// Sequence Player - turns sequence notes into sample-accurate MIDI events
//
// Called once per sub-block (see `audio::block_plan`). Note-ons are emitted
// for every note starting inside the sub-block; a note-off either lands in
// the same sub-block or waits in the pending list until the sub-block that
// contains its end tick. At a loop seam the pending note-offs are clipped
// to the last frame before the seam.
//
// Real-time constraints: the pending list is allocated once, events go to
// a fixed-capacity buffer, sequences are read through the published
// snapshot.

use crate::audio::block_plan::{Segment, frame_floor};
use crate::midi::buffer::MidiEventBuffer;
use crate::midi::event::{MidiEvent, MidiEventTimed};
use crate::sequencer::sequence::Sequence;
use crate::sequencer::time_service::MusicalTimeService;
use std::sync::Arc;

/// Note-on sent, note-off still ahead
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingNoteOff {
    channel: u8,
    pitch: u8,
    end_tick: f64,
}

/// Sequence player - converts sequence notes to timed MIDI events
#[derive(Debug)]
pub struct SequencePlayer {
    pending: Vec<PendingNoteOff>,
    capacity: usize,
}

impl SequencePlayer {
    /// Room for `capacity` pending note-offs; a note whose off does not fit
    /// is ended at the last frame of its sub-block
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop every pending note-off without emitting it
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Emit every pending note-off at `offset` (playhead relocation)
    pub fn flush_pending(&mut self, dest: &mut MidiEventBuffer, offset: u32) {
        for pending in self.pending.drain(..) {
            dest.push_sorted(MidiEventTimed::new(
                MidiEvent::note_off(pending.channel, pending.pitch, 0),
                offset,
            ));
        }
    }

    /// Schedule one sub-block of a device block of `frames` frames.
    /// Event offsets written to `dest` are relative to the device block.
    pub fn schedule(
        &mut self,
        time: &impl MusicalTimeService,
        segment: &Segment,
        frames: usize,
        sequences: &[Arc<Sequence>],
        dest: &mut MidiEventBuffer,
    ) {
        if frames == 0 {
            return;
        }
        let placement = Placement::new(time, segment, frames);

        // Note-offs carried over from earlier sub-blocks
        let mut i = 0;
        while i < self.pending.len() {
            let pending = self.pending[i];
            if pending.end_tick < segment.end_tick {
                let offset = placement.offset_of(time, pending.end_tick.max(segment.start_tick));
                dest.push_sorted(MidiEventTimed::new(
                    MidiEvent::note_off(pending.channel, pending.pitch, 0),
                    offset,
                ));
                self.pending.swap_remove(i);
            } else {
                i += 1;
            }
        }

        for sequence in sequences {
            let channel = sequence.channel();
            for note in sequence.notes_in_range(segment.start_tick, segment.end_tick) {
                let on_offset = placement.offset_of(time, note.position as f64);
                dest.push_sorted(MidiEventTimed::new(
                    MidiEvent::note_on(channel, note.pitch, note.velocity),
                    on_offset,
                ));

                let end_tick = note.end() as f64;
                if end_tick < segment.end_tick {
                    let off_offset = placement.offset_of(time, end_tick);
                    dest.push_sorted(MidiEventTimed::new(
                        MidiEvent::note_off(channel, note.pitch, 0),
                        off_offset,
                    ));
                } else if self.pending.len() < self.capacity {
                    self.pending.push(PendingNoteOff {
                        channel,
                        pitch: note.pitch,
                        end_tick,
                    });
                } else {
                    dest.push_sorted(MidiEventTimed::new(
                        MidiEvent::note_off(channel, note.pitch, 0),
                        placement.last,
                    ));
                }
            }
        }

        // Nothing may sound across the seam
        if segment.at_seam {
            self.flush_pending(dest, placement.last);
        }
    }
}

/// Maps ticks inside one segment to device-block frames
struct Placement {
    start_sample: f64,
    first: u32,
    last: u32,
}

impl Placement {
    fn new(time: &impl MusicalTimeService, segment: &Segment, frames: usize) -> Self {
        let max_frame = frames.saturating_sub(1);
        Self {
            start_sample: time.tick_to_sample(segment.start_tick),
            first: segment.offset.min(max_frame) as u32,
            last: segment.last_frame().min(max_frame) as u32,
        }
    }

    fn offset_of(&self, time: &impl MusicalTimeService, tick: f64) -> u32 {
        let relative = frame_floor(time.tick_to_sample(tick) - self.start_sample).max(0);
        let offset = (self.first as i64 + relative).min(self.last as i64);
        offset.max(self.first as i64) as u32
    }
}
