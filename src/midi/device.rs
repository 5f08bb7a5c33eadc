// MIDI device collaborator
//
// Binding to real MIDI hardware lives outside this crate. The graph only
// needs something it can pull one block of input events from and push one
// block of output events to.

use super::buffer::MidiEventBuffer;
use super::event::MidiEventTimed;
use crate::audio::process_info::ProcessInfo;

/// A MIDI port as seen from the processing graph.
///
/// Both methods are called on the audio thread: implementations must not
/// block, allocate or perform I/O (use a lock-free queue to hand events to
/// the driver thread).
pub trait MidiDevice: Send + Sync {
    fn name(&self) -> &str;

    /// Fill `dest` with the events received for this block
    fn read_events(&self, info: &ProcessInfo, dest: &mut MidiEventBuffer) {
        let _ = (info, dest);
    }

    /// Deliver the events produced for this block
    fn write_events(&self, info: &ProcessInfo, events: &[MidiEventTimed]) {
        let _ = (info, events);
    }
}
