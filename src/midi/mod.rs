// MIDI module - events, block buffers and the device collaborator

pub mod buffer;
pub mod device;
pub mod event;

pub use buffer::MidiEventBuffer;
pub use device::MidiDevice;
pub use event::{MidiEvent, MidiEventTimed};
