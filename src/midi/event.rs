// MIDI event types

/// Controller number of the "All Notes Off" channel mode message
pub const CC_ALL_NOTES_OFF: u8 = 123;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: i16 },
    /// Silence every sounding note on every channel of the receiver
    AllNotesOff,
}

impl MidiEvent {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        MidiEvent::NoteOn {
            channel: channel & 0x0F,
            note: note & 0x7F,
            velocity: velocity & 0x7F,
        }
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        MidiEvent::NoteOff {
            channel: channel & 0x0F,
            note: note & 0x7F,
            velocity: velocity & 0x7F,
        }
    }

    /// Channel of a channel voice message (`None` for `AllNotesOff`)
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. } => Some(channel),
            MidiEvent::AllNotesOff => None,
        }
    }

    /// True for CC 123 as well as the dedicated variant
    pub fn is_all_notes_off(&self) -> bool {
        matches!(
            self,
            MidiEvent::AllNotesOff
                | MidiEvent::ControlChange {
                    controller: CC_ALL_NOTES_OFF,
                    ..
                }
        )
    }
}

/// MIDI event with sample-accurate timing
/// `sample_offset` is relative to the first sample of the block (or
/// sub-block) the event is delivered with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEventTimed {
    pub event: MidiEvent,
    pub sample_offset: u32,
}

impl MidiEventTimed {
    pub fn new(event: MidiEvent, sample_offset: u32) -> Self {
        Self {
            event,
            sample_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_mask_ranges() {
        match MidiEvent::note_on(17, 200, 130) {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => {
                assert_eq!(channel, 1);
                assert_eq!(note, 72);
                assert_eq!(velocity, 2);
            }
            _ => panic!("Expected NoteOn"),
        }
    }

    #[test]
    fn test_channel() {
        assert_eq!(MidiEvent::note_off(9, 36, 0).channel(), Some(9));
        assert_eq!(MidiEvent::AllNotesOff.channel(), None);
    }

    #[test]
    fn test_all_notes_off_detection() {
        assert!(MidiEvent::AllNotesOff.is_all_notes_off());
        assert!(
            MidiEvent::ControlChange {
                channel: 3,
                controller: CC_ALL_NOTES_OFF,
                value: 0
            }
            .is_all_notes_off()
        );
        assert!(!MidiEvent::note_on(0, 60, 100).is_all_notes_off());
    }
}
