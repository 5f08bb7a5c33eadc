// Live note commands - control threads → audio thread

use crate::midi::event::MidiEvent;

/// Default velocity of an auditioned note
pub const DEFAULT_SAMPLE_NOTE_VELOCITY: u8 = 64;

/// A "sample note": a note triggered live (piano roll preview, on-screen
/// keyboard), independent of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleNoteCommand {
    On { channel: u8, pitch: u8, velocity: u8 },
    Off { channel: u8, pitch: u8, velocity: u8 },
}

impl SampleNoteCommand {
    pub fn to_midi(self) -> MidiEvent {
        match self {
            SampleNoteCommand::On {
                channel,
                pitch,
                velocity,
            } => MidiEvent::note_on(channel, pitch, velocity),
            SampleNoteCommand::Off {
                channel,
                pitch,
                velocity,
            } => MidiEvent::note_off(channel, pitch, velocity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_midi() {
        let on = SampleNoteCommand::On {
            channel: 1,
            pitch: 60,
            velocity: DEFAULT_SAMPLE_NOTE_VELOCITY,
        };
        assert_eq!(on.to_midi(), MidiEvent::note_on(1, 60, 64));

        let off = SampleNoteCommand::Off {
            channel: 1,
            pitch: 60,
            velocity: 10,
        };
        assert_eq!(off.to_midi(), MidiEvent::note_off(1, 60, 10));
    }
}
