// Sequencer module
// Musical time, sequences, transport and note scheduling

pub mod note;
pub mod player;
pub mod playing_notes;
pub mod sequence;
pub mod tempo_map;
pub mod time_service;
pub mod timeline;
pub mod transport;

pub use note::Note;
pub use player::SequencePlayer;
pub use playing_notes::{PlayingNoteInfo, PlayingNoteRegistry};
pub use sequence::Sequence;
pub use tempo_map::{MeterMap, MeterPoint, TempoMap, TempoPoint};
pub use time_service::{MusicalTimeService, TimeContext, TimeMap};
pub use timeline::{Mbt, Meter, Tempo, Tick};
pub use transport::{LoopRegion, SharedTransporter, TransportState, Transporter};
