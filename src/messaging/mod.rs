// Messaging - lock-free queues between the control side and the audio thread

pub mod channels;
pub mod command;
pub mod retired;

pub use channels::{SampleNoteConsumer, SampleNoteSender, create_sample_note_channel};
pub use command::{DEFAULT_SAMPLE_NOTE_VELOCITY, SampleNoteCommand};
pub use retired::{
    RETIRED_QUEUE_CAPACITY, RetiredProducer, RetiredSnapshot, SnapshotCollector,
    create_retired_queue,
};
