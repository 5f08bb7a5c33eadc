// Communication channels lock-free

use crate::messaging::command::SampleNoteCommand;
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;
use std::sync::{Arc, Mutex};

pub type SampleNoteProducer = ringbuf::HeapProd<SampleNoteCommand>;
pub type SampleNoteConsumer = ringbuf::HeapCons<SampleNoteCommand>;

pub fn create_sample_note_channel(capacity: usize) -> (SampleNoteSender, SampleNoteConsumer) {
    let rb = HeapRb::<SampleNoteCommand>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (SampleNoteSender::new(producer), consumer)
}

/// Cloneable sending side, usable from any non-real-time thread.
///
/// The ring buffer is single-producer; senders serialize on a mutex that
/// the audio thread never touches.
#[derive(Clone)]
pub struct SampleNoteSender {
    producer: Arc<Mutex<SampleNoteProducer>>,
}

impl SampleNoteSender {
    pub fn new(producer: SampleNoteProducer) -> Self {
        Self {
            producer: Arc::new(Mutex::new(producer)),
        }
    }

    /// Queue a command. Returns false if the queue is full.
    pub fn send(&self, command: SampleNoteCommand) -> bool {
        let mut producer = match self.producer.lock() {
            Ok(producer) => producer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if producer.try_push(command).is_err() {
            tracing::warn!(?command, "sample note queue full, command dropped");
            return false;
        }
        true
    }
}

impl std::fmt::Debug for SampleNoteSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleNoteSender").finish_non_exhaustive()
    }
}
