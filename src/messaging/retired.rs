// Retired snapshots - audio thread -> control side
//
// The engine keeps its own `Arc` to every published snapshot it plays.
// When a newer one is published it swaps the handle and pushes the old
// `Arc` here instead of dropping it, so the last reference (and the free)
// always ends up on the control side.

use crate::audio::compiled::CompiledGraph;
use crate::sequencer::sequence::Sequence;
use crate::sequencer::time_service::TimeMap;
use ringbuf::traits::{Consumer, Split};
use ringbuf::HeapRb;
use std::sync::{Arc, Mutex};

/// Room for a few rounds of all three snapshot kinds
pub const RETIRED_QUEUE_CAPACITY: usize = 32;

/// A snapshot the audio thread no longer reads
#[derive(Debug)]
pub enum RetiredSnapshot {
    TimeMap(Arc<TimeMap>),
    Sequences(Arc<Vec<Arc<Sequence>>>),
    Graph(Arc<CompiledGraph>),
}

pub type RetiredProducer = ringbuf::HeapProd<RetiredSnapshot>;
pub type RetiredConsumer = ringbuf::HeapCons<RetiredSnapshot>;

pub fn create_retired_queue(capacity: usize) -> (RetiredProducer, SnapshotCollector) {
    let rb = HeapRb::<RetiredSnapshot>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (producer, SnapshotCollector::new(consumer))
}

/// Control-side end of the queue; dropping what it pops frees the snapshots
pub struct SnapshotCollector {
    consumer: Mutex<RetiredConsumer>,
}

impl SnapshotCollector {
    pub fn new(consumer: RetiredConsumer) -> Self {
        Self {
            consumer: Mutex::new(consumer),
        }
    }

    /// Free everything retired so far; returns how many snapshots went
    pub fn collect(&self) -> usize {
        let mut consumer = match self.consumer.lock() {
            Ok(consumer) => consumer,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut collected = 0;
        while let Some(snapshot) = consumer.try_pop() {
            drop(snapshot);
            collected += 1;
        }
        if collected > 0 {
            tracing::trace!(collected, "retired snapshots freed");
        }
        collected
    }
}

impl std::fmt::Debug for SnapshotCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCollector").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Observer, Producer};

    #[test]
    fn test_collect_drops_last_reference() {
        let (mut producer, collector) = create_retired_queue(4);
        let map = Arc::new(TimeMap::default());
        let weak = Arc::downgrade(&map);

        assert!(producer.try_push(RetiredSnapshot::TimeMap(map)).is_ok());
        assert_eq!(producer.occupied_len(), 1);
        assert!(weak.upgrade().is_some());

        assert_eq!(collector.collect(), 1);
        assert!(weak.upgrade().is_none());
        assert_eq!(collector.collect(), 0);
    }
}
