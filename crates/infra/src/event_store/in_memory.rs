use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use accounts_core::AggregateId;
use accounts_events::SequencedEvent;

use super::r#trait::{EventStore, EventStoreError};

type Log<E> = Arc<Vec<SequencedEvent<E>>>;

/// One aggregate's committed log.
///
/// `writer` serializes check-and-append for the aggregate. `log` only guards the
/// pointer to the current snapshot: readers clone the `Arc` and walk it without
/// holding any lock, so they never wait for an append in progress.
#[derive(Debug)]
struct Stream<E> {
    writer: Mutex<()>,
    log: RwLock<Log<E>>,
}

impl<E> Default for Stream<E> {
    fn default() -> Self {
        Self {
            writer: Mutex::new(()),
            log: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl<E: Clone> Stream<E> {
    fn snapshot(&self) -> Result<Log<E>, EventStoreError> {
        let log = self.log.read().map_err(|_| poisoned())?;
        Ok(Arc::clone(&*log))
    }

    /// Append `batch` and return the new latest version.
    ///
    /// Callers must hold `writer`.
    fn extend(&self, batch: &[&SequencedEvent<E>]) -> Result<u64, EventStoreError> {
        let mut log = self.log.write().map_err(|_| poisoned())?;
        if let Some(events) = Arc::get_mut(&mut *log) {
            events.extend(batch.iter().map(|e| (*e).clone()));
            return Ok(current_version(events.as_slice()));
        }

        // A reader still holds the current snapshot: build the next one outside
        // the lock and swap it in.
        let shared = Arc::clone(&*log);
        drop(log);
        let mut events = Vec::with_capacity(shared.len() + batch.len());
        events.extend(shared.iter().cloned());
        events.extend(batch.iter().map(|e| (*e).clone()));
        let version = current_version(events.as_slice());

        *self.log.write().map_err(|_| poisoned())? = Arc::new(events);
        Ok(version)
    }
}

/// In-memory append-only event store.
///
/// Each aggregate stream has its own writer lock, so the check-and-append
/// critical section is scoped to the aggregates a batch touches. The outer map
/// lock is only held to look up stream handles or to register the streams of a
/// batch that has already been accepted.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug)]
pub struct InMemoryEventStore<E> {
    streams: RwLock<HashMap<AggregateId, Arc<Stream<E>>>>,
}

impl<E> Default for InMemoryEventStore<E> {
    fn default() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }
}

impl<E> InMemoryEventStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self, aggregate_id: AggregateId) -> Result<Option<Arc<Stream<E>>>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        Ok(streams.get(&aggregate_id).cloned())
    }
}

fn poisoned() -> EventStoreError {
    EventStoreError::InvalidAppend("lock poisoned".to_string())
}

fn current_version<E>(stream: &[SequencedEvent<E>]) -> u64 {
    stream.last().map(|e| e.sequence_number()).unwrap_or(0)
}

/// Group a batch by aggregate, keeping batch order inside each group.
fn group_batch<E>(
    events: &[SequencedEvent<E>],
) -> Result<BTreeMap<AggregateId, Vec<&SequencedEvent<E>>>, EventStoreError> {
    let mut batches: BTreeMap<AggregateId, Vec<&SequencedEvent<E>>> = BTreeMap::new();

    for (idx, e) in events.iter().enumerate() {
        if e.sequence_number() == 0 {
            return Err(EventStoreError::InvalidAppend(format!(
                "sequence_number 0 at index {idx}"
            )));
        }
        batches.entry(e.aggregate_id()).or_default().push(e);
    }

    Ok(batches)
}

/// Check one aggregate's group against the stream's latest version.
///
/// Any number at or below `current` is a conflict, wherever it sits in the
/// group. Only then must the group run contiguously from `current + 1`.
fn check_batch<E>(
    aggregate_id: AggregateId,
    batch: &[&SequencedEvent<E>],
    current: u64,
) -> Result<(), EventStoreError> {
    if let Some(lowest) = batch.iter().map(|e| e.sequence_number()).min() {
        if lowest <= current {
            return Err(EventStoreError::ConcurrentModification {
                aggregate_id,
                expected: lowest - 1,
                actual: current,
            });
        }
    }

    for (offset, e) in (1_u64..).zip(batch) {
        let wanted = current + offset;
        if e.sequence_number() != wanted {
            return Err(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number for aggregate {aggregate_id} (latest {current}, expected {wanted}, found {})",
                e.sequence_number()
            )));
        }
    }

    Ok(())
}

impl<E> EventStore<E> for InMemoryEventStore<E>
where
    E: Clone + Send + Sync,
{
    fn append(&self, events: &[SequencedEvent<E>]) -> Result<(), EventStoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let batches = group_batch(events)?;

        loop {
            // Aggregates without a stream get a fresh, unregistered one. It only
            // becomes visible once the whole batch has been accepted.
            let slots: Vec<(bool, Arc<Stream<E>>)> = {
                let streams = self.streams.read().map_err(|_| poisoned())?;
                batches
                    .keys()
                    .map(|id| match streams.get(id) {
                        Some(stream) => (false, Arc::clone(stream)),
                        None => (true, Arc::new(Stream::default())),
                    })
                    .collect()
            };

            // Lock in ascending aggregate order (BTreeMap order) so that two batches
            // touching overlapping aggregates cannot deadlock.
            let mut writers = Vec::with_capacity(slots.len());
            for (_, stream) in slots.iter().filter(|(is_new, _)| !is_new) {
                writers.push(stream.writer.lock().map_err(|_| poisoned())?);
            }

            let mut registry = None;
            if slots.iter().any(|(is_new, _)| *is_new) {
                let streams = self.streams.write().map_err(|_| poisoned())?;
                let raced = batches
                    .keys()
                    .zip(&slots)
                    .any(|(id, (is_new, _))| *is_new && streams.contains_key(id));
                if raced {
                    // Another batch registered one of our aggregates since the lookup.
                    continue;
                }
                registry = Some(streams);
            }

            for ((aggregate_id, batch), (_, stream)) in batches.iter().zip(&slots) {
                let current = current_version(stream.snapshot()?.as_slice());
                check_batch(*aggregate_id, batch.as_slice(), current)?;
            }

            for ((aggregate_id, batch), (_, stream)) in batches.iter().zip(&slots) {
                let version = stream.extend(batch.as_slice())?;
                debug!(aggregate_id = %aggregate_id, version, "appended events");
            }

            if let Some(mut streams) = registry {
                for (aggregate_id, (is_new, stream)) in batches.keys().zip(&slots) {
                    if *is_new {
                        streams.insert(*aggregate_id, Arc::clone(stream));
                    }
                }
            }

            return Ok(());
        }
    }

    fn sequenced_events(
        &self,
        aggregate_id: AggregateId,
        from_version: u64,
    ) -> Result<Vec<SequencedEvent<E>>, EventStoreError> {
        let Some(stream) = self.stream(aggregate_id)? else {
            return Ok(vec![]);
        };

        let snapshot = stream.snapshot()?;
        Ok(snapshot
            .iter()
            .filter(|e| e.sequence_number() > from_version)
            .cloned()
            .collect())
    }

    fn latest_version(&self, aggregate_id: AggregateId) -> Result<u64, EventStoreError> {
        let Some(stream) = self.stream(aggregate_id)? else {
            return Ok(0);
        };

        Ok(current_version(stream.snapshot()?.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    fn id(n: u128) -> AggregateId {
        AggregateId::from_u128(n)
    }

    fn seq(aggregate: u128, n: u64, payload: &'static str) -> SequencedEvent<&'static str> {
        SequencedEvent::new(id(aggregate), n, payload)
    }

    #[test]
    fn unknown_aggregate_has_empty_stream() {
        let store = InMemoryEventStore::<&'static str>::new();

        assert!(store.events(id(1), 0).unwrap().is_empty());
        assert_eq!(store.latest_version(id(1)).unwrap(), 0);
    }

    #[test]
    fn appended_events_are_visible_in_order() {
        let store = InMemoryEventStore::new();
        store.append(&[seq(1, 1, "a"), seq(1, 2, "b")]).unwrap();
        store.append(&[seq(1, 3, "c")]).unwrap();

        assert_eq!(store.events(id(1), 0).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(store.latest_version(id(1)).unwrap(), 3);
    }

    #[test]
    fn from_version_skips_older_events() {
        let store = InMemoryEventStore::new();
        store
            .append(&[seq(1, 1, "a"), seq(1, 2, "b"), seq(1, 3, "c")])
            .unwrap();

        assert_eq!(store.events(id(1), 2).unwrap(), vec!["c"]);
        assert!(store.events(id(1), 3).unwrap().is_empty());
    }

    #[test]
    fn streams_are_isolated_per_aggregate() {
        let store = InMemoryEventStore::new();
        store
            .append(&[seq(1, 1, "a"), seq(2, 1, "x"), seq(1, 2, "b")])
            .unwrap();

        assert_eq!(store.events(id(1), 0).unwrap(), vec!["a", "b"]);
        assert_eq!(store.events(id(2), 0).unwrap(), vec!["x"]);
    }

    #[test]
    fn taken_sequence_number_is_a_concurrent_modification() {
        let store = InMemoryEventStore::new();
        store.append(&[seq(1, 1, "a"), seq(1, 2, "b")]).unwrap();

        let err = store.append(&[seq(1, 2, "late")]).unwrap_err();

        assert_eq!(
            err,
            EventStoreError::ConcurrentModification {
                aggregate_id: id(1),
                expected: 1,
                actual: 2,
            }
        );
        assert_eq!(store.events(id(1), 0).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn conflicting_batch_appends_nothing() {
        let store = InMemoryEventStore::new();
        store.append(&[seq(1, 1, "a")]).unwrap();

        let err = store
            .append(&[seq(2, 1, "x"), seq(1, 1, "dup"), seq(1, 2, "b")])
            .unwrap_err();

        assert!(matches!(err, EventStoreError::ConcurrentModification { .. }));
        assert_eq!(store.events(id(1), 0).unwrap(), vec!["a"]);
        assert!(store.events(id(2), 0).unwrap().is_empty());
    }

    #[test]
    fn gaps_are_rejected() {
        let store = InMemoryEventStore::new();

        let err = store.append(&[seq(1, 2, "a")]).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));

        let err = store.append(&[seq(1, 1, "a"), seq(1, 3, "c")]).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));

        assert!(store.events(id(1), 0).unwrap().is_empty());
    }

    #[test]
    fn sequence_number_zero_is_rejected() {
        let store = InMemoryEventStore::new();

        let err = store.append(&[seq(1, 0, "a")]).unwrap_err();

        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let store = InMemoryEventStore::<&'static str>::new();

        store.append(&[]).unwrap();

        assert_eq!(store.latest_version(id(1)).unwrap(), 0);
    }

    #[test]
    fn shared_handle_sees_same_log() {
        let store = Arc::new(InMemoryEventStore::new());
        let other = Arc::clone(&store);

        other.append(&[seq(1, 1, "a")]).unwrap();

        assert_eq!(store.events(id(1), 0).unwrap(), vec!["a"]);
    }

    #[test]
    fn taken_number_anywhere_in_a_batch_is_a_concurrent_modification() {
        let store = InMemoryEventStore::new();
        store.append(&[seq(1, 1, "a")]).unwrap();

        let err = store.append(&[seq(1, 2, "b"), seq(1, 1, "dup")]).unwrap_err();

        assert_eq!(
            err,
            EventStoreError::ConcurrentModification {
                aggregate_id: id(1),
                expected: 0,
                actual: 1,
            }
        );
        assert_eq!(store.events(id(1), 0).unwrap(), vec!["a"]);
    }

    #[test]
    fn rejected_appends_register_no_streams() {
        let store = InMemoryEventStore::new();

        for n in 0..1000 {
            let err = store.append(&[seq(n, 5, "early")]).unwrap_err();
            assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        }

        assert!(store.streams.read().unwrap().is_empty());
    }

    #[test]
    fn conflict_elsewhere_in_batch_registers_no_new_stream() {
        let store = InMemoryEventStore::new();
        store.append(&[seq(1, 1, "a")]).unwrap();

        let err = store.append(&[seq(1, 1, "dup"), seq(2, 1, "x")]).unwrap_err();

        assert!(matches!(err, EventStoreError::ConcurrentModification { .. }));
        assert_eq!(store.streams.read().unwrap().len(), 1);
        assert_eq!(store.latest_version(id(2)).unwrap(), 0);
    }

    #[test]
    fn racing_first_appends_admit_exactly_one() {
        const THREADS: usize = 8;

        let store = Arc::new(InMemoryEventStore::<&'static str>::new());
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.append(&[seq(1, 1, "first")])
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.into_iter().filter_map(Result::err) {
            assert!(matches!(err, EventStoreError::ConcurrentModification { .. }));
        }
        assert_eq!(store.events(id(1), 0).unwrap(), vec!["first"]);
    }

    #[test]
    fn reads_do_not_wait_for_an_append_in_progress() {
        let store = InMemoryEventStore::new();
        store.append(&[seq(1, 1, "a")]).unwrap();
        let stream = store.stream(id(1)).unwrap().unwrap();

        let _append_in_progress = stream.writer.lock().unwrap();

        assert_eq!(store.events(id(1), 0).unwrap(), vec!["a"]);
        assert_eq!(store.latest_version(id(1)).unwrap(), 1);
    }

    #[test]
    fn held_snapshot_is_unaffected_by_later_appends() {
        let store = InMemoryEventStore::new();
        store.append(&[seq(1, 1, "a")]).unwrap();
        let snapshot = store.stream(id(1)).unwrap().unwrap().snapshot().unwrap();

        store.append(&[seq(1, 2, "b")]).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.events(id(1), 0).unwrap(), vec!["a", "b"]);
    }
}
