//! Unit of work over an event store.
//!
//! An `EventStream` lives for one logical operation: it replays aggregates,
//! remembers the version it observed for each of them, buffers new events with
//! the sequence numbers that follow, and flushes the buffer in one conditional
//! append on `commit`.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use accounts_core::{Aggregate, AggregateId};
use accounts_events::SequencedEvent;

use crate::event_store::{EventStore, EventStoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Replay found no history for the aggregate.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

/// Session bound to one store for the life of one logical operation.
///
/// A stream that failed to commit with `ConcurrentModification` keeps its buffer
/// and is meant to be dropped; start a new stream (and replay again) to retry.
#[derive(Debug)]
pub struct EventStream<'s, S, E> {
    store: &'s S,
    versions: HashMap<AggregateId, u64>,
    uncommitted: Vec<SequencedEvent<E>>,
}

impl<'s, S, E> EventStream<'s, S, E>
where
    S: EventStore<E>,
{
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            versions: HashMap::new(),
            uncommitted: Vec::new(),
        }
    }

    /// Rebuild `aggregate_id` from its full history and record the observed version.
    pub fn replay<A>(&mut self, aggregate_id: AggregateId) -> Result<A, StreamError>
    where
        A: Aggregate<Event = E>,
    {
        let history = self.store.events(aggregate_id, 0)?;
        if history.is_empty() {
            return Err(StreamError::AggregateNotFound(aggregate_id));
        }

        let aggregate = A::replay(&history);
        let version = history.len() as u64;
        self.versions.insert(aggregate_id, version);

        debug!(aggregate_id = %aggregate_id, version, "replayed aggregate");
        Ok(aggregate)
    }

    /// Buffer `event` as the next record of `aggregate_id`.
    ///
    /// Aggregates never replayed in this stream start from version 0.
    pub fn append(&mut self, event: E, aggregate_id: AggregateId) {
        let version = self.versions.entry(aggregate_id).or_insert(0);
        *version += 1;
        self.uncommitted
            .push(SequencedEvent::new(aggregate_id, *version, event));
    }

    /// Flush buffered events, in buffering order, through one conditional append.
    ///
    /// The buffer is cleared only when the store accepts the batch.
    pub fn commit(&mut self) -> Result<(), StreamError> {
        if self.uncommitted.is_empty() {
            return Ok(());
        }

        self.store.append(&self.uncommitted)?;
        debug!(events = self.uncommitted.len(), "committed events");
        self.uncommitted.clear();
        Ok(())
    }

    /// Version this stream currently holds for `aggregate_id`, including buffered events.
    pub fn version(&self, aggregate_id: AggregateId) -> Option<u64> {
        self.versions.get(&aggregate_id).copied()
    }

    pub fn uncommitted(&self) -> &[SequencedEvent<E>] {
        &self.uncommitted
    }
}
