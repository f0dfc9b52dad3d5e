use std::sync::Arc;

use thiserror::Error;

use accounts_core::AggregateId;
use accounts_events::SequencedEvent;

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventStoreError {
    /// Another writer already committed one of the batch's sequence numbers.
    ///
    /// `expected` is the latest version the batch was built against (its lowest
    /// sequence number for the aggregate minus one), `actual`
    /// the latest version found in the store.
    #[error(
        "concurrent modification of aggregate {aggregate_id} (expected version {expected}, found {actual})"
    )]
    ConcurrentModification {
        aggregate_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    /// The batch itself is malformed (zero or non-contiguous sequence numbers)
    /// or the backend is unusable.
    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only, per-aggregate event store.
///
/// The `EventStore` is the **persistence layer** for events. Every aggregate owns
/// one ordered stream addressed by its `AggregateId`; sequence numbers inside a
/// stream start at 1 and grow by one without gaps.
///
/// ## Append Semantics
///
/// `append()`:
/// - Accepts a batch that may touch several aggregates, in the caller's order
/// - Rejects an aggregate's group with `ConcurrentModification` if any of its
///   sequence numbers is at or below `latest`
/// - Otherwise requires the group to run contiguously from `latest + 1`
///   (anything else is `InvalidAppend`)
/// - Persists the batch atomically (all or nothing)
///
/// No locks are held between a caller's read and its append; the sequence number
/// precondition is the only concurrency control, and retrying after a conflict is
/// the caller's business.
///
/// ## Load Semantics
///
/// `sequenced_events()` returns every record with `sequence_number > from_version`
/// in ascending order, or an empty vector for an unknown aggregate. Reads observe a
/// point-in-time view of committed records and do not wait for appends in progress.
pub trait EventStore<E>: Send + Sync {
    /// Append a batch of sequenced events (append-only, all or nothing).
    fn append(&self, events: &[SequencedEvent<E>]) -> Result<(), EventStoreError>;

    /// Load the stream of `aggregate_id` past `from_version`.
    fn sequenced_events(
        &self,
        aggregate_id: AggregateId,
        from_version: u64,
    ) -> Result<Vec<SequencedEvent<E>>, EventStoreError>;

    /// Latest committed sequence number of `aggregate_id` (0 when unknown).
    fn latest_version(&self, aggregate_id: AggregateId) -> Result<u64, EventStoreError>;

    /// Payload-only view of `sequenced_events`.
    fn events(&self, aggregate_id: AggregateId, from_version: u64) -> Result<Vec<E>, EventStoreError> {
        Ok(self
            .sequenced_events(aggregate_id, from_version)?
            .into_iter()
            .map(SequencedEvent::into_event)
            .collect())
    }
}

impl<E, S> EventStore<E> for Arc<S>
where
    S: EventStore<E> + ?Sized,
{
    fn append(&self, events: &[SequencedEvent<E>]) -> Result<(), EventStoreError> {
        (**self).append(events)
    }

    fn sequenced_events(
        &self,
        aggregate_id: AggregateId,
        from_version: u64,
    ) -> Result<Vec<SequencedEvent<E>>, EventStoreError> {
        (**self).sequenced_events(aggregate_id, from_version)
    }

    fn latest_version(&self, aggregate_id: AggregateId) -> Result<u64, EventStoreError> {
        (**self).latest_version(aggregate_id)
    }
}
