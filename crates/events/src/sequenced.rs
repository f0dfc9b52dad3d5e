use serde::{Deserialize, Serialize};

use accounts_core::AggregateId;

/// An event positioned in its aggregate's stream.
///
/// This is the unit an event store persists and the unit of its optimistic
/// concurrency check.
///
/// Notes:
/// - `sequence_number` is 1-based, strictly increasing per aggregate, without gaps.
/// - The store never rewrites a record once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent<E> {
    aggregate_id: AggregateId,

    /// Position in the aggregate stream.
    sequence_number: u64,

    event: E,
}

impl<E> SequencedEvent<E> {
    pub fn new(aggregate_id: AggregateId, sequence_number: u64, event: E) -> Self {
        Self {
            aggregate_id,
            sequence_number,
            event,
        }
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event(&self) -> &E {
        &self.event
    }

    pub fn into_event(self) -> E {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_flat_field_names() {
        let id = AggregateId::from_u128(7);
        let record = SequencedEvent::new(id, 3, "payload".to_string());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["aggregate_id"], id.to_string());
        assert_eq!(json["sequence_number"], 3);
        assert_eq!(json["event"], "payload");
    }

    #[test]
    fn into_event_releases_payload() {
        let record = SequencedEvent::new(AggregateId::from_u128(1), 1, 42_i64);
        assert_eq!(*record.event(), 42);
        assert_eq!(record.into_event(), 42);
    }
}
