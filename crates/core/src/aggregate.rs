//! Aggregate trait for event-sourced domain models.

/// Event-sourced aggregate: state is a pure fold over its own event history.
///
/// - **Initial state**: `Default::default()` is the empty, never-touched aggregate.
/// - **State mutation**: `apply(&mut self, event)` is the only way state evolves,
///   both when a command decides an event and when history is replayed.
///
/// Aggregates must not perform IO or side effects. Decision logic lives in
/// inherent command methods on the concrete type, which validate against the
/// current state and route the resulting event through `apply`.
pub trait Aggregate: Default {
    type Event: Clone + core::fmt::Debug;

    /// Evolve in-memory state from a single event.
    ///
    /// Must be total over `Self::Event` and deterministic.
    fn apply(&mut self, event: &Self::Event);

    /// Rebuild state by folding `events` into a fresh aggregate.
    fn replay<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a Self::Event>,
        Self::Event: 'a,
    {
        let mut aggregate = Self::default();
        for event in events {
            aggregate.apply(event);
        }
        aggregate
    }
}
