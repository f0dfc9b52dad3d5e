//! Domain events and their persisted, sequenced form.

pub mod event;
pub mod sequenced;

pub use event::Event;
pub use sequenced::SequencedEvent;
