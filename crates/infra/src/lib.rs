//! Infrastructure layer: event store, unit of work, repository.

pub mod event_store;
pub mod event_stream;
pub mod repository;


pub use event_store::{EventStore, EventStoreError, InMemoryEventStore};
pub use event_stream::{EventStream, StreamError};
pub use repository::{AccountRepository, RepositoryError};
