//! Account command execution (application-level orchestration).
//!
//! Every command is one short unit of work:
//!
//! ```text
//! Command
//!   ↓
//! 1. Replay the account through a fresh EventStream
//!   ↓
//! 2. Run the command method on the rebuilt Account
//!   ↓
//! 3. Buffer the resulting event (if any)
//!   ↓
//! 4. Commit (conditional append, optimistic concurrency check)
//! ```
//!
//! Conflicts surface as `RepositoryError::ConcurrentModification`; the repository
//! never retries on its own.

use thiserror::Error;
use tracing::instrument;

use accounts_core::{AggregateId, DomainError, OwnerId};
use accounts_domain::{Account, AccountEvent, AccountSnapshot};
use accounts_events::SequencedEvent;

use crate::event_store::{EventStore, EventStoreError};
use crate::event_stream::{EventStream, StreamError};

/// Outcome taxonomy of repository commands and queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("account already open")]
    AlreadyOpen,

    #[error("account not open")]
    NotOpen,

    #[error("can not deposit negative amount: {0}")]
    NegativeAmount(i64),

    #[error("aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    /// Another writer committed to the aggregate between this replay and this commit.
    #[error(
        "concurrent modification of aggregate {aggregate_id} (expected version {expected}, found {actual})"
    )]
    ConcurrentModification {
        aggregate_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    #[error("deposit of {amount} overflows balance {balance}")]
    BalanceOverflow { balance: i64, amount: i64 },

    /// Any other store failure.
    #[error(transparent)]
    Store(EventStoreError),
}

impl From<DomainError> for RepositoryError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::AlreadyOpen => RepositoryError::AlreadyOpen,
            DomainError::NotOpen => RepositoryError::NotOpen,
            DomainError::NegativeAmount(amount) => RepositoryError::NegativeAmount(amount),
            DomainError::BalanceOverflow { balance, amount } => {
                RepositoryError::BalanceOverflow { balance, amount }
            }
        }
    }
}

impl From<EventStoreError> for RepositoryError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::ConcurrentModification {
                aggregate_id,
                expected,
                actual,
            } => RepositoryError::ConcurrentModification {
                aggregate_id,
                expected,
                actual,
            },
            other => RepositoryError::Store(other),
        }
    }
}

impl From<StreamError> for RepositoryError {
    fn from(value: StreamError) -> Self {
        match value {
            StreamError::AggregateNotFound(id) => RepositoryError::AggregateNotFound(id),
            StreamError::Store(e) => e.into(),
        }
    }
}

/// Façade over one shared event store, exposing one operation per account command.
///
/// `S` is typically `InMemoryEventStore<AccountEvent>` or an `Arc` of it when
/// several repositories share the same log.
#[derive(Debug, Clone)]
pub struct AccountRepository<S> {
    store: S,
}

impl<S> AccountRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> AccountRepository<S>
where
    S: EventStore<AccountEvent>,
{
    /// Open account `id` for `owner_id`.
    ///
    /// Does not replay first: opening an id that already has history is rejected
    /// by the store and surfaces as `ConcurrentModification`, the same outcome as
    /// losing a race against a concurrent opener.
    #[instrument(level = "debug", skip_all, fields(account_id = %id, owner_id = %owner_id))]
    pub fn open(&self, id: AggregateId, owner_id: OwnerId) -> Result<(), RepositoryError> {
        let mut stream = EventStream::new(&self.store);
        let mut account = Account::empty();

        let event = account.open(id, owner_id)?;
        stream.append(event, id);

        Ok(stream.commit()?)
    }

    /// Deposit `amount` into account `id`.
    ///
    /// A zero amount commits nothing and succeeds.
    #[instrument(level = "debug", skip_all, fields(account_id = %id, amount = amount))]
    pub fn deposit(&self, id: AggregateId, amount: i64) -> Result<(), RepositoryError> {
        let mut stream = EventStream::new(&self.store);
        let mut account: Account = stream.replay(id)?;

        if let Some(event) = account.deposit(amount)? {
            stream.append(event, id);
        }

        Ok(stream.commit()?)
    }

    /// Current state of account `id`, rebuilt from its history.
    pub fn query(&self, id: AggregateId) -> Result<AccountSnapshot, RepositoryError> {
        let mut stream = EventStream::new(&self.store);
        let account: Account = stream.replay(id)?;
        Ok(account.snapshot()?)
    }

    /// Full committed history of account `id` (empty when unknown).
    pub fn events(&self, id: AggregateId) -> Result<Vec<SequencedEvent<AccountEvent>>, RepositoryError> {
        Ok(self.store.sequenced_events(id, 0)?)
    }
}
