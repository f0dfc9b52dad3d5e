//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic rejection of a command against the current
/// in-memory state. None of them are fatal; callers are expected to branch on them.
/// Storage and concurrency failures belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The aggregate already carries an identity.
    #[error("account already open")]
    AlreadyOpen,

    /// The command requires an open account.
    #[error("account not open")]
    NotOpen,

    /// Deposits must be non-negative.
    #[error("can not deposit negative amount: {0}")]
    NegativeAmount(i64),

    /// The deposit would take the balance past `i64::MAX`.
    #[error("deposit of {amount} overflows balance {balance}")]
    BalanceOverflow { balance: i64, amount: i64 },
}
