//! Account domain module (event-sourced).
//!
//! This crate contains the business rules for accounts, implemented purely as
//! deterministic domain logic (no IO, no storage, no logging).

pub mod account;

pub use account::{Account, AccountEvent, AccountOpened, AccountSnapshot, MoneyDeposited};
