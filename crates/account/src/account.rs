use serde::{Deserialize, Serialize};

use accounts_core::{Aggregate, AggregateId, DomainError, DomainResult, OwnerId};
use accounts_events::Event;

/// Event: AccountOpened.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub account_id: AggregateId,
    pub owner_id: OwnerId,
}

/// Event: MoneyDeposited.
///
/// `resulting_balance` is the balance after the deposit. Replay takes it as-is
/// rather than re-adding `amount_deposited`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyDeposited {
    pub amount_deposited: i64,
    pub resulting_balance: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    AccountOpened(AccountOpened),
    MoneyDeposited(MoneyDeposited),
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountOpened(_) => "account.opened",
            AccountEvent::MoneyDeposited(_) => "account.money_deposited",
        }
    }
}

/// Read view of an open account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: AggregateId,
    pub owner_id: OwnerId,
    pub balance: i64,
    pub open: bool,
}

/// Aggregate root: Account.
///
/// Never persisted directly; rebuilt from its event history on every command.
/// `open` holds exactly when both `id` and `owner_id` are set, and `balance`
/// never goes below zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    id: Option<AggregateId>,
    owner_id: Option<OwnerId>,
    balance: i64,
    open: bool,
}

impl Account {
    /// Create an empty, not-yet-opened aggregate instance.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<AggregateId> {
        self.id
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.owner_id
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn snapshot(&self) -> DomainResult<AccountSnapshot> {
        match (self.open, self.id, self.owner_id) {
            (true, Some(account_id), Some(owner_id)) => Ok(AccountSnapshot {
                account_id,
                owner_id,
                balance: self.balance,
                open: self.open,
            }),
            _ => Err(DomainError::NotOpen),
        }
    }

    /// Command: open the account for `owner_id`.
    pub fn open(&mut self, account_id: AggregateId, owner_id: OwnerId) -> DomainResult<AccountEvent> {
        if self.id.is_some() || self.owner_id.is_some() {
            return Err(DomainError::AlreadyOpen);
        }

        let event = AccountEvent::AccountOpened(AccountOpened {
            account_id,
            owner_id,
        });
        self.apply(&event);
        Ok(event)
    }

    /// Command: deposit `amount`.
    ///
    /// A zero deposit is accepted but changes nothing, so it yields `Ok(None)`.
    pub fn deposit(&mut self, amount: i64) -> DomainResult<Option<AccountEvent>> {
        if amount < 0 {
            return Err(DomainError::NegativeAmount(amount));
        }
        if !self.open {
            return Err(DomainError::NotOpen);
        }
        if amount == 0 {
            return Ok(None);
        }

        let resulting_balance = self
            .balance
            .checked_add(amount)
            .ok_or(DomainError::BalanceOverflow {
                balance: self.balance,
                amount,
            })?;

        let event = AccountEvent::MoneyDeposited(MoneyDeposited {
            amount_deposited: amount,
            resulting_balance,
        });
        self.apply(&event);
        Ok(Some(event))
    }
}

impl Aggregate for Account {
    type Event = AccountEvent;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::AccountOpened(e) => {
                self.id = Some(e.account_id);
                self.owner_id = Some(e.owner_id);
                self.balance = 0;
                self.open = true;
            }
            AccountEvent::MoneyDeposited(e) => {
                self.balance = e.resulting_balance;
            }
        }
    }
}
