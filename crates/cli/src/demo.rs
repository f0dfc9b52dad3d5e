use anyhow::{bail, Context};
use tracing::info;

use accounts_core::{AggregateId, OwnerId};
use accounts_domain::AccountEvent;
use accounts_infra::{AccountRepository, InMemoryEventStore, RepositoryError};

/// Run the scripted session and render the final snapshot and history as JSON.
pub fn run() -> anyhow::Result<String> {
    let repo = AccountRepository::new(InMemoryEventStore::<AccountEvent>::new());
    let id = AggregateId::from_u128(1);
    let owner_id = OwnerId::from_u128(2);

    repo.open(id, owner_id).context("opening account")?;
    repo.deposit(id, 42).context("depositing 42")?;

    match repo.deposit(id, -5) {
        Err(RepositoryError::NegativeAmount(amount)) => info!(amount, "negative deposit rejected"),
        other => bail!("expected a negative deposit to be rejected, got {other:?}"),
    }

    repo.deposit(id, 0).context("depositing 0")?;

    let snapshot = repo.query(id).context("querying account")?;
    let history = repo.events(id).context("loading history")?;
    info!(balance = snapshot.balance, version = history.len(), "account replayed");

    let rendered = serde_json::json!({
        "account": snapshot,
        "events": history,
    });
    Ok(serde_json::to_string_pretty(&rendered)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_ends_with_balance_42_at_version_2() {
        let output = run().unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(json["account"]["balance"], 42);
        assert_eq!(json["account"]["open"], true);
        assert_eq!(json["events"].as_array().unwrap().len(), 2);
        assert_eq!(json["events"][1]["sequence_number"], 2);
    }
}
