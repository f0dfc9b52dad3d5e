use std::fmt;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, ensure, Context};
use clap::Args;
use tracing::{debug, info};

use accounts_core::{AggregateId, OwnerId};
use accounts_domain::AccountEvent;
use accounts_infra::{AccountRepository, InMemoryEventStore, RepositoryError};

type SharedRepository = AccountRepository<Arc<InMemoryEventStore<AccountEvent>>>;

#[derive(Debug, Clone, Args)]
pub struct StressArgs {
    /// Number of accounts to open up front.
    #[arg(long, default_value_t = 10)]
    pub accounts: usize,

    /// Number of writer threads.
    #[arg(long, default_value_t = 4)]
    pub threads: usize,

    /// Deposits issued by each thread.
    #[arg(long, default_value_t = 100)]
    pub deposits: usize,

    /// Amount of every deposit.
    #[arg(long, default_value_t = 1)]
    pub amount: i64,

    /// Retries of a deposit after a concurrent modification.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StressReport {
    pub committed: usize,
    pub conflicts: usize,
    pub exhausted: usize,
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "committed: {}, conflicts: {}, retries exhausted: {}",
            self.committed, self.conflicts, self.exhausted
        )
    }
}

/// Per-thread tally: the report counters plus what each account actually received.
struct Tally {
    report: StressReport,
    credited: Vec<i64>,
}

pub fn run(args: &StressArgs) -> anyhow::Result<StressReport> {
    ensure!(args.accounts > 0, "--accounts must be at least 1");
    ensure!(args.amount >= 0, "--amount must not be negative");

    let repo: SharedRepository = AccountRepository::new(Arc::new(InMemoryEventStore::new()));
    let ids: Arc<Vec<AggregateId>> = Arc::new((0..args.accounts).map(|_| AggregateId::new()).collect());
    for id in ids.iter() {
        repo.open(*id, OwnerId::new())
            .with_context(|| format!("opening account {id}"))?;
    }
    info!(accounts = args.accounts, threads = args.threads, "accounts opened");

    let handles: Vec<_> = (0..args.threads)
        .map(|thread_idx| {
            let repo = repo.clone();
            let ids = Arc::clone(&ids);
            let args = args.clone();
            thread::spawn(move || write_deposits(&repo, &ids, thread_idx, &args))
        })
        .collect();

    let mut report = StressReport::default();
    let mut expected = vec![0_i64; args.accounts];
    for handle in handles {
        let tally = match handle.join() {
            Ok(tally) => tally?,
            Err(_) => bail!("writer thread panicked"),
        };
        report.committed += tally.report.committed;
        report.conflicts += tally.report.conflicts;
        report.exhausted += tally.report.exhausted;
        for (total, credited) in expected.iter_mut().zip(tally.credited) {
            *total += credited;
        }
    }

    verify(&repo, &ids, &expected)?;
    info!(%report, "stress run verified");
    Ok(report)
}

fn write_deposits(
    repo: &SharedRepository,
    ids: &[AggregateId],
    thread_idx: usize,
    args: &StressArgs,
) -> anyhow::Result<Tally> {
    let mut tally = Tally {
        report: StressReport::default(),
        credited: vec![0; ids.len()],
    };

    for n in 0..args.deposits {
        // Round-robin, offset per thread so writers contend on the same accounts.
        let slot = (thread_idx + n) % ids.len();
        let id = ids[slot];

        let mut attempt = 0;
        loop {
            match repo.deposit(id, args.amount) {
                Ok(()) => {
                    tally.report.committed += 1;
                    tally.credited[slot] += args.amount;
                    break;
                }
                Err(RepositoryError::ConcurrentModification { .. }) if attempt < args.max_retries => {
                    tally.report.conflicts += 1;
                    attempt += 1;
                    debug!(account_id = %id, attempt, "retrying deposit");
                }
                Err(RepositoryError::ConcurrentModification { .. }) => {
                    tally.report.conflicts += 1;
                    tally.report.exhausted += 1;
                    break;
                }
                Err(e) => return Err(e).with_context(|| format!("depositing into {id}")),
            }
        }
    }

    Ok(tally)
}

/// Check every account against the deposits its writers saw committed.
fn verify(repo: &SharedRepository, ids: &[AggregateId], expected: &[i64]) -> anyhow::Result<()> {
    for (id, expected) in ids.iter().zip(expected) {
        let snapshot = repo.query(*id)?;
        ensure!(
            snapshot.balance == *expected,
            "account {id}: balance {} but {expected} was committed",
            snapshot.balance
        );

        for (idx, record) in repo.events(*id)?.iter().enumerate() {
            ensure!(
                record.sequence_number() == idx as u64 + 1,
                "account {id}: gap at position {idx} (found sequence number {})",
                record.sequence_number()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(threads: usize, deposits: usize) -> StressArgs {
        StressArgs {
            accounts: 3,
            threads,
            deposits,
            amount: 2,
            max_retries: 1000,
        }
    }

    #[test]
    fn single_writer_never_conflicts() {
        let report = run(&args(1, 20)).unwrap();

        assert_eq!(
            report,
            StressReport {
                committed: 20,
                conflicts: 0,
                exhausted: 0,
            }
        );
    }

    #[test]
    fn every_deposit_is_accounted_for() {
        let report = run(&args(4, 50)).unwrap();

        assert_eq!(report.committed + report.exhausted, 200);
    }

    #[test]
    fn rejects_bad_arguments() {
        let mut bad = args(1, 1);
        bad.accounts = 0;
        assert!(run(&bad).is_err());

        let mut bad = args(1, 1);
        bad.amount = -1;
        assert!(run(&bad).is_err());
    }
}
