use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use super::{execute_transfer, write_balances, RunSummary};
use crate::{
    csv_utils::read_csv,
    dto::{AccountRow, TransferRow},
    AccountsStore, LoggingNotificationService, TransferCoordinator,
};

/// Runs the transfers file against the opening balances and writes the final
/// balances to the provided writer.
///
/// All transfers are read up front and then shared across `workers` scoped
/// threads, each taking every `workers`-th row. Execution order between workers
/// is unspecified.
///
/// # Arguments
/// * `accounts_path` - CSV file with `account,balance` rows
/// * `transfers_path` - CSV file with `from,to,amount` rows
/// * `writer` - Where to write the final balances (e.g. stdout)
/// * `workers` - Number of threads executing transfers (at least one is used)
///
/// # Errors
/// Returns an error if:
/// * Either input file cannot be read
/// * Either CSV is malformed
/// * An opening balance row is rejected (duplicate id, negative balance)
/// * Writing to the output fails
pub fn run<P, Q, W>(
    accounts_path: P,
    transfers_path: Q,
    writer: W,
    workers: usize,
) -> Result<RunSummary, Box<dyn Error>>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    W: Write,
{
    let coordinator = TransferCoordinator::new(
        Arc::new(AccountsStore::new()),
        Arc::new(LoggingNotificationService),
    );
    load_accounts(&coordinator, accounts_path)?;

    // CSV parsing errors are critical - propagate them before any transfer runs
    let transfers: Vec<TransferRow> = read_csv(transfers_path)?.collect::<csv::Result<_>>()?;

    let workers = workers.max(1);
    let summary = thread::scope(|s| -> Result<RunSummary, Box<dyn Error>> {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let coordinator = &coordinator;
                let transfers = &transfers;
                s.spawn(move || {
                    let mut summary = RunSummary::default();
                    for row in transfers.iter().skip(worker).step_by(workers) {
                        summary.record(execute_transfer(coordinator, row));
                    }
                    summary
                })
            })
            .collect();

        let mut summary = RunSummary::default();
        for handle in handles {
            summary.merge(handle.join().map_err(|_| "transfer worker panicked")?);
        }
        Ok(summary)
    })?;

    write_balances(&coordinator, writer)?;
    Ok(summary)
}

fn load_accounts<P: AsRef<Path>>(
    coordinator: &TransferCoordinator,
    accounts_path: P,
) -> Result<(), Box<dyn Error>> {
    for row in read_csv::<AccountRow, _>(accounts_path)? {
        let row = row?;
        coordinator.create_account(row.account, row.balance)?;
    }
    Ok(())
}
