//! The runner loads opening balances from CSV, executes a file of transfers
//! concurrently against one coordinator, and writes the final balances to a
//! writer.
//!
//! This module provides both a synchronous (scoped threads) and an asynchronous
//! (tokio tasks) runner implementation.
//!
mod async_runner;
mod sync_runner;

pub use async_runner::run as run_async;
pub use sync_runner::run;

use std::io::Write;
use tracing::warn;

use crate::{csv_utils::write_csv, dto::AccountRow, dto::TransferRow, TransferCoordinator};

/// Counts of transfers that were committed and rejected during a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, committed: bool) {
        if committed {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    fn merge(&mut self, other: RunSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Executes one transfer row. Rejections are expected outcomes, so they are
/// logged and reported as `false` rather than aborting the run.
fn execute_transfer(coordinator: &TransferCoordinator, row: &TransferRow) -> bool {
    match coordinator.transfer(&row.from, &row.to, row.amount) {
        Ok(_) => true,
        Err(err) => {
            warn!(
                from = %row.from,
                to = %row.to,
                amount = %row.amount,
                %err,
                "transfer rejected"
            );
            false
        }
    }
}

/// Writes every account's balance, sorted by account id.
fn write_balances<W: Write>(coordinator: &TransferCoordinator, writer: W) -> csv::Result<()> {
    let rows = coordinator.store().snapshot().into_iter().map(AccountRow::from);
    write_csv(writer, rows)
}
