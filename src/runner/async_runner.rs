use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use super::{execute_transfer, write_balances, RunSummary};
use crate::{
    dto::{AccountRow, TransferRow},
    AccountsStore, LoggingNotificationService, TransferCoordinator,
};

use csv_async::{AsyncReaderBuilder, Error as CsvError, Trim};
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_stream::StreamExt;

const BUFFER_SIZE: usize = 1024;

type Result<T, E = Box<dyn Error + Send + Sync>> = std::result::Result<T, E>;

/// Runs the transfers file async against the opening balances and writes the
/// final balances to the provided writer.
///
/// Opening balances are loaded first. Then two tasks are spawned:
/// * CSV reader - streams transfer rows from the input file and sends them to the processor via channel.
/// * Processor - receives rows and spawns one task per transfer until the channel is closed,
///   then waits for all of them.
///
/// # Arguments
/// * `accounts_path` - CSV file with `account,balance` rows
/// * `transfers_path` - CSV file with `from,to,amount` rows
/// * `writer` - Where to write the final balances (e.g. stdout)
///
/// # Errors
/// Returns an error if:
/// * Either input file cannot be read
/// * Either CSV is malformed
/// * An opening balance row is rejected (duplicate id, negative balance)
/// * Writing to the output fails
pub async fn run<P, Q, W>(accounts_path: P, transfers_path: Q, writer: W) -> Result<RunSummary>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    W: Write,
{
    let coordinator = Arc::new(TransferCoordinator::new(
        Arc::new(AccountsStore::new()),
        Arc::new(LoggingNotificationService),
    ));
    load_accounts(&coordinator, accounts_path).await?;

    // Create channel for passing transfer rows from reader to processor
    let (tx, rx) = mpsc::channel(BUFFER_SIZE);
    let transfers_path = transfers_path.as_ref().to_owned();

    let reader_handle = tokio::spawn(read_transfers(transfers_path, tx));
    let processor_handle = tokio::spawn(process_transfers(Arc::clone(&coordinator), rx));

    // Wait for reader to finish. On failure the processor is stopped, which
    // drops its JoinSet and aborts every transfer task not yet started.
    let read_result: Result<()> = match reader_handle.await {
        Ok(read) => read.map_err(Into::into),
        Err(join_err) => Err(join_err.into()),
    };
    if let Err(err) = read_result {
        processor_handle.abort();
        return Err(err);
    }

    // Every spawned transfer has completed once the processor returns
    let summary = processor_handle.await??;

    write_balances(&coordinator, writer)?;
    Ok(summary)
}

async fn load_accounts(
    coordinator: &TransferCoordinator,
    accounts_path: impl AsRef<Path>,
) -> Result<()> {
    let file = File::open(accounts_path).await?;
    let mut csv_reader = AsyncReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .create_deserializer(file);

    let mut rows = csv_reader.deserialize::<AccountRow>();
    while let Some(row) = rows.next().await {
        let row = row?;
        coordinator.create_account(row.account, row.balance)?;
    }
    Ok(())
}

/// Reads and deserializes transfer rows from a CSV file.
/// Returns them through the provided channel.
async fn read_transfers(
    transfers_path: impl AsRef<Path> + Send,
    tx: mpsc::Sender<TransferRow>,
) -> Result<(), CsvError> {
    let file = File::open(transfers_path).await?;
    let mut csv_reader = AsyncReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .create_deserializer(file);

    let mut records = csv_reader.deserialize::<TransferRow>();
    while let Some(result) = records.next().await {
        match result {
            Ok(row) => {
                if tx.send(row).await.is_err() {
                    // Receiver dropped, exit gracefully
                    break;
                }
            }
            // CSV parsing errors are critical - propagate them
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Spawns a task per received transfer and tallies the outcomes once the
/// channel is closed by the reader and every task has finished.
async fn process_transfers(
    coordinator: Arc<TransferCoordinator>,
    mut rx: mpsc::Receiver<TransferRow>,
) -> Result<RunSummary, JoinError> {
    let mut tasks = JoinSet::new();
    while let Some(row) = rx.recv().await {
        let coordinator = Arc::clone(&coordinator);
        // The critical section does no I/O, so holding an account lock inside
        // a task never spans an await point.
        tasks.spawn(async move { execute_transfer(&coordinator, &row) });
    }

    let mut summary = RunSummary::default();
    while let Some(committed) = tasks.join_next().await {
        summary.record(committed?);
    }
    Ok(summary)
}
