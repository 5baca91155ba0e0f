use std::env;
use std::error::Error;
use std::io;
use std::process;

use rusty_remittance::logging::init_logging;
use rusty_remittance::{run, Config};
use tracing::info;

fn main() {
    if let Err(err) = run_app() {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn run_app() -> Result<(), Box<dyn Error>> {
    let config = Config::from_args(env::args().skip(1))?;
    init_logging(&config);

    let summary = run(
        &config.accounts_path,
        &config.transfers_path,
        io::stdout(),
        config.workers,
    )?;
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "all transfers processed"
    );
    Ok(())
}
