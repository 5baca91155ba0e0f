use std::env;
use std::error::Error;
use std::process;

use rusty_remittance::logging::init_logging;
use rusty_remittance::{run_async, Config};

#[tokio::main]
async fn main() {
    if let Err(err) = run_app().await {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

async fn run_app() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Config::from_args(env::args().skip(1))?;
    init_logging(&config);

    let summary = run_async(
        config.accounts_path,
        config.transfers_path,
        std::io::stdout(),
    )
    .await?;
    eprintln!(
        "{} transfers committed, {} rejected",
        summary.succeeded, summary.failed
    );
    Ok(())
}
