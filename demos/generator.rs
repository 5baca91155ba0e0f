//! This example generates a ring of accounts and a matching transfers file
//! (configurable through the constants) for a number of accounts supplied as a
//! command-line argument.
//!
//! The two CSV files can then be used to exercise the `rusty-remittance` runners
//! under contention.
//!
//! Example (10 accounts, as used by the `data/ring_*.csv` fixtures):
//! ```bash
//! cargo run --example generator accounts 10 > data/ring_accounts.csv
//! cargo run --example generator transfers 10 > data/ring_transfers.csv
//! ```
//! ### Maths
//! Let N = number of accounts, R = NUM_ROUNDS, A = TRANSFER_AMOUNT, B = OPENING_BALANCE.
//!
//! Account i's neighbour is i+1 (wrapping N back to 1). In every round each
//! account transfers A to its neighbour on even rounds and receives A back from
//! it on odd rounds, so every ordered pair (i, i+1) carries R/2 transfers each way.
//!
//! **No rejection, whatever the order**
//! An account sends at most R·A in total (R/2 forward, R/2 back to its other
//! neighbour). With our constants that is 50·10 = 500 ≤ B = 1000, so even if
//! every outgoing transfer ran before any incoming one the balance stays ≥ 0.
//!
//! **Final State for every account:** balance = B, and N·R transfers committed.
//!
//! If the locking is correct, the runner output shows every account back at B.
//!

use csv::Writer;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use rusty_remittance::{AccountRow, TransferRow};
use std::{env, error::Error};

// Configuration constants.
const NUM_ROUNDS: usize = 50;
const OPENING_BALANCE: Decimal = dec!(1000);
const TRANSFER_AMOUNT: Decimal = dec!(10);

fn account_id(i: u32) -> String {
    format!("acc-{}", i)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() != 3 {
        eprintln!("Usage: cargo run --example generator <accounts|transfers> <num_accounts>");
        std::process::exit(1);
    }

    let num_accounts: u32 = match args[2].parse() {
        Ok(n) if n > 1 => n,
        _ => {
            eprintln!("Error: <num_accounts> must be an integer greater than 1.");
            std::process::exit(1);
        }
    };

    let mut wtr = Writer::from_writer(std::io::stdout());

    match args[1].as_str() {
        "accounts" => {
            for i in 1..=num_accounts {
                wtr.serialize(AccountRow {
                    account: account_id(i),
                    balance: OPENING_BALANCE,
                })?;
            }
        }
        "transfers" => {
            for round in 0..NUM_ROUNDS {
                for i in 1..=num_accounts {
                    let neighbour = i % num_accounts + 1;
                    // Even rounds go forward around the ring, odd rounds come back
                    let (from, to) = if round % 2 == 0 {
                        (i, neighbour)
                    } else {
                        (neighbour, i)
                    };
                    wtr.serialize(TransferRow {
                        from: account_id(from),
                        to: account_id(to),
                        amount: TRANSFER_AMOUNT,
                    })?;
                }
            }
        }
        other => {
            eprintln!("Error: unknown file kind '{}', expected accounts or transfers.", other);
            std::process::exit(1);
        }
    }

    wtr.flush()?;
    Ok(())
}
