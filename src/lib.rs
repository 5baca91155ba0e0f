pub mod config;
mod coordinator;
mod csv_utils;
mod dto;
mod error;
pub mod logging;
mod notification;
mod runner;
mod stores;

pub use config::{Config, ConfigError};
pub use coordinator::{TransferCoordinator, TransferReceipt};
pub use dto::{AccountRow, TransferRow};
pub use error::Error;
pub use notification::{LoggingNotificationService, NotificationService};
pub use runner::{run, run_async, RunSummary};
pub use stores::{Account, AccountSnapshot, AccountsStore};
