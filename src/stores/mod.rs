//! Storage layer for the transfer system. Provides:
//! - The [`Account`] entity, each carrying its own balance lock
//! - The concurrent [`AccountsStore`] registry
//!
//! Storage is in-memory only and lives for the duration of the process.

mod accounts;

pub use accounts::{Account, AccountSnapshot, AccountsStore};
