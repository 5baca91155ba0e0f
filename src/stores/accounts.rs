use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::Error;

/// A balance holder. The balance sits behind the account's own mutex, which is
/// the exclusive-access primitive the coordinator locks during a transfer.
#[derive(Debug)]
pub struct Account {
    id: String,
    balance: Mutex<Decimal>,
}

/// Point-in-time copy of an account handed out to callers outside the core.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub id: String,
    pub balance: Decimal,
}

impl Account {
    /// Opens a new account. The id must be non-empty and the opening balance
    /// must not be negative.
    pub fn new(id: impl Into<String>, balance: Decimal) -> Result<Self, Error> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::EmptyAccountId);
        }
        if balance < Decimal::ZERO {
            return Err(Error::NegativeInitialBalance {
                account: id,
                balance,
            });
        }
        Ok(Self {
            id,
            balance: Mutex::new(balance),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn balance(&self) -> Decimal {
        *self.lock_balance()
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            id: self.id.clone(),
            balance: self.balance(),
        }
    }

    /// Takes exclusive access to the balance.
    /// Only the transfer coordinator mutates through this guard.
    ///
    /// A poisoned lock is recovered: nothing panics between the funds check and
    /// the two writes of a transfer, so the guarded value is always consistent.
    pub(crate) fn lock_balance(&self) -> MutexGuard<'_, Decimal> {
        self.balance.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-wide account registry. Every account lives here exactly once, behind
/// an `Arc`, so concurrent callers always work on the same underlying balance.
#[derive(Default)]
pub struct AccountsStore {
    accounts: DashMap<String, Arc<Account>>,
}

impl AccountsStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Inserts the account if its id is not taken yet.
    /// The check and the insert happen under the same shard lock, so two racing
    /// creates of one id yield exactly one success.
    pub fn create(&self, account: Account) -> Result<Arc<Account>, Error> {
        match self.accounts.entry(account.id.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateAccountId(account.id)),
            Entry::Vacant(entry) => {
                let account = Arc::new(account);
                entry.insert(Arc::clone(&account));
                debug!(account = %account.id, "account stored");
                Ok(account)
            }
        }
    }

    /// Gets a handle to the live account, or `None` if the id is unknown.
    pub fn get(&self, id: &str) -> Option<Arc<Account>> {
        self.accounts.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Writes the given accounts back after a transfer.
    ///
    /// Only the handle already live for an id may be written, so there is never
    /// more than one instance per id. A different instance under the same id
    /// is refused and the live one is kept. Calling it with handles that are
    /// already stored is a no-op in effect.
    pub(crate) fn replace(&self, accounts: &[Arc<Account>]) {
        for account in accounts {
            match self.accounts.entry(account.id.clone()) {
                Entry::Occupied(mut entry) if Arc::ptr_eq(entry.get(), account) => {
                    entry.insert(Arc::clone(account));
                }
                Entry::Occupied(_) => {
                    warn!(account = %account.id, "refusing to replace live account with another instance");
                }
                Entry::Vacant(entry) => {
                    entry.insert(Arc::clone(account));
                }
            }
        }
    }

    /// Removes every account. Intended for resets between test runs.
    pub fn clear(&self) {
        self.accounts.clear();
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Copies every account, sorted by id.
    ///
    /// Each balance is read under its own lock; the result is not a single
    /// atomic cut across accounts while transfers are still running.
    pub fn snapshot(&self) -> Vec<AccountSnapshot> {
        // Shard guards must be released before any account mutex is taken:
        // a running transfer holds account locks while it calls `replace`.
        let accounts: Vec<Arc<Account>> = self
            .accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut snapshots: Vec<_> = accounts.iter().map(|a| a.snapshot()).collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }
}
