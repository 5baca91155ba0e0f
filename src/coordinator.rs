//! Transfer Coordinator
//!
//! Drives a single transfer through validation, ordered two-account locking,
//! balance mutation, persistence and notification.
//!
//! Locks are always taken in ascending account id order, whichever side is the
//! source. Two transfers touching the same pair in opposite directions therefore
//! contend for the same first lock instead of each holding one and waiting for
//! the other.

use rust_decimal::Decimal;
use std::sync::{Arc, MutexGuard};
use tracing::{debug, info};

use crate::notification::NotificationService;
use crate::stores::{Account, AccountSnapshot, AccountsStore};
use crate::Error;

/// Outcome of a committed transfer, with both balances as they were right
/// after the mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub from_balance: Decimal,
    pub to_balance: Decimal,
}

pub struct TransferCoordinator {
    store: Arc<AccountsStore>,
    notifier: Arc<dyn NotificationService>,
}

impl TransferCoordinator {
    pub fn new(store: Arc<AccountsStore>, notifier: Arc<dyn NotificationService>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &AccountsStore {
        &self.store
    }

    /// Opens an account with the given starting balance.
    pub fn create_account(
        &self,
        id: impl Into<String>,
        initial_balance: Decimal,
    ) -> Result<(), Error> {
        let account = self.store.create(Account::new(id, initial_balance)?)?;
        info!(account = %account.id(), balance = %initial_balance, "account created");
        Ok(())
    }

    /// Returns a copy of the account, or `NonexistentAccount` if the id is unknown.
    pub fn get_account(&self, id: &str) -> Result<AccountSnapshot, Error> {
        Ok(self.resolve(id)?.snapshot())
    }

    /// Moves `amount` from `from_id` to `to_id`.
    ///
    /// Checks run in this order: positive amount, distinct ids, both accounts
    /// exist. Sufficient funds are only checked once both locks are held. Both
    /// holders are notified after the locks are released, source first.
    pub fn transfer(
        &self,
        from_id: &str,
        to_id: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt, Error> {
        debug!(from = from_id, to = to_id, %amount, "validating transfer");
        if amount <= Decimal::ZERO {
            return Err(Error::NotPositiveAmount(amount));
        }
        if from_id == to_id {
            return Err(Error::SameOriginAndTarget(from_id.to_owned()));
        }
        let from = self.resolve(from_id)?;
        let to = self.resolve(to_id)?;

        let receipt = self.apply(&from, &to, amount)?;
        info!(
            from = from_id,
            to = to_id,
            %amount,
            from_balance = %receipt.from_balance,
            to_balance = %receipt.to_balance,
            "transfer committed"
        );

        debug!(from = from_id, to = to_id, "notifying account holders");
        self.notifier
            .notify_about_transfer(&from, &format!("Transferred {amount} to {to_id}"));
        self.notifier
            .notify_about_transfer(&to, &format!("Received {amount} from {from_id}"));

        Ok(receipt)
    }

    fn resolve(&self, id: &str) -> Result<Arc<Account>, Error> {
        self.store
            .get(id)
            .ok_or_else(|| Error::NonexistentAccount(id.to_owned()))
    }

    /// The critical section. Both guards live until the end of this function,
    /// so no other transfer can observe one side changed without the other.
    fn apply(
        &self,
        from: &Arc<Account>,
        to: &Arc<Account>,
        amount: Decimal,
    ) -> Result<TransferReceipt, Error> {
        let (mut from_balance, mut to_balance) = lock_in_order(from, to);
        debug!(from = %from.id(), to = %to.id(), "locks acquired");

        // Authoritative funds check: the balance may have moved since the
        // accounts were resolved.
        if *from_balance < amount {
            return Err(Error::InsufficientFunds {
                account: from.id().to_owned(),
                balance: *from_balance,
                amount,
            });
        }
        // Decimal arithmetic rounds silently once a result needs more than 28
        // significant digits, so each side must move by exactly `amount`.
        let debited = from_balance
            .checked_sub(amount)
            .filter(|debited| from_balance.checked_sub(*debited) == Some(amount))
            .ok_or_else(|| Error::PrecisionLoss {
                account: from.id().to_owned(),
                amount,
            })?;
        let credited = to_balance
            .checked_add(amount)
            .ok_or_else(|| Error::BalanceOverflow(to.id().to_owned()))?;
        if credited.checked_sub(*to_balance) != Some(amount) {
            return Err(Error::PrecisionLoss {
                account: to.id().to_owned(),
                amount,
            });
        }

        *from_balance = debited;
        *to_balance = credited;
        self.store.replace(&[Arc::clone(from), Arc::clone(to)]);

        Ok(TransferReceipt {
            from: from.id().to_owned(),
            to: to.id().to_owned(),
            amount,
            from_balance: *from_balance,
            to_balance: *to_balance,
        })
    }
}

/// Locks both balances, lower id first. Returns the guards as (from, to).
fn lock_in_order<'a>(
    from: &'a Account,
    to: &'a Account,
) -> (MutexGuard<'a, Decimal>, MutexGuard<'a, Decimal>) {
    lock_in_order_then(from, to, || {})
}

/// Same as [`lock_in_order`], running `between` while only the first lock is held.
fn lock_in_order_then<'a>(
    from: &'a Account,
    to: &'a Account,
    between: impl FnOnce(),
) -> (MutexGuard<'a, Decimal>, MutexGuard<'a, Decimal>) {
    if from.id() < to.id() {
        let from_guard = from.lock_balance();
        between();
        let to_guard = to.lock_balance();
        (from_guard, to_guard)
    } else {
        let to_guard = to.lock_balance();
        between();
        let from_guard = from.lock_balance();
        (from_guard, to_guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::RecordingNotificationService;
    use rust_decimal_macros::dec;
    use std::sync::mpsc::{self, RecvTimeoutError};
    use std::thread;
    use std::time::Duration;

    /// Upper bound for any test that could hang on a lock-ordering bug.
    const DEADLINE: Duration = Duration::from_secs(30);

    /// Runs `work` on its own thread and fails the test if it has not returned
    /// within [`DEADLINE`].
    fn within_deadline<T: Send + 'static>(work: impl FnOnce() -> T + Send + 'static) -> T {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(work());
        });
        match rx.recv_timeout(DEADLINE) {
            Ok(value) => value,
            Err(RecvTimeoutError::Timeout) => {
                panic!("no result after {DEADLINE:?}, transfers likely deadlocked")
            }
            Err(RecvTimeoutError::Disconnected) => panic!("worker panicked"),
        }
    }

    fn setup(
        accounts: &[(&str, Decimal)],
    ) -> (TransferCoordinator, Arc<RecordingNotificationService>) {
        let notifier = Arc::new(RecordingNotificationService::default());
        let coordinator =
            TransferCoordinator::new(Arc::new(AccountsStore::new()), notifier.clone());
        for (id, balance) in accounts {
            coordinator.create_account(*id, *balance).unwrap();
        }
        (coordinator, notifier)
    }

    fn balance(coordinator: &TransferCoordinator, id: &str) -> Decimal {
        coordinator.get_account(id).unwrap().balance
    }

    #[test]
    fn test_create_and_get_account() {
        let (coordinator, _) = setup(&[]);
        coordinator.create_account("Id-123", dec!(1000)).unwrap();

        let account = coordinator.get_account("Id-123").unwrap();
        assert_eq!(account.id, "Id-123");
        assert_eq!(account.balance, dec!(1000));
    }

    #[test]
    fn test_create_duplicate_account() {
        let (coordinator, _) = setup(&[("Id-1", dec!(5))]);
        assert_eq!(
            coordinator.create_account("Id-1", dec!(10)),
            Err(Error::DuplicateAccountId("Id-1".into()))
        );
        assert_eq!(balance(&coordinator, "Id-1"), dec!(5));
    }

    #[test]
    fn test_create_account_negative_balance() {
        let (coordinator, _) = setup(&[]);
        assert!(matches!(
            coordinator.create_account("Id-1", dec!(-1)),
            Err(Error::NegativeInitialBalance { .. })
        ));
        assert!(coordinator.store().is_empty());
    }

    #[test]
    fn test_get_missing_account() {
        let (coordinator, _) = setup(&[]);
        assert_eq!(
            coordinator.get_account("Id-0"),
            Err(Error::NonexistentAccount("Id-0".into()))
        );
    }

    #[test]
    fn test_transfer() {
        let (coordinator, notifier) = setup(&[("A", dec!(1000)), ("B", dec!(0))]);

        let receipt = coordinator.transfer("A", "B", dec!(300)).unwrap();

        assert_eq!(
            receipt,
            TransferReceipt {
                from: "A".into(),
                to: "B".into(),
                amount: dec!(300),
                from_balance: dec!(700),
                to_balance: dec!(300),
            }
        );
        assert_eq!(balance(&coordinator, "A"), dec!(700));
        assert_eq!(balance(&coordinator, "B"), dec!(300));
        assert_eq!(
            notifier.sent(),
            vec![
                ("A".to_owned(), "Transferred 300 to B".to_owned()),
                ("B".to_owned(), "Received 300 from A".to_owned()),
            ]
        );
    }

    #[test]
    fn test_transfer_direction_does_not_matter() {
        // "Id-1" sorts first, so the first transfer locks its target before its source
        let (coordinator, _) = setup(&[("Id-2", dec!(50)), ("Id-1", dec!(0))]);
        coordinator.transfer("Id-2", "Id-1", dec!(20)).unwrap();
        coordinator.transfer("Id-1", "Id-2", dec!(5)).unwrap();
        assert_eq!(balance(&coordinator, "Id-2"), dec!(35));
        assert_eq!(balance(&coordinator, "Id-1"), dec!(15));
    }

    #[test]
    fn test_transfer_entire_balance() {
        let (coordinator, _) = setup(&[("A", dec!(12.5)), ("B", dec!(0))]);
        coordinator.transfer("A", "B", dec!(12.5)).unwrap();
        assert_eq!(balance(&coordinator, "A"), Decimal::ZERO);
        assert_eq!(balance(&coordinator, "B"), dec!(12.5));
    }

    #[test]
    fn test_transfer_nonexistent_target() {
        let (coordinator, notifier) = setup(&[("A", dec!(1000))]);

        assert_eq!(
            coordinator.transfer("A", "missing", dec!(100)),
            Err(Error::NonexistentAccount("missing".into()))
        );
        assert_eq!(balance(&coordinator, "A"), dec!(1000));
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn test_transfer_nonexistent_source() {
        let (coordinator, _) = setup(&[("B", dec!(0))]);
        assert_eq!(
            coordinator.transfer("missing", "B", dec!(1)),
            Err(Error::NonexistentAccount("missing".into()))
        );
    }

    #[test]
    fn test_transfer_insufficient_funds_leaves_state_unchanged() {
        let (coordinator, notifier) = setup(&[("A", dec!(200)), ("B", dec!(1000))]);

        assert_eq!(
            coordinator.transfer("A", "B", dec!(300)),
            Err(Error::InsufficientFunds {
                account: "A".into(),
                balance: dec!(200),
                amount: dec!(300),
            })
        );
        assert_eq!(balance(&coordinator, "A"), dec!(200));
        assert_eq!(balance(&coordinator, "B"), dec!(1000));
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn test_transfer_amount_is_zero() {
        let (coordinator, _) = setup(&[("A", dec!(200)), ("B", dec!(1000))]);
        assert_eq!(
            coordinator.transfer("A", "B", Decimal::ZERO),
            Err(Error::NotPositiveAmount(Decimal::ZERO))
        );
        assert_eq!(balance(&coordinator, "A"), dec!(200));
        assert_eq!(balance(&coordinator, "B"), dec!(1000));
    }

    #[test]
    fn test_transfer_amount_is_negative() {
        let (coordinator, _) = setup(&[("A", dec!(200)), ("B", dec!(1000))]);
        assert_eq!(
            coordinator.transfer("A", "B", dec!(-1)),
            Err(Error::NotPositiveAmount(dec!(-1)))
        );
        assert_eq!(balance(&coordinator, "A"), dec!(200));
        assert_eq!(balance(&coordinator, "B"), dec!(1000));
    }

    #[test]
    fn test_transfer_same_origin_and_target() {
        let (coordinator, _) = setup(&[("A", dec!(200))]);
        assert_eq!(
            coordinator.transfer("A", "A", dec!(200)),
            Err(Error::SameOriginAndTarget("A".into()))
        );
        assert_eq!(balance(&coordinator, "A"), dec!(200));
    }

    #[test]
    fn test_transfer_same_origin_and_target_unknown_account() {
        let (coordinator, _) = setup(&[]);
        assert_eq!(
            coordinator.transfer("ghost", "ghost", dec!(1)),
            Err(Error::SameOriginAndTarget("ghost".into()))
        );
    }

    #[test]
    fn test_amount_checked_before_account_ids() {
        let (coordinator, _) = setup(&[]);
        assert!(matches!(
            coordinator.transfer("ghost", "ghost", dec!(0)),
            Err(Error::NotPositiveAmount(_))
        ));
    }

    #[test]
    fn test_credit_losing_precision_is_rejected() {
        // 1e27 + 0.01 needs 30 significant digits
        let (coordinator, notifier) = setup(&[
            ("A", dec!(1)),
            ("B", dec!(1000000000000000000000000000)),
        ]);
        assert_eq!(
            coordinator.transfer("A", "B", dec!(0.01)),
            Err(Error::PrecisionLoss {
                account: "B".into(),
                amount: dec!(0.01),
            })
        );
        assert_eq!(balance(&coordinator, "A"), dec!(1));
        assert_eq!(balance(&coordinator, "B"), dec!(1000000000000000000000000000));
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn test_debit_losing_precision_is_rejected() {
        let (coordinator, _) = setup(&[
            ("A", dec!(1000000000000000000000000000)),
            ("B", dec!(0)),
        ]);
        assert_eq!(
            coordinator.transfer("A", "B", dec!(0.01)),
            Err(Error::PrecisionLoss {
                account: "A".into(),
                amount: dec!(0.01),
            })
        );
        assert_eq!(balance(&coordinator, "A"), dec!(1000000000000000000000000000));
        assert_eq!(balance(&coordinator, "B"), Decimal::ZERO);
    }

    #[test]
    fn test_large_balances_move_exactly() {
        let (coordinator, _) = setup(&[
            ("A", dec!(1000000000000000000000000000)),
            ("B", dec!(0)),
        ]);
        coordinator.transfer("A", "B", dec!(1)).unwrap();
        assert_eq!(balance(&coordinator, "A"), dec!(999999999999999999999999999));
        assert_eq!(balance(&coordinator, "B"), dec!(1));
    }

    #[test]
    fn test_transfer_balance_overflow_leaves_state_unchanged() {
        let (coordinator, notifier) = setup(&[("A", dec!(10)), ("B", Decimal::MAX)]);
        assert_eq!(
            coordinator.transfer("A", "B", dec!(1)),
            Err(Error::BalanceOverflow("B".into()))
        );
        assert_eq!(balance(&coordinator, "A"), dec!(10));
        assert_eq!(balance(&coordinator, "B"), Decimal::MAX);
        assert!(notifier.sent().is_empty());
    }

    /// Reads the balance it is told about. Would block forever if called while
    /// the coordinator still held that account's lock.
    struct BalanceReadingNotifier;

    impl NotificationService for BalanceReadingNotifier {
        fn notify_about_transfer(&self, account: &Account, _message: &str) {
            let _ = account.balance();
        }
    }

    #[test]
    fn test_notifications_sent_after_locks_released() {
        let coordinator = TransferCoordinator::new(
            Arc::new(AccountsStore::new()),
            Arc::new(BalanceReadingNotifier),
        );
        coordinator.create_account("A", dec!(10)).unwrap();
        coordinator.create_account("B", dec!(0)).unwrap();

        coordinator.transfer("A", "B", dec!(4)).unwrap();
        assert_eq!(balance(&coordinator, "B"), dec!(4));
    }

    #[test]
    fn test_transfer_concurrent_threads() {
        let (coordinator, notifier) = setup(&[("A", dec!(1000)), ("B", dec!(0))]);
        let coordinator = Arc::new(coordinator);

        // 50 concurrent transfers from 25 workers. Each worker sends 10 from A
        // to B and only then 1 from B back to A, so only the interleaving
        // across workers varies. Every debit of B follows a credit of 10 from
        // the same worker, which keeps every B->A transfer funded.
        let shared = Arc::clone(&coordinator);
        within_deadline(move || {
            thread::scope(|s| {
                for _ in 0..25 {
                    s.spawn(|| {
                        shared.transfer("A", "B", dec!(10)).unwrap();
                        shared.transfer("B", "A", dec!(1)).unwrap();
                    });
                }
            })
        });

        assert_eq!(balance(&coordinator, "A"), dec!(775));
        assert_eq!(balance(&coordinator, "B"), dec!(225));
        assert_eq!(notifier.count_for("A"), 50);
        assert_eq!(notifier.count_for("B"), 50);
    }

    #[test]
    fn test_contended_transfers_terminate_and_conserve() {
        const IDS: [&str; 4] = ["w", "x", "y", "z"];
        let (coordinator, _) = setup(&IDS.map(|id| (id, dec!(100))));
        let coordinator = Arc::new(coordinator);

        let shared = Arc::clone(&coordinator);
        within_deadline(move || {
            thread::scope(|s| {
                for worker in 0..8 {
                    let coordinator = &shared;
                    s.spawn(move || {
                        for i in 0..500 {
                            let from = IDS[(worker + i) % IDS.len()];
                            // Odd workers walk the ring backwards to create reversed pairs
                            let step = if worker % 2 == 0 { 1 } else { IDS.len() - 1 };
                            let to = IDS[(worker + i + step) % IDS.len()];
                            match coordinator.transfer(from, to, dec!(3)) {
                                Ok(_) | Err(Error::InsufficientFunds { .. }) => {}
                                Err(e) => panic!("unexpected error: {e}"),
                            }
                        }
                    });
                }
            })
        });

        let snapshot = coordinator.store().snapshot();
        let total: Decimal = snapshot.iter().map(|a| a.balance).sum();
        assert_eq!(total, dec!(400));
        assert!(snapshot.iter().all(|a| a.balance >= Decimal::ZERO));
    }

    #[test]
    fn test_reversed_pair_locks_cannot_deadlock() {
        // Each side takes its first lock, tells the other, then waits briefly
        // for the other to hold its own first lock. Locking by role would leave
        // A->B holding A and B->A holding B, both waiting forever.
        const HANDOFF: Duration = Duration::from_millis(200);
        let a = Arc::new(Account::new("A", dec!(5)).unwrap());
        let b = Arc::new(Account::new("B", dec!(5)).unwrap());

        let finished = within_deadline(move || {
            let (a_ready, a_ready_rx) = mpsc::channel();
            let (b_ready, b_ready_rx) = mpsc::channel();
            thread::scope(|s| {
                let forward = s.spawn(|| {
                    let _guards = lock_in_order_then(&a, &b, move || {
                        let _ = a_ready.send(());
                        let _ = b_ready_rx.recv_timeout(HANDOFF);
                    });
                });
                let backward = s.spawn(|| {
                    let _guards = lock_in_order_then(&b, &a, move || {
                        let _ = b_ready.send(());
                        let _ = a_ready_rx.recv_timeout(HANDOFF);
                    });
                });
                [forward.join().is_ok(), backward.join().is_ok()]
            })
        });

        assert_eq!(finished, [true, true]);
    }
}
