//! Outbound notifications to account holders.
//!
//! The coordinator only knows the [`NotificationService`] contract. Delivery is
//! fire-and-forget: nothing is returned, and a lost message never rolls back a
//! committed transfer.

use tracing::info;

use crate::stores::Account;

pub trait NotificationService: Send + Sync {
    /// Tells the holder of `account` about a transfer it took part in.
    fn notify_about_transfer(&self, account: &Account, message: &str);
}

/// Emits every notification as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotificationService;

impl NotificationService for LoggingNotificationService {
    fn notify_about_transfer(&self, account: &Account, message: &str) {
        info!(account = %account.id(), message, "sending notification");
    }
}

#[cfg(test)]
pub(crate) use recording::RecordingNotificationService;
