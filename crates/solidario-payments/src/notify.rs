//! Settlement Side Effects
//!
//! In-app notifications and the thank-you email sent after a payment
//! settles. Both are best-effort from the reconciler's point of view: their
//! failures are logged and never undo or retry a settlement.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use solidario_core::{
    NewNotification, Notification, NotificationDetail, NotificationSender, NotificationTransaction,
    User,
};

use crate::directory::UserDirectory;
use crate::error::{PaymentError, Result};
use crate::ledger::TransactionLedger;

/// Notification storage trait
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Store a notification
    async fn create(&self, notification: NewNotification) -> Result<Notification>;

    /// Notifications addressed to a user, newest first
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>>;

    /// `list_for_user` joined with each sender and referenced transaction.
    ///
    /// Notifications whose sender no longer exists are left out.
    async fn list_details_for_user(&self, user_id: i64) -> Result<Vec<NotificationDetail>>;

    /// Mark as read. Returns `None` when the notification does not exist or
    /// belongs to someone else.
    async fn mark_read(&self, id: i64, user_id: i64) -> Result<Option<Notification>>;
}

/// Outbound email trait
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Thank the payer for a settled payment
    async fn send_payment_thanks(&self, payer: &User, amount: Decimal) -> Result<()>;
}

/// In-memory notification store (for development and tests)
pub struct MemoryNotificationStore {
    notifications: RwLock<Vec<Notification>>,

    /// Sources for `list_details_for_user`
    lookups: Option<(Arc<dyn UserDirectory>, Arc<dyn TransactionLedger>)>,
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            notifications: RwLock::new(Vec::new()),
            lookups: None,
        }
    }

    /// Resolve senders and transactions for detailed listings
    #[must_use]
    pub fn with_lookups(mut self, users: Arc<dyn UserDirectory>, ledger: Arc<dyn TransactionLedger>) -> Self {
        self.lookups = Some((users, ledger));
        self
    }

    /// Every stored notification, oldest first
    pub async fn all(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification> {
        let mut notifications = self.notifications.write().await;
        let now = Utc::now();
        let stored = Notification {
            id: notifications.last().map_or(1, |n| n.id + 1),
            user_id: notification.user_id,
            from_user_id: notification.from_user_id,
            kind: notification.kind,
            resource_id: notification.resource_id,
            is_read: notification.is_read,
            created_at: now,
            updated_at: now,
        };
        notifications.push(stored.clone());
        Ok(stored)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_details_for_user(&self, user_id: i64) -> Result<Vec<NotificationDetail>> {
        let (users, ledger) = self.lookups.as_ref().ok_or_else(|| {
            PaymentError::Config("notification details need user and ledger lookups".into())
        })?;

        let mut details = Vec::new();
        for notification in self.list_for_user(user_id).await? {
            let Some(sender) = users.get_user(notification.from_user_id).await? else {
                continue;
            };
            let transaction = ledger.get_by_id(notification.resource_id).await?;

            details.push(NotificationDetail {
                id: notification.id,
                kind: notification.kind,
                is_read: notification.is_read,
                created_at: notification.created_at,
                from_user: NotificationSender::from(&sender),
                transaction: transaction.as_ref().map(NotificationTransaction::from),
            });
        }
        Ok(details)
    }

    async fn mark_read(&self, id: i64, user_id: i64) -> Result<Option<Notification>> {
        let mut notifications = self.notifications.write().await;
        Ok(notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .map(|n| {
                n.is_read = true;
                n.updated_at = Utc::now();
                n.clone()
            }))
    }
}

/// Mailer that only logs (used when no mail provider is configured)
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_payment_thanks(&self, payer: &User, amount: Decimal) -> Result<()> {
        tracing::info!(
            user_id = payer.id,
            email = %payer.email,
            amount = %amount,
            "Payment thanks email (mail delivery disabled)"
        );
        Ok(())
    }
}

/// A thank-you email captured by `RecordingMailer`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentThanks {
    pub user_id: i64,
    pub email: String,
    pub amount: Decimal,
}

/// Mailer that records what it was asked to send (test double)
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentThanks>>,
    failure: Mutex<Option<String>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail until cleared
    pub async fn fail_with(&self, message: Option<&str>) {
        *self.failure.lock().await = message.map(str::to_string);
    }

    pub async fn sent(&self) -> Vec<SentThanks> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_payment_thanks(&self, payer: &User, amount: Decimal) -> Result<()> {
        if let Some(message) = self.failure.lock().await.clone() {
            return Err(PaymentError::Notifier(message));
        }

        self.sent.lock().await.push(SentThanks {
            user_id: payer.id,
            email: payer.email.clone(),
            amount,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryUserDirectory;
    use crate::ledger::MemoryLedger;
    use rust_decimal_macros::dec;
    use solidario_core::{NewTransaction, NotificationKind};

    fn user(id: i64, name: &str) -> User {
        User {
            id,
            name: name.into(),
            surname: "Souza".into(),
            email: format!("{}@example.com", name.to_lowercase()),
            cpf: "12345678909".into(),
            postal_code: "01001000".into(),
            city: "São Paulo".into(),
            state: "SP".into(),
        }
    }

    fn payment_notice(user_id: i64, resource_id: i64) -> NewNotification {
        NewNotification {
            user_id,
            from_user_id: 1,
            kind: NotificationKind::Payment,
            resource_id,
            is_read: false,
        }
    }

    #[tokio::test]
    async fn test_list_newest_first_and_scoped() {
        let store = MemoryNotificationStore::new();
        store.create(payment_notice(2, 10)).await.unwrap();
        store.create(payment_notice(3, 11)).await.unwrap();
        store.create(payment_notice(2, 12)).await.unwrap();

        let listed = store.list_for_user(2).await.unwrap();
        let resources: Vec<_> = listed.iter().map(|n| n.resource_id).collect();
        assert_eq!(resources, vec![12, 10]);
    }

    #[tokio::test]
    async fn test_details_join_sender_and_transaction() {
        let users = Arc::new(MemoryUserDirectory::with_users([user(1, "Ana"), user(2, "Bia")]));
        let ledger = Arc::new(MemoryLedger::new());
        let tx = ledger
            .create_transaction(NewTransaction {
                external_id: "555".into(),
                payer_id: 1,
                payee_id: 2,
                amount: dec!(49.90),
                description: "Payment".into(),
            })
            .await
            .unwrap()
            .unwrap();
        let store = MemoryNotificationStore::new().with_lookups(users, ledger);

        store.create(NewNotification::payment_received(&tx)).await.unwrap();
        // Sender 7 is unknown: left out, like an inner join
        store
            .create(NewNotification {
                from_user_id: 7,
                ..payment_notice(2, tx.id)
            })
            .await
            .unwrap();
        // Dangling resource: kept, without a transaction
        store.create(payment_notice(2, 999)).await.unwrap();

        let details = store.list_details_for_user(2).await.unwrap();
        assert_eq!(details.len(), 2);

        assert!(details[0].transaction.is_none());
        assert_eq!(details[0].from_user.id, 1);

        let paid = &details[1];
        assert_eq!(paid.kind, NotificationKind::Payment);
        assert_eq!(paid.from_user.name, "Ana");
        assert_eq!(paid.from_user.email, "ana@example.com");
        let joined = paid.transaction.as_ref().unwrap();
        assert_eq!(joined.id, tx.id);
        assert_eq!(joined.amount, dec!(49.90));
        assert_eq!(joined.created_at, tx.created_at);
    }

    #[tokio::test]
    async fn test_details_need_lookups() {
        let store = MemoryNotificationStore::new();
        let result = store.list_details_for_user(2).await;
        assert!(matches!(result, Err(PaymentError::Config(_))));
    }

    #[tokio::test]
    async fn test_mark_read_requires_owner() {
        let store = MemoryNotificationStore::new();
        let created = store.create(payment_notice(2, 10)).await.unwrap();

        assert!(store.mark_read(created.id, 3).await.unwrap().is_none());

        let read = store.mark_read(created.id, 2).await.unwrap().unwrap();
        assert!(read.is_read);
    }

    #[tokio::test]
    async fn test_recording_mailer_failure() {
        let mailer = RecordingMailer::new();
        let user = user(1, "Ana");

        mailer.fail_with(Some("smtp down")).await;
        assert!(mailer.send_payment_thanks(&user, Decimal::ONE).await.is_err());
        assert!(mailer.sent().await.is_empty());

        mailer.fail_with(None).await;
        mailer.send_payment_thanks(&user, Decimal::ONE).await.unwrap();
        assert_eq!(mailer.sent().await.len(), 1);
    }
}
