//! Postgres Storage
//!
//! Ledger, notification and user lookups over a shared `PgPool`. Each write
//! is a single conditional statement; the `transactions.external_id` unique
//! constraint is what makes concurrent first-time inserts collapse to one row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use solidario_core::{
    NewNotification, NewTransaction, Notification, NotificationDetail, NotificationSender,
    NotificationTransaction, Transaction, TransactionStatus, User,
};

use crate::directory::UserDirectory;
use crate::error::{PaymentError, Result};
use crate::ledger::{StatusUpdate, TransactionLedger};
use crate::notify::NotificationStore;

/// Schema migrations for every table these stores touch
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

const TRANSACTION_COLUMNS: &str = "id, external_id, payer_id, payee_id, amount, status, \
     description, created_at, updated_at, notified_at";

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, from_user_id, type, resource_id, is_read, created_at, updated_at";

#[derive(FromRow)]
struct TransactionRow {
    id: i64,
    external_id: String,
    payer_id: i64,
    payee_id: i64,
    amount: Decimal,
    status: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    notified_at: Option<DateTime<Utc>>,
}

impl TransactionRow {
    fn into_domain(self) -> Result<Transaction> {
        Ok(Transaction {
            id: self.id,
            external_id: self.external_id,
            payer_id: self.payer_id,
            payee_id: self.payee_id,
            amount: self.amount,
            status: self.status.parse()?,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
            notified_at: self.notified_at,
        })
    }
}

/// Postgres-backed transaction ledger
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionLedger for PgLedger {
    async fn create_transaction(&self, new: NewTransaction) -> Result<Option<Transaction>> {
        if self.get_by_external_id(&new.external_id).await?.is_some() {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r"
            INSERT INTO transactions (external_id, payer_id, payee_id, amount, status, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING {TRANSACTION_COLUMNS}
            "
        ))
        .bind(&new.external_id)
        .bind(new.payer_id)
        .bind(new.payee_id)
        .bind(new.amount)
        .bind(TransactionStatus::Pending.as_str())
        .bind(&new.description)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn update_status_and_amount(
        &self,
        external_id: &str,
        status: TransactionStatus,
        amount: Decimal,
    ) -> Result<StatusUpdate> {
        let allowed_from: Vec<String> = TransactionStatus::predecessors(status)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let updated = sqlx::query_as::<_, TransactionRow>(&format!(
            r"
            UPDATE transactions
            SET status = $2, amount = $3, updated_at = NOW()
            WHERE external_id = $1 AND status = ANY($4)
            RETURNING {TRANSACTION_COLUMNS}
            "
        ))
        .bind(external_id)
        .bind(status.as_str())
        .bind(amount)
        .bind(allowed_from)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(StatusUpdate {
                transaction: row.into_domain()?,
                applied: true,
            });
        }

        let current = self
            .get_by_external_id(external_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(external_id.to_string()))?;

        Ok(StatusUpdate {
            transaction: current,
            applied: false,
        })
    }

    async fn claim_settlement_notice(&self, external_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE transactions
            SET notified_at = NOW()
            WHERE external_id = $1 AND status = $2 AND notified_at IS NULL
            ",
        )
        .bind(external_id)
        .bind(TransactionStatus::Done.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        if self.get_by_external_id(external_id).await?.is_none() {
            return Err(PaymentError::TransactionNotFound(external_id.to_string()));
        }
        Ok(false)
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: i64,
    user_id: i64,
    from_user_id: i64,
    #[sqlx(rename = "type")]
    kind: String,
    resource_id: i64,
    is_read: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NotificationRow {
    fn into_domain(self) -> Result<Notification> {
        Ok(Notification {
            id: self.id,
            user_id: self.user_id,
            from_user_id: self.from_user_id,
            kind: self.kind.parse()?,
            resource_id: self.resource_id,
            is_read: self.is_read,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct NotificationDetailRow {
    id: i64,
    #[sqlx(rename = "type")]
    kind: String,
    is_read: bool,
    created_at: DateTime<Utc>,
    from_user_id: i64,
    from_name: String,
    from_surname: String,
    from_email: String,
    transaction_id: Option<i64>,
    transaction_amount: Option<Decimal>,
    transaction_created_at: Option<DateTime<Utc>>,
}

impl NotificationDetailRow {
    fn into_domain(self) -> Result<NotificationDetail> {
        let transaction = match (self.transaction_id, self.transaction_amount, self.transaction_created_at) {
            (Some(id), Some(amount), Some(created_at)) => Some(NotificationTransaction {
                id,
                amount,
                created_at,
            }),
            _ => None,
        };

        Ok(NotificationDetail {
            id: self.id,
            kind: self.kind.parse()?,
            is_read: self.is_read,
            created_at: self.created_at,
            from_user: NotificationSender {
                id: self.from_user_id,
                name: self.from_name,
                surname: self.from_surname,
                email: self.from_email,
            },
            transaction,
        })
    }
}

/// Postgres-backed notification store
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification> {
        sqlx::query_as::<_, NotificationRow>(&format!(
            r"
            INSERT INTO notifications (user_id, from_user_id, type, resource_id, is_read)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLUMNS}
            "
        ))
        .bind(notification.user_id)
        .bind(notification.from_user_id)
        .bind(notification.kind.as_str())
        .bind(notification.resource_id)
        .bind(notification.is_read)
        .fetch_one(&self.pool)
        .await?
        .into_domain()
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>> {
        sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(NotificationRow::into_domain)
        .collect()
    }

    async fn list_details_for_user(&self, user_id: i64) -> Result<Vec<NotificationDetail>> {
        sqlx::query_as::<_, NotificationDetailRow>(
            r"
            SELECT n.id, n.type, n.is_read, n.created_at,
                   u.id AS from_user_id, u.name AS from_name,
                   u.surname AS from_surname, u.email AS from_email,
                   t.id AS transaction_id, t.amount AS transaction_amount,
                   t.created_at AS transaction_created_at
            FROM notifications n
            JOIN users u ON u.id = n.from_user_id
            LEFT JOIN transactions t ON t.id = n.resource_id
            WHERE n.user_id = $1
            ORDER BY n.created_at DESC, n.id DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(NotificationDetailRow::into_domain)
        .collect()
    }

    async fn mark_read(&self, id: i64, user_id: i64) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r"
            UPDATE notifications
            SET is_read = TRUE, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NotificationRow::into_domain).transpose()
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    name: String,
    surname: String,
    email: String,
    cpf: String,
    postal_code: String,
    city: String,
    state: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            surname: row.surname,
            email: row.email,
            cpf: row.cpf,
            postal_code: row.postal_code,
            city: row.city,
            state: row.state,
        }
    }
}

/// Postgres-backed user lookups
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, surname, email, cpf, postal_code, city, state FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }
}
