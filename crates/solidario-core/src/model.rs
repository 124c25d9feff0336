//! Domain Models
//!
//! Ledger, user and notification types. Money is always `rust_decimal`;
//! it crosses JSON boundaries as a plain number because that is what the
//! payment gateway and the mobile clients speak.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Lifecycle state of a ledger transaction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Done,
    Canceled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Done => "done",
            TransactionStatus::Canceled => "canceled",
        }
    }

    /// Whether a row in this state may move to `next`.
    ///
    /// Only `Pending` has outgoing edges; `Done` and `Canceled` are terminal.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Done)
                | (TransactionStatus::Pending, TransactionStatus::Canceled)
        )
    }

    /// States from which `target` is reachable in one step
    pub fn predecessors(target: TransactionStatus) -> &'static [TransactionStatus] {
        match target {
            TransactionStatus::Pending => &[],
            TransactionStatus::Done | TransactionStatus::Canceled => &[TransactionStatus::Pending],
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "done" => Ok(TransactionStatus::Done),
            "canceled" => Ok(TransactionStatus::Canceled),
            other => Err(CoreError::Parse(format!("unknown transaction status '{other}'"))),
        }
    }
}

/// A tracked payment attempt, keyed by the gateway's payment ID
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Internal ID, assigned on insert
    pub id: i64,

    /// Gateway payment ID; unique across the ledger
    pub external_id: String,

    pub payer_id: i64,
    pub payee_id: i64,

    /// Requested amount until settlement, gateway-reported amount after
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    pub status: TransactionStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set once the settlement notification and thank-you email were dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified_at: Option<DateTime<Utc>>,
}

/// Fields needed to start tracking a gateway charge
#[derive(Clone, Debug, PartialEq)]
pub struct NewTransaction {
    pub external_id: String,
    pub payer_id: i64,
    pub payee_id: i64,
    pub amount: Decimal,
    pub description: String,
}

/// A platform user, restricted to the fields payments need
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub email: String,

    /// Brazilian taxpayer document (11 digits), sent to the gateway as payer identification
    pub cpf: String,
    pub postal_code: String,
    pub city: String,
    pub state: String,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

/// What a notification points at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Payment,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Payment => "payment",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment" => Ok(NotificationKind::Payment),
            other => Err(CoreError::Parse(format!("unknown notification kind '{other}'"))),
        }
    }
}

/// An in-app notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,

    /// Recipient
    pub user_id: i64,
    pub from_user_id: i64,
    pub kind: NotificationKind,

    /// ID of the referenced resource (a transaction for `Payment`)
    pub resource_id: i64,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sender of a notification, as shown to the recipient
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSender {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub email: String,
}

impl From<&User> for NotificationSender {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            surname: user.surname.clone(),
            email: user.email.clone(),
        }
    }
}

/// Transaction a payment notification refers to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationTransaction {
    pub id: i64,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for NotificationTransaction {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            amount: tx.amount,
            created_at: tx.created_at,
        }
    }
}

/// A notification joined with its sender and referenced transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationDetail {
    pub id: i64,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub from_user: NotificationSender,

    /// `None` when the referenced transaction no longer exists
    pub transaction: Option<NotificationTransaction>,
}

/// Notification to be stored
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: i64,
    pub from_user_id: i64,
    pub kind: NotificationKind,
    pub resource_id: i64,
    pub is_read: bool,
}

impl NewNotification {
    /// "You received a payment" for the payee of a settled transaction
    pub fn payment_received(transaction: &Transaction) -> Self {
        Self {
            user_id: transaction.payee_id,
            from_user_id: transaction.payer_id,
            kind: NotificationKind::Payment,
            resource_id: transaction.id,
            is_read: false,
        }
    }
}
