//! Transaction Ledger
//!
//! Durable record of gateway charges, keyed by the gateway payment ID.
//!
//! The ledger is the only shared mutable state on the payment path. Every
//! write is a single conditional operation:
//!
//! - `create_transaction` inserts only when no row carries the external ID
//! - `update_status_and_amount` applies only along a legal status edge
//! - `claim_settlement_notice` flips `notified_at` once per settled row
//!
//! so concurrent webhook deliveries and status polls for the same payment
//! collapse to one effect.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

use solidario_core::{NewTransaction, Transaction, TransactionStatus};

use crate::error::{PaymentError, Result};

/// Result of a conditional status update
#[derive(Clone, Debug, PartialEq)]
pub struct StatusUpdate {
    /// Row as it stands after the call
    pub transaction: Transaction,

    /// `true` only for the call that performed the transition
    pub applied: bool,
}

/// Ledger storage trait
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Start tracking a charge.
    ///
    /// Returns `Ok(None)` when a row for `external_id` already exists: the
    /// charge is already tracked and the caller has nothing more to do.
    async fn create_transaction(&self, new: NewTransaction) -> Result<Option<Transaction>>;

    /// Look up a row; `Ok(None)` means "no such row", not a failure
    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Transaction>>;

    /// Look up a row by its internal ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Transaction>>;

    /// Move a row to `status` and record the gateway-authoritative amount.
    ///
    /// Applies only if the current status may transition to `status`;
    /// otherwise the row is left untouched and `applied` is `false`.
    /// A missing row is `PaymentError::TransactionNotFound`.
    async fn update_status_and_amount(
        &self,
        external_id: &str,
        status: TransactionStatus,
        amount: Decimal,
    ) -> Result<StatusUpdate>;

    /// Claim the right to dispatch settlement side effects for a `Done` row.
    ///
    /// Returns `true` for exactly one caller per row.
    async fn claim_settlement_notice(&self, external_id: &str) -> Result<bool>;
}

/// In-memory ledger (for development and tests)
pub struct MemoryLedger {
    rows: RwLock<LedgerRows>,
}

struct LedgerRows {
    by_external_id: HashMap<String, Transaction>,
    next_id: i64,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(LedgerRows {
                by_external_id: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Number of tracked transactions
    pub async fn len(&self) -> usize {
        self.rows.read().await.by_external_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Overwrite a row's status without any transition check.
    ///
    /// Stands in for out-of-band data manipulation (operator tooling).
    pub async fn force_status(&self, external_id: &str, status: TransactionStatus) -> Result<()> {
        let mut rows = self.rows.write().await;
        let tx = rows
            .by_external_id
            .get_mut(external_id)
            .ok_or_else(|| PaymentError::TransactionNotFound(external_id.to_string()))?;
        tx.status = status;
        tx.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TransactionLedger for MemoryLedger {
    async fn create_transaction(&self, new: NewTransaction) -> Result<Option<Transaction>> {
        let mut rows = self.rows.write().await;

        if rows.by_external_id.contains_key(&new.external_id) {
            return Ok(None);
        }

        let now = Utc::now();
        let tx = Transaction {
            id: rows.next_id,
            external_id: new.external_id,
            payer_id: new.payer_id,
            payee_id: new.payee_id,
            amount: new.amount,
            status: TransactionStatus::Pending,
            description: new.description,
            created_at: now,
            updated_at: now,
            notified_at: None,
        };
        rows.next_id += 1;
        rows.by_external_id.insert(tx.external_id.clone(), tx.clone());

        Ok(Some(tx))
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Transaction>> {
        Ok(self.rows.read().await.by_external_id.get(external_id).cloned())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Transaction>> {
        let rows = self.rows.read().await;
        Ok(rows.by_external_id.values().find(|tx| tx.id == id).cloned())
    }

    async fn update_status_and_amount(
        &self,
        external_id: &str,
        status: TransactionStatus,
        amount: Decimal,
    ) -> Result<StatusUpdate> {
        let mut rows = self.rows.write().await;
        let tx = rows
            .by_external_id
            .get_mut(external_id)
            .ok_or_else(|| PaymentError::TransactionNotFound(external_id.to_string()))?;

        if !tx.status.can_transition_to(status) {
            return Ok(StatusUpdate {
                transaction: tx.clone(),
                applied: false,
            });
        }

        tx.status = status;
        tx.amount = amount;
        tx.updated_at = Utc::now();

        Ok(StatusUpdate {
            transaction: tx.clone(),
            applied: true,
        })
    }

    async fn claim_settlement_notice(&self, external_id: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let tx = rows
            .by_external_id
            .get_mut(external_id)
            .ok_or_else(|| PaymentError::TransactionNotFound(external_id.to_string()))?;

        if tx.status != TransactionStatus::Done || tx.notified_at.is_some() {
            return Ok(false);
        }

        tx.notified_at = Some(Utc::now());
        Ok(true)
    }
}
