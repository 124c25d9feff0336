//! Payment Orchestrator
//!
//! Creates PIX charges and answers status polls by coordinating the gateway
//! with the ledger.
//!
//! A ledger row is only ever written after the gateway has accepted a
//! charge, because the row is keyed by the gateway-assigned payment ID.
//! The status poll may settle a row but never raises settlement side
//! effects; those belong to the webhook reconciler.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use solidario_core::{NewTransaction, TransactionStatus, User};

use crate::directory::UserDirectory;
use crate::error::{PaymentError, Result};
use crate::gateway::{ChargeRequest, PayerProfile, PaymentGateway};
use crate::ledger::TransactionLedger;

const DEFAULT_DESCRIPTION: &str = "Payment";

/// Inbound create-payment request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    #[serde(default)]
    pub description: String,
    pub receiver_id: i64,

    /// Forwarded to the gateway as its idempotency key
    pub idempotency_key: String,
}

/// Redeemable payment data handed back to the payer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub external_id: String,
    pub qr_code_base64: String,
    pub copy_paste_code: String,

    /// Amount as the gateway charged it
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Answer to a status poll
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub status: TransactionStatus,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    /// Empty once the payment is done
    pub qr_code: String,

    /// Empty once the payment is done
    pub copy_paste_code: String,
}

/// Check that a payment ID looks like a gateway payment ID
pub fn validate_payment_id(payment_id: &str) -> Result<&str> {
    let id = payment_id.trim();
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PaymentError::InvalidPaymentId(payment_id.to_string()));
    }
    Ok(id)
}

/// Payment orchestrator
pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn TransactionLedger>,
    users: Arc<dyn UserDirectory>,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<dyn TransactionLedger>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            users,
        }
    }

    /// Resolve the authenticated caller's user record
    pub async fn load_payer(&self, payer_id: i64) -> Result<User> {
        self.users
            .get_user(payer_id)
            .await?
            .ok_or(PaymentError::PayerNotFound(payer_id))
    }

    /// Create a PIX charge and start tracking it.
    ///
    /// Every check runs before the gateway is called. If the gateway already
    /// knows this charge (same idempotency key, same external ID) the
    /// existing ledger row is kept and the fresh artifacts are returned.
    pub async fn create_payment(&self, request: &PaymentRequest, payer: &User) -> Result<PaymentSummary> {
        if request.receiver_id == payer.id {
            return Err(PaymentError::SelfPayment);
        }
        if request.amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidInput("amount must be positive".into()));
        }
        if request.idempotency_key.trim().is_empty() {
            return Err(PaymentError::InvalidInput("idempotency_key is required".into()));
        }
        if self.users.get_user(request.receiver_id).await?.is_none() {
            return Err(PaymentError::PayeeNotFound(request.receiver_id));
        }

        let description = if request.description.trim().is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            request.description.clone()
        };

        let charge = self
            .gateway
            .create_charge(&ChargeRequest {
                amount: request.amount,
                description: description.clone(),
                payer: PayerProfile::from(payer),
                idempotency_key: request.idempotency_key.clone(),
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    gateway = self.gateway.name(),
                    payer_id = payer.id,
                    payee_id = request.receiver_id,
                    error = %e,
                    "Charge creation failed"
                );
            })?;

        let summary = PaymentSummary {
            external_id: charge.id.clone(),
            qr_code_base64: charge.artifacts.qr_code_base64,
            copy_paste_code: charge.artifacts.copy_paste_code,
            amount: charge.amount,
        };

        if self.ledger.get_by_external_id(&charge.id).await?.is_some() {
            tracing::info!(external_id = %charge.id, "Charge already tracked");
            return Ok(summary);
        }

        let created = self
            .ledger
            .create_transaction(NewTransaction {
                external_id: charge.id.clone(),
                payer_id: payer.id,
                payee_id: request.receiver_id,
                amount: request.amount,
                description,
            })
            .await?;

        match created {
            Some(tx) => tracing::info!(
                external_id = %tx.external_id,
                payer_id = tx.payer_id,
                payee_id = tx.payee_id,
                amount = %tx.amount,
                "Transaction created"
            ),
            // Lost the insert race to a concurrent request for the same charge
            None => tracing::info!(external_id = %charge.id, "Charge already tracked"),
        }

        Ok(summary)
    }

    /// Ask the gateway for the live status of a payment.
    ///
    /// An approved payment settles the ledger row (missing row is a
    /// consistency error). No notification or email is sent from here.
    pub async fn get_payment_status(&self, payment_id: &str) -> Result<StatusSummary> {
        let payment_id = validate_payment_id(payment_id)?;
        let remote = self.gateway.get_status(payment_id).await?;

        let status = if remote.status.is_approved() {
            if self.ledger.get_by_external_id(payment_id).await?.is_none() {
                tracing::error!(
                    external_id = %payment_id,
                    "Gateway approved a payment with no ledger row"
                );
                return Err(PaymentError::TransactionNotFound(payment_id.to_string()));
            }

            let update = self
                .ledger
                .update_status_and_amount(payment_id, TransactionStatus::Done, remote.amount)
                .await?;

            if update.applied {
                tracing::info!(
                    external_id = %payment_id,
                    amount = %remote.amount,
                    "Transaction settled by status poll"
                );
            }
            update.transaction.status
        } else {
            self.ledger
                .get_by_external_id(payment_id)
                .await?
                .map_or(TransactionStatus::Pending, |tx| tx.status)
        };

        let (qr_code, copy_paste_code) = if status == TransactionStatus::Done {
            (String::new(), String::new())
        } else {
            (remote.artifacts.qr_code_base64, remote.artifacts.copy_paste_code)
        };

        Ok(StatusSummary {
            status,
            amount: remote.amount,
            qr_code,
            copy_paste_code,
        })
    }
}
