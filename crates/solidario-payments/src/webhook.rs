//! Mercado Pago Webhook Reconciliation
//!
//! Turns gateway notifications into ledger transitions. Notifications are
//! delivered at least once, possibly concurrently and out of order, so:
//!
//! - the event body is never trusted for status; the gateway is re-queried
//! - the ledger transition is compare-and-swap
//! - notification + thank-you email are gated on the ledger's one-time
//!   settlement notice claim
//!
//! Any error returned from here makes the HTTP layer answer non-2xx so the
//! gateway redelivers. Side-effect failures are logged and never returned.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;

use solidario_core::{NewNotification, Transaction, TransactionStatus};

use crate::directory::UserDirectory;
use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayStatus, PaymentGateway};
use crate::ledger::TransactionLedger;
use crate::notify::{Mailer, NotificationStore};
use crate::orchestrator::validate_payment_id;
use crate::signature::WebhookVerifier;

const ACTION_PAYMENT_CREATED: &str = "payment.created";
const ACTION_PAYMENT_UPDATED: &str = "payment.updated";

/// Default bound on the thank-you email send
const DEFAULT_MAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification body as posted by the gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub action: String,
    pub data: WebhookData,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookData {
    /// Gateway payment ID (sent as a string or a number)
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

impl WebhookEvent {
    /// Parse a raw notification body
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| PaymentError::WebhookParse(e.to_string()))
    }

    pub fn action(&self) -> WebhookAction {
        WebhookAction::parse(&self.action)
    }
}

/// Notification action
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookAction {
    /// Charge registered; carries no settlement information
    Created,
    Updated,
    Other(String),
}

impl WebhookAction {
    pub fn parse(action: &str) -> Self {
        match action {
            ACTION_PAYMENT_CREATED => WebhookAction::Created,
            ACTION_PAYMENT_UPDATED => WebhookAction::Updated,
            other => WebhookAction::Other(other.to_string()),
        }
    }
}

/// What a reconciliation pass did
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// Event intentionally skipped
    Ignored,

    /// Gateway does not report the payment as approved
    NotSettled { status: GatewayStatus },

    /// Payment approved; `notified` is true for the pass that sent the side effects
    Settled {
        transaction: Transaction,
        notified: bool,
    },
}

/// One inbound delivery: raw body plus the signature inputs
#[derive(Clone, Copy, Debug, Default)]
pub struct WebhookDelivery<'a> {
    pub body: &'a [u8],

    /// `x-signature` header
    pub signature: Option<&'a str>,

    /// `x-request-id` header
    pub request_id: Option<&'a str>,

    /// `data.id` query parameter, preferred over the body for the manifest
    pub data_id: Option<&'a str>,
}

/// Webhook reconciler
pub struct WebhookReconciler {
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn TransactionLedger>,
    notifications: Arc<dyn NotificationStore>,
    mailer: Arc<dyn Mailer>,
    users: Arc<dyn UserDirectory>,
    verifier: Option<WebhookVerifier>,
    mail_timeout: Duration,
}

impl WebhookReconciler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<dyn TransactionLedger>,
        notifications: Arc<dyn NotificationStore>,
        mailer: Arc<dyn Mailer>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            notifications,
            mailer,
            users,
            verifier: None,
            mail_timeout: DEFAULT_MAIL_TIMEOUT,
        }
    }

    /// Give up on the thank-you email after `timeout`; the webhook still succeeds
    #[must_use]
    pub fn with_mail_timeout(mut self, timeout: Duration) -> Self {
        self.mail_timeout = timeout;
        self
    }

    /// Require a valid signature on every delivery
    #[must_use]
    pub fn with_verifier(mut self, verifier: WebhookVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn verifies_signatures(&self) -> bool {
        self.verifier.is_some()
    }

    /// Parse, authenticate and reconcile one delivery
    pub async fn handle_delivery(&self, delivery: WebhookDelivery<'_>) -> Result<ReconcileOutcome> {
        let event = WebhookEvent::from_slice(delivery.body)?;

        if let Some(verifier) = &self.verifier {
            let signature = delivery
                .signature
                .ok_or_else(|| PaymentError::WebhookSignature("missing x-signature".into()))?;
            let request_id = delivery
                .request_id
                .ok_or_else(|| PaymentError::WebhookSignature("missing x-request-id".into()))?;
            let data_id = delivery.data_id.unwrap_or(event.data.id.as_str());

            verifier.verify(signature, request_id, data_id).inspect_err(|e| {
                tracing::warn!(data_id = %data_id, error = %e, "Rejected webhook");
            })?;

            if data_id != event.data.id {
                return Err(PaymentError::WebhookSignature(
                    "signed ID does not match body".into(),
                ));
            }
        }

        self.process_event(&event).await
    }

    /// Reconcile one (already authenticated) event
    pub async fn process_event(&self, event: &WebhookEvent) -> Result<ReconcileOutcome> {
        if event.kind != "payment" {
            return Err(PaymentError::UnhandledEvent(format!("type '{}'", event.kind)));
        }

        match event.action() {
            WebhookAction::Created => {
                tracing::debug!(external_id = %event.data.id, "Ignoring payment.created");
                return Ok(ReconcileOutcome::Ignored);
            }
            WebhookAction::Other(action) => {
                return Err(PaymentError::UnhandledEvent(format!("action '{action}'")));
            }
            WebhookAction::Updated => {}
        }

        let external_id = validate_payment_id(&event.data.id)?;

        // A failed lookup (including a timeout) must not read as "not approved"
        let remote = self.gateway.get_status(external_id).await.inspect_err(|e| {
            tracing::warn!(external_id = %external_id, error = %e, "Status lookup failed");
        })?;

        if !remote.status.is_approved() {
            tracing::debug!(external_id = %external_id, status = %remote.status, "Payment not settled");
            return Ok(ReconcileOutcome::NotSettled {
                status: remote.status,
            });
        }

        if self.ledger.get_by_external_id(external_id).await?.is_none() {
            tracing::error!(
                external_id = %external_id,
                "Approved webhook for a payment with no ledger row"
            );
            return Err(PaymentError::TransactionNotFound(external_id.to_string()));
        }

        let update = self
            .ledger
            .update_status_and_amount(external_id, TransactionStatus::Done, remote.amount)
            .await?;

        if update.applied {
            tracing::info!(
                external_id = %external_id,
                amount = %remote.amount,
                "Transaction settled by webhook"
            );
        } else if update.transaction.status != TransactionStatus::Done {
            tracing::warn!(
                external_id = %external_id,
                status = %update.transaction.status,
                "Gateway approved a payment the ledger has closed"
            );
        }

        let notified = self.ledger.claim_settlement_notice(external_id).await?;
        if notified {
            self.dispatch_side_effects(&update.transaction, remote.amount).await;
        } else {
            tracing::debug!(external_id = %external_id, "Settlement already notified");
        }

        Ok(ReconcileOutcome::Settled {
            transaction: update.transaction,
            notified,
        })
    }

    async fn dispatch_side_effects(&self, tx: &Transaction, amount: Decimal) {
        if let Err(e) = self
            .notifications
            .create(NewNotification::payment_received(tx))
            .await
        {
            tracing::error!(
                external_id = %tx.external_id,
                payee_id = tx.payee_id,
                error = %e,
                "Failed to create payment notification"
            );
        }

        let payer = match self.users.get_user(tx.payer_id).await {
            Ok(Some(payer)) => payer,
            Ok(None) => {
                tracing::warn!(payer_id = tx.payer_id, "Payer not found; skipping thanks email");
                return;
            }
            Err(e) => {
                tracing::error!(payer_id = tx.payer_id, error = %e, "Payer lookup failed");
                return;
            }
        };

        let send = self.mailer.send_payment_thanks(&payer, amount);
        match tokio::time::timeout(self.mail_timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(
                    external_id = %tx.external_id,
                    payer_id = payer.id,
                    error = %e,
                    "Failed to send payment thanks email"
                );
            }
            Err(_) => {
                tracing::error!(
                    external_id = %tx.external_id,
                    payer_id = payer.id,
                    timeout_ms = self.mail_timeout.as_millis(),
                    "Payment thanks email timed out"
                );
            }
        }
    }
}
