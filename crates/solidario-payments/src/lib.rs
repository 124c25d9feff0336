//! # solidario-payments
//!
//! PIX payment orchestration and webhook reconciliation for Solidário.
//!
//! ## Flow
//!
//! ```text
//! ┌────────┐  create   ┌──────────────┐  charge   ┌─────────┐
//! │ Client │──────────▶│ Orchestrator │──────────▶│ Gateway │
//! └────────┘           └──────────────┘           └─────────┘
//!                             │ insert-if-absent       │
//!                             ▼                        │ webhook
//!                        ┌────────┐   CAS → Done  ┌────────────┐
//!                        │ Ledger │◀──────────────│ Reconciler │
//!                        └────────┘               └────────────┘
//!                                                       │ once
//!                                                       ▼
//!                                          notification + thanks email
//! ```
//!
//! The ledger is keyed by the gateway payment ID and only ever moves a row
//! `Pending → Done` once. Settlement side effects are dispatched by the
//! reconciler after it claims the row's one-time settlement notice, so
//! duplicate or concurrent webhook deliveries produce one notification and
//! one email.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use solidario_payments::{MemoryLedger, MockGateway, PaymentOrchestrator};
//!
//! let orchestrator = PaymentOrchestrator::new(gateway, ledger, users);
//! let payer = orchestrator.load_payer(caller_id).await?;
//! let summary = orchestrator.create_payment(&request, &payer).await?;
//!
//! // Show summary.qr_code_base64 / summary.copy_paste_code to the payer
//! ```

mod directory;
mod error;
mod ledger;
mod notify;
mod orchestrator;
mod signature;
mod webhook;

pub mod gateway;

#[cfg(feature = "postgres")]
mod postgres;

pub use directory::{MemoryUserDirectory, UserDirectory};
pub use error::{ErrorKind, PaymentError, Result};
pub use gateway::{
    ChargeRequest, ChargeResult, GatewayStatus, MockGateway, PayerProfile, PaymentGateway,
    PaymentStatus, PixArtifacts,
};
pub use ledger::{MemoryLedger, StatusUpdate, TransactionLedger};
pub use notify::{LogMailer, Mailer, MemoryNotificationStore, NotificationStore, RecordingMailer, SentThanks};
pub use orchestrator::{
    PaymentOrchestrator, PaymentRequest, PaymentSummary, StatusSummary, validate_payment_id,
};
pub use signature::WebhookVerifier;
pub use webhook::{
    ReconcileOutcome, WebhookAction, WebhookData, WebhookDelivery, WebhookEvent, WebhookReconciler,
};

#[cfg(feature = "postgres")]
pub use postgres::{MIGRATOR, PgLedger, PgNotificationStore, PgUserDirectory};
