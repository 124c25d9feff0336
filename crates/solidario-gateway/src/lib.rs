//! # solidario-gateway
//!
//! Outbound HTTP adapters for the payment core.
//!
//! ## Adapters
//!
//! - **Mercado Pago** (default): PIX charges and status lookups
//! - **SendGrid** (default): payment thank-you emails
//!
//! ## Usage
//!
//! ```rust,ignore
//! use solidario_gateway::MercadoPagoClient;
//!
//! let gateway = MercadoPagoClient::from_config(&config.gateway)?;
//! let orchestrator = PaymentOrchestrator::new(Arc::new(gateway), ledger, users);
//! ```

#[cfg(feature = "mercadopago")]
pub mod mercadopago;

#[cfg(feature = "sendgrid")]
pub mod sendgrid;

#[cfg(feature = "mercadopago")]
pub use mercadopago::MercadoPagoClient;

#[cfg(feature = "sendgrid")]
pub use sendgrid::SendGridMailer;

// Re-export the contracts these adapters implement
pub use solidario_payments::{Mailer, PaymentError, PaymentGateway, Result};
