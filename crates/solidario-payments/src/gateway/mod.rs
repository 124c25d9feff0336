//! Payment Gateway Contract
//!
//! Transport-independent view of the PIX provider. Implementations live in
//! `solidario-gateway` (Mercado Pago over HTTPS) and in [`mock`] for tests.
//!
//! Implementations never retry. Re-sending a charge is only safe with the
//! same idempotency key, and that decision belongs to the caller.

mod mock;

pub use mock::MockGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use solidario_core::User;

use crate::error::Result;

/// Payer fields the provider requires for a PIX charge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerProfile {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub cpf: String,
    pub postal_code: String,
    pub city: String,
    pub state: String,
}

impl From<&User> for PayerProfile {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            first_name: user.name.clone(),
            last_name: user.surname.clone(),
            cpf: user.cpf.clone(),
            postal_code: user.postal_code.clone(),
            city: user.city.clone(),
            state: user.state.clone(),
        }
    }
}

/// Request to create a PIX charge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeRequest {
    pub amount: Decimal,
    pub description: String,
    pub payer: PayerProfile,

    /// Client-supplied key forwarded untouched so the provider can dedupe retries
    pub idempotency_key: String,
}

/// Provider payment status, mapped from the provider vocabulary
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayStatus {
    Pending,
    Approved,
    /// Any other provider status (rejected, cancelled, in_process, ...)
    Other(String),
}

impl GatewayStatus {
    pub fn from_provider(status: &str) -> Self {
        match status {
            "pending" => GatewayStatus::Pending,
            "approved" => GatewayStatus::Approved,
            other => GatewayStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GatewayStatus::Pending => "pending",
            GatewayStatus::Approved => "approved",
            GatewayStatus::Other(s) => s,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, GatewayStatus::Approved)
    }
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Redeemable PIX artifacts
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixArtifacts {
    /// QR code image, base64-encoded PNG
    pub qr_code_base64: String,

    /// "Copia e cola" code
    pub copy_paste_code: String,
}

/// Provider answer to a charge creation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeResult {
    /// Provider payment ID (the ledger's external ID)
    pub id: String,
    pub status: GatewayStatus,
    pub amount: Decimal,
    pub artifacts: PixArtifacts,
}

/// Provider answer to a status query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentStatus {
    pub id: String,
    pub status: GatewayStatus,

    /// Settled amount once approved, requested amount before
    pub amount: Decimal,
    pub artifacts: PixArtifacts,
}

/// Payment gateway trait (Strategy pattern)
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a PIX charge
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResult>;

    /// Query the current state of a payment. Always safe to retry.
    async fn get_status(&self, payment_id: &str) -> Result<PaymentStatus>;

    /// Gateway name
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayStatus::from_provider("approved"), GatewayStatus::Approved);
        assert_eq!(GatewayStatus::from_provider("pending"), GatewayStatus::Pending);
        assert_eq!(
            GatewayStatus::from_provider("rejected"),
            GatewayStatus::Other("rejected".into())
        );
        assert!(!GatewayStatus::from_provider("in_process").is_approved());
    }

    #[test]
    fn test_payer_profile_from_user() {
        let user = User {
            id: 1,
            name: "Maria".into(),
            surname: "Silva".into(),
            email: "maria@example.com".into(),
            cpf: "12345678909".into(),
            postal_code: "01001000".into(),
            city: "São Paulo".into(),
            state: "SP".into(),
        };

        let payer = PayerProfile::from(&user);
        assert_eq!(payer.first_name, "Maria");
        assert_eq!(payer.last_name, "Silva");
        assert_eq!(payer.cpf, "12345678909");
    }
}
