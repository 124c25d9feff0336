//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Coarse classification used by the HTTP boundary
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad request, rejected before any side effect
    Input,
    /// Referenced user does not exist
    NotFound,
    /// Gateway failed or answered something unusable
    Upstream,
    /// Gateway and ledger disagree
    Consistency,
    /// Storage, configuration or anything else on our side
    Internal,
}

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Request failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    
    /// Payer and receiver are the same user
    #[error("Cannot pay yourself")]
    SelfPayment,
    
    /// Payment ID is not a gateway payment ID
    #[error("Invalid payment ID: {0}")]
    InvalidPaymentId(String),
    
    /// Receiver does not exist
    #[error("Payee not found: {0}")]
    PayeeNotFound(i64),
    
    /// Authenticated caller has no user record
    #[error("Payer not found: {0}")]
    PayerNotFound(i64),
    
    /// Transport failure talking to the gateway (includes timeouts)
    #[error("Gateway error: {0}")]
    Gateway(String),
    
    /// Gateway answered with a non-success status
    #[error("Gateway returned {status}: {body}")]
    GatewayStatus { status: u16, body: String },
    
    /// Gateway answer could not be decoded
    #[error("Gateway decode error: {0}")]
    GatewayDecode(String),
    
    /// Gateway reports a payment the ledger does not track
    #[error("Transaction not found for external ID {0}")]
    TransactionNotFound(String),
    
    /// Webhook type or action this service does not handle
    #[error("Unhandled webhook event: {0}")]
    UnhandledEvent(String),
    
    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),
    
    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),
    
    /// Notification store or mailer failure
    #[error("Notifier error: {0}")]
    Notifier(String),
    
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
    
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::Gateway(_) | PaymentError::GatewayStatus { .. } | PaymentError::Storage(_)
        )
    }
    
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidInput(_)
            | PaymentError::SelfPayment
            | PaymentError::InvalidPaymentId(_)
            | PaymentError::UnhandledEvent(_)
            | PaymentError::WebhookParse(_)
            | PaymentError::WebhookSignature(_) => ErrorKind::Input,
            PaymentError::PayeeNotFound(_) | PaymentError::PayerNotFound(_) => ErrorKind::NotFound,
            PaymentError::Gateway(_)
            | PaymentError::GatewayStatus { .. }
            | PaymentError::GatewayDecode(_) => ErrorKind::Upstream,
            PaymentError::TransactionNotFound(_) => ErrorKind::Consistency,
            PaymentError::Notifier(_) | PaymentError::Config(_) | PaymentError::Storage(_) => {
                ErrorKind::Internal
            }
        }
    }
    
    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::InvalidInput(msg) => format!("Invalid request: {msg}"),
            PaymentError::SelfPayment => "You cannot pay yourself.".into(),
            PaymentError::InvalidPaymentId(_) => "Invalid payment ID.".into(),
            PaymentError::PayeeNotFound(_) => "Receiver not found.".into(),
            PaymentError::PayerNotFound(_) => "Your account could not be found.".into(),
            PaymentError::Gateway(_) | PaymentError::GatewayStatus { .. } | PaymentError::GatewayDecode(_) => {
                "Payment processing failed. Please try again.".into()
            }
            PaymentError::UnhandledEvent(_) => "Unhandled event.".into(),
            PaymentError::WebhookSignature(_) => "Invalid signature.".into(),
            PaymentError::WebhookParse(_) => "Malformed event.".into(),
            _ => "An error occurred processing your request.".into(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        PaymentError::Storage(err.to_string())
    }
}

impl From<solidario_core::CoreError> for PaymentError {
    fn from(err: solidario_core::CoreError) -> Self {
        PaymentError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(PaymentError::SelfPayment.kind(), ErrorKind::Input);
        assert_eq!(PaymentError::PayeeNotFound(2).kind(), ErrorKind::NotFound);
        assert_eq!(PaymentError::Gateway("timeout".into()).kind(), ErrorKind::Upstream);
        assert_eq!(
            PaymentError::TransactionNotFound("555".into()).kind(),
            ErrorKind::Consistency
        );
    }

    #[test]
    fn test_only_transport_errors_retry() {
        assert!(PaymentError::Gateway("timeout".into()).is_retryable());
        assert!(!PaymentError::GatewayDecode("bad json".into()).is_retryable());
        assert!(!PaymentError::TransactionNotFound("555".into()).is_retryable());
    }
}
