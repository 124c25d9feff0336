//! Application State

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::PgPool;

use solidario_core::config::WebhookConfig;
use solidario_core::{TokenService, User};
use solidario_payments::{
    Mailer, MemoryLedger, MemoryNotificationStore, MemoryUserDirectory, NotificationStore,
    PaymentGateway, PaymentOrchestrator, PgLedger, PgNotificationStore, PgUserDirectory,
    TransactionLedger, UserDirectory, WebhookReconciler, WebhookVerifier,
};

/// Storage backends shared by every component
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn TransactionLedger>,
    pub notifications: Arc<dyn NotificationStore>,
    pub users: Arc<dyn UserDirectory>,

    /// Backend name reported by `/health`
    pub kind: &'static str,
}

impl Stores {
    /// Process-local stores (development only; nothing survives a restart)
    pub fn memory() -> Self {
        Self::memory_with_users(Vec::new())
    }

    /// Process-local stores with a fixed set of users.
    ///
    /// Accounts are owned by the user service, so in memory mode the seeded
    /// users are the only ones that can pay or be paid.
    pub fn memory_with_users(users: impl IntoIterator<Item = User>) -> Self {
        let ledger: Arc<dyn TransactionLedger> = Arc::new(MemoryLedger::new());
        let users: Arc<dyn UserDirectory> = Arc::new(MemoryUserDirectory::with_users(users));
        let notifications = MemoryNotificationStore::new().with_lookups(users.clone(), ledger.clone());

        Self {
            ledger,
            notifications: Arc::new(notifications),
            users,
            kind: "memory",
        }
    }

    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            ledger: Arc::new(PgLedger::new(pool.clone())),
            notifications: Arc::new(PgNotificationStore::new(pool.clone())),
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            kind: "postgres",
        }
    }
}

/// Read a JSON array of users for the in-memory directory
pub fn load_seed_users(path: &Path) -> anyhow::Result<Vec<User>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed users from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing seed users in {}", path.display()))
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Payment orchestrator (None if the gateway is not configured)
    pub orchestrator: Option<Arc<PaymentOrchestrator>>,

    /// Webhook reconciler (None if the gateway is not configured)
    pub reconciler: Option<Arc<WebhookReconciler>>,

    /// Notification store, read by the notification endpoints
    pub notifications: Arc<dyn NotificationStore>,

    /// Bearer-token issuer/validator
    pub tokens: Arc<TokenService>,

    pub storage: &'static str,
}

impl AppState {
    pub fn new(
        gateway: Option<Arc<dyn PaymentGateway>>,
        stores: Stores,
        mailer: Arc<dyn Mailer>,
        tokens: TokenService,
        webhook: &WebhookConfig,
        mail_timeout: Duration,
    ) -> Self {
        let (orchestrator, reconciler) = match gateway {
            Some(gateway) => {
                let orchestrator = PaymentOrchestrator::new(
                    gateway.clone(),
                    stores.ledger.clone(),
                    stores.users.clone(),
                );

                let mut reconciler = WebhookReconciler::new(
                    gateway,
                    stores.ledger.clone(),
                    stores.notifications.clone(),
                    mailer,
                    stores.users.clone(),
                )
                .with_mail_timeout(mail_timeout);

                if let Some(secret) = &webhook.secret {
                    let mut verifier = WebhookVerifier::new(secret.as_str());
                    if let Some(max_age) = webhook.max_age() {
                        verifier = verifier.with_max_age(max_age);
                    }
                    reconciler = reconciler.with_verifier(verifier);
                }

                (Some(Arc::new(orchestrator)), Some(Arc::new(reconciler)))
            }
            None => (None, None),
        };

        Self {
            orchestrator,
            reconciler,
            notifications: stores.notifications,
            tokens: Arc::new(tokens),
            storage: stores.kind,
        }
    }
}
