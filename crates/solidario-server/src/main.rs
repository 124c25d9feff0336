//! Solidário Payments HTTP Server
//!
//! Axum-based server exposing PIX payment creation, status polling, the
//! Mercado Pago webhook and payment notifications.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solidario_core::{AppConfig, TokenService};
use solidario_gateway::{MercadoPagoClient, SendGridMailer};
use solidario_payments::{LogMailer, Mailer, PaymentGateway};

use crate::handlers::{
    create_payment, health_check, list_notifications, mark_notification_read, mercadopago_webhook,
    payment_status, refresh_token,
};
use crate::state::{AppState, Stores, load_seed_users};

/// Build the application router
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))
        // Payments
        .route("/api/pay", post(create_payment))
        .route("/api/pay/status/{payment_id}", get(payment_status))
        .route("/api/webhook/mpago", post(mercadopago_webhook))
        // Notifications
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/{id}/read", patch(mark_notification_read))
        // Auth
        .route("/api/auth/refresh", post(refresh_token))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    // Storage
    let stores = match &config.database.url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(url)
                .await?;
            solidario_payments::MIGRATOR.run(&pool).await?;
            tracing::info!("✓ Connected to Postgres, migrations applied");
            Stores::postgres(&pool)
        }
        None => {
            tracing::warn!("⚠ DATABASE_URL not set - using in-memory storage");
            match &config.database.seed_users_path {
                Some(path) => {
                    let users = load_seed_users(std::path::Path::new(path))?;
                    tracing::info!(count = users.len(), path = %path, "Seeded in-memory users");
                    Stores::memory_with_users(users)
                }
                None => {
                    tracing::warn!("  No MEMORY_SEED_USERS file - every payment will fail with PAYER_NOT_FOUND");
                    Stores::memory()
                }
            }
        }
    };

    // Payment gateway
    let gateway: Option<Arc<dyn PaymentGateway>> = if config.gateway.access_token.is_some() {
        let client = MercadoPagoClient::from_config(&config.gateway)?;
        tracing::info!(base_url = %config.gateway.base_url, "✓ Mercado Pago configured");
        Some(Arc::new(client))
    } else {
        tracing::warn!("⚠ Mercado Pago not configured - payments disabled");
        tracing::warn!("  Set MERCADOPAGO_ACCESS_TOKEN in .env");
        None
    };

    if config.webhook.secret.is_none() {
        tracing::warn!("⚠ MERCADOPAGO_WEBHOOK_SECRET not set - webhook signatures are not checked");
    }

    // Mailer
    let mailer: Arc<dyn Mailer> = match SendGridMailer::from_config(&config.mail)? {
        Some(mailer) => {
            tracing::info!("✓ SendGrid configured");
            Arc::new(mailer)
        }
        None => {
            tracing::warn!("⚠ SENDGRID_API_KEY not set - emails are only logged");
            Arc::new(LogMailer)
        }
    };

    let state = AppState::new(
        gateway,
        stores,
        mailer,
        TokenService::new(&config.auth),
        &config.webhook,
        config.mail.timeout(),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 solidario-server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET   /health                        - Health check");
    tracing::info!("  POST  /api/pay                       - Create PIX payment");
    tracing::info!("  GET   /api/pay/status/{{payment_id}}   - Payment status");
    tracing::info!("  POST  /api/webhook/mpago             - Mercado Pago webhook");
    tracing::info!("  GET   /api/notifications             - List notifications");
    tracing::info!("  PATCH /api/notifications/{{id}}/read   - Mark notification read");
    tracing::info!("  POST  /api/auth/refresh              - Refresh tokens");

    axum::serve(listener, router(state)).await?;

    Ok(())
}
