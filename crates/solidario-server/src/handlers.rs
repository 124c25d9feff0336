//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use solidario_core::{CoreError, Notification, NotificationDetail, TokenKind, TokenPair};
use solidario_payments::{
    ErrorKind, PaymentError, PaymentOrchestrator, PaymentRequest, PaymentSummary, ReconcileOutcome,
    StatusSummary, WebhookDelivery, WebhookReconciler,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub gateway_configured: bool,
    pub storage: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Query string Mercado Pago appends to notification URLs
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn error_code(err: &PaymentError) -> &'static str {
    match err {
        PaymentError::InvalidInput(_) => "INVALID_INPUT",
        PaymentError::SelfPayment => "SELF_PAYMENT",
        PaymentError::InvalidPaymentId(_) => "INVALID_PAYMENT_ID",
        PaymentError::PayeeNotFound(_) => "PAYEE_NOT_FOUND",
        PaymentError::PayerNotFound(_) => "PAYER_NOT_FOUND",
        PaymentError::Gateway(_) | PaymentError::GatewayStatus { .. } | PaymentError::GatewayDecode(_) => {
            "GATEWAY_ERROR"
        }
        PaymentError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
        PaymentError::UnhandledEvent(_) => "UNHANDLED_EVENT",
        PaymentError::WebhookSignature(_) => "INVALID_SIGNATURE",
        PaymentError::WebhookParse(_) => "INVALID_EVENT",
        PaymentError::Notifier(_) | PaymentError::Config(_) | PaymentError::Storage(_) => {
            "INTERNAL_ERROR"
        }
    }
}

impl From<PaymentError> for ErrorResponse {
    fn from(err: PaymentError) -> Self {
        Self {
            error: err.user_message(),
            code: error_code(&err).into(),
        }
    }
}

fn payment_error(err: PaymentError) -> ApiError {
    let status = match (err.kind(), &err) {
        (_, PaymentError::WebhookSignature(_)) => StatusCode::UNAUTHORIZED,
        (ErrorKind::Input, _) => StatusCode::BAD_REQUEST,
        (ErrorKind::NotFound, _) => StatusCode::NOT_FOUND,
        (ErrorKind::Upstream, _) => StatusCode::BAD_GATEWAY,
        (ErrorKind::Consistency | ErrorKind::Internal, _) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::debug!(error = %err, "Request rejected");
    }

    (status, Json(err.into()))
}

fn payments_disabled() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "Payments not configured",
        "PAYMENTS_DISABLED",
    )
}

fn orchestrator(state: &AppState) -> Result<&Arc<PaymentOrchestrator>, ApiError> {
    state.orchestrator.as_ref().ok_or_else(payments_disabled)
}

fn reconciler(state: &AppState) -> Result<&Arc<WebhookReconciler>, ApiError> {
    state.reconciler.as_ref().ok_or_else(payments_disabled)
}

fn token_error(err: &CoreError) -> ApiError {
    match err {
        CoreError::TokenExpired => api_error(StatusCode::UNAUTHORIZED, "Token expired", "TOKEN_EXPIRED"),
        _ => api_error(StatusCode::UNAUTHORIZED, "Invalid token", "INVALID_TOKEN"),
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// Authenticated caller, resolved from an access token
#[derive(Clone, Copy, Debug)]
pub struct CurrentUser(pub i64);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Missing bearer token", "UNAUTHORIZED"))?;

        let claims = state.tokens.validate(token.trim(), TokenKind::Access).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            token_error(&e)
        })?;

        Ok(CurrentUser(claims.sub))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        gateway_configured: state.orchestrator.is_some(),
        storage: state.storage,
    })
}

/// Create a PIX payment
pub async fn create_payment(
    State(state): State<AppState>,
    CurrentUser(payer_id): CurrentUser,
    Json(payload): Json<PaymentRequest>,
) -> Result<Json<PaymentSummary>, ApiError> {
    let orchestrator = orchestrator(&state)?;

    let payer = orchestrator.load_payer(payer_id).await.map_err(payment_error)?;
    let summary = orchestrator
        .create_payment(&payload, &payer)
        .await
        .map_err(payment_error)?;

    Ok(Json(summary))
}

/// Live payment status
pub async fn payment_status(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(payment_id): Path<String>,
) -> Result<Json<StatusSummary>, ApiError> {
    let summary = orchestrator(&state)?
        .get_payment_status(&payment_id)
        .await
        .map_err(payment_error)?;

    Ok(Json(summary))
}

/// Mercado Pago notification endpoint
pub async fn mercadopago_webhook(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let reconciler = reconciler(&state)?;
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let outcome = reconciler
        .handle_delivery(WebhookDelivery {
            body: &body,
            signature: header("x-signature"),
            request_id: header("x-request-id"),
            data_id: query.data_id.as_deref(),
        })
        .await
        .map_err(payment_error)?;

    if let ReconcileOutcome::Settled { transaction, notified } = &outcome {
        tracing::info!(
            external_id = %transaction.external_id,
            notified,
            "Webhook reconciled"
        );
    }

    Ok(Json(WebhookResponse { status: "ok" }))
}

/// Caller's notifications with sender and transaction, newest first
pub async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<NotificationDetail>>, ApiError> {
    let notifications = state
        .notifications
        .list_details_for_user(user_id)
        .await
        .map_err(payment_error)?;

    Ok(Json(notifications))
}

/// Mark one of the caller's notifications as read
pub async fn mark_notification_read(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Notification>, ApiError> {
    state
        .notifications
        .mark_read(id, user_id)
        .await
        .map_err(payment_error)?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Notification not found", "NOT_FOUND"))
}

/// Exchange a refresh token for a fresh token pair
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let claims = state
        .tokens
        .validate(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| token_error(&e))?;

    let pair = state.tokens.issue_pair(claims.sub).map_err(|e| {
        tracing::error!(error = %e, "Token issue failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Token issue failed", "INTERNAL_ERROR")
    })?;

    Ok(Json(pair))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use std::time::Duration;

    use solidario_core::config::{AuthConfig, WebhookConfig};
    use solidario_core::{TokenService, User};
    use solidario_payments::{
        ChargeResult, GatewayStatus, MockGateway, PaymentGateway, PixArtifacts, RecordingMailer,
    };

    use crate::router;
    use crate::state::Stores;

    fn user(id: i64) -> User {
        User {
            id,
            name: format!("User{id}"),
            surname: "Costa".into(),
            email: format!("user{id}@example.com"),
            cpf: "12345678909".into(),
            postal_code: "01001000".into(),
            city: "Fortaleza".into(),
            state: "CE".into(),
        }
    }

    fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "server-test-secret".into(),
            access_ttl_secs: 300,
            refresh_ttl_secs: 600,
        }
    }

    struct TestApp {
        router: Router,
        gateway: Arc<MockGateway>,
        tokens: TokenService,
    }

    fn test_app(webhook_secret: Option<&str>) -> TestApp {
        let gateway = Arc::new(MockGateway::new());
        let webhook = WebhookConfig {
            secret: webhook_secret.map(str::to_string),
            max_age_secs: None,
        };
        let state = AppState::new(
            Some(gateway.clone() as Arc<dyn PaymentGateway>),
            Stores::memory_with_users([user(1), user(2)]),
            Arc::new(RecordingMailer::new()),
            TokenService::new(&auth_config()),
            &webhook,
            Duration::from_secs(1),
        );

        TestApp {
            router: router(state),
            gateway,
            tokens: TokenService::new(&auth_config()),
        }
    }

    impl TestApp {
        fn bearer(&self, user_id: i64) -> String {
            format!("Bearer {}", self.tokens.issue(user_id, TokenKind::Access).unwrap())
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, body)
        }

        async fn pay(&self, payer_id: i64, body: Value) -> (StatusCode, Value) {
            self.send(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/pay")
                    .header("authorization", self.bearer(payer_id))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }

        async fn get(&self, uri: &str, user_id: i64) -> (StatusCode, Value) {
            self.send(
                Request::builder()
                    .uri(uri)
                    .header("authorization", self.bearer(user_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
        }

        async fn webhook(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.send(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }
    }

    fn pay_body(receiver_id: i64) -> Value {
        json!({
            "amount": 50.0,
            "description": "Doação",
            "receiver_id": receiver_id,
            "idempotency_key": "idem-1"
        })
    }

    async fn script_555(app: &TestApp) {
        app.gateway
            .script_charge(ChargeResult {
                id: "555".into(),
                status: GatewayStatus::Pending,
                amount: dec!(50),
                artifacts: PixArtifacts {
                    qr_code_base64: "X".into(),
                    copy_paste_code: "Y".into(),
                },
            })
            .await;
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(None);
        let (status, body) = app
            .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gateway_configured"], true);
        assert_eq!(body["storage"], "memory");
    }

    #[tokio::test]
    async fn test_pay_requires_token() {
        let app = test_app(None);
        let (status, body) = app
            .send(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/pay")
                    .header("content-type", "application/json")
                    .body(Body::from(pay_body(2).to_string()))
                    .unwrap(),
            )
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_refresh_token_cannot_call_api() {
        let app = test_app(None);
        let refresh = app.tokens.issue(1, TokenKind::Refresh).unwrap();

        let (status, _) = app
            .send(
                Request::builder()
                    .uri("/api/notifications")
                    .header("authorization", format!("Bearer {refresh}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_self_payment_rejected() {
        let app = test_app(None);
        let (status, body) = app.pay(1, pay_body(1)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "SELF_PAYMENT");
        assert_eq!(app.gateway.create_calls().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_payee_is_404() {
        let app = test_app(None);
        let (status, body) = app.pay(1, pay_body(99)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "PAYEE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_gateway_failure_is_502() {
        let app = test_app(None);
        app.gateway.fail_charges(Some("connection reset")).await;

        let (status, body) = app.pay(1, pay_body(2)).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "GATEWAY_ERROR");
    }

    #[tokio::test]
    async fn test_payment_flow_through_webhook() {
        let app = test_app(None);
        script_555(&app).await;

        let (status, body) = app.pay(1, pay_body(2)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "external_id": "555",
                "qr_code_base64": "X",
                "copy_paste_code": "Y",
                "amount": 50.0
            })
        );

        let (status, body) = app.get("/api/pay/status/555", 1).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["qr_code"], "X");

        app.gateway.approve("555", dec!(50)).await;
        let event = json!({"type": "payment", "action": "payment.updated", "data": {"id": "555"}});
        let (status, _) = app.webhook("/api/webhook/mpago?data.id=555&type=payment", event.clone()).await;
        assert_eq!(status, StatusCode::OK);

        // Redelivery is accepted and does not notify again
        let (status, _) = app.webhook("/api/webhook/mpago", event).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.get("/api/pay/status/555", 1).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "done");
        assert_eq!(body["qr_code"], "");
        assert_eq!(body["copy_paste_code"], "");

        let (status, body) = app.get("/api/notifications", 2).await;
        assert_eq!(status, StatusCode::OK);
        let notifications = body.as_array().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["from_user"]["id"], 1);
        assert_eq!(notifications[0]["from_user"]["name"], "User1");
        assert_eq!(notifications[0]["from_user"]["email"], "user1@example.com");
        assert_eq!(notifications[0]["transaction"]["amount"], 50.0);
        assert_eq!(notifications[0]["kind"], "payment");
        assert_eq!(notifications[0]["is_read"], false);

        let id = notifications[0]["id"].as_i64().unwrap();

        // Only the recipient can mark it read
        let (status, _) = app
            .send(
                Request::builder()
                    .method(Method::PATCH)
                    .uri(format!("/api/notifications/{id}/read"))
                    .header("authorization", app.bearer(1))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app
            .send(
                Request::builder()
                    .method(Method::PATCH)
                    .uri(format!("/api/notifications/{id}/read"))
                    .header("authorization", app.bearer(2))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_read"], true);
    }

    #[tokio::test]
    async fn test_invalid_payment_id_is_400() {
        let app = test_app(None);
        let (status, body) = app.get("/api/pay/status/abc", 1).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PAYMENT_ID");
    }

    #[tokio::test]
    async fn test_webhook_errors() {
        let app = test_app(None);

        let (status, body) = app
            .webhook("/api/webhook/mpago", json!({"type": "plan", "data": {"id": "1"}}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "UNHANDLED_EVENT");

        let (status, body) = app
            .webhook(
                "/api/webhook/mpago",
                json!({"type": "payment", "action": "payment.created", "data": {"id": 777}}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        // Approved but never tracked
        app.gateway.approve("777", dec!(10)).await;
        let (status, body) = app
            .webhook(
                "/api/webhook/mpago",
                json!({"type": "payment", "action": "payment.updated", "data": {"id": 777}}),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "TRANSACTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unsigned_webhook_rejected_when_secret_set() {
        let app = test_app(Some("mp-secret"));
        app.gateway.approve("555", dec!(50)).await;

        let (status, body) = app
            .webhook(
                "/api/webhook/mpago?data.id=555",
                json!({"type": "payment", "action": "payment.updated", "data": {"id": "555"}}),
            )
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_SIGNATURE");
        assert_eq!(app.gateway.status_calls().await, 0);
    }

    #[tokio::test]
    async fn test_refresh_issues_new_pair() {
        let app = test_app(None);
        let refresh = app.tokens.issue(2, TokenKind::Refresh).unwrap();
        let access = app.tokens.issue(2, TokenKind::Access).unwrap();

        let request = |token: String| {
            Request::builder()
                .method(Method::POST)
                .uri("/api/auth/refresh")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "refresh_token": token }).to_string()))
                .unwrap()
        };

        let (status, body) = app.send(request(refresh)).await;
        assert_eq!(status, StatusCode::OK);
        let new_access = body["access_token"].as_str().unwrap();
        assert_eq!(app.tokens.validate(new_access, TokenKind::Access).unwrap().sub, 2);

        let (status, body) = app.send(request(access)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_payments_disabled_without_gateway() {
        let state = AppState::new(
            None,
            Stores::memory(),
            Arc::new(RecordingMailer::new()),
            TokenService::new(&auth_config()),
            &WebhookConfig::default(),
            Duration::from_secs(1),
        );
        let app = TestApp {
            router: router(state),
            gateway: Arc::new(MockGateway::new()),
            tokens: TokenService::new(&auth_config()),
        };

        let (status, body) = app.pay(1, pay_body(2)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "PAYMENTS_DISABLED");

        let (status, body) = app
            .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gateway_configured"], false);
    }
}
