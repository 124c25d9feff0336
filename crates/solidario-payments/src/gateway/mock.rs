//! Mock Gateway
//!
//! Scriptable in-process gateway for tests and local runs. Behaves like the
//! provider where it matters: a repeated idempotency key returns the charge
//! created the first time, and unknown payment IDs are a 404.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use super::{ChargeRequest, ChargeResult, GatewayStatus, PaymentGateway, PaymentStatus, PixArtifacts};
use crate::error::{PaymentError, Result};

/// Mock gateway with scripted answers
pub struct MockGateway {
    state: Mutex<MockState>,
}

struct MockState {
    next_id: u64,
    scripted_charges: VecDeque<ChargeResult>,
    by_idempotency_key: HashMap<String, ChargeResult>,
    statuses: HashMap<String, PaymentStatus>,
    create_failure: Option<String>,
    status_failure: Option<String>,
    create_calls: usize,
    status_calls: usize,
    idempotency_keys: Vec<String>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_id: 1000,
                scripted_charges: VecDeque::new(),
                by_idempotency_key: HashMap::new(),
                statuses: HashMap::new(),
                create_failure: None,
                status_failure: None,
                create_calls: 0,
                status_calls: 0,
                idempotency_keys: Vec::new(),
            }),
        }
    }

    /// Queue the answer for the next charge with an unseen idempotency key
    pub async fn script_charge(&self, charge: ChargeResult) {
        self.state.lock().await.scripted_charges.push_back(charge);
    }

    /// Set what `get_status` reports for a payment
    pub async fn set_status(&self, payment_id: &str, status: GatewayStatus, amount: Decimal) {
        let mut state = self.state.lock().await;
        let artifacts = state
            .statuses
            .get(payment_id)
            .map(|s| s.artifacts.clone())
            .unwrap_or_default();
        state.statuses.insert(
            payment_id.to_string(),
            PaymentStatus {
                id: payment_id.to_string(),
                status,
                amount,
                artifacts,
            },
        );
    }

    /// Shorthand for `set_status(id, Approved, amount)`
    pub async fn approve(&self, payment_id: &str, amount: Decimal) {
        self.set_status(payment_id, GatewayStatus::Approved, amount).await;
    }

    /// Make every `create_charge` fail until cleared
    pub async fn fail_charges(&self, message: Option<&str>) {
        self.state.lock().await.create_failure = message.map(str::to_string);
    }

    /// Make every `get_status` fail until cleared (e.g. to simulate a timeout)
    pub async fn fail_status(&self, message: Option<&str>) {
        self.state.lock().await.status_failure = message.map(str::to_string);
    }

    pub async fn create_calls(&self) -> usize {
        self.state.lock().await.create_calls
    }

    pub async fn status_calls(&self) -> usize {
        self.state.lock().await.status_calls
    }

    /// Idempotency keys in the order they were received
    pub async fn idempotency_keys(&self) -> Vec<String> {
        self.state.lock().await.idempotency_keys.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResult> {
        let mut state = self.state.lock().await;
        state.create_calls += 1;
        state.idempotency_keys.push(request.idempotency_key.clone());

        if let Some(message) = &state.create_failure {
            return Err(PaymentError::Gateway(message.clone()));
        }

        if let Some(existing) = state.by_idempotency_key.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }

        let charge = match state.scripted_charges.pop_front() {
            Some(charge) => charge,
            None => {
                let id = state.next_id.to_string();
                state.next_id += 1;
                ChargeResult {
                    artifacts: PixArtifacts {
                        qr_code_base64: format!("qr-{id}"),
                        copy_paste_code: format!("pix-{id}"),
                    },
                    id,
                    status: GatewayStatus::Pending,
                    amount: request.amount,
                }
            }
        };

        state
            .by_idempotency_key
            .insert(request.idempotency_key.clone(), charge.clone());
        state.statuses.entry(charge.id.clone()).or_insert_with(|| PaymentStatus {
            id: charge.id.clone(),
            status: charge.status.clone(),
            amount: charge.amount,
            artifacts: charge.artifacts.clone(),
        });

        Ok(charge)
    }

    async fn get_status(&self, payment_id: &str) -> Result<PaymentStatus> {
        let mut state = self.state.lock().await;
        state.status_calls += 1;

        if let Some(message) = &state.status_failure {
            return Err(PaymentError::Gateway(message.clone()));
        }

        state
            .statuses
            .get(payment_id)
            .cloned()
            .ok_or_else(|| PaymentError::GatewayStatus {
                status: 404,
                body: format!("payment {payment_id} not found"),
            })
    }

    fn name(&self) -> &str {
        "MockGateway"
    }
}
