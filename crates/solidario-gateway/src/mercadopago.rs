//! Mercado Pago PIX Client
//!
//! Implementation of `PaymentGateway` over the Mercado Pago payments API.
//! One `reqwest::Client` is built up front with the configured timeout; no
//! call is retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use solidario_core::config::GatewayConfig;
use solidario_payments::{
    ChargeRequest, ChargeResult, GatewayStatus, PaymentError, PaymentGateway, PaymentStatus,
    PixArtifacts, Result,
};

const PAYMENT_METHOD_PIX: &str = "pix";
const IDENTIFICATION_CPF: &str = "CPF";

#[derive(Serialize)]
struct CreatePaymentBody<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    transaction_amount: Decimal,
    description: &'a str,
    payment_method_id: &'static str,
    payer: PayerBody<'a>,
}

#[derive(Serialize)]
struct PayerBody<'a> {
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    identification: Identification<'a>,
    address: Address<'a>,
}

#[derive(Serialize)]
struct Identification<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    number: &'a str,
}

#[derive(Serialize)]
struct Address<'a> {
    zip_code: &'a str,
    city: &'a str,
    federal_unit: &'a str,
}

/// Payment resource as returned by both endpoints
#[derive(Deserialize)]
struct PaymentResource {
    id: u64,
    status: String,

    #[serde(with = "rust_decimal::serde::float")]
    transaction_amount: Decimal,

    #[serde(default)]
    point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Deserialize)]
struct PointOfInteraction {
    #[serde(default)]
    transaction_data: Option<TransactionData>,
}

#[derive(Deserialize)]
struct TransactionData {
    #[serde(default)]
    qr_code: Option<String>,

    #[serde(default)]
    qr_code_base64: Option<String>,
}

impl PaymentResource {
    fn artifacts(&mut self) -> PixArtifacts {
        let data = self
            .point_of_interaction
            .take()
            .and_then(|poi| poi.transaction_data);

        match data {
            Some(data) => PixArtifacts {
                qr_code_base64: data.qr_code_base64.unwrap_or_default(),
                copy_paste_code: data.qr_code.unwrap_or_default(),
            },
            None => PixArtifacts::default(),
        }
    }
}

/// Mercado Pago payments client
pub struct MercadoPagoClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl MercadoPagoClient {
    /// Create a client against `base_url` (e.g. `https://api.mercadopago.com`)
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    /// Create from configuration; fails when no access token is configured
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let token = config
            .access_token
            .as_deref()
            .ok_or_else(|| PaymentError::Config("MERCADOPAGO_ACCESS_TOKEN not set".into()))?;

        Self::new(&config.base_url, token, config.timeout())
    }

    fn payments_url(&self) -> String {
        format!("{}/v1/payments", self.base_url)
    }

    /// Turn a response into `T`, mapping non-2xx and undecodable bodies
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        if !status.is_success() {
            return Err(PaymentError::GatewayStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| PaymentError::GatewayDecode(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResult> {
        let payer = &request.payer;
        let body = CreatePaymentBody {
            transaction_amount: request.amount,
            description: &request.description,
            payment_method_id: PAYMENT_METHOD_PIX,
            payer: PayerBody {
                email: &payer.email,
                first_name: &payer.first_name,
                last_name: &payer.last_name,
                identification: Identification {
                    kind: IDENTIFICATION_CPF,
                    number: &payer.cpf,
                },
                address: Address {
                    zip_code: &payer.postal_code,
                    city: &payer.city,
                    federal_unit: &payer.state,
                },
            },
        };

        let response = self
            .http
            .post(self.payments_url())
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", &request.idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        let mut payment: PaymentResource = Self::decode(response).await?;
        let artifacts = payment.artifacts();

        tracing::debug!(
            payment_id = payment.id,
            status = %payment.status,
            "Mercado Pago charge created"
        );

        Ok(ChargeResult {
            id: payment.id.to_string(),
            status: GatewayStatus::from_provider(&payment.status),
            amount: payment.transaction_amount,
            artifacts,
        })
    }

    async fn get_status(&self, payment_id: &str) -> Result<PaymentStatus> {
        let response = self
            .http
            .get(format!("{}/{payment_id}", self.payments_url()))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        let mut payment: PaymentResource = Self::decode(response).await?;
        let artifacts = payment.artifacts();

        Ok(PaymentStatus {
            id: payment.id.to_string(),
            status: GatewayStatus::from_provider(&payment.status),
            amount: payment.transaction_amount,
            artifacts,
        })
    }

    fn name(&self) -> &str {
        "MercadoPago"
    }
}
