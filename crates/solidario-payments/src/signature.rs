//! Webhook Signature Verification
//!
//! Mercado Pago signs every notification with the secret configured for the
//! application. The `x-signature` header carries `ts=<unix>,v1=<hex>`, where
//! `v1` is HMAC-SHA256 over the manifest
//!
//! ```text
//! id:<data.id>;request-id:<x-request-id>;ts:<ts>;
//! ```
//!
//! With a max age configured, `ts` must also lie within that window of the
//! current time (either direction), which bounds how long a captured
//! delivery can be replayed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Verifies webhook signatures against a shared secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    max_age: Option<Duration>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

/// Parts of an `x-signature` header
#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader<'a> {
    ts: &'a str,
    v1: &'a str,
}

fn parse_header(header: &str) -> Result<SignatureHeader<'_>> {
    let mut ts = None;
    let mut v1 = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }

    match (ts, v1) {
        (Some(ts), Some(v1)) if !ts.is_empty() && !v1.is_empty() => Ok(SignatureHeader { ts, v1 }),
        _ => Err(PaymentError::WebhookSignature(
            "x-signature must carry ts and v1".into(),
        )),
    }
}

/// `ts` is unix seconds; 13-digit values are taken as milliseconds
fn signed_at(ts: &str) -> Option<DateTime<Utc>> {
    let raw: i64 = ts.parse().ok()?;
    if raw >= 100_000_000_000 {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}

fn check_freshness(ts: &str, now: DateTime<Utc>, max_age: Duration) -> Result<()> {
    let signed_at = signed_at(ts)
        .ok_or_else(|| PaymentError::WebhookSignature("ts is not a unix timestamp".into()))?;

    let skew = (now - signed_at).abs().to_std().unwrap_or(Duration::MAX);
    if skew > max_age {
        return Err(PaymentError::WebhookSignature(format!(
            "ts {ts} outside the {}s window",
            max_age.as_secs()
        )));
    }
    Ok(())
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            max_age: None,
        }
    }

    /// Reject signatures whose timestamp is further than `max_age` from now
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Build the signed manifest for a notification
    pub fn manifest(data_id: &str, request_id: &str, ts: &str) -> String {
        format!("id:{data_id};request-id:{request_id};ts:{ts};")
    }

    /// Check an `x-signature` header for the given request ID and payment ID
    pub fn verify(&self, x_signature: &str, x_request_id: &str, data_id: &str) -> Result<()> {
        self.verify_at(x_signature, x_request_id, data_id, Utc::now())
    }

    /// `verify` against an explicit current time
    pub fn verify_at(
        &self,
        x_signature: &str,
        x_request_id: &str,
        data_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let header = parse_header(x_signature)?;

        if let Some(max_age) = self.max_age {
            check_freshness(header.ts, now, max_age)?;
        }

        let expected = hex::decode(header.v1)
            .map_err(|_| PaymentError::WebhookSignature("v1 is not hex".into()))?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PaymentError::Config(format!("webhook secret: {e}")))?;
        mac.update(Self::manifest(data_id, x_request_id, header.ts).as_bytes());

        // Constant-time comparison
        mac.verify_slice(&expected)
            .map_err(|_| PaymentError::WebhookSignature("signature mismatch".into()))
    }
}
