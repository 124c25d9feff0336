//! SendGrid Mailer
//!
//! Implementation of `Mailer` over the SendGrid v3 mail-send endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;

use solidario_core::User;
use solidario_core::config::MailConfig;
use solidario_payments::{Mailer, PaymentError, Result};

const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";

#[derive(Serialize)]
struct MailBody<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: String,
    content: [Content; 1],
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    name: String,
}

#[derive(Serialize)]
struct Content {
    #[serde(rename = "type")]
    mime: &'static str,
    value: String,
}

/// Build the thank-you email text
fn thanks_message(payer: &User, amount: Decimal) -> (String, String) {
    let subject = "Obrigado pela sua doação!".to_string();
    let body = format!(
        "Olá, {}!\n\nRecebemos sua doação de R$ {:.2}. Obrigado por apoiar a comunidade.\n",
        payer.name,
        amount.round_dp(2),
    );
    (subject, body)
}

/// SendGrid mailer
pub struct SendGridMailer {
    http: Client,
    base_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl SendGridMailer {
    /// Create a mailer whose sends give up after `timeout`
    pub fn new(
        api_key: impl Into<String>,
        from_email: impl Into<String>,
        from_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            from_email: from_email.into(),
            from_name: from_name.into(),
        })
    }

    /// Create from configuration; `None` when no API key is configured
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>> {
        config
            .sendgrid_api_key
            .as_deref()
            .map(|key| Self::new(key, &config.from_email, &config.from_name, config.timeout()))
            .transpose()
    }

    /// Point at a different API host (tests, regional endpoints)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send_payment_thanks(&self, payer: &User, amount: Decimal) -> Result<()> {
        let (subject, text) = thanks_message(payer, amount);
        let body = MailBody {
            personalizations: [Personalization {
                to: [Address {
                    email: &payer.email,
                    name: payer.full_name(),
                }],
            }],
            from: Address {
                email: &self.from_email,
                name: self.from_name.clone(),
            },
            subject,
            content: [Content {
                mime: "text/plain",
                value: text,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Notifier(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PaymentError::Notifier(format!("SendGrid returned {status}: {detail}")));
        }

        tracing::debug!(user_id = payer.id, "Payment thanks email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn payer() -> User {
        User {
            id: 1,
            name: "Ana".into(),
            surname: "Souza".into(),
            email: "ana@example.com".into(),
            cpf: "12345678909".into(),
            postal_code: "01001000".into(),
            city: "São Paulo".into(),
            state: "SP".into(),
        }
    }

    #[test]
    fn test_thanks_message_formats_amount() {
        let (_, body) = thanks_message(&payer(), dec!(49.9));
        assert!(body.contains("R$ 49.90"));
        assert!(body.contains("Ana"));
    }

    #[tokio::test]
    async fn test_send_payment_thanks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v3/mail/send")
            .match_header("authorization", "Bearer SG.key")
            .match_body(Matcher::PartialJson(json!({
                "personalizations": [{ "to": [{ "email": "ana@example.com", "name": "Ana Souza" }] }],
                "from": { "email": "no-reply@solidario.app" }
            })))
            .with_status(202)
            .create_async()
            .await;

        let mailer = SendGridMailer::new("SG.key", "no-reply@solidario.app", "Solidário", Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.url());
        mailer.send_payment_thanks(&payer(), dec!(50)).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_send_is_notifier_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v3/mail/send")
            .with_status(401)
            .with_body(r#"{"errors":[{"message":"bad key"}]}"#)
            .create_async()
            .await;

        let mailer = SendGridMailer::new("SG.bad", "no-reply@solidario.app", "Solidário", Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.url());
        let result = mailer.send_payment_thanks(&payer(), dec!(50)).await;

        assert!(matches!(result, Err(PaymentError::Notifier(msg)) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        // Accepts the connection, never writes a response
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let mailer = SendGridMailer::new("SG.key", "no-reply@solidario.app", "Solidário", Duration::from_millis(200))
            .unwrap()
            .with_base_url(format!("http://{addr}"));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            mailer.send_payment_thanks(&payer(), dec!(50)),
        )
        .await
        .expect("client timeout fired first");

        assert!(matches!(result, Err(PaymentError::Notifier(_))));
    }

    #[test]
    fn test_from_config_without_key() {
        assert!(SendGridMailer::from_config(&MailConfig::default()).unwrap().is_none());

        let config = MailConfig {
            sendgrid_api_key: Some("SG.key".into()),
            ..MailConfig::default()
        };
        assert!(SendGridMailer::from_config(&config).unwrap().is_some());
    }
}
