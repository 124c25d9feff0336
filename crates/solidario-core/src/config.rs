//! Application Configuration
//!
//! Built once at startup and handed to each component. Nothing reads the
//! environment after `AppConfig::from_env` returns.

use std::time::Duration;

use url::Url;

use crate::error::{CoreError, Result};

/// Top-level configuration
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Listen address for the HTTP server
    pub bind_addr: String,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub webhook: WebhookConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
}

/// Relational store connection
#[derive(Clone, Debug, Default)]
pub struct DatabaseConfig {
    /// Postgres URL; `None` selects the in-memory stores
    pub url: Option<String>,

    /// Pool size
    pub max_connections: u32,

    /// JSON file of users loaded into the in-memory user directory
    pub seed_users_path: Option<String>,
}

/// Mercado Pago credentials and transport settings
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Bearer token; `None` disables payment endpoints
    pub access_token: Option<String>,

    /// API base URL (without `/v1`)
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: "https://api.mercadopago.com".into(),
            timeout_secs: 10,
        }
    }
}

/// Inbound webhook verification
#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    /// HMAC secret shared with the gateway; when set, unsigned webhooks are rejected
    pub secret: Option<String>,

    /// Reject signatures whose `ts` is older than this many seconds
    pub max_age_secs: Option<u64>,
}

impl WebhookConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

/// Bearer-token signing
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

/// Outbound email
#[derive(Clone, Debug)]
pub struct MailConfig {
    /// `None` selects the logging mailer
    pub sendgrid_api_key: Option<String>,
    pub from_email: String,
    pub from_name: String,

    /// Upper bound on one send, in seconds
    pub timeout_secs: u64,
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sendgrid_api_key: None,
            from_email: String::new(),
            from_name: String::new(),
            timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET")
            .ok_or_else(|| CoreError::Config("JWT_SECRET not set".into()))?;

        let database_url = match get("DATABASE_URL") {
            Some(url) => Some(url),
            None => get("POSTGRES_HOST")
                .map(|host| {
                    tracing::debug!(host = %host, "Building database URL from POSTGRES_* variables");
                    postgres_url(
                        &host,
                        &get("POSTGRES_PORT").unwrap_or_else(|| "5432".into()),
                        &get("POSTGRES_USER").unwrap_or_else(|| "postgres".into()),
                        &get("POSTGRES_PASSWORD").unwrap_or_else(|| "postgres".into()),
                        &get("POSTGRES_DB").unwrap_or_else(|| "postgres".into()),
                        &get("POSTGRES_SSL_MODE").unwrap_or_else(|| "disable".into()),
                    )
                })
                .transpose()?,
        };

        let mail_defaults = MailConfig::default();
        let gateway_defaults = GatewayConfig::default();

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_or(get("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS", 5)?,
                seed_users_path: get("MEMORY_SEED_USERS"),
            },
            gateway: GatewayConfig {
                access_token: get("MERCADOPAGO_ACCESS_TOKEN"),
                base_url: get("MERCADOPAGO_BASE_URL").unwrap_or(gateway_defaults.base_url),
                timeout_secs: parse_or(
                    get("GATEWAY_TIMEOUT_SECS"),
                    "GATEWAY_TIMEOUT_SECS",
                    gateway_defaults.timeout_secs,
                )?,
            },
            webhook: WebhookConfig {
                secret: get("MERCADOPAGO_WEBHOOK_SECRET"),
                max_age_secs: get("MERCADOPAGO_WEBHOOK_MAX_AGE_SECS")
                    .map(|raw| parse_or(Some(raw), "MERCADOPAGO_WEBHOOK_MAX_AGE_SECS", 0))
                    .transpose()?,
            },
            auth: AuthConfig {
                jwt_secret,
                access_ttl_secs: parse_or(get("JWT_EXPIRATION_IN_SECONDS"), "JWT_EXPIRATION_IN_SECONDS", 30)?,
                refresh_ttl_secs: parse_or(
                    get("JWT_REFRESH_EXPIRATION_IN_SECONDS"),
                    "JWT_REFRESH_EXPIRATION_IN_SECONDS",
                    60,
                )?,
            },
            mail: MailConfig {
                sendgrid_api_key: get("SENDGRID_API_KEY"),
                from_email: get("EMAIL_FROM").unwrap_or_default(),
                from_name: get("EMAIL_FROM_NAME").unwrap_or_default(),
                timeout_secs: parse_or(
                    get("MAIL_TIMEOUT_SECS"),
                    "MAIL_TIMEOUT_SECS",
                    mail_defaults.timeout_secs,
                )?,
            },
        })
    }
}

/// Assemble a Postgres URL; credentials are percent-encoded
fn postgres_url(host: &str, port: &str, user: &str, password: &str, db: &str, ssl_mode: &str) -> Result<String> {
    let invalid = |what: &str| CoreError::Config(format!("invalid POSTGRES_{what}"));

    let mut url = Url::parse(&format!("postgres://{host}:{port}")).map_err(|_| invalid("HOST/PORT"))?;
    url.set_username(user).map_err(|()| invalid("USER"))?;
    url.set_password(Some(password)).map_err(|()| invalid("PASSWORD"))?;
    url.path_segments_mut()
        .map_err(|()| invalid("HOST"))?
        .push(db);
    url.query_pairs_mut().append_pair("sslmode", ssl_mode);

    Ok(url.into())
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CoreError::Config(format!("{key}={raw}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.database.url.is_none());
        assert!(config.gateway.access_token.is_none());
        assert_eq!(config.gateway.base_url, "https://api.mercadopago.com");
        assert_eq!(config.gateway.timeout(), Duration::from_secs(10));
        assert!(config.webhook.secret.is_none());
        assert_eq!(config.auth.access_ttl_secs, 30);
        assert_eq!(config.auth.refresh_ttl_secs, 60);
        assert!(config.mail.sendgrid_api_key.is_none());
        assert_eq!(config.mail.timeout(), Duration::from_secs(10));
        assert!(config.webhook.max_age().is_none());
        assert!(config.database.seed_users_path.is_none());
    }

    #[test]
    fn test_jwt_secret_required() {
        let result = AppConfig::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_database_url_from_postgres_parts() {
        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_PASSWORD", "pw"),
        ]))
        .unwrap();

        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://postgres:pw@db:5432/postgres?sslmode=disable")
        );
    }

    #[test]
    fn test_database_credentials_are_encoded() {
        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_USER", "app"),
            ("POSTGRES_PASSWORD", "p@ss/w:rd"),
        ]))
        .unwrap();

        let url = config.database.url.unwrap();
        assert_eq!(url, "postgres://app:p%40ss%2Fw%3Ard@db:5432/postgres?sslmode=disable");

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("db"));
        assert_eq!(parsed.password(), Some("p%40ss%2Fw%3Ard"));
    }

    #[test]
    fn test_optional_limits() {
        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("MERCADOPAGO_WEBHOOK_MAX_AGE_SECS", "300"),
            ("MAIL_TIMEOUT_SECS", "3"),
            ("MEMORY_SEED_USERS", "users.json"),
        ]))
        .unwrap();

        assert_eq!(config.webhook.max_age(), Some(Duration::from_secs(300)));
        assert_eq!(config.mail.timeout(), Duration::from_secs(3));
        assert_eq!(config.database.seed_users_path.as_deref(), Some("users.json"));

        let bad = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("MERCADOPAGO_WEBHOOK_MAX_AGE_SECS", "soon"),
        ]));
        assert!(matches!(bad, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_database_url_takes_precedence() {
        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://u:p@h/d"),
            ("POSTGRES_HOST", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.database.url.as_deref(), Some("postgres://u:p@h/d"));
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let result = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("GATEWAY_TIMEOUT_SECS", "ten"),
        ]));

        assert!(matches!(result, Err(CoreError::Config(msg)) if msg.contains("GATEWAY_TIMEOUT_SECS")));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("MERCADOPAGO_ACCESS_TOKEN", "  "),
        ]))
        .unwrap();

        assert!(config.gateway.access_token.is_none());
    }
}
