//! Bearer Tokens
//!
//! HS256-signed tokens with a typed claim set. A token is only accepted for
//! the purpose it was issued for: an access token cannot refresh a session
//! and a refresh token cannot call the API.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{CoreError, Result};

/// Purpose of a token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by every token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: i64,

    /// Expiry (unix seconds)
    pub exp: i64,
    pub kind: TokenKind,
}

/// Access + refresh token pair handed to clients
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and validates bearer tokens
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
        }
    }

    /// Sign a token of the given kind for a user
    pub fn issue(&self, user_id: i64, kind: TokenKind) -> Result<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let claims = Claims {
            sub: user_id,
            exp: Utc::now().timestamp() + ttl,
            kind,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Sign a fresh access + refresh pair
    pub fn issue_pair(&self, user_id: i64) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(user_id, TokenKind::Access)?,
            refresh_token: self.issue(user_id, TokenKind::Refresh)?,
        })
    }

    /// Check signature, expiry and purpose
    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation)?;

        if data.claims.kind != expected {
            return Err(CoreError::Auth(format!(
                "expected {expected:?} token, got {:?}",
                data.claims.kind
            )));
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(ttl: i64) -> TokenService {
        TokenService::new(&AuthConfig {
            jwt_secret: "test-secret".into(),
            access_ttl_secs: ttl,
            refresh_ttl_secs: ttl * 2,
        })
    }

    #[test]
    fn test_issue_and_validate() {
        let tokens = service(60);
        let token = tokens.issue(42, TokenKind::Access).unwrap();

        let claims = tokens.validate(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let tokens = service(60);
        let refresh = tokens.issue(42, TokenKind::Refresh).unwrap();

        let result = tokens.validate(&refresh, TokenKind::Access);
        assert!(matches!(result, Err(CoreError::Auth(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = service(-120);
        let token = tokens.issue(42, TokenKind::Access).unwrap();

        let result = tokens.validate(&token, TokenKind::Access);
        assert!(matches!(result, Err(CoreError::TokenExpired)));
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let token = service(60).issue(42, TokenKind::Access).unwrap();
        let other = TokenService::new(&AuthConfig {
            jwt_secret: "another-secret".into(),
            access_ttl_secs: 60,
            refresh_ttl_secs: 60,
        });

        let result = other.validate(&token, TokenKind::Access);
        assert!(result.unwrap_err().is_auth());
    }

    #[test]
    fn test_pair_kinds() {
        let tokens = service(60);
        let pair = tokens.issue_pair(7).unwrap();

        assert!(tokens.validate(&pair.access_token, TokenKind::Access).is_ok());
        assert!(tokens.validate(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }
}
