//! Error Types

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),
    
    /// Token could not be issued or failed validation
    #[error("Authentication failed: {0}")]
    Auth(String),
    
    /// Token was well-formed but has expired
    #[error("Token expired")]
    TokenExpired,
    
    /// Stored value could not be mapped onto a domain type
    #[error("Parse error: {0}")]
    Parse(String),
}

impl CoreError {
    /// Whether the caller should be asked to authenticate again
    pub fn is_auth(&self) -> bool {
        matches!(self, CoreError::Auth(_) | CoreError::TokenExpired)
    }
}

impl From<jsonwebtoken::errors::Error> for CoreError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => CoreError::TokenExpired,
            _ => CoreError::Auth(err.to_string()),
        }
    }
}
