//! Static Vault token authentication

use crate::auth::provider::{AuthHeader, AuthProvider};
use crate::error::AuthError;
use crate::util::SecretString;
use async_trait::async_trait;

/// Static token authentication provider
#[derive(Debug, Clone)]
pub struct TokenProvider {
    token: SecretString,
}

impl TokenProvider {
    /// Create a new token provider
    pub fn new(token: impl Into<String>) -> Result<Self, AuthError> {
        let token = token.into();

        if token.trim().is_empty() {
            return Err(AuthError::InvalidToken);
        }

        Ok(Self {
            token: SecretString::new(token),
        })
    }

    /// Create from the `VAULT_TOKEN` environment variable
    pub fn from_env() -> Result<Self, AuthError> {
        match std::env::var("VAULT_TOKEN") {
            Ok(token) if !token.is_empty() => Self::new(token),
            _ => Err(AuthError::NotConfigured),
        }
    }
}

#[async_trait]
impl AuthProvider for TokenProvider {
    async fn get_auth_header(&self) -> Result<AuthHeader, AuthError> {
        Ok(AuthHeader::VaultToken(self.token.expose_secret().to_string()))
    }

    fn auth_type(&self) -> &'static str {
        "Vault token"
    }
}
