//! Authentication module
//!
//! Provides authentication mechanisms for Vault API access.

pub mod provider;
pub mod token;

pub use provider::{AuthHeader, AuthProvider, BoxedAuthProvider};
pub use token::TokenProvider;

use crate::config::VaultConfig;
use crate::error::AuthError;

/// Create an auth provider from configuration
pub fn create_auth_provider(config: &VaultConfig) -> Result<BoxedAuthProvider, AuthError> {
    if let Some(token) = &config.token {
        Ok(Box::new(TokenProvider::new(token.expose_secret())?))
    } else {
        Ok(Box::new(TokenProvider::from_env()?))
    }
}
