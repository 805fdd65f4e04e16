//! Authentication provider trait
//!
//! Defines the credential seam used by the Vault client. Static tokens are
//! the only implementation today; AppRole or other login flows would plug in
//! behind the same trait.

use crate::error::AuthError;
// async_trait required for dyn-compatibility with Box<dyn AuthProvider>
use async_trait::async_trait;

/// Authentication provider trait
///
/// Implementations provide authentication credentials for Vault API requests.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Get the authentication header to attach to a request
    async fn get_auth_header(&self) -> Result<AuthHeader, AuthError>;

    /// Get a description of the auth method (for logging)
    fn auth_type(&self) -> &'static str;
}

/// Authentication header to use with requests
#[derive(Debug, Clone)]
pub enum AuthHeader {
    /// Vault token (`X-Vault-Token`)
    VaultToken(String),
}

impl AuthHeader {
    /// Get the header name for this auth type
    pub fn header_name(&self) -> &'static str {
        match self {
            AuthHeader::VaultToken(_) => "X-Vault-Token",
        }
    }

    /// Get the header value for this auth type
    pub fn header_value(&self) -> String {
        match self {
            AuthHeader::VaultToken(token) => token.clone(),
        }
    }
}

/// Box type alias for auth providers
pub type BoxedAuthProvider = Box<dyn AuthProvider>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_token_header() {
        let header = AuthHeader::VaultToken("s.abc".into());
        assert_eq!(header.header_name(), "X-Vault-Token");
        assert_eq!(header.header_value(), "s.abc");
    }
}
