//! Vault API client
//!
//! Provides an HTTP client for the Vault REST API (`/v1/...`).

use crate::auth::BoxedAuthProvider;
use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::util::{QueryBuilder, encode_path};
use crate::vault::VaultApi;
use crate::vault::types::{Envelope, ListResponse};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// Vault API client
pub struct VaultClient {
    http: Client,
    base_url: String,
    auth: Arc<RwLock<BoxedAuthProvider>>,
    max_retries: u32,
}

impl VaultClient {
    /// Create a new Vault client from configuration
    pub fn new(config: &VaultConfig, auth: BoxedAuthProvider) -> VaultResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .user_agent(format!("vault-deployer/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(VaultError::Request)?;

        Ok(Self {
            http,
            base_url: config.api_url(),
            auth: Arc::new(RwLock::new(auth)),
            max_retries: config.max_retries,
        })
    }

    /// Build a URL for an API path
    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url,
            encode_path(path.trim_start_matches('/'))
        )
    }

    /// Add authentication to a request
    async fn authenticate(&self, request: RequestBuilder) -> VaultResult<RequestBuilder> {
        let auth = self.auth.read().await;
        let header = auth
            .get_auth_header()
            .await
            .map_err(|_| VaultError::Unauthorized)?;

        Ok(request.header(header.header_name(), header.header_value()))
    }

    /// Execute a request, retrying only when the connection could not be made
    async fn execute(&self, path: &str, request: RequestBuilder) -> VaultResult<Response> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
                debug!(path, attempt = attempt + 1, "Retrying request");
            }

            let req = request
                .try_clone()
                .ok_or_else(|| VaultError::InvalidResponse("Cannot clone request".to_string()))?;

            match req.send().await {
                Ok(response) => {
                    return self.handle_response(path, response).await;
                }
                Err(e) => {
                    warn!(path, error = %e, "Request failed");
                    let retryable = e.is_connect();
                    last_error = Some(VaultError::Request(e));
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| VaultError::InvalidResponse("Unknown error".to_string())))
    }

    /// Handle API response
    async fn handle_response(&self, path: &str, response: Response) -> VaultResult<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(VaultError::from_response(status.as_u16(), path, &body))
    }

    /// Decode a response body, treating an empty body (HTTP 204) as `None`
    async fn decode(response: Response) -> VaultResult<Option<Value>> {
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let text = response.text().await.map_err(|e| {
            VaultError::InvalidResponse(format!("Failed to read response: {}", e))
        })?;

        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| VaultError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    /// Check that Vault is initialized, unsealed and that the token is valid
    #[instrument(skip(self))]
    pub async fn ensure_ready(&self) -> VaultResult<()> {
        // sys/health is unauthenticated; any non-2xx means not usable
        let request = self.http.get(self.url("sys/health"));
        self.execute("sys/health", request).await?;

        let request = self.authenticate(self.http.get(self.url("auth/token/lookup-self"))).await?;
        self.execute("auth/token/lookup-self", request).await?;

        debug!("Vault is ready and the token is valid");
        Ok(())
    }
}

#[async_trait]
impl VaultApi for VaultClient {
    #[instrument(skip(self))]
    async fn read(&self, path: &str) -> VaultResult<Option<Value>> {
        let request = self.authenticate(self.http.get(self.url(path))).await?;

        match self.execute(path, request).await {
            Ok(response) => Self::decode(response).await,
            Err(VaultError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, body))]
    async fn write(&self, path: &str, body: &Value) -> VaultResult<Option<Value>> {
        let request = self.authenticate(self.http.post(self.url(path)).json(body)).await?;

        let response = self.execute(path, request).await?;
        Self::decode(response).await
    }

    #[instrument(skip(self))]
    async fn list(&self, path: &str) -> VaultResult<Option<ListResponse>> {
        let url = format!(
            "{}{}",
            self.url(path.trim_end_matches('/')),
            QueryBuilder::new().param("list", true).build()
        );
        let request = self.authenticate(self.http.get(url)).await?;

        let response = match self.execute(path, request).await {
            Ok(response) => response,
            // Vault answers 404 for a LIST with no keys
            Err(VaultError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        match Self::decode(response).await? {
            Some(body) => serde_json::from_value::<Envelope<ListResponse>>(body)
                .map(|envelope| Some(envelope.data))
                .map_err(|e| {
                    VaultError::InvalidResponse(format!("Invalid list response for {}: {}", path, e))
                }),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, path: &str) -> VaultResult<()> {
        let request = self.authenticate(self.http.delete(self.url(path))).await?;

        match self.execute(path, request).await {
            Ok(_) | Err(VaultError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
