//! External directory source
//!
//! The directory tool exposes membership as JSON arrays over HTTP.

use crate::config::DirectoryConfig;
use crate::error::DirectoryError;
// async_trait required for dyn-compatibility with &dyn DirectorySource
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Endpoints listing groups
pub const GROUP_ENDPOINTS: [&str; 2] = ["ldapUserGroup", "ldapServiceGroup"];
/// Endpoint listing the members of a group (`<endpoint>/<group>`)
pub const GROUP_MEMBERS_ENDPOINT: &str = "ldapGroupMembersInfo";
/// Endpoint listing service accounts
pub const SERVICE_ACCOUNTS_ENDPOINT: &str = "ldapServiceAccount";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Human,
    Service,
    Group,
}

/// A member of the external directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryMember {
    pub name: String,
    /// Groups only
    pub description: Option<String>,
    pub kind: MemberKind,
}

impl DirectoryMember {
    pub fn human(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: MemberKind::Human,
        }
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: MemberKind::Service,
        }
    }

    pub fn group(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            kind: MemberKind::Group,
        }
    }
}

/// Source of directory membership
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// User and service groups
    async fn groups(&self) -> Result<Vec<DirectoryMember>, DirectoryError>;

    /// Human users of the synchronized user group
    async fn users(&self) -> Result<Vec<DirectoryMember>, DirectoryError>;

    /// Service accounts, full login names
    async fn services(&self) -> Result<Vec<DirectoryMember>, DirectoryError>;
}

#[derive(Debug, Deserialize)]
struct RawMember {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

/// HTTP directory tool client
pub struct HttpDirectory {
    http: Client,
    base_url: String,
    user_group: String,
    service_prefix: String,
}

impl HttpDirectory {
    pub fn new(config: &DirectoryConfig, service_prefix: &str) -> Result<Self, DirectoryError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("vault-deployer/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            user_group: config.user_group.clone(),
            service_prefix: service_prefix.to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn fetch(&self, endpoint: &str) -> Result<Vec<RawMember>, DirectoryError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            error!(url = %url, status = status.as_u16(), "Directory lookup failed");
            return Err(DirectoryError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let members: Vec<RawMember> =
            serde_json::from_str(&body).map_err(|e| DirectoryError::InvalidResponse {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        debug!(url = %url, count = members.len(), "Fetched directory members");
        Ok(members)
    }
}

#[async_trait]
impl DirectorySource for HttpDirectory {
    async fn groups(&self) -> Result<Vec<DirectoryMember>, DirectoryError> {
        let mut groups = Vec::new();
        for endpoint in GROUP_ENDPOINTS {
            groups.extend(self.fetch(endpoint).await?.into_iter().map(|raw| {
                DirectoryMember::group(raw.name, raw.description.unwrap_or_default())
            }));
        }
        Ok(groups)
    }

    async fn users(&self) -> Result<Vec<DirectoryMember>, DirectoryError> {
        let endpoint = format!("{}/{}", GROUP_MEMBERS_ENDPOINT, self.user_group);
        Ok(self
            .fetch(&endpoint)
            .await?
            .into_iter()
            .map(|raw| DirectoryMember::human(raw.name))
            .collect())
    }

    async fn services(&self) -> Result<Vec<DirectoryMember>, DirectoryError> {
        Ok(self
            .fetch(SERVICE_ACCOUNTS_ENDPOINT)
            .await?
            .into_iter()
            .filter(|raw| raw.name.starts_with(&self.service_prefix))
            .map(|raw| DirectoryMember::service(raw.name))
            .collect())
    }
}
