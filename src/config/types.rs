//! Configuration types for vault-deployer
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use crate::util::SecretString;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Vault connection settings
    pub vault: VaultConfig,

    /// Input and build directories
    pub paths: PathsConfig,

    /// Deployment behaviour
    pub deploy: DeployConfig,

    /// Team ACL compilation settings
    pub acl: AclConfig,

    /// External directory source
    pub directory: DirectoryConfig,

    /// Identity alias reconciliation
    pub identity: IdentityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Vault connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault server address (e.g., `https://127.0.0.1:8200`)
    pub addr: String,

    /// Vault token (prefer env var VAULT_TOKEN)
    #[serde(default)]
    pub token: Option<SecretString>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retries for requests that could not connect
    pub max_retries: u32,

    /// Whether to verify SSL certificates
    pub verify_ssl: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: "https://127.0.0.1:8200".to_string(),
            token: None,
            timeout_secs: 30,
            max_retries: 2,
            verify_ssl: true,
        }
    }
}

impl VaultConfig {
    /// Get the full API base URL
    pub fn api_url(&self) -> String {
        format!("{}/v1", self.addr.trim_end_matches('/'))
    }
}

/// Input and build directories
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Static configuration tree copied verbatim into the build directory
    pub static_config: String,

    /// Team ACL tree compiled into policies
    pub teams: String,

    /// Build directory applied to Vault
    pub build: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            static_config: "static-configurations".to_string(),
            teams: "configurations/teams".to_string(),
            build: "build".to_string(),
        }
    }
}

/// Deployment behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Delete remote resources that are no longer declared
    pub cleanup: bool,

    /// Policies applied before touching any other endpoint
    pub bootstrap_policies: Vec<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            cleanup: true,
            bootstrap_policies: Vec::new(),
        }
    }
}

/// Team ACL compilation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// Prefix of every generated policy name
    pub policy_prefix: String,

    /// Auth backend whose users/groups files receive policy assignments
    pub backend: String,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            policy_prefix: "__team_policy".to_string(),
            backend: "ldap".to_string(),
        }
    }
}

/// External directory source
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Base URL of the directory tool API, `{env}` is substituted
    pub url: String,

    /// Environment used for substitution
    pub env: String,

    /// Directory group whose members are synchronized as entities
    pub user_group: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: "https://idm.{env}.example.com/tool".to_string(),
            env: "preprod".to_string(),
            user_group: "gu-rnd".to_string(),
            timeout_secs: 30,
        }
    }
}

impl DirectoryConfig {
    /// Base URL with the environment substituted
    pub fn base_url(&self) -> String {
        self.url
            .replace("{env}", &self.env)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Identity alias reconciliation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Auth backend the directory members log in through
    pub backend: String,

    /// Login prefix of service accounts
    pub service_prefix: String,

    /// Policy granted to every service account
    pub service_policy: String,

    /// Value of the `ldap_type` metadata key
    pub metadata_type: String,

    /// Additional backends that receive entity aliases (no policy update)
    pub extra_backends: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            backend: "ldap".to_string(),
            service_prefix: "svc-".to_string(),
            service_policy: "service-self-ro".to_string(),
            metadata_type: "UAD".to_string(),
            extra_backends: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}
