//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (VAULT_DEPLOYER__*, then VAULT_ADDR / VAULT_TOKEN)
//! 2. Configuration file (TOML)
//! 3. Default values

use crate::config::types::AppConfig;
use crate::error::ConfigError;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "vault-deployer.toml",
    ".vault-deployer.toml",
    "~/.config/vault-deployer/config.toml",
    "/etc/vault-deployer/config.toml",
];

/// Load configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        // Explicit path provided - must exist
        if !Path::new(path).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(File::new(path, FileFormat::Toml));
    } else {
        // Try default paths (first existing one wins)
        for path in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
                break;
            }
        }
    }

    // e.g., VAULT_DEPLOYER__VAULT__ADDR, VAULT_DEPLOYER__DEPLOY__CLEANUP
    // Double underscore (__) maps to nested keys (vault.addr)
    builder = builder.add_source(
        Environment::with_prefix("VAULT_DEPLOYER")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    // The conventional Vault CLI variables win over everything but CLI flags
    if let Ok(addr) = std::env::var("VAULT_ADDR")
        && !addr.is_empty()
    {
        builder = builder
            .set_override("vault.addr", addr)
            .map_err(|e| ConfigError::Load(e.to_string()))?;
    }

    if let Ok(token) = std::env::var("VAULT_TOKEN")
        && !token.is_empty()
    {
        builder = builder
            .set_override("vault.token", token)
            .map_err(|e| ConfigError::Load(e.to_string()))?;
    }

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Validate configuration values
///
/// The token is not required here: a build-only run never talks to Vault.
/// See [`require_token`] for deploy runs.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.vault.addr.is_empty() {
        return Err(ConfigError::Missing {
            field: "vault.addr".to_string(),
        });
    }

    if !config.vault.addr.starts_with("http://") && !config.vault.addr.starts_with("https://") {
        return Err(ConfigError::Invalid {
            message: format!(
                "vault.addr must start with http:// or https://, got: {}",
                config.vault.addr
            ),
        });
    }

    if config.vault.timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "vault.timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.directory.timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "directory.timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.acl.policy_prefix.is_empty() {
        return Err(ConfigError::Missing {
            field: "acl.policy_prefix".to_string(),
        });
    }

    for (field, value) in [
        ("paths.static_config", &config.paths.static_config),
        ("paths.teams", &config.paths.teams),
        ("paths.build", &config.paths.build),
        ("identity.backend", &config.identity.backend),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Missing {
                field: field.to_string(),
            });
        }
    }

    Ok(())
}

/// Fail unless a Vault token is configured
pub fn require_token(config: &AppConfig) -> Result<(), ConfigError> {
    match &config.vault.token {
        Some(token) if !token.expose_secret().is_empty() => Ok(()),
        _ => Err(ConfigError::Missing {
            field: "vault.token (set VAULT_TOKEN environment variable)".to_string(),
        }),
    }
}
