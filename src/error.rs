//! Error types for vault-deployer
//!
//! This module defines the error hierarchy used throughout the application.
//! Each phase of a run (ACL compilation, reconciliation, identity sync) has
//! its own `thiserror` enum; `AppError` wraps them at the binary boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Vault API error: {0}")]
    Vault(#[from] VaultError),

    #[error("ACL error: {0}")]
    Acl(#[from] AclError),

    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Build error: {0}")]
    Tree(#[from] TreeError),
}

/// Application settings errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading the declarative configuration tree
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path} as {format}: {reason}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        reason: String,
    },

    #[error("Path {path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("Path {path} not found")]
    NotFound { path: PathBuf },
}

impl TreeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TreeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Malformed access-control declarations
///
/// Every variant is fatal: a malformed declaration must never fall back to a
/// wider default right.
#[derive(Error, Debug)]
pub enum AclError {
    #[error("More than one ACL file in {dir}: {files:?}")]
    AmbiguousAcl { dir: PathBuf, files: Vec<PathBuf> },

    #[error("Unknown capability '{token}' for path '{path}'")]
    UnknownCapability { path: String, token: String },

    #[error("'deny' cannot be combined with other capabilities for path '{path}'")]
    DenyMixed { path: String },

    #[error("Invalid rights for role '{role}' in '{path}': {reason}")]
    MalformedRights {
        path: String,
        role: String,
        reason: String,
    },

    #[error("Role '{role}' in '{path}' is not a default role and declares no rights")]
    NoRightsSource { path: String, role: String },

    #[error("Invalid ACL declaration in {path}: {reason}")]
    InvalidDeclaration { path: PathBuf, reason: String },

    #[error("ACL file {path} sits at the tree root and has no resource path")]
    RootAcl { path: PathBuf },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Errors raised while converging the remote state with the build tree
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("{path} doesn't support listing; add .nocleanup in the directory")]
    ListingUnsupported { path: String },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: VaultError,
    },

    #[error("Failed to list {path}: {source}")]
    ListFailed {
        path: String,
        #[source]
        source: VaultError,
    },

    #[error("Invalid mount declaration {name}: {reason}")]
    InvalidMount { name: String, reason: String },

    #[error("Failed to encode policy {path}: {source}")]
    PolicyEncoding {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Vault HTTP API errors
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Vault API error (HTTP {status}): {}", errors.join("; "))]
    Api { status: u16, errors: Vec<String> },

    #[error("Resource not found: {path}")]
    NotFound { path: String },

    #[error("Unauthorized: missing or invalid token")]
    Unauthorized,

    #[error("Forbidden: permission denied on {path}")]
    Forbidden { path: String },

    #[error("Unsupported operation on {path}")]
    UnsupportedOperation { path: String },

    #[error("Vault is sealed or not initialized")]
    Sealed,

    #[error("Invalid response from Vault: {0}")]
    InvalidResponse(String),
}

impl VaultError {
    /// Create an appropriate error from an HTTP status code and response body
    pub fn from_response(status: u16, path: &str, body: &str) -> Self {
        let errors = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("errors").and_then(|e| e.as_array()).map(|errs| {
                    errs.iter()
                        .filter_map(|e| e.as_str().map(str::to_string))
                        .collect::<Vec<_>>()
                })
            })
            .unwrap_or_default();

        match status {
            401 => VaultError::Unauthorized,
            403 => VaultError::Forbidden {
                path: path.to_string(),
            },
            404 => VaultError::NotFound {
                path: path.to_string(),
            },
            405 => VaultError::UnsupportedOperation {
                path: path.to_string(),
            },
            503 => VaultError::Sealed,
            _ => VaultError::Api {
                status,
                errors: if errors.is_empty() && !body.is_empty() {
                    vec![body.to_string()]
                } else if errors.is_empty() {
                    vec![format!("HTTP {}", status)]
                } else {
                    errors
                },
            },
        }
    }
}

/// Errors raised by the external directory source
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Directory lookup {url} failed with HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

/// Identity graph reconciliation errors
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Auth backend '{backend}' is not initialized or not found; make sure a first pass has been made")]
    BackendNotInitialized { backend: String },

    #[error("Invariant violated (potential race condition): {message}")]
    InvariantViolation { message: String },

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl IdentityError {
    pub fn invariant(message: impl Into<String>) -> Self {
        IdentityError::InvariantViolation {
            message: message.into(),
        }
    }
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No Vault token configured")]
    NotConfigured,

    #[error("Invalid token format")]
    InvalidToken,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for Vault API operations
pub type VaultResult<T> = std::result::Result<T, VaultError>;

/// Result type alias for ACL compilation
pub type AclResult<T> = std::result::Result<T, AclError>;
