//! Vault API module
//!
//! [`VaultApi`] is the seam every reconciliation phase talks through;
//! [`VaultClient`] is the HTTP implementation.

pub mod client;
pub mod types;

pub use client::VaultClient;
pub use types::*;

use crate::error::{VaultError, VaultResult};
// async_trait required for dyn-compatibility with &dyn VaultApi
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

/// Auth backend mount table
pub const AUTH_MOUNTS_PATH: &str = "sys/auth";
/// Secret backend mount table
pub const SECRET_MOUNTS_PATH: &str = "sys/mounts";
/// ACL policy namespace
pub const POLICIES_PATH: &str = "sys/policy";
/// Plugin catalog
pub const PLUGIN_CATALOG_PATH: &str = "sys/plugins/catalog";
/// Built-in policy that can never be deleted
pub const ROOT_POLICY: &str = "root";

/// Primitive operations of the Vault HTTP API
///
/// `read` and `write` return the raw response body; `None` means the
/// resource does not exist (read) or Vault answered without content (write).
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Read a path (GET)
    async fn read(&self, path: &str) -> VaultResult<Option<Value>>;

    /// Write a path (POST)
    async fn write(&self, path: &str, body: &Value) -> VaultResult<Option<Value>>;

    /// List the keys under a path (LIST)
    ///
    /// Returns `Err(VaultError::UnsupportedOperation)` when the backend at
    /// that path cannot be listed, and `Ok(None)` when there is nothing to list.
    async fn list(&self, path: &str) -> VaultResult<Option<ListResponse>>;

    /// Delete a path (DELETE)
    async fn delete(&self, path: &str) -> VaultResult<()>;
}

/// Read a path and deserialize its `data` payload
pub async fn read_data<T: DeserializeOwned>(
    api: &dyn VaultApi,
    path: &str,
) -> VaultResult<Option<T>> {
    match api.read(path).await? {
        Some(body) => decode_data(path, body).map(Some),
        None => Ok(None),
    }
}

/// Deserialize the `data` payload of a response body
pub fn decode_data<T: DeserializeOwned>(path: &str, body: Value) -> VaultResult<T> {
    serde_json::from_value::<Envelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|e| VaultError::InvalidResponse(format!("Unexpected payload for {}: {}", path, e)))
}

/// Read a mount table (`sys/auth` or `sys/mounts`), keyed by `<path>/`
pub async fn list_mounts(
    api: &dyn VaultApi,
    mounts_path: &str,
) -> VaultResult<BTreeMap<String, MountInfo>> {
    // The table also carries non-mount keys on some versions; keep only
    // entries that look like mounts.
    let raw: BTreeMap<String, Value> = read_data(api, mounts_path).await?.unwrap_or_default();

    Ok(raw
        .into_iter()
        .filter(|(key, _)| key.ends_with('/'))
        .filter_map(|(key, value)| {
            serde_json::from_value::<MountInfo>(value)
                .ok()
                .map(|mount| (key, mount))
        })
        .collect())
}

/// Look up the accessor of an enabled auth backend
pub async fn auth_backend_accessor(api: &dyn VaultApi, backend: &str) -> VaultResult<Option<String>> {
    let mounts = list_mounts(api, AUTH_MOUNTS_PATH).await?;
    Ok(mounts
        .get(&format!("{}/", backend.trim_end_matches('/')))
        .and_then(|mount| mount.accessor.clone()))
}
