//! Vault API response types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Standard Vault response envelope: the payload lives under `data`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Result of a LIST operation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub key_info: BTreeMap<String, Value>,
}

impl ListResponse {
    /// Keys that are leaves, not nested directories (`foo/`)
    pub fn leaf_keys(&self) -> impl Iterator<Item = &str> {
        self.keys
            .iter()
            .map(String::as_str)
            .filter(|k| !k.ends_with('/'))
    }
}

/// Entry of the `sys/auth` or `sys/mounts` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    #[serde(rename = "type")]
    pub mount_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub accessor: Option<String>,
}

/// Backend-specific pointer to a canonical identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mount_accessor: String,
    #[serde(default)]
    pub canonical_id: String,
}

/// Entity or group record of the identity store
///
/// Entities expose `aliases`, groups a single `alias` object which Vault
/// returns as `{}` when unset; [`IdentityRecord::all_aliases`] merges both.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IdentityRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub policies: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub aliases: Option<Vec<Alias>>,
    #[serde(default)]
    pub alias: Option<Alias>,
}

impl IdentityRecord {
    /// Every non-empty alias of this identity
    pub fn all_aliases(&self) -> Vec<&Alias> {
        self.aliases
            .iter()
            .flatten()
            .chain(self.alias.iter())
            .filter(|a| !a.id.is_empty())
            .collect()
    }

    /// The alias bound to a given mount accessor, if any
    pub fn alias_for(&self, mount_accessor: &str) -> Option<&Alias> {
        self.all_aliases()
            .into_iter()
            .find(|a| a.mount_accessor == mount_accessor)
    }
}
