//! Per-directory reconciliation plans
//!
//! Everything here is pure: the engine fetches remote state and hands it in.

use crate::error::ReconcileError;
use crate::vault::{ListResponse, POLICIES_PATH, ROOT_POLICY};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// How much of a plan may be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Writes and deletes
    Full,
    /// Writes only: `.nocleanup` is present or cleanup is disabled
    KeepStale,
    /// `.noupdate` is present: nothing is applied
    ReportOnly,
}

impl PlanMode {
    pub fn from_markers(cleanup: bool, no_update: bool, no_cleanup: bool) -> Self {
        if no_update {
            PlanMode::ReportOnly
        } else if !cleanup || no_cleanup {
            PlanMode::KeepStale
        } else {
            PlanMode::Full
        }
    }

    pub fn allows_writes(&self) -> bool {
        !matches!(self, PlanMode::ReportOnly)
    }

    pub fn allows_deletes(&self) -> bool {
        matches!(self, PlanMode::Full)
    }
}

/// A local file and the remote resource it declares
#[derive(Debug, Clone, PartialEq)]
pub struct LocalResource {
    pub file: PathBuf,
    pub path: String,
    pub content: Value,
}

/// Disjoint sets of actions for one directory
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryPlan {
    pub resource: String,
    pub mode: PlanMode,
    pub writes: Vec<LocalResource>,
    pub unchanged: Vec<String>,
    pub deletes: Vec<String>,
    pub retained: Vec<String>,
}

impl DirectoryPlan {
    pub fn new(resource: impl Into<String>, mode: PlanMode) -> Self {
        Self {
            resource: resource.into(),
            mode,
            writes: Vec::new(),
            unchanged: Vec::new(),
            deletes: Vec::new(),
            retained: Vec::new(),
        }
    }

    /// Split stale remote paths into deletes and retained per the plan mode
    pub fn set_stale(&mut self, stale: Vec<String>) {
        if self.mode.allows_deletes() {
            self.deletes = stale;
        } else {
            self.retained = stale;
        }
    }

    pub fn is_noop(&self) -> bool {
        self.writes.is_empty() && self.deletes.is_empty()
    }
}

/// `<dir>/<stem>`, or just the stem at the top level
pub fn resource_path(dir_resource: &str, stem: &str) -> String {
    if dir_resource.is_empty() {
        stem.to_string()
    } else {
        format!("{}/{}", dir_resource, stem)
    }
}

pub fn is_policy_path(path: &str) -> bool {
    path.strip_prefix(POLICIES_PATH)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Remote paths listed under `dir_resource` that no local file declares
///
/// Nested directories are ignored and the root policy is never stale.
/// Policy names are matched case-insensitively.
pub fn stale_paths(
    dir_resource: &str,
    remote: Option<&ListResponse>,
    local: &BTreeSet<String>,
) -> Vec<String> {
    let Some(remote) = remote else {
        return Vec::new();
    };

    let policies = dir_resource == POLICIES_PATH;
    let normalize = |path: &str| {
        if policies {
            path.to_lowercase()
        } else {
            path.to_string()
        }
    };
    let declared: BTreeSet<String> = local.iter().map(|path| normalize(path)).collect();

    remote
        .leaf_keys()
        .filter(|key| !(policies && *key == ROOT_POLICY))
        .map(|key| resource_path(dir_resource, key))
        .filter(|path| !declared.contains(&normalize(path)))
        .collect()
}

/// Body sent to Vault for a local resource
///
/// Policies go in a `policy` field holding the JSON text of the document.
pub fn desired_payload(resource: &LocalResource) -> Result<Value, ReconcileError> {
    if is_policy_path(&resource.path) {
        let text = serde_json::to_string(&resource.content).map_err(|source| {
            ReconcileError::PolicyEncoding {
                path: resource.path.clone(),
                source,
            }
        })?;
        Ok(json!({ "policy": text }))
    } else {
        Ok(resource.content.clone())
    }
}

/// Whether the remote state already matches a local declaration
///
/// `remote` is the raw read response. For policies the stored rules are
/// parsed and compared with the local document; anything else matches when
/// every declared key has an equal remote value.
pub fn matches_remote(resource: &LocalResource, remote: Option<&Value>) -> bool {
    let Some(remote) = remote else {
        return false;
    };
    let data = remote.get("data").unwrap_or(remote);

    if is_policy_path(&resource.path) {
        return ["rules", "policy"]
            .iter()
            .filter_map(|key| data.get(*key).and_then(Value::as_str))
            .filter_map(|text| serde_json::from_str::<Value>(text).ok())
            .any(|rules| rules == resource.content);
    }

    match resource.content.as_object() {
        Some(declared) => declared
            .iter()
            .all(|(key, value)| data.get(key) == Some(value)),
        None => false,
    }
}
