//! Auth and secret backend enabling
//!
//! Mount declarations live in `<build>/sys/auth/<name>.json` and
//! `<build>/sys/mounts/<name>.json`. Existing mounts are only checked, never
//! re-tuned or disabled.

use crate::error::{ReconcileError, TreeError, VaultError};
use crate::tree::TreeReader;
use crate::vault::{
    AUTH_MOUNTS_PATH, MountInfo, PLUGIN_CATALOG_PATH, POLICIES_PATH, SECRET_MOUNTS_PATH,
    VaultApi, list_mounts,
};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

/// Mount type of externally registered plugins
const PLUGIN_TYPE: &str = "plugin";

/// A local mount declaration
#[derive(Debug, Clone, PartialEq)]
pub struct MountDeclaration {
    pub name: String,
    pub mount_type: String,
    pub description: Option<String>,
    pub plugin_name: Option<String>,
    pub config: Value,
}

impl MountDeclaration {
    pub fn from_value(name: &str, config: Value) -> Result<Self, ReconcileError> {
        let invalid = |reason: &str| ReconcileError::InvalidMount {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let mount_type = config
            .get("type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| invalid("missing 'type'"))?
            .to_string();

        let plugin_name = config
            .get("plugin_name")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        if mount_type == PLUGIN_TYPE && plugin_name.is_none() {
            return Err(invalid("a valid 'plugin_name' is required for plugin mounts"));
        }

        Ok(Self {
            name: name.to_string(),
            description: config
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            mount_type,
            plugin_name,
            config,
        })
    }

    /// Differences with the remote mount, as human-readable field names
    pub fn drift(&self, remote: &MountInfo) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.mount_type != remote.mount_type {
            fields.push("type");
        }
        if let Some(description) = &self.description
            && remote.description.as_deref().unwrap_or_default() != description.as_str()
        {
            fields.push("description");
        }
        fields
    }
}

/// Outcome of one mount table pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountReport {
    pub enabled: Vec<String>,
    pub existing: Vec<String>,
    pub skipped: Vec<String>,
    pub drifted: Vec<String>,
}

/// Enable the auth backends declared in the build tree
pub async fn enable_auth_backends(
    api: &dyn VaultApi,
    reader: &TreeReader,
    build_dir: &Path,
) -> Result<MountReport, ReconcileError> {
    enable_mounts(api, reader, build_dir, AUTH_MOUNTS_PATH).await
}

/// Enable the secret backends declared in the build tree
pub async fn enable_secret_backends(
    api: &dyn VaultApi,
    reader: &TreeReader,
    build_dir: &Path,
) -> Result<MountReport, ReconcileError> {
    enable_mounts(api, reader, build_dir, SECRET_MOUNTS_PATH).await
}

/// Enable every mount declared under `<build_dir>/<mounts_path>`
///
/// Plugin mounts whose plugin is not registered are skipped and their build
/// directories removed, so that later phases do not configure them.
#[instrument(skip(api, reader))]
pub async fn enable_mounts(
    api: &dyn VaultApi,
    reader: &TreeReader,
    build_dir: &Path,
    mounts_path: &str,
) -> Result<MountReport, ReconcileError> {
    let mut report = MountReport::default();
    let declarations_dir = build_dir.join(mounts_path);
    if !declarations_dir.is_dir() {
        debug!(path = %mounts_path, "No mount declared");
        return Ok(report);
    }

    let remote_mounts = list_mounts(api, mounts_path).await?;
    let plugins = registered_plugins(api).await?;

    for entry in reader.list(&declarations_dir)? {
        if entry.is_dir {
            continue;
        }
        let name = entry.stem();
        let declaration = MountDeclaration::from_value(&name, reader.parse(&entry.path)?)?;

        if let Some(plugin) = &declaration.plugin_name
            && declaration.mount_type == PLUGIN_TYPE
            && !plugins.contains(plugin)
        {
            warn!(
                mount = %name,
                plugin = %plugin,
                "Plugin based mount not registered in the plugin catalog, skipping"
            );
            remove_mount_build_dirs(build_dir, mounts_path, &name)?;
            report.skipped.push(name);
            continue;
        }

        match remote_mounts.get(&format!("{}/", name)) {
            Some(remote) => {
                let drift = declaration.drift(remote);
                if !drift.is_empty() {
                    error!(
                        mount = %format!("{}/{}", mounts_path, name),
                        fields = ?drift,
                        remote = ?remote,
                        local = %declaration.config,
                        "Remote mount differs from its declaration"
                    );
                    report.drifted.push(name.clone());
                }
                report.existing.push(name);
            }
            None => {
                info!(mount = %name, "Enabling mount");
                let path = format!("{}/{}", mounts_path, name);
                api.write(&path, &declaration.config)
                    .await
                    .map_err(|source| ReconcileError::WriteFailed { path, source })?;
                report.enabled.push(name);
            }
        }
    }

    Ok(report)
}

async fn registered_plugins(api: &dyn VaultApi) -> Result<BTreeSet<String>, ReconcileError> {
    match api.list(PLUGIN_CATALOG_PATH).await {
        Ok(listing) => Ok(listing
            .map(|l| l.keys.into_iter().collect())
            .unwrap_or_default()),
        Err(VaultError::UnsupportedOperation { .. }) => {
            warn!("Plugin catalog cannot be listed, assuming no plugin is registered");
            Ok(BTreeSet::new())
        }
        Err(source) => Err(ReconcileError::ListFailed {
            path: PLUGIN_CATALOG_PATH.to_string(),
            source,
        }),
    }
}

/// Remove the build directories configuring a skipped mount
fn remove_mount_build_dirs(
    build_dir: &Path,
    mounts_path: &str,
    name: &str,
) -> Result<(), ReconcileError> {
    let config_root = if mounts_path == AUTH_MOUNTS_PATH {
        build_dir.join("auth")
    } else {
        build_dir.to_path_buf()
    };

    for dir in [build_dir.join(mounts_path).join(name), config_root.join(name)] {
        if dir.is_dir() {
            debug!(dir = %dir.display(), "Removing build directory of skipped mount");
            fs::remove_dir_all(&dir).map_err(|e| TreeError::io(&dir, e))?;
        }
    }
    Ok(())
}

/// Write the named policies from `<build>/sys/policy` before anything else
///
/// Returns how many policies were written. A listed policy without a build
/// file is reported and skipped.
#[instrument(skip(api, reader))]
pub async fn apply_bootstrap_policies(
    api: &dyn VaultApi,
    reader: &TreeReader,
    build_dir: &Path,
    names: &[String],
) -> Result<usize, ReconcileError> {
    if names.is_empty() {
        return Ok(0);
    }

    let policy_dir = build_dir.join(POLICIES_PATH);
    let entries = if policy_dir.is_dir() {
        reader.list(&policy_dir)?
    } else {
        Vec::new()
    };

    let mut applied = 0;
    for name in names {
        let Some(entry) = entries.iter().find(|e| !e.is_dir && e.stem() == *name) else {
            warn!(policy = %name, "Bootstrap policy has no build file");
            continue;
        };

        let document = reader.parse(&entry.path)?;
        let text = serde_json::to_string(&document).map_err(|source| {
            ReconcileError::PolicyEncoding {
                path: name.clone(),
                source,
            }
        })?;

        let path = format!("{}/{}", POLICIES_PATH, name);
        info!(policy = %name, "Applying bootstrap policy");
        api.write(&path, &json!({ "policy": text }))
            .await
            .map_err(|source| ReconcileError::WriteFailed { path, source })?;
        applied += 1;
    }

    Ok(applied)
}
