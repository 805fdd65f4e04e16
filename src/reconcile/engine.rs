//! Reconciliation engine
//!
//! Walks the build tree directory by directory, diffing each against the
//! remote listing at the same path and applying the resulting plan.

use crate::error::{ReconcileError, VaultError};
use crate::reconcile::ReconcileReport;
use crate::reconcile::plan::{
    DirectoryPlan, LocalResource, PlanMode, desired_payload, matches_remote, resource_path,
    stale_paths,
};
use crate::tree::{NO_CLEANUP_MARKER, NO_UPDATE_MARKER, TreeReader, ensure_dir, relative_key};
use crate::vault::{AUTH_MOUNTS_PATH, ListResponse, SECRET_MOUNTS_PATH, VaultApi};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

/// Top-level directory processed before every other one
const SYS_DIR: &str = "sys";

/// Applies a build tree to Vault
pub struct Reconciler<'a> {
    api: &'a dyn VaultApi,
    reader: &'a TreeReader,
    cleanup: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(api: &'a dyn VaultApi, reader: &'a TreeReader, cleanup: bool) -> Self {
        Self {
            api,
            reader,
            cleanup,
        }
    }

    /// Reconcile every directory of `build_dir`
    ///
    /// Children of `sys/` go first, then the other top-level directories.
    /// Each directory is handled before its subdirectories, siblings in
    /// name order.
    #[instrument(skip(self), fields(cleanup = self.cleanup))]
    pub async fn apply(&self, build_dir: &Path) -> Result<ReconcileReport, ReconcileError> {
        ensure_dir(build_dir)?;

        let mut roots = Vec::new();
        let sys_dir = build_dir.join(SYS_DIR);
        if sys_dir.is_dir() {
            roots.extend(self.subdirectories(&sys_dir)?);
        }
        for entry in self.reader.list(build_dir)? {
            if !entry.is_dir {
                debug!(file = %entry.path.display(), "Ignoring file at the build root");
            } else if entry.name() != SYS_DIR {
                roots.push(entry.path);
            }
        }

        let mut report = ReconcileReport::default();
        let mut worklist: Vec<PathBuf> = roots.into_iter().rev().collect();

        while let Some(dir) = worklist.pop() {
            let resource = relative_key(build_dir, &dir).unwrap_or_default();
            debug!(path = %resource, "Entering");

            if is_mount_table(&resource) {
                debug!(path = %resource, "Mount table, handled by the mount enabler");
            } else {
                let plan = self.plan_directory(&dir, &resource).await?;
                self.execute(plan, &mut report).await?;
            }

            worklist.extend(self.subdirectories(&dir)?.into_iter().rev());
        }

        info!(
            writes = report.writes,
            unchanged = report.unchanged,
            deletes = report.deletes,
            retained = report.retained,
            "Configuration applied"
        );
        Ok(report)
    }

    fn subdirectories(&self, dir: &Path) -> Result<Vec<PathBuf>, ReconcileError> {
        Ok(self
            .reader
            .list(dir)?
            .into_iter()
            .filter(|entry| entry.is_dir)
            .map(|entry| entry.path)
            .collect())
    }

    /// Diff one directory against its remote listing
    pub async fn plan_directory(
        &self,
        dir: &Path,
        resource: &str,
    ) -> Result<DirectoryPlan, ReconcileError> {
        let no_update = self.reader.has_marker(dir, NO_UPDATE_MARKER);
        let no_cleanup = self.reader.has_marker(dir, NO_CLEANUP_MARKER);
        let mode = PlanMode::from_markers(self.cleanup, no_update, no_cleanup);
        let cleanup_requested = self.cleanup && !no_cleanup;

        let mut locals = Vec::new();
        for entry in self.reader.list(dir)? {
            if entry.is_dir {
                continue;
            }
            locals.push(LocalResource {
                path: resource_path(resource, &entry.stem()),
                content: self.reader.parse(&entry.path)?,
                file: entry.path,
            });
        }

        let remote = self.list_remote(resource, cleanup_requested).await?;
        if let Some(remote) = &remote {
            for key in remote.leaf_keys() {
                debug!(path = %resource, key, "Existing remote config");
            }
        }

        let mut plan = DirectoryPlan::new(resource, mode);
        let local_paths: BTreeSet<String> = locals.iter().map(|l| l.path.clone()).collect();
        plan.set_stale(stale_paths(resource, remote.as_ref(), &local_paths));

        for local in locals {
            let current = match self.api.read(&local.path).await {
                Ok(current) => current,
                Err(e) => {
                    warn!(path = %local.path, error = %e, "Cannot read remote state, assuming it differs");
                    None
                }
            };

            if matches_remote(&local, current.as_ref()) {
                plan.unchanged.push(local.path);
            } else {
                plan.writes.push(local);
            }
        }

        Ok(plan)
    }

    async fn list_remote(
        &self,
        resource: &str,
        cleanup_requested: bool,
    ) -> Result<Option<ListResponse>, ReconcileError> {
        match self.api.list(resource).await {
            Ok(listing) => Ok(listing),
            Err(VaultError::UnsupportedOperation { .. }) if cleanup_requested => {
                error!(path = %resource, "Listing not supported and cleanup requested");
                Err(ReconcileError::ListingUnsupported {
                    path: resource.to_string(),
                })
            }
            Err(VaultError::UnsupportedOperation { .. }) => {
                warn!(
                    path = %resource,
                    "Listing not supported, no information can be given on already present configurations"
                );
                Ok(None)
            }
            Err(source) => Err(ReconcileError::ListFailed {
                path: resource.to_string(),
                source,
            }),
        }
    }

    /// Apply a plan, recording the outcome in `report`
    pub async fn execute(
        &self,
        plan: DirectoryPlan,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        report.directories += 1;
        report.unchanged += plan.unchanged.len();

        if !plan.mode.allows_writes() {
            info!(
                path = %plan.resource,
                pending_writes = plan.writes.len(),
                stale = plan.retained.len(),
                "Directory marked {}, skipping", NO_UPDATE_MARKER
            );
            report.skipped += plan.writes.len() + plan.retained.len();
            return Ok(());
        }

        for local in &plan.writes {
            info!(path = %local.path, "Updating");
            let payload = desired_payload(local)?;
            self.api
                .write(&local.path, &payload)
                .await
                .map_err(|source| ReconcileError::WriteFailed {
                    path: local.path.clone(),
                    source,
                })?;
            report.writes += 1;
        }

        for path in &plan.deletes {
            info!(path = %path, "Deleting");
            match self.api.delete(path).await {
                Ok(()) => report.deletes += 1,
                Err(e) => {
                    error!(path = %path, error = %e, "Failed to delete");
                    report.delete_failures += 1;
                }
            }
        }

        for path in &plan.retained {
            info!(path = %path, "Not deleted");
        }
        report.retained += plan.retained.len();

        Ok(())
    }
}

fn is_mount_table(resource: &str) -> bool {
    resource == AUTH_MOUNTS_PATH || resource == SECRET_MOUNTS_PATH
}
