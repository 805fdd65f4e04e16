//! Run pipeline
//!
//! [`Deployer`] carries the configuration and the tree reader through both
//! phases: building the tree locally, then converging Vault with it.

use crate::acl::TeamStorage;
use crate::build::{BuildReport, build_static_config};
use crate::config::AppConfig;
use crate::error::Result;
use crate::identity::{DirectorySource, IdentityReconciler, IdentityReport, LocalAssignments};
use crate::reconcile::{
    MountReport, ReconcileReport, Reconciler, apply_bootstrap_policies, enable_auth_backends,
    enable_secret_backends,
};
use crate::tree::TreeReader;
use crate::vault::VaultApi;
use std::path::Path;
use tracing::{info, instrument};

/// Outcome of the build phase
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub static_files: BuildReport,
    pub policies: Vec<String>,
}

/// Outcome of the deploy phase
#[derive(Debug, Clone, Default)]
pub struct DeploySummary {
    pub bootstrap_policies: usize,
    pub auth_mounts: MountReport,
    pub secret_mounts: MountReport,
    pub configuration: ReconcileReport,
    pub groups: IdentityReport,
    pub entities: IdentityReport,
    pub extra_aliases: IdentityReport,
}

pub struct Deployer {
    config: AppConfig,
    reader: TreeReader,
}

impl Deployer {
    pub fn new(config: AppConfig) -> Self {
        Self::with_reader(config, TreeReader::default())
    }

    pub fn with_reader(config: AppConfig, reader: TreeReader) -> Self {
        Self { config, reader }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn build_dir(&self) -> &Path {
        Path::new(&self.config.paths.build)
    }

    /// Copy the static tree and generate team policies into the build directory
    #[instrument(skip(self))]
    pub fn build(&self) -> Result<BuildSummary> {
        let paths = &self.config.paths;
        let static_files = build_static_config(Path::new(&paths.static_config), self.build_dir())?;

        let storage = TeamStorage::new(
            &self.reader,
            &self.config.acl.policy_prefix,
            &self.config.acl.backend,
        );
        let policies = storage.generate_team_storage(Path::new(&paths.teams), self.build_dir())?;
        info!(policies = policies.len(), "Team policies generated");

        Ok(BuildSummary {
            static_files,
            policies,
        })
    }

    /// Converge Vault with the build directory and the external directory
    ///
    /// The caller is expected to have checked that Vault is usable.
    #[instrument(skip(self, api, directory))]
    pub async fn deploy(
        &self,
        api: &dyn VaultApi,
        directory: &dyn DirectorySource,
        cleanup: bool,
    ) -> Result<DeploySummary> {
        let build_dir = self.build_dir();
        let mut summary = DeploySummary {
            bootstrap_policies: apply_bootstrap_policies(
                api,
                &self.reader,
                build_dir,
                &self.config.deploy.bootstrap_policies,
            )
            .await?,
            ..Default::default()
        };

        summary.auth_mounts = enable_auth_backends(api, &self.reader, build_dir).await?;
        summary.secret_mounts = enable_secret_backends(api, &self.reader, build_dir).await?;
        summary.configuration = Reconciler::new(api, &self.reader, cleanup)
            .apply(build_dir)
            .await?;

        let identity = &self.config.identity;
        let local = LocalAssignments::load(&self.reader, build_dir, &identity.backend)?;
        let reconciler = IdentityReconciler::new(api, identity, local);

        let identities = reconciler.sync(directory).await?;
        summary.groups = identities.groups;
        summary.entities = identities.entities;
        summary.extra_aliases = identities.extra_aliases;

        info!(
            writes = summary.configuration.writes,
            deletes = summary.configuration.deletes,
            groups = summary.groups.members,
            entities = summary.entities.members,
            "Deployment complete"
        );
        Ok(summary)
    }
}
