//! Identity alias reconciliation
//!
//! Converges Vault's identity groups and entities with the external
//! directory, one canonical identity and one alias per member and backend.

use crate::config::IdentityConfig;
use crate::error::IdentityError;
use crate::identity::directory::{DirectoryMember, DirectorySource, MemberKind};
use crate::identity::graph::{
    IdentityKind, IdentityUpdate, create_alias, create_or_update, delete_alias, delete_identity,
    list_aliases_for_accessor, lookup_by_alias, lookup_by_name,
};
use crate::tree::TreeReader;
use crate::vault::{IdentityRecord, VaultApi, auth_backend_accessor};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, instrument, warn};

/// Group type of directory-backed groups
pub const EXTERNAL_GROUP_TYPE: &str = "external";

static MURPHY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*\[MURPHY\]\s+").expect("MURPHY_TAG is a valid pattern"));

/// Strip a leading `[MURPHY]` tag from a group description
pub fn sanitize_description(description: &str) -> String {
    MURPHY_TAG.replace(description, "").into_owned()
}

/// Policies assigned to users and groups in the build tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalAssignments {
    pub users: BTreeMap<String, Vec<String>>,
    pub groups: BTreeMap<String, Vec<String>>,
}

impl LocalAssignments {
    /// Load `<build>/auth/<backend>/{users,groups}/*.json`
    pub fn load(reader: &TreeReader, build_dir: &Path, backend: &str) -> Result<Self, IdentityError> {
        let backend_dir = build_dir.join("auth").join(backend);
        Ok(Self {
            users: load_policies(reader, &backend_dir.join("users"))?,
            groups: load_policies(reader, &backend_dir.join("groups"))?,
        })
    }
}

fn load_policies(reader: &TreeReader, dir: &Path) -> Result<BTreeMap<String, Vec<String>>, IdentityError> {
    let mut assignments = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(assignments);
    }

    for entry in reader.list(dir)? {
        if entry.is_dir || !entry.name().ends_with(".json") {
            continue;
        }
        let policies = reader
            .parse(&entry.path)?
            .get("policies")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        assignments.insert(entry.stem(), policies);
    }
    Ok(assignments)
}

/// Counters of one identity pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityReport {
    pub members: usize,
    pub created: usize,
    pub adopted: usize,
    pub aliases_created: usize,
    pub aliases_deleted: usize,
}

impl IdentityReport {
    fn merge(&mut self, other: IdentityReport) {
        self.members += other.members;
        self.created += other.created;
        self.adopted += other.adopted;
        self.aliases_created += other.aliases_created;
        self.aliases_deleted += other.aliases_deleted;
    }
}

/// Reports of a complete identity sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySync {
    pub groups: IdentityReport,
    pub entities: IdentityReport,
    pub extra_aliases: IdentityReport,
}

/// One member as it should exist in the identity store
#[derive(Debug, Clone)]
struct DesiredIdentity {
    kind: IdentityKind,
    name: String,
    alias_name: String,
    policies: Vec<String>,
    metadata: BTreeMap<String, String>,
    group_type: Option<String>,
}

impl DesiredIdentity {
    fn update(&self, id: Option<String>) -> IdentityUpdate {
        IdentityUpdate {
            name: self.name.clone(),
            id,
            policies: Some(self.policies.clone()),
            metadata: self.metadata.clone(),
            group_type: self.group_type.clone(),
        }
    }
}

/// What a member pass is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncMode {
    /// Create missing identities and push policies and metadata
    Full,
    /// Identities must exist; only aliases are converged
    AliasOnly,
}

/// Converges the identity store with directory membership
pub struct IdentityReconciler<'a> {
    api: &'a dyn VaultApi,
    config: &'a IdentityConfig,
    local: LocalAssignments,
}

impl<'a> IdentityReconciler<'a> {
    pub fn new(api: &'a dyn VaultApi, config: &'a IdentityConfig, local: LocalAssignments) -> Self {
        Self { api, config, local }
    }

    async fn accessor(&self, backend: &str) -> Result<String, IdentityError> {
        auth_backend_accessor(self.api, backend)
            .await?
            .ok_or_else(|| IdentityError::BackendNotInitialized {
                backend: backend.to_string(),
            })
    }

    /// Canonical name of a login: service accounts lose their prefix
    fn canonical_name<'n>(&self, member: &'n DirectoryMember) -> &'n str {
        match member.kind {
            MemberKind::Service => member
                .name
                .strip_prefix(&self.config.service_prefix)
                .unwrap_or(&member.name),
            _ => &member.name,
        }
    }

    fn desired_group(&self, group: &DirectoryMember) -> DesiredIdentity {
        let name = group.name.to_lowercase();
        let description = sanitize_description(group.description.as_deref().unwrap_or_default());

        DesiredIdentity {
            kind: IdentityKind::Group,
            alias_name: name.clone(),
            policies: self.local.groups.get(&name).cloned().unwrap_or_default(),
            metadata: BTreeMap::from([
                ("description".to_string(), description),
                ("ldap_type".to_string(), self.config.metadata_type.clone()),
            ]),
            group_type: Some(EXTERNAL_GROUP_TYPE.to_string()),
            name,
        }
    }

    fn desired_entity(&self, member: &DirectoryMember) -> DesiredIdentity {
        let mut policies: BTreeSet<String> = self
            .local
            .users
            .get(&member.name.to_lowercase())
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        if member.kind == MemberKind::Service {
            policies.insert(self.config.service_policy.clone());
        }

        DesiredIdentity {
            kind: IdentityKind::Entity,
            name: self.canonical_name(member).to_string(),
            alias_name: member.name.clone(),
            policies: policies.into_iter().collect(),
            metadata: BTreeMap::from([(
                "ldap_type".to_string(),
                self.config.metadata_type.clone(),
            )]),
            group_type: None,
        }
    }

    /// Fetch the directory and every backend accessor, then converge
    ///
    /// Nothing is written to Vault until the directory has answered for
    /// groups, users and services and every backend accessor is known.
    #[instrument(skip(self, directory), fields(backend = %self.config.backend))]
    pub async fn sync(&self, directory: &dyn DirectorySource) -> Result<IdentitySync, IdentityError> {
        let groups = directory.groups().await?;
        let mut members = directory.users().await?;
        members.extend(directory.services().await?);

        let accessor = self.accessor(&self.config.backend).await?;
        let mut extra = Vec::with_capacity(self.config.extra_backends.len());
        for backend in &self.config.extra_backends {
            extra.push(self.accessor(backend).await?);
        }

        let mut sync = IdentitySync {
            groups: self.converge_groups(&accessor, &groups).await?,
            entities: self.converge_entities(&accessor, &members).await?,
            ..Default::default()
        };
        for accessor in &extra {
            sync.extra_aliases
                .merge(self.converge_aliases(accessor, &members).await?);
        }
        Ok(sync)
    }

    /// Converge identity groups with directory groups on the main backend
    #[instrument(skip(self, groups), fields(backend = %self.config.backend))]
    pub async fn reconcile_groups(&self, groups: &[DirectoryMember]) -> Result<IdentityReport, IdentityError> {
        let accessor = self.accessor(&self.config.backend).await?;
        self.converge_groups(&accessor, groups).await
    }

    /// Converge identity entities with directory users and service accounts
    #[instrument(skip(self, members), fields(backend = %self.config.backend))]
    pub async fn reconcile_entities(
        &self,
        members: &[DirectoryMember],
    ) -> Result<IdentityReport, IdentityError> {
        let accessor = self.accessor(&self.config.backend).await?;
        self.converge_entities(&accessor, members).await
    }

    /// Attach entity aliases on additional backends
    ///
    /// Entities must already exist; their policies are left untouched.
    pub async fn attach_aliases_from_backends(
        &self,
        backends: &[String],
        members: &[DirectoryMember],
    ) -> Result<IdentityReport, IdentityError> {
        let mut report = IdentityReport::default();
        for backend in backends {
            report.merge(self.attach_aliases_from_backend(backend, members).await?);
        }
        Ok(report)
    }

    #[instrument(skip(self, members))]
    pub async fn attach_aliases_from_backend(
        &self,
        backend: &str,
        members: &[DirectoryMember],
    ) -> Result<IdentityReport, IdentityError> {
        let accessor = self.accessor(backend).await?;
        self.converge_aliases(&accessor, members).await
    }

    async fn converge_groups(
        &self,
        accessor: &str,
        groups: &[DirectoryMember],
    ) -> Result<IdentityReport, IdentityError> {
        let desired: Vec<_> = groups.iter().map(|g| self.desired_group(g)).collect();
        self.converge(IdentityKind::Group, accessor, &desired, SyncMode::Full)
            .await
    }

    async fn converge_entities(
        &self,
        accessor: &str,
        members: &[DirectoryMember],
    ) -> Result<IdentityReport, IdentityError> {
        let desired: Vec<_> = members.iter().map(|m| self.desired_entity(m)).collect();
        self.converge(IdentityKind::Entity, accessor, &desired, SyncMode::Full)
            .await
    }

    async fn converge_aliases(
        &self,
        accessor: &str,
        members: &[DirectoryMember],
    ) -> Result<IdentityReport, IdentityError> {
        let desired: Vec<_> = members
            .iter()
            .map(|member| {
                let name = self.canonical_name(member).to_string();
                DesiredIdentity {
                    kind: IdentityKind::Entity,
                    alias_name: name.clone(),
                    name,
                    policies: Vec::new(),
                    metadata: BTreeMap::new(),
                    group_type: None,
                }
            })
            .collect();
        self.converge(IdentityKind::Entity, accessor, &desired, SyncMode::AliasOnly)
            .await
    }

    /// Converge every member on one accessor, then drop the aliases nobody claimed
    async fn converge(
        &self,
        kind: IdentityKind,
        accessor: &str,
        desired: &[DesiredIdentity],
        mode: SyncMode,
    ) -> Result<IdentityReport, IdentityError> {
        let mut report = IdentityReport::default();
        let mut unclaimed = list_aliases_for_accessor(self.api, kind, accessor).await?;

        for member in desired {
            let alias_id = self.converge_member(member, accessor, mode, &mut report).await?;
            unclaimed.remove(&alias_id);
            report.members += 1;
        }

        for alias_id in unclaimed {
            info!(kind = %kind, alias = %alias_id, "Deleting stale alias");
            delete_alias(self.api, kind, &alias_id).await?;
            report.aliases_deleted += 1;
        }

        info!(
            kind = %kind,
            members = report.members,
            created = report.created,
            adopted = report.adopted,
            aliases_deleted = report.aliases_deleted,
            "Identities converged"
        );
        Ok(report)
    }

    /// Converge one member, returning the id of its alias on `accessor`
    async fn converge_member(
        &self,
        member: &DesiredIdentity,
        accessor: &str,
        mode: SyncMode,
        report: &mut IdentityReport,
    ) -> Result<String, IdentityError> {
        let kind = member.kind;

        let mut record = match lookup_by_name(self.api, kind, &member.name).await? {
            Some(record) => record,
            None if mode == SyncMode::AliasOnly => {
                return Err(IdentityError::invariant(format!(
                    "{} {} is missing",
                    kind, member.name
                )));
            }
            None => {
                info!(kind = %kind, name = %member.name, "Identity missing, creating it");
                let mut create = IdentityUpdate::named(&member.name);
                create.group_type = member.group_type.clone();
                let id = create_or_update(self.api, kind, &create).await?;
                report.created += 1;
                IdentityRecord {
                    id,
                    name: member.name.clone(),
                    ..Default::default()
                }
            }
        };
        debug!(kind = %kind, name = %member.name, id = %record.id, "Canonical identity");

        // An alias already bound elsewhere wins: it is what logins resolve to.
        if let Some(owner) = lookup_by_alias(self.api, kind, &member.alias_name, accessor).await?
            && owner.id != record.id
        {
            warn!(
                kind = %kind,
                name = %member.name,
                discarded = %record.id,
                adopted = %owner.id,
                "Alias bound to another identity, adopting it"
            );
            delete_identity(self.api, kind, &record.id).await?;
            record = owner;
            report.adopted += 1;
        }

        if mode == SyncMode::Full {
            create_or_update(self.api, kind, &member.update(Some(record.id.clone()))).await?;
        }

        match record.alias_for(accessor) {
            Some(alias) => Ok(alias.id.clone()),
            None => {
                debug!(kind = %kind, alias = %member.alias_name, "Creating alias");
                let alias_id =
                    create_alias(self.api, kind, &member.alias_name, &record.id, accessor).await?;
                report.aliases_created += 1;
                Ok(alias_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_description() {
        assert_eq!(sanitize_description("[MURPHY] Ops team"), "Ops team");
        assert_eq!(sanitize_description("  [murphy]   Ops team"), "Ops team");
        assert_eq!(sanitize_description("Ops [MURPHY] team"), "Ops [MURPHY] team");
        assert_eq!(sanitize_description("[MURPHY]Ops"), "[MURPHY]Ops");
    }

    fn reconciler_parts() -> (IdentityConfig, LocalAssignments) {
        let local = LocalAssignments {
            users: BTreeMap::from([
                ("alice".to_string(), vec!["team_ro".to_string()]),
                ("svc-backup".to_string(), vec!["backup_rw".to_string()]),
            ]),
            groups: BTreeMap::from([("ops".to_string(), vec!["ops_admin".to_string()])]),
        };
        (IdentityConfig::default(), local)
    }

    struct NoVault;

    #[async_trait::async_trait]
    impl VaultApi for NoVault {
        async fn read(&self, _: &str) -> crate::error::VaultResult<Option<Value>> {
            Ok(None)
        }
        async fn write(&self, _: &str, _: &Value) -> crate::error::VaultResult<Option<Value>> {
            Ok(None)
        }
        async fn list(&self, _: &str) -> crate::error::VaultResult<Option<crate::vault::ListResponse>> {
            Ok(None)
        }
        async fn delete(&self, _: &str) -> crate::error::VaultResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_service_entity_keeps_login_as_alias() {
        let (config, local) = reconciler_parts();
        let reconciler = IdentityReconciler::new(&NoVault, &config, local);

        let desired = reconciler.desired_entity(&DirectoryMember::service("svc-backup"));
        assert_eq!(desired.name, "backup");
        assert_eq!(desired.alias_name, "svc-backup");
        assert_eq!(desired.policies, vec!["backup_rw", "service-self-ro"]);
        assert_eq!(desired.metadata.get("ldap_type").map(String::as_str), Some("UAD"));
    }

    #[test]
    fn test_entity_policies_are_found_for_mixed_case_login() {
        let (config, local) = reconciler_parts();
        let reconciler = IdentityReconciler::new(&NoVault, &config, local);

        let desired = reconciler.desired_entity(&DirectoryMember::human("Alice"));
        assert_eq!(desired.policies, vec!["team_ro"]);
    }

    #[test]
    fn test_group_is_external_and_lowercased() {
        let (config, local) = reconciler_parts();
        let reconciler = IdentityReconciler::new(&NoVault, &config, local);

        let desired = reconciler.desired_group(&DirectoryMember::group("OPS", "[MURPHY] Operations"));
        assert_eq!(desired.name, "ops");
        assert_eq!(desired.policies, vec!["ops_admin"]);
        assert_eq!(desired.group_type.as_deref(), Some("external"));
        assert_eq!(
            desired.metadata.get("description").map(String::as_str),
            Some("Operations")
        );
    }

    #[tokio::test]
    async fn test_missing_backend_is_fatal() {
        let (config, local) = reconciler_parts();
        let reconciler = IdentityReconciler::new(&NoVault, &config, local);

        let err = reconciler.reconcile_groups(&[]).await.unwrap_err();
        assert!(matches!(err, IdentityError::BackendNotInitialized { ref backend } if backend == "ldap"));
    }

    #[test]
    fn test_load_local_assignments() {
        let dir = tempdir().unwrap();
        let users = dir.path().join("auth/ldap/users");
        std::fs::create_dir_all(&users).unwrap();
        std::fs::write(users.join("alice.json"), r#"{"policies": ["a", "b"]}"#).unwrap();
        std::fs::write(users.join("notes.txt"), "ignored").unwrap();

        let local = LocalAssignments::load(&TreeReader::default(), dir.path(), "ldap").unwrap();
        assert_eq!(local.users.get("alice"), Some(&vec!["a".to_string(), "b".to_string()]));
        assert_eq!(local.users.len(), 1);
        assert!(local.groups.is_empty());
    }
}
