//! Build tree output of the ACL compiler
//!
//! Policies land in `<build>/sys/policy/<name>.json`; grantees get the
//! policy name added to `<build>/auth/<backend>/{users,groups}/<name>.json`.

use crate::acl::compiler::AclCompiler;
use crate::acl::policy::generate_policies;
use crate::acl::types::AclNode;
use crate::error::{AclResult, TreeError};
use crate::tree::{TreeReader, ensure_dir, write_file};
use crate::vault::POLICIES_PATH;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Writes compiled ACLs into a build directory
pub struct TeamStorage<'a> {
    reader: &'a TreeReader,
    prefix: String,
    backend: String,
}

impl<'a> TeamStorage<'a> {
    pub fn new(reader: &'a TreeReader, prefix: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            reader,
            prefix: prefix.into(),
            backend: backend.into(),
        }
    }

    /// Compile `teams_dir` and write the result into `output_dir`
    ///
    /// Returns the generated policy names.
    pub fn generate_team_storage(&self, teams_dir: &Path, output_dir: &Path) -> AclResult<Vec<String>> {
        ensure_dir(teams_dir)?;
        ensure_dir(output_dir)?;

        let nodes = AclCompiler::new(self.reader).compile(teams_dir)?;
        if nodes.is_empty() {
            warn!(path = %teams_dir.display(), "Empty list of ACL generated");
        }
        self.generate_files(&nodes, output_dir)
    }

    /// Write policies and grantee assignments for `nodes` and their subpaths
    pub fn generate_files(&self, nodes: &[AclNode], output_dir: &Path) -> AclResult<Vec<String>> {
        let mut names = Vec::new();
        let mut pending: Vec<&AclNode> = nodes.iter().rev().collect();

        while let Some(node) = pending.pop() {
            debug!(path = %node.path, "Creating files");
            for policy in generate_policies(node, &self.prefix)? {
                let policy_file = output_dir
                    .join(POLICIES_PATH)
                    .join(format!("{}.json", policy.name));
                let content = serde_json::to_string_pretty(&policy.document)
                    .map_err(|e| encoding_error(&policy_file, e))?;
                write_file(&policy_file, &content)?;
                info!(policy = %policy.name, "Generated team policy");

                if let Some(role) = node.roles.get(&policy.role) {
                    for (kind, grantee) in role.grantees() {
                        let file = self.entity_file(output_dir, kind, grantee);
                        add_policy_to_entity_file(self.reader, &file, &[policy.name.as_str()], None)?;
                    }
                }
                names.push(policy.name);
            }
            pending.extend(node.subpaths.iter().rev());
        }

        Ok(names)
    }

    /// Assignment file of a user or group; the build tree is lower-cased
    fn entity_file(&self, output_dir: &Path, kind: &str, name: &str) -> PathBuf {
        output_dir
            .join("auth")
            .join(&self.backend)
            .join(kind)
            .join(format!("{}.json", name.to_lowercase()))
    }
}

fn encoding_error(path: &Path, e: serde_json::Error) -> TreeError {
    TreeError::Parse {
        path: path.to_path_buf(),
        format: "json",
        reason: e.to_string(),
    }
}

/// Add policy names to a per-identity assignment file
///
/// The `policies` key is a set: adding a name twice keeps one entry. Other
/// keys of an existing file are preserved, and an existing file that is not
/// a JSON object is an error. With `prefix_cleanup`, existing policies
/// starting with that prefix are dropped first.
pub fn add_policy_to_entity_file(
    reader: &TreeReader,
    file: &Path,
    policies: &[&str],
    prefix_cleanup: Option<&str>,
) -> Result<(), TreeError> {
    let mut entity: Map<String, Value> = if file.exists() {
        match reader.parse(file)? {
            Value::Object(map) => map,
            _ => {
                return Err(TreeError::Parse {
                    path: file.to_path_buf(),
                    format: "json",
                    reason: "assignment file is not an object".to_string(),
                });
            }
        }
    } else {
        Map::new()
    };

    let mut merged: BTreeSet<String> = entity
        .get("policies")
        .and_then(Value::as_array)
        .map(|existing| {
            existing
                .iter()
                .filter_map(Value::as_str)
                .filter(|p| prefix_cleanup.is_none_or(|prefix| !p.starts_with(prefix)))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    merged.extend(policies.iter().map(|p| p.to_string()));

    entity.insert(
        "policies".to_string(),
        Value::Array(merged.into_iter().map(Value::String).collect()),
    );

    let content = serde_json::to_string_pretty(&Value::Object(entity))
        .map_err(|e| encoding_error(file, e))?;
    write_file(file, &content)?;
    debug!(file = %file.display(), ?policies, "Assigned policies");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn policies_in(file: &Path) -> Vec<String> {
        let value: Value = serde_json::from_str(&fs::read_to_string(file).unwrap()).unwrap();
        serde_json::from_value(value["policies"].clone()).unwrap()
    }

    #[test]
    fn test_add_policy_twice_is_a_set() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("auth/ldap/users/alice.json");
        let reader = TreeReader::default();

        add_policy_to_entity_file(&reader, &file, &["p1"], None).unwrap();
        add_policy_to_entity_file(&reader, &file, &["p1"], None).unwrap();

        assert_eq!(policies_in(&file), vec!["p1"]);
    }

    #[test]
    fn test_add_policy_preserves_other_keys() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("ops.json");
        fs::write(&file, r#"{"policies": ["static"], "ttl": "1h"}"#).unwrap();
        let reader = TreeReader::default();

        add_policy_to_entity_file(&reader, &file, &["generated"], None).unwrap();

        let value: Value = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(value["ttl"], "1h");
        assert_eq!(policies_in(&file), vec!["generated", "static"]);
    }

    #[test]
    fn test_prefix_cleanup_drops_stale_generated_policies() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("ops.json");
        fs::write(&file, r#"{"policies": ["__team_policy_old_ro", "static"]}"#).unwrap();
        let reader = TreeReader::default();

        add_policy_to_entity_file(&reader, &file, &["__team_policy_new_ro"], Some("__team_policy"))
            .unwrap();

        assert_eq!(policies_in(&file), vec!["__team_policy_new_ro", "static"]);
    }

    #[test]
    fn test_non_object_assignment_file_is_rejected() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("ops.json");
        fs::write(&file, r#"["static"]"#).unwrap();
        let reader = TreeReader::default();

        let err = add_policy_to_entity_file(&reader, &file, &["generated"], None).unwrap_err();

        assert!(matches!(err, TreeError::Parse { .. }));
        assert_eq!(fs::read_to_string(&file).unwrap(), r#"["static"]"#);
    }
}
