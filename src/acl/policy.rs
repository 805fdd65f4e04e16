//! Policy generation from ACL nodes

use crate::acl::rights::{CapabilitySet, PolicyDocument, expand};
use crate::acl::types::AclNode;
use crate::error::AclResult;
use tracing::info;

/// Default prefix of generated policy names
pub const TEAM_POLICY_PREFIX: &str = "__team_policy";

/// A policy generated for one role of one ACL node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPolicy {
    pub name: String,
    pub role: String,
    pub document: PolicyDocument,
}

/// `<prefix>_<path>_<role>`, lower-cased, with every `/` replaced by `_`
///
/// Vault stores policy names lower-cased.
pub fn policy_name(prefix: &str, path: &str, role: &str) -> String {
    format!("{}_{}_{}", prefix, path, role)
        .to_lowercase()
        .replace('/', "_")
}

/// Generate one policy per role declared on `node`
///
/// Each policy grants the role's expanded rights on the node path and
/// denies every direct subpath that declares its own ACL.
pub fn generate_policies(node: &AclNode, prefix: &str) -> AclResult<Vec<GeneratedPolicy>> {
    let mut denied = PolicyDocument::new();
    for subpath in &node.subpaths {
        denied.extend(expand(&subpath.path, &CapabilitySet::empty())?);
    }

    node.roles
        .values()
        .map(|role| {
            let rights = role.resolve_rights(&node.path)?;
            if role.rights.is_some() {
                info!(role = %role.name, path = %node.path, "Found custom rights");
            }

            let mut document = expand(&node.path, &rights)?;
            document.extend(denied.clone());

            Ok(GeneratedPolicy {
                name: policy_name(prefix, &node.path, &role.name),
                role: role.name.clone(),
                document,
            })
        })
        .collect()
}
