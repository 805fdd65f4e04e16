//! Rights model
//!
//! Capabilities, the default roles, and the versioned KV expansion that
//! turns a grant on a logical `<mount>/<path>` into the synthetic
//! `data`/`metadata`/`delete`/`destroy`/`undelete` paths of a KV v2 mount.

use crate::error::{AclError, AclResult};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Versioned KV sub-path holding secret versions
pub const KV_DATA: &str = "data";
/// Versioned KV sub-path holding key metadata
pub const KV_METADATA: &str = "metadata";
/// Versioned KV sub-path for soft deletes
pub const KV_DELETE: &str = "delete";
/// Versioned KV sub-path for permanent deletes
pub const KV_DESTROY: &str = "destroy";
/// Versioned KV sub-path for restoring soft-deleted versions
pub const KV_UNDELETE: &str = "undelete";

const KV_KEYWORDS: [&str; 5] = [KV_DATA, KV_METADATA, KV_DELETE, KV_DESTROY, KV_UNDELETE];

/// A single Vault ACL capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    List,
    Create,
    Update,
    Delete,
    Sudo,
    Deny,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::List => "list",
            Capability::Create => "create",
            Capability::Update => "update",
            Capability::Delete => "delete",
            Capability::Sudo => "sudo",
            Capability::Deny => "deny",
        }
    }

    pub fn try_parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Capability::Read),
            "list" => Some(Capability::List),
            "create" => Some(Capability::Create),
            "update" => Some(Capability::Update),
            "delete" => Some(Capability::Delete),
            "sudo" => Some(Capability::Sudo),
            "deny" => Some(Capability::Deny),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of capabilities; the empty set denies the path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse capability tokens declared for `path`
    ///
    /// Rejects unknown tokens and `deny` mixed with anything else.
    pub fn parse<S: AsRef<str>>(path: &str, tokens: &[S]) -> AclResult<Self> {
        let mut set = BTreeSet::new();
        for token in tokens {
            let token = token.as_ref();
            let capability =
                Capability::try_parse(token).ok_or_else(|| AclError::UnknownCapability {
                    path: path.to_string(),
                    token: token.to_string(),
                })?;
            set.insert(capability);
        }

        let parsed = Self(set);
        parsed.check_deny(path)?;
        Ok(parsed)
    }

    fn check_deny(&self, path: &str) -> AclResult<()> {
        if self.contains(Capability::Deny) && self.0.len() > 1 {
            return Err(AclError::DenyMixed {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0.insert(capability);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn union(&self, other: &CapabilitySet) -> CapabilitySet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn to_strings(&self) -> Vec<&'static str> {
        self.iter().map(|c| c.as_str()).collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Rights of the built-in roles, `None` for custom role names
pub fn default_rights(role: &str) -> Option<CapabilitySet> {
    use Capability::*;

    let ro = [Read, List];
    let rw = [Read, List, Update, Create, Delete];
    let admin = [Read, List, Update, Create, Delete, Sudo];

    match role {
        "ro" => Some(ro.into_iter().collect()),
        "rw" => Some(rw.into_iter().collect()),
        "admin" => Some(admin.into_iter().collect()),
        _ => None,
    }
}

/// Resource path → capabilities, serialized in Vault's JSON policy syntax
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyDocument {
    paths: BTreeMap<String, CapabilitySet>,
}

impl PolicyDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&CapabilitySet> {
        self.paths.get(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, capabilities: CapabilitySet) {
        self.paths.insert(path.into(), capabilities);
    }

    /// Add every entry of `other`, replacing entries for the same path
    pub fn extend(&mut self, other: PolicyDocument) {
        self.paths.extend(other.paths);
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, &CapabilitySet)> {
        self.paths.iter().map(|(p, c)| (p.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// `{"path": {"<p>": {"capabilities": [...]}}}`
    pub fn to_json(&self) -> Value {
        let paths: serde_json::Map<String, Value> = self
            .paths
            .iter()
            .map(|(path, caps)| (path.clone(), json!({ "capabilities": caps.to_strings() })))
            .collect();
        json!({ "path": paths })
    }
}

impl Serialize for PolicyDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("path", &self.to_json()["path"])?;
        map.end()
    }
}

/// Synthetic versioned KV path for `keyword`
fn kv_path(mount: &str, rest: &str, keyword: &str) -> String {
    if rest.is_empty() {
        format!("{mount}/{keyword}/*")
    } else {
        format!("{mount}/{keyword}/{rest}/*")
    }
}

/// Expand a grant on a logical KV path into its policy entries
///
/// The logical path keeps the declared capabilities. Derived paths:
/// - `data`: each of read, update, delete, create, list that is declared
/// - `metadata`: list if list; read if read+sudo; delete if delete+sudo
/// - `delete`, `destroy`: update if delete+sudo
/// - `undelete`: update if delete+sudo+read
///
/// `sudo` alone grants nothing on derived paths. A lone `deny` denies the
/// logical path and all derived paths.
pub fn expand(path: &str, capabilities: &CapabilitySet) -> AclResult<PolicyDocument> {
    use Capability::*;

    capabilities.check_deny(path)?;

    let path = path.trim_matches('/');
    let (mount, rest) = path.split_once('/').unwrap_or((path, ""));

    let mut derived: BTreeMap<&str, CapabilitySet> = KV_KEYWORDS
        .iter()
        .map(|kw| (*kw, CapabilitySet::empty()))
        .collect();
    let mut grant = |keyword: &'static str, capability: Capability| {
        if let Some(set) = derived.get_mut(keyword) {
            set.insert(capability);
        }
    };

    if capabilities.contains(Deny) {
        for keyword in KV_KEYWORDS {
            grant(keyword, Deny);
        }
    } else {
        let sudo = capabilities.contains(Sudo);
        let read = capabilities.contains(Read);
        let delete = capabilities.contains(Delete);

        if capabilities.contains(List) {
            grant(KV_METADATA, List);
        }
        if read && sudo {
            grant(KV_METADATA, Read);
        }
        if delete && sudo {
            grant(KV_METADATA, Delete);
            grant(KV_DELETE, Update);
            grant(KV_DESTROY, Update);
            if read {
                grant(KV_UNDELETE, Update);
            }
        }
        for capability in [Read, Update, Delete, Create, List] {
            if capabilities.contains(capability) {
                grant(KV_DATA, capability);
            }
        }
    }

    let mut document = PolicyDocument::new();
    document.insert(path, capabilities.clone());
    for (keyword, set) in derived {
        document.insert(kv_path(mount, rest, keyword), set);
    }
    Ok(document)
}
