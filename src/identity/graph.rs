//! Identity store primitives
//!
//! Thin wrappers over the `identity/*` endpoints. Every response that should
//! carry an id and does not is an invariant violation.

use crate::error::IdentityError;
use crate::vault::{IdentityRecord, VaultApi, decode_data};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

/// The two kinds of canonical identities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Entity,
    Group,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Entity => "entity",
            IdentityKind::Group => "group",
        }
    }

    fn alias_kind(&self) -> String {
        format!("{}-alias", self.as_str())
    }
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of a canonical identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityUpdate {
    pub name: String,
    /// Set to update an existing identity
    pub id: Option<String>,
    pub policies: Option<Vec<String>>,
    pub metadata: BTreeMap<String, String>,
    /// Groups only: `internal` or `external`
    pub group_type: Option<String>,
}

impl IdentityUpdate {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".to_string(), json!(self.name));
        body.insert("metadata".to_string(), json!(self.metadata));
        if let Some(policies) = &self.policies {
            body.insert("policies".to_string(), json!(policies));
        }
        if let Some(id) = &self.id {
            body.insert("id".to_string(), json!(id));
        }
        if let Some(group_type) = &self.group_type {
            body.insert("type".to_string(), json!(group_type));
        }
        Value::Object(body)
    }
}

async fn lookup(
    api: &dyn VaultApi,
    kind: IdentityKind,
    request: Value,
) -> Result<Option<IdentityRecord>, IdentityError> {
    let path = format!("identity/lookup/{}", kind);
    let Some(body) = api.write(&path, &request).await? else {
        return Ok(None);
    };

    let record: IdentityRecord = decode_data(&path, body.clone())?;
    if record.id.is_empty() {
        return Err(IdentityError::invariant(format!(
            "{} lookup returned no id: {}",
            kind, body
        )));
    }
    Ok(Some(record))
}

/// Canonical identity by name
#[instrument(skip(api))]
pub async fn lookup_by_name(
    api: &dyn VaultApi,
    kind: IdentityKind,
    name: &str,
) -> Result<Option<IdentityRecord>, IdentityError> {
    lookup(api, kind, json!({ "name": name })).await
}

/// Canonical identity owning the alias `(alias_name, mount_accessor)`
#[instrument(skip(api))]
pub async fn lookup_by_alias(
    api: &dyn VaultApi,
    kind: IdentityKind,
    alias_name: &str,
    mount_accessor: &str,
) -> Result<Option<IdentityRecord>, IdentityError> {
    lookup(
        api,
        kind,
        json!({ "alias_name": alias_name, "alias_mount_accessor": mount_accessor }),
    )
    .await
}

/// Create an identity, or merge into it when `update.id` is set
///
/// Returns the identity id. Vault answers updates without content, in which
/// case the requested id is returned.
#[instrument(skip(api, update), fields(name = %update.name))]
pub async fn create_or_update(
    api: &dyn VaultApi,
    kind: IdentityKind,
    update: &IdentityUpdate,
) -> Result<String, IdentityError> {
    let path = format!("identity/{}", kind);
    let response = api.write(&path, &update.to_body()).await?;

    let returned = response
        .as_ref()
        .and_then(|body| body.pointer("/data/id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    match (returned, &update.id) {
        (Some(id), _) => Ok(id),
        (None, Some(id)) if response.is_none() => Ok(id.clone()),
        _ => Err(IdentityError::invariant(format!(
            "writing {} '{}' returned no id: {:?}",
            kind, update.name, response
        ))),
    }
}

/// Bind `name` on `mount_accessor` to the canonical identity
#[instrument(skip(api))]
pub async fn create_alias(
    api: &dyn VaultApi,
    kind: IdentityKind,
    name: &str,
    canonical_id: &str,
    mount_accessor: &str,
) -> Result<String, IdentityError> {
    let path = format!("identity/{}", kind.alias_kind());
    let body = json!({
        "name": name,
        "canonical_id": canonical_id,
        "mount_accessor": mount_accessor,
    });

    api.write(&path, &body)
        .await?
        .as_ref()
        .and_then(|response| response.pointer("/data/id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            IdentityError::invariant(format!("creating {} alias '{}' returned no id", kind, name))
        })
}

#[instrument(skip(api))]
pub async fn delete_identity(api: &dyn VaultApi, kind: IdentityKind, id: &str) -> Result<(), IdentityError> {
    api.delete(&format!("identity/{}/id/{}", kind, id)).await?;
    Ok(())
}

#[instrument(skip(api))]
pub async fn delete_alias(api: &dyn VaultApi, kind: IdentityKind, id: &str) -> Result<(), IdentityError> {
    api.delete(&format!("identity/{}/id/{}", kind.alias_kind(), id))
        .await?;
    Ok(())
}

/// Ids of every alias bound to `mount_accessor`
#[instrument(skip(api))]
pub async fn list_aliases_for_accessor(
    api: &dyn VaultApi,
    kind: IdentityKind,
    mount_accessor: &str,
) -> Result<BTreeSet<String>, IdentityError> {
    let path = format!("identity/{}/id", kind.alias_kind());
    let Some(listing) = api.list(&path).await? else {
        return Ok(BTreeSet::new());
    };

    let ids: BTreeSet<String> = listing
        .keys
        .iter()
        .filter(|id| {
            listing
                .key_info
                .get(id.as_str())
                .and_then(|info| info.get("mount_accessor"))
                .and_then(Value::as_str)
                == Some(mount_accessor)
        })
        .cloned()
        .collect();
    debug!(kind = %kind, count = ids.len(), "Existing aliases for accessor");
    Ok(ids)
}
