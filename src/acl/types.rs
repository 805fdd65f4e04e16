//! ACL tree types

use crate::acl::rights::{CapabilitySet, default_rights};
use crate::error::{AclError, AclResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// One role of an ACL declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    /// Explicit rights, overriding the default rights of `name`
    pub rights: Option<CapabilitySet>,
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

impl RoleSpec {
    /// Capabilities granted by this role on `path`
    ///
    /// Explicit rights win; otherwise the role must be a default role.
    pub fn resolve_rights(&self, path: &str) -> AclResult<CapabilitySet> {
        if let Some(rights) = &self.rights {
            return Ok(rights.clone());
        }
        default_rights(&self.name).ok_or_else(|| AclError::NoRightsSource {
            path: path.to_string(),
            role: self.name.clone(),
        })
    }

    /// Grantees of this role as `(kind, name)` pairs, kind being `users` or `groups`
    pub fn grantees(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.users
            .iter()
            .map(|u| ("users", u.as_str()))
            .chain(self.groups.iter().map(|g| ("groups", g.as_str())))
    }
}

/// A directory-scoped ACL declaration and the ACL nodes found below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclNode {
    pub path: String,
    pub roles: BTreeMap<String, RoleSpec>,
    pub subpaths: Vec<AclNode>,
}

/// Parse the content of an ACL file declared for resource `path`
pub fn parse_roles(file: &Path, path: &str, content: &Value) -> AclResult<BTreeMap<String, RoleSpec>> {
    let object = content
        .as_object()
        .ok_or_else(|| AclError::InvalidDeclaration {
            path: file.to_path_buf(),
            reason: "top level is not a mapping of roles".to_string(),
        })?;

    object
        .iter()
        .map(|(name, declaration)| {
            parse_role(file, path, name, declaration).map(|role| (name.clone(), role))
        })
        .collect()
}

fn parse_role(file: &Path, path: &str, name: &str, declaration: &Value) -> AclResult<RoleSpec> {
    let invalid = |reason: String| AclError::InvalidDeclaration {
        path: file.to_path_buf(),
        reason,
    };

    let object = declaration
        .as_object()
        .ok_or_else(|| invalid(format!("role '{}' is not a mapping", name)))?;

    let mut role = RoleSpec {
        name: name.to_string(),
        rights: None,
        users: Vec::new(),
        groups: Vec::new(),
    };

    for (key, value) in object {
        match key.as_str() {
            "users" | "groups" => {
                let names = value
                    .as_array()
                    .and_then(|items| {
                        items
                            .iter()
                            .map(|item| item.as_str().map(str::to_string))
                            .collect::<Option<Vec<_>>>()
                    })
                    .ok_or_else(|| invalid(format!("{}.{} must be a list of names", name, key)))?;
                if key == "users" {
                    role.users = names;
                } else {
                    role.groups = names;
                }
            }
            "rights" => role.rights = Some(parse_rights(path, name, value)?),
            other => {
                return Err(invalid(format!(
                    "unsupported key '{}' in role '{}'",
                    other, name
                )));
            }
        }
    }

    Ok(role)
}

/// Explicit rights must be exactly `{"capabilities": [<token>, ...]}`
fn parse_rights(path: &str, role: &str, value: &Value) -> AclResult<CapabilitySet> {
    let malformed = |reason: &str| AclError::MalformedRights {
        path: path.to_string(),
        role: role.to_string(),
        reason: reason.to_string(),
    };

    let object = value
        .as_object()
        .ok_or_else(|| malformed("rights is not a mapping"))?;
    if object.len() != 1 {
        return Err(malformed("only the 'capabilities' key is supported"));
    }
    let tokens = object
        .get("capabilities")
        .ok_or_else(|| malformed("missing 'capabilities'"))?
        .as_array()
        .ok_or_else(|| malformed("capabilities is not a list"))?
        .iter()
        .map(|token| token.as_str().ok_or_else(|| malformed("capability is not a string")))
        .collect::<AclResult<Vec<_>>>()?;

    CapabilitySet::parse(path, &tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file() -> &'static Path {
        Path::new("teams/team/secrets/acl.json")
    }

    #[test]
    fn test_parse_default_role() {
        let roles = parse_roles(file(), "team/secrets", &json!({"ro": {"users": ["alice"]}})).unwrap();
        let ro = &roles["ro"];
        assert_eq!(ro.users, vec!["alice"]);
        assert!(ro.groups.is_empty());
        assert_eq!(ro.resolve_rights("team/secrets").unwrap().to_strings(), vec!["read", "list"]);
    }

    #[test]
    fn test_explicit_rights_override_default() {
        let roles = parse_roles(
            file(),
            "team/secrets",
            &json!({"rw": {"groups": ["ops"], "rights": {"capabilities": ["read"]}}}),
        )
        .unwrap();
        assert_eq!(
            roles["rw"].resolve_rights("team/secrets").unwrap().to_strings(),
            vec!["read"]
        );
    }

    #[test]
    fn test_rights_with_extra_key_fails() {
        let err = parse_roles(
            file(),
            "team/secrets",
            &json!({"ro": {"rights": {"capabilities": ["read"], "allowed_parameters": {}}}}),
        )
        .unwrap_err();
        assert!(matches!(err, AclError::MalformedRights { .. }));
    }

    #[test]
    fn test_rights_not_a_list_fails() {
        let err = parse_roles(
            file(),
            "team/secrets",
            &json!({"ro": {"rights": {"capabilities": "read"}}}),
        )
        .unwrap_err();
        assert!(matches!(err, AclError::MalformedRights { .. }));

        let err = parse_roles(file(), "team/secrets", &json!({"ro": {"rights": ["read"]}})).unwrap_err();
        assert!(matches!(err, AclError::MalformedRights { .. }));
    }

    #[test]
    fn test_custom_role_without_rights_fails_on_resolve() {
        let roles = parse_roles(file(), "team/secrets", &json!({"auditor": {"users": ["bob"]}})).unwrap();
        assert!(matches!(
            roles["auditor"].resolve_rights("team/secrets"),
            Err(AclError::NoRightsSource { .. })
        ));
    }

    #[test]
    fn test_unknown_role_key_fails() {
        let err = parse_roles(file(), "team/secrets", &json!({"ro": {"user": ["alice"]}})).unwrap_err();
        assert!(matches!(err, AclError::InvalidDeclaration { .. }));
    }

    #[test]
    fn test_grantees_lists_users_then_groups() {
        let roles = parse_roles(
            file(),
            "team/secrets",
            &json!({"ro": {"users": ["alice"], "groups": ["ops"]}}),
        )
        .unwrap();
        let grantees: Vec<_> = roles["ro"].grantees().collect();
        assert_eq!(grantees, vec![("users", "alice"), ("groups", "ops")]);
    }
}
