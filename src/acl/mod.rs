//! Team access control
//!
//! Compiles the declarative team tree into Vault policy documents and
//! per-identity policy assignments written into the build tree.

pub mod compiler;
pub mod output;
pub mod policy;
pub mod rights;
pub mod types;

pub use compiler::{AclCompiler, is_acl_file};
pub use output::{TeamStorage, add_policy_to_entity_file};
pub use policy::{GeneratedPolicy, TEAM_POLICY_PREFIX, generate_policies, policy_name};
pub use rights::{Capability, CapabilitySet, PolicyDocument, default_rights, expand};
pub use types::{AclNode, RoleSpec};
