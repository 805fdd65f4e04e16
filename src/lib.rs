//! Vault Deployer
//!
//! Declarative configuration for HashiCorp Vault: a directory tree on disk
//! describes the desired state, and a run converges the server with it.
//!
//! ## Pipeline
//!
//! ```text
//! static tree ─┐
//!              ├─ build dir ─ mounts ─ generic reconciliation ─ identity sync
//! team ACLs ───┘
//! ```
//!
//! - **Build**: the static tree is copied into the build directory, and team
//!   ACL declarations are compiled into policies and per-user/per-group
//!   policy assignments.
//! - **Deploy**: bootstrap policies, auth and secret mounts, every build
//!   directory against its remote listing, then identity groups, entities and
//!   aliases from the external directory.
//!
//! ## Team ACL example
//!
//! ```yaml
//! # configurations/teams/payments/secrets/acl.yaml
//! ro:
//!   groups: [payments-readers]
//! rw:
//!   users: [alice]
//! auditor:
//!   users: [bob]
//!   rights:
//!     capabilities: [read, list, sudo]
//! ```

pub mod acl;
pub mod auth;
pub mod build;
pub mod config;
pub mod deploy;
pub mod error;
pub mod identity;
pub mod reconcile;
pub mod tree;
pub mod util;
pub mod vault;

// Re-export main types
pub use config::{AppConfig, load_config};
pub use deploy::Deployer;
pub use error::{AppError, Result};
pub use vault::{VaultApi, VaultClient};
