//! Identity graph synchronization
//!
//! Directory membership is the source of truth for which groups and
//! entities exist; the build tree decides which policies they carry.

pub mod directory;
pub mod graph;
pub mod reconciler;

pub use directory::{DirectoryMember, DirectorySource, HttpDirectory, MemberKind};
pub use graph::{IdentityKind, IdentityUpdate};
pub use reconciler::{
    IdentityReconciler, IdentityReport, IdentitySync, LocalAssignments, sanitize_description,
};
