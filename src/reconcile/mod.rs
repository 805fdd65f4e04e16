//! Convergence of the remote configuration with the build tree

pub mod engine;
pub mod mounts;
pub mod plan;

pub use engine::Reconciler;
pub use mounts::{
    MountDeclaration, MountReport, apply_bootstrap_policies, enable_auth_backends,
    enable_mounts, enable_secret_backends,
};
pub use plan::{DirectoryPlan, LocalResource, PlanMode};

/// Counters of one reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub directories: usize,
    pub writes: usize,
    pub unchanged: usize,
    pub deletes: usize,
    pub retained: usize,
    pub delete_failures: usize,
    /// Writes and deletes suppressed by `.noupdate`
    pub skipped: usize,
}
