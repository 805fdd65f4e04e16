//! Declarative configuration tree
//!
//! Listing and parsing of the on-disk trees (static configuration, team ACLs
//! and the build directory).

pub mod reader;
pub mod registry;

pub use reader::{Entry, TreeReader, ensure_dir, file_stem, relative_key, write_file};
pub use registry::{Format, ParserRegistry};

/// Marker suppressing every write (and therefore every delete) in a directory
pub const NO_UPDATE_MARKER: &str = ".noupdate";
/// Marker suppressing deletions in a directory
pub const NO_CLEANUP_MARKER: &str = ".nocleanup";
