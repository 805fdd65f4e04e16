//! ACL compiler
//!
//! Walks a team directory tree and builds the [`AclNode`] forest. A
//! directory with an ACL file becomes a node whose `subpaths` are the nodes
//! found anywhere below it; a directory without one is transparent.

use crate::acl::types::{AclNode, parse_roles};
use crate::error::{AclError, AclResult};
use crate::tree::{TreeReader, relative_key};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name suffixes recognized as ACL declarations
pub const ACL_FILE_SUFFIXES: [&str; 4] = ["acl.json", "acl.hcl", "acl.yaml", "acl.yml"];

/// Whether a file name declares an ACL
pub fn is_acl_file(name: &str) -> bool {
    ACL_FILE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Compiles a team directory tree into ACL nodes
pub struct AclCompiler<'a> {
    reader: &'a TreeReader,
}

impl<'a> AclCompiler<'a> {
    pub fn new(reader: &'a TreeReader) -> Self {
        Self { reader }
    }

    /// Compile every ACL below `root`
    ///
    /// Resource paths are relative to `root`. An empty result is valid.
    pub fn compile(&self, root: &Path) -> AclResult<Vec<AclNode>> {
        self.compile_dir(root, root)
    }

    fn compile_dir(&self, root: &Path, dir: &Path) -> AclResult<Vec<AclNode>> {
        debug!(dir = %dir.display(), "Entering");

        let entries = self.reader.list(dir)?;

        let mut acl_files: Vec<PathBuf> = Vec::new();
        let mut subpaths = Vec::new();
        for entry in &entries {
            if entry.is_dir {
                subpaths.extend(self.compile_dir(root, &entry.path)?);
            } else if is_acl_file(&entry.name()) {
                acl_files.push(entry.path.clone());
            }
        }

        match acl_files.as_slice() {
            [] => Ok(subpaths),
            [file] => {
                let path = relative_key(root, dir).unwrap_or_default();
                if path.is_empty() {
                    return Err(AclError::RootAcl { path: file.clone() });
                }
                let content = self.reader.parse(file)?;
                let roles = parse_roles(file, &path, &content)?;
                debug!(path = %path, roles = roles.len(), subpaths = subpaths.len(), "Compiled ACL");
                Ok(vec![AclNode {
                    path,
                    roles,
                    subpaths,
                }])
            }
            _ => Err(AclError::AmbiguousAcl {
                dir: dir.to_path_buf(),
                files: acl_files,
            }),
        }
    }
}
