//! Config tree reader
//!
//! Deterministic, hidden-file-free view of a configuration directory.

use crate::error::TreeError;
use crate::tree::registry::ParserRegistry;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// A direct child of a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl Entry {
    /// File name as UTF-8 (lossy)
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without its last extension
    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }
}

/// File name without its last extension
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Slash-separated path of `path` relative to `root`
///
/// Returns `None` when `path` is not below `root`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    Some(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

/// Reads and lists a configuration tree
#[derive(Debug, Clone, Default)]
pub struct TreeReader {
    registry: ParserRegistry,
}

impl TreeReader {
    pub fn new(registry: ParserRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Children of `dir` sorted by name, hidden entries excluded
    pub fn list(&self, dir: &Path) -> Result<Vec<Entry>, TreeError> {
        let read_dir = fs::read_dir(dir).map_err(|e| TreeError::io(dir, e))?;

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| TreeError::io(dir, e))?;
            if item.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = item.file_type().map_err(|e| TreeError::io(item.path(), e))?;
            entries.push(Entry {
                path: item.path(),
                is_dir: file_type.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Parse a file into a mapping (raw text is wrapped as `{"value": ...}`)
    pub fn parse(&self, path: &Path) -> Result<Value, TreeError> {
        let content = fs::read_to_string(path).map_err(|e| TreeError::io(path, e))?;
        self.registry.parse_str(path, &content)
    }

    /// Whether a marker file exists in `dir`
    pub fn has_marker(&self, dir: &Path, marker: &str) -> bool {
        dir.join(marker).exists()
    }
}

/// Fail unless `path` exists and is a directory
pub fn ensure_dir(path: &Path) -> Result<(), TreeError> {
    if !path.exists() {
        return Err(TreeError::NotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(TreeError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Write a file, creating its parent directories
pub fn write_file(path: &Path, content: &str) -> Result<(), TreeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TreeError::io(parent, e))?;
    }
    fs::write(path, content).map_err(|e| TreeError::io(path, e))
}
