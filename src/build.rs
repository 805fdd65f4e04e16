//! Static configuration build
//!
//! Copies the static configuration tree into a fresh build directory with
//! every path lower-cased. Marker files are copied too.

use crate::error::TreeError;
use crate::tree::relative_key;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extension of files rendered from templates
const TEMPLATE_EXTENSION: &str = "template";

/// Summary of a static build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub files: usize,
    pub skipped_templates: usize,
}

/// Empty `output_dir`, creating it when needed
pub fn clean_build_dir(output_dir: &Path) -> Result<(), TreeError> {
    if output_dir.exists() {
        if !output_dir.is_dir() {
            return Err(TreeError::NotADirectory {
                path: output_dir.to_path_buf(),
            });
        }
        info!(dir = %output_dir.display(), "Cleaning the build directory");
        fs::remove_dir_all(output_dir).map_err(|e| TreeError::io(output_dir, e))?;
    }
    fs::create_dir_all(output_dir).map_err(|e| TreeError::io(output_dir, e))
}

/// Rebuild `output_dir` from `input_dir`
///
/// Template files are not rendered; they are skipped with a warning.
pub fn build_static_config(input_dir: &Path, output_dir: &Path) -> Result<BuildReport, TreeError> {
    if !input_dir.is_dir() {
        return Err(TreeError::NotFound {
            path: input_dir.to_path_buf(),
        });
    }
    clean_build_dir(output_dir)?;

    let mut report = BuildReport::default();
    for entry in WalkDir::new(input_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(input_dir).to_path_buf();
            TreeError::io(path, e.into())
        })?;
        let Some(relative) = relative_key(input_dir, entry.path()) else {
            continue;
        };
        let target = output_dir.join(relative.to_lowercase());

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| TreeError::io(&target, e))?;
            continue;
        }

        if entry.path().extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION) {
            warn!(file = %entry.path().display(), "Template rendering is not supported, skipping");
            report.skipped_templates += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| TreeError::io(parent, e))?;
        }
        debug!(file = %target.display(), "Copying");
        fs::copy(entry.path(), &target).map_err(|e| TreeError::io(entry.path(), e))?;
        report.files += 1;
    }

    info!(
        files = report.files,
        skipped_templates = report.skipped_templates,
        "Static configuration built"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_build_lowercases_and_copies_markers() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let src = input.path();
        fs::create_dir_all(src.join("Auth/LDAP/Groups")).unwrap();
        fs::write(src.join("Auth/LDAP/Groups/Ops.json"), r#"{"policies": []}"#).unwrap();
        fs::write(src.join("Auth/LDAP/Groups/.nocleanup"), "").unwrap();
        fs::write(src.join("Auth/LDAP/config.json.template"), "{{ url }}").unwrap();

        let report = build_static_config(src, output.path()).unwrap();

        let out = output.path();
        assert!(out.join("auth/ldap/groups/ops.json").is_file());
        assert!(out.join("auth/ldap/groups/.nocleanup").is_file());
        assert!(!out.join("auth/ldap/config.json").exists());
        assert_eq!(report.files, 2);
        assert_eq!(report.skipped_templates, 1);
    }

    #[test]
    fn test_build_copies_binary_files_verbatim() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let bytes = [0x00, 0xff, 0xfe, 0x80, 0x0a];
        fs::create_dir_all(input.path().join("Certs")).unwrap();
        fs::write(input.path().join("Certs/CA.der"), bytes).unwrap();

        let report = build_static_config(input.path(), output.path()).unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(fs::read(output.path().join("certs/ca.der")).unwrap(), bytes);
    }

    #[test]
    fn test_build_cleans_previous_output() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        fs::write(output.path().join("stale.json"), "{}").unwrap();

        build_static_config(input.path(), output.path()).unwrap();

        assert!(!output.path().join("stale.json").exists());
        assert!(output.path().is_dir());
    }

    #[test]
    fn test_build_output_must_be_a_directory() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        let file = output.path().join("build");
        fs::write(&file, "").unwrap();

        assert!(matches!(
            build_static_config(input.path(), &file),
            Err(TreeError::NotADirectory { .. })
        ));
    }
}
