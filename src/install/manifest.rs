//! Manifest files: the record of what an artifact installed.
//!
//! One manifest per installed artifact, plain text, one prefix-relative
//! path per line. Written only after extraction fully succeeds, so a
//! manifest never names files that were never on disk.

use std::fs;
use std::path::{Component, Path, PathBuf};

use super::prefix::Prefix;
use super::InstallError;

/// Manifest location for an artifact filename:
/// `<prefix>/manifests/<stem>.list`.
pub fn manifest_path(prefix: &Prefix, artifact_file_name: &str) -> PathBuf {
    let stem = artifact_file_name
        .strip_suffix(".tar.gz")
        .unwrap_or(artifact_file_name);
    prefix.manifests().join(format!("{stem}.list"))
}

pub fn write_manifest(path: &Path, files: &[String]) -> Result<(), InstallError> {
    let mut contents = String::new();
    for file in files {
        contents.push_str(file);
        contents.push('\n');
    }
    fs::write(path, contents)?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<Vec<String>, InstallError> {
    if !path.exists() {
        return Err(InstallError::Manifest {
            path: path.to_path_buf(),
            reason: "manifest does not exist".to_string(),
        });
    }
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Resolve a manifest-relative path inside the prefix, rejecting anything
/// that would escape it.
pub fn resolve_within(prefix: &Prefix, relative: &str) -> Result<PathBuf, InstallError> {
    let path = Path::new(relative);
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir));
    if escapes {
        return Err(InstallError::Manifest {
            path: path.to_path_buf(),
            reason: "path escapes the prefix".to_string(),
        });
    }
    Ok(prefix.root().join(path))
}
