use anyhow::Result;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use prefab::engines::Engines;
use prefab::install::{Installer, Prefix, sha256_file};
use prefab::platform::Platform;

pub struct TestEnvironment {
    temp_dir: TempDir,
    pub prefix: Prefix,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let prefix = Prefix::create(temp_dir.path().join("prefix"))?;
        Ok(Self { temp_dir, prefix })
    }

    /// Scratch directory outside the prefix, for source artifacts.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Build a gzipped tar fixture holding the given (path, contents)
    /// entries, in order.
    pub fn build_artifact(&self, file_name: &str, entries: &[(&str, &str)]) -> Result<PathBuf> {
        let path = self.path().join(file_name);
        let file = fs::File::create(&path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (relative, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, relative, contents.as_bytes())?;
        }
        builder.into_inner()?.finish()?;
        Ok(path)
    }

    /// Everything currently under the prefix, relative and sorted.
    /// Directories count, so pruning shows up in comparisons.
    pub fn snapshot(&self) -> Vec<String> {
        let root = self.prefix.root();
        let mut paths: Vec<String> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.path() != root)
            .map(|entry| {
                entry
                    .path()
                    .strip_prefix(root)
                    .expect("walked path is under root")
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        paths.sort();
        paths
    }
}

/// Artifact filename carrying the host triplet, so the platform gate
/// passes wherever the suite runs.
pub fn host_artifact_name(name: &str) -> String {
    format!("{name}.v1.0.0.{}.tar.gz", Platform::current().triplet())
}

/// Installer wired to the real host tools.
pub fn installer() -> Installer {
    Installer::new(Engines::detect(None, None).expect("tar available on test host"))
}

pub fn sha256_hex(path: &Path) -> Result<String> {
    Ok(sha256_file(path)?)
}
