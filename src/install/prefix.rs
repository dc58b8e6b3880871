//! Installation root layout.
//!
//! A prefix is one isolated installation target with a fixed set of
//! subdirectories. Creation is idempotent; operating on an existing
//! prefix is the normal case.

use std::path::{Path, PathBuf};
use std::{fs, io};

const SUBDIRS: &[&str] = &["bin", "lib", "include", "logs", "downloads", "manifests"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    root: PathBuf,
}

impl Prefix {
    /// Open a prefix at `root`, creating the root and every fixed
    /// subdirectory that does not exist yet.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        for sub in SUBDIRS {
            fs::create_dir_all(root.join(sub))?;
        }
        Ok(Self { root })
    }

    /// Convenience default under the user data directory. Core operations
    /// never fall back to this on their own; callers opt in.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("prefab")
            .join("prefix")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bin(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn lib(&self) -> PathBuf {
        self.root.join("lib")
    }

    pub fn include(&self) -> PathBuf {
        self.root.join("include")
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn downloads(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn manifests(&self) -> PathBuf {
        self.root.join("manifests")
    }

    /// Whether `dir` is part of the fixed prefix skeleton rather than
    /// content owned by some artifact.
    pub fn is_structural(&self, dir: &Path) -> bool {
        if dir == self.root {
            return true;
        }
        SUBDIRS.iter().any(|sub| self.root.join(sub) == dir)
    }
}
