//! The install / verify / uninstall lifecycle.
//!
//! Installs are gated on platform compatibility, verified against a
//! SHA-256 sidecar cache, unpacked by an external engine under collector
//! supervision, and recorded in a manifest that makes the whole
//! installation reversible. One artifact at a time, into one prefix;
//! serializing concurrent writers is the caller's job.

pub mod artifact;
pub mod cmdlog;
pub mod manifest;
pub mod prefix;
pub mod verify;

pub use artifact::{ArtifactName, ArtifactSource};
pub use cmdlog::{CommandLogEntry, CommandLogger};
pub use prefix::Prefix;
pub use verify::{CacheStatus, sha256_file, verify};

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;
use std::{fs, io};
use thiserror::Error;
use walkdir::WalkDir;

use crate::collector::{CollectOptions, OutputCollector, ProcessError, TeeSink};
use crate::engines::{EngineError, Engines};
use crate::platform::{Platform, PlatformError};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("integrity mismatch for {path}: expected {expected}, got {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("refusing to overwrite untracked file {path} (use force to replace it)")]
    Conflict { path: PathBuf },

    #[error("manifest error for {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Replace conflicting files and reinstall over an existing manifest.
    pub force: bool,
    /// Skip the platform compatibility gate entirely.
    pub ignore_platform: bool,
}

/// Carries the external-tool strategy and output plumbing through the
/// lifecycle operations.
pub struct Installer {
    engines: Engines,
    tee: Option<TeeSink>,
    verbose_lines: bool,
    logger: Option<CommandLogger>,
    copy_symlinks: bool,
}

impl Installer {
    pub fn new(engines: Engines) -> Self {
        Self {
            engines,
            tee: None,
            verbose_lines: false,
            logger: None,
            copy_symlinks: false,
        }
    }

    /// Mirror supervised subprocess output to `sink`; with `per_line`
    /// unset only failure tails are emitted.
    pub fn with_tee(mut self, sink: TeeSink, per_line: bool) -> Self {
        self.tee = Some(sink);
        self.verbose_lines = per_line;
        self
    }

    pub fn with_logger(mut self, logger: CommandLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Replace extracted symlinks with copies of their targets, for
    /// filesystems that cannot host symlinks.
    pub fn with_copy_symlinks(mut self, enabled: bool) -> Self {
        self.copy_symlinks = enabled;
        self
    }

    /// Install `source` into `prefix`.
    ///
    /// The artifact filename must encode a platform compatible with the
    /// host unless `ignore_platform` is set; the content must verify
    /// against `expected_hash`; listed files conflicting with untracked
    /// on-disk files abort the install unless `force` is set. The
    /// manifest is written only after extraction fully succeeds.
    pub fn install(
        &self,
        source: &ArtifactSource,
        expected_hash: &str,
        prefix: &Prefix,
        options: &InstallOptions,
    ) -> Result<(), InstallError> {
        let file_name = source
            .file_name()
            .ok_or_else(|| PlatformError::Unparsable(source.to_string()))?
            .to_string();

        if !options.ignore_platform {
            self.check_platform(&file_name)?;
        }

        let archive = match source {
            ArtifactSource::File(path) => {
                verify(path, expected_hash)?;
                path.clone()
            }
            ArtifactSource::Url(url) => {
                let dest = prefix.downloads().join(&file_name);
                self.fetch_verified(url, &dest, expected_hash, options.force)?;
                dest
            }
        };

        let manifest_file = manifest::manifest_path(prefix, &file_name);
        if manifest_file.exists() && options.force {
            self.uninstall(&manifest_file, prefix)?;
        }

        let files = self.list_archive(&archive)?;
        for relative in &files {
            let dest = manifest::resolve_within(prefix, relative)?;
            if dest.symlink_metadata().is_ok() {
                if !options.force {
                    return Err(InstallError::Conflict { path: dest });
                }
                fs::remove_file(&dest)?;
            }
        }

        self.supervised(self.engines.unpack.unpack_invocation(&archive, prefix.root()))?;
        if self.copy_symlinks {
            replace_symlinks(prefix.root())?;
        }

        manifest::write_manifest(&manifest_file, &files)?;
        Ok(())
    }

    /// Remove everything a manifest lists, prune directories the removal
    /// emptied, then delete the manifest itself. Files already gone are
    /// tolerated so a half-done uninstall can be re-run.
    pub fn uninstall(&self, manifest_path: &Path, prefix: &Prefix) -> Result<(), InstallError> {
        let files = manifest::read_manifest(manifest_path)?;
        for relative in &files {
            let path = manifest::resolve_within(prefix, relative)?;
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
            prune_empty_parents(&path, prefix);
        }
        fs::remove_file(manifest_path)?;
        Ok(())
    }

    /// Whether `source` is fully installed in `prefix`: the artifact
    /// verifies, the manifest is no older than the artifact, and every
    /// listed file still exists and is no older than the artifact.
    pub fn is_installed(
        &self,
        source: &ArtifactSource,
        expected_hash: &str,
        prefix: &Prefix,
    ) -> bool {
        let Some(file_name) = source.file_name() else {
            return false;
        };
        let archive = match source {
            ArtifactSource::File(path) => path.clone(),
            ArtifactSource::Url(_) => prefix.downloads().join(file_name),
        };
        if verify(&archive, expected_hash).is_err() {
            return false;
        }
        let Ok(archive_mtime) = modified(&archive) else {
            return false;
        };
        let manifest_file = manifest::manifest_path(prefix, file_name);
        let Ok(manifest_mtime) = modified(&manifest_file) else {
            return false;
        };
        if manifest_mtime < archive_mtime {
            return false;
        }
        let Ok(files) = manifest::read_manifest(&manifest_file) else {
            return false;
        };
        files.iter().all(|relative| {
            manifest::resolve_within(prefix, relative)
                .ok()
                .and_then(|path| modified(&path).ok())
                .is_some_and(|mtime| mtime >= archive_mtime)
        })
    }

    /// Member files of an archive, without extracting it.
    pub fn list_archive(&self, archive: &Path) -> Result<Vec<String>, InstallError> {
        let collector = self.supervised(self.engines.unpack.list_invocation(archive))?;
        Ok(self.engines.unpack.parse_listing(&collector.stdout_only()))
    }

    fn check_platform(&self, file_name: &str) -> Result<(), InstallError> {
        let artifact = ArtifactName::parse(file_name)
            .ok_or_else(|| PlatformError::Unparsable(file_name.to_string()))?;
        if artifact.platform == Platform::Unknown {
            return Err(PlatformError::Unparsable(artifact.triplet).into());
        }
        let host = Platform::current();
        if !artifact.platform.matches(&host) {
            return Err(PlatformError::Mismatch {
                artifact: artifact.platform.triplet(),
                host: host.triplet(),
            }
            .into());
        }
        Ok(())
    }

    /// Download `url` to `dest` and verify it. A pre-existing file that
    /// verifies is reused as-is. On a verification failure with `force`
    /// set, the file is deleted and downloaded exactly once more; the
    /// second verdict is final. Without `force` an existing file that
    /// fails verification is never overwritten.
    fn fetch_verified(
        &self,
        url: &str,
        dest: &Path,
        expected_hash: &str,
        force: bool,
    ) -> Result<(), InstallError> {
        if !dest.exists() {
            self.download(url, dest)?;
        }
        match verify(dest, expected_hash) {
            Ok(_) => return Ok(()),
            Err(InstallError::Integrity { .. }) if force => {
                let _ = fs::remove_file(dest);
                let _ = fs::remove_file(verify::sidecar_path(dest));
            }
            Err(error) => return Err(error),
        }
        self.download(url, dest)?;
        verify(dest, expected_hash)?;
        Ok(())
    }

    /// Fetch into a staging file next to the destination, then move it
    /// into place, so an interrupted transfer never looks like a
    /// completed download.
    fn download(&self, url: &str, dest: &Path) -> Result<(), InstallError> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let staging = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempfile_in(dir)?;
        self.supervised(self.engines.download.invocation(url, staging.path()))?;
        staging.persist(dest).map_err(|error| error.error)?;
        Ok(())
    }

    fn supervised(&self, command: Command) -> Result<OutputCollector, InstallError> {
        let mut collect = CollectOptions::new();
        if let Some(sink) = &self.tee {
            collect = collect.tee(sink.clone());
            if !self.verbose_lines {
                collect = collect.quiet();
            }
        }
        let mut collector = OutputCollector::spawn(command, collect)?;
        let success = collector.wait();
        if let Some(logger) = &self.logger {
            if let Err(error) = logger.log(&collector) {
                eprintln!("Warning: failed to record command log: {error}");
            }
        }
        if !success {
            return Err(collector.failure_error().into());
        }
        Ok(collector)
    }
}

fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Walk up from a removed file, deleting directories the removal left
/// empty. Stops at the prefix skeleton.
fn prune_empty_parents(path: &Path, prefix: &Prefix) {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if prefix.is_structural(current) || !current.starts_with(prefix.root()) {
            break;
        }
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

/// Replace every symlink under `root` with a copy of its target, for
/// symlink-hostile filesystems. Dangling links are left alone.
fn replace_symlinks(root: &Path) -> Result<(), InstallError> {
    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.path_is_symlink() {
            continue;
        }
        let path = entry.path();
        let Ok(target) = fs::canonicalize(path) else {
            continue;
        };
        if target.is_file() {
            fs::remove_file(path)?;
            fs::copy(&target, path)?;
        }
    }
    Ok(())
}
