//! External download and unpack tooling.
//!
//! The install engine never speaks HTTP or decodes archives itself; it
//! shells out to whichever tools the host provides. Each role has a ranked
//! list of candidates, every candidate pairing a probe with invocation
//! builders. Detection walks the ranking once and the chosen engine is
//! immutable afterwards, so tests can substitute a fake built from the
//! same parts.

mod listing;

pub use listing::{parse_7z_listing, parse_tar_listing};

use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("no usable {role} engine found (tried: {tried})")]
    NotFound { role: &'static str, tried: String },

    #[error("unknown {role} engine `{name}`")]
    UnknownName { role: &'static str, name: String },
}

fn have(program: &str) -> bool {
    which::which(program).is_ok()
}

fn curl_present() -> bool {
    have("curl")
}

fn wget_present() -> bool {
    have("wget")
}

fn tar_present() -> bool {
    have("tar")
}

fn sevenzip_present() -> bool {
    have("7z")
}

fn curl_invocation(url: &str, dest: &Path) -> Command {
    let mut command = Command::new("curl");
    command.arg("-f").arg("-sS").arg("-L").arg("-o").arg(dest).arg(url);
    command
}

fn wget_invocation(url: &str, dest: &Path) -> Command {
    let mut command = Command::new("wget");
    command.arg("-q").arg("-O").arg(dest).arg(url);
    command
}

fn tar_list_invocation(archive: &Path) -> Command {
    let mut command = Command::new("tar");
    command.arg("-tzf").arg(archive);
    command
}

// -m stamps extracted files with the extraction time; freshness checks
// compare installed files against the artifact's own mtime.
fn tar_unpack_invocation(archive: &Path, dest: &Path) -> Command {
    let mut command = Command::new("tar");
    command.arg("-xzmf").arg(archive).arg("-C").arg(dest);
    command
}

// 7z cannot read a .tar.gz in one pass, so both operations pipe the
// decompressed tar back into a second 7z. Paths travel as positional
// shell parameters, not spliced into the script.
fn sevenzip_list_invocation(archive: &Path) -> Command {
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(r#"7z x -so "$0" | 7z l -si -ttar"#)
        .arg(archive);
    command
}

fn sevenzip_unpack_invocation(archive: &Path, dest: &Path) -> Command {
    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(r#"7z x -so "$0" | 7z x -si -ttar -y -o"$1""#)
        .arg(archive)
        .arg(dest);
    command
}

/// One way of fetching a URL into a local file.
#[derive(Clone, Copy)]
pub struct DownloadEngine {
    name: &'static str,
    probe: fn() -> bool,
    build: fn(&str, &Path) -> Command,
}

const DOWNLOAD_CANDIDATES: &[DownloadEngine] = &[
    DownloadEngine {
        name: "curl",
        probe: curl_present,
        build: curl_invocation,
    },
    DownloadEngine {
        name: "wget",
        probe: wget_present,
        build: wget_invocation,
    },
];

impl DownloadEngine {
    pub const fn new(name: &'static str, probe: fn() -> bool, build: fn(&str, &Path) -> Command) -> Self {
        Self { name, probe, build }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn available(&self) -> bool {
        (self.probe)()
    }

    pub fn invocation(&self, url: &str, dest: &Path) -> Command {
        (self.build)(url, dest)
    }

    /// Pick an engine: the named one when `preferred` is set, otherwise
    /// the first candidate whose probe succeeds.
    pub fn detect(preferred: Option<&str>) -> Result<Self, EngineError> {
        detect_engine(
            "download",
            DOWNLOAD_CANDIDATES,
            preferred,
            |engine| engine.name,
            |engine| engine.available(),
        )
    }
}

/// One way of listing and extracting an archive, with the parser for its
/// listing format.
#[derive(Clone, Copy)]
pub struct UnpackEngine {
    name: &'static str,
    probe: fn() -> bool,
    list: fn(&Path) -> Command,
    unpack: fn(&Path, &Path) -> Command,
    parse: fn(&str) -> Vec<String>,
}

const UNPACK_CANDIDATES: &[UnpackEngine] = &[
    UnpackEngine {
        name: "tar",
        probe: tar_present,
        list: tar_list_invocation,
        unpack: tar_unpack_invocation,
        parse: parse_tar_listing,
    },
    UnpackEngine {
        name: "7z",
        probe: sevenzip_present,
        list: sevenzip_list_invocation,
        unpack: sevenzip_unpack_invocation,
        parse: parse_7z_listing,
    },
];

impl UnpackEngine {
    pub const fn new(
        name: &'static str,
        probe: fn() -> bool,
        list: fn(&Path) -> Command,
        unpack: fn(&Path, &Path) -> Command,
        parse: fn(&str) -> Vec<String>,
    ) -> Self {
        Self {
            name,
            probe,
            list,
            unpack,
            parse,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn available(&self) -> bool {
        (self.probe)()
    }

    pub fn list_invocation(&self, archive: &Path) -> Command {
        (self.list)(archive)
    }

    pub fn unpack_invocation(&self, archive: &Path, dest: &Path) -> Command {
        (self.unpack)(archive, dest)
    }

    pub fn parse_listing(&self, output: &str) -> Vec<String> {
        (self.parse)(output)
    }

    pub fn detect(preferred: Option<&str>) -> Result<Self, EngineError> {
        detect_engine(
            "unpack",
            UNPACK_CANDIDATES,
            preferred,
            |engine| engine.name,
            |engine| engine.available(),
        )
    }
}

fn detect_engine<T: Copy>(
    role: &'static str,
    candidates: &[T],
    preferred: Option<&str>,
    name_of: impl Fn(&T) -> &'static str,
    usable: impl Fn(&T) -> bool,
) -> Result<T, EngineError> {
    if let Some(name) = preferred {
        let engine = candidates
            .iter()
            .find(|candidate| name_of(candidate) == name)
            .ok_or_else(|| EngineError::UnknownName {
                role,
                name: name.to_string(),
            })?;
        if !usable(engine) {
            return Err(EngineError::NotFound {
                role,
                tried: name.to_string(),
            });
        }
        return Ok(*engine);
    }
    candidates
        .iter()
        .find(|candidate| usable(candidate))
        .copied()
        .ok_or_else(|| EngineError::NotFound {
            role,
            tried: candidates
                .iter()
                .map(|candidate| name_of(candidate))
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// The full external-tool strategy handed to the install engine.
#[derive(Clone, Copy)]
pub struct Engines {
    pub download: DownloadEngine,
    pub unpack: UnpackEngine,
}

impl Engines {
    /// Probe the host once, honoring configured overrides.
    pub fn detect(
        preferred_download: Option<&str>,
        preferred_unpack: Option<&str>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            download: DownloadEngine::detect(preferred_download)?,
            unpack: UnpackEngine::detect(preferred_unpack)?,
        })
    }
}
