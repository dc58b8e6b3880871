//! Artifact naming and sources.
//!
//! Prebuilt artifacts follow the `<name>.v<semver>.<triplet>.tar.gz`
//! filename convention, the only contract for discovering the target
//! platform from a bare filename.

use regex::Regex;
use semver::Version;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::platform::Platform;

/// Where an artifact comes from: a remote URL or a file already on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    Url(String),
    File(PathBuf),
}

impl ArtifactSource {
    /// Anything with a scheme separator is treated as a URL.
    pub fn parse(raw: &str) -> Self {
        if raw.contains("://") {
            Self::Url(raw.to_string())
        } else {
            Self::File(PathBuf::from(raw))
        }
    }

    /// Final path segment, used for platform discovery and manifest
    /// naming.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Url(url) => url
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty()),
            Self::File(path) => path.file_name().and_then(|name| name.to_str()),
        }
    }
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A parsed artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub name: String,
    pub version: Version,
    /// Raw triplet segment as it appeared in the filename.
    pub triplet: String,
    pub platform: Platform,
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<name>.+)\.v(?P<version>[0-9]+\.[0-9]+\.[0-9]+(?:[-+][0-9A-Za-z.-]+)?)\.(?P<triplet>[A-Za-z0-9_.-]+)\.tar\.gz$",
        )
        .expect("static artifact name pattern compiles")
    })
}

impl ArtifactName {
    /// Parse a filename following the artifact convention. The platform
    /// field degrades to [`Platform::Unknown`] when the triplet segment
    /// is unrecognized; a filename outside the convention is `None`.
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = name_regex().captures(file_name)?;
        let version = Version::parse(&caps["version"]).ok()?;
        let triplet = caps["triplet"].to_string();
        let platform = Platform::parse(&triplet);
        Some(Self {
            name: caps["name"].to_string(),
            version,
            triplet,
            platform,
        })
    }

    /// Canonical filename for this artifact.
    pub fn file_name(&self) -> String {
        format!(
            "{}.v{}.{}.tar.gz",
            self.name,
            self.version,
            self.platform.triplet()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, CompilerAbi, CxxAbi, GccVersion, Libc};

    #[test]
    fn parses_conventional_filename() {
        let parsed =
            ArtifactName::parse("libfoo.v1.2.3.x86_64-linux-gnu.tar.gz").unwrap();
        assert_eq!(parsed.name, "libfoo");
        assert_eq!(parsed.version, Version::new(1, 2, 3));
        assert_eq!(
            parsed.platform,
            Platform::linux(Arch::X86_64, Libc::Glibc, None, CompilerAbi::ANY).unwrap()
        );
    }

    #[test]
    fn parses_compiler_abi_tagged_filename() {
        let parsed =
            ArtifactName::parse("tool.v0.1.0.aarch64-linux-musl-gcc7-cxx11.tar.gz").unwrap();
        assert_eq!(
            parsed.platform,
            Platform::linux(
                Arch::Aarch64,
                Libc::Musl,
                None,
                CompilerAbi::new(GccVersion::Gcc7, CxxAbi::Cxx11)
            )
            .unwrap()
        );
    }

    #[test]
    fn dotted_package_names_survive() {
        let parsed =
            ArtifactName::parse("lib.foo.bar.v2.0.0.x86_64-apple-darwin14.tar.gz").unwrap();
        assert_eq!(parsed.name, "lib.foo.bar");
    }

    #[test]
    fn round_trips_through_file_name() {
        let original = "libfoo.v1.2.3.armv7l-linux-gnueabihf-gcc7.tar.gz";
        let parsed = ArtifactName::parse(original).unwrap();
        assert_eq!(parsed.file_name(), original);
    }

    #[test]
    fn unconventional_names_are_rejected() {
        assert!(ArtifactName::parse("libfoo-1.2.3.tar.gz").is_none());
        assert!(ArtifactName::parse("libfoo.v1.2.x86_64-linux-gnu.tar.gz").is_none());
        assert!(ArtifactName::parse("libfoo.v1.2.3.x86_64-linux-gnu.zip").is_none());
    }

    #[test]
    fn unknown_triplet_degrades_to_unknown_platform() {
        let parsed = ArtifactName::parse("libfoo.v1.2.3.wasm32-emscripten.tar.gz").unwrap();
        assert_eq!(parsed.platform, Platform::Unknown);
    }

    #[test]
    fn source_classification() {
        assert!(matches!(
            ArtifactSource::parse("https://example.com/a/libfoo.v1.0.0.x86_64-linux-gnu.tar.gz"),
            ArtifactSource::Url(_)
        ));
        assert!(matches!(
            ArtifactSource::parse("downloads/libfoo.v1.0.0.x86_64-linux-gnu.tar.gz"),
            ArtifactSource::File(_)
        ));
        let url = ArtifactSource::parse("https://example.com/pkg/libfoo.v1.0.0.x86_64-linux-gnu.tar.gz");
        assert_eq!(
            url.file_name(),
            Some("libfoo.v1.0.0.x86_64-linux-gnu.tar.gz")
        );
    }
}
