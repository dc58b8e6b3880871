//! Triplet parsing and serialization.
//!
//! A triplet reads `<arch>-<os/vendor>[-<libc>][<call-abi>][-<gcc>][-<cxx>]`,
//! e.g. `armv7l-linux-gnueabihf-gcc7-cxx11`. Parsing is built from an
//! ordered list of per-attribute-family patterns assembled into a single
//! anchored regex compiled once; each family contributes exactly one
//! (possibly empty) capture.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use super::{Arch, CallAbi, CompilerAbi, CxxAbi, GccVersion, Libc, Platform, PlatformError};

/// Serialized form of [`Platform::Unknown`].
pub const UNKNOWN_TRIPLET: &str = "unknown-unknown-unknown";

/// Attribute families in serialization order. Each pattern carries its own
/// named capture group so the families stay individually testable.
const FAMILIES: &[(&str, &str)] = &[
    (
        "arch",
        r"(?P<arch>x86_64|amd64|i[3-6]86|aarch64|armv7l|arm|p(?:ower)?pc64le)",
    ),
    (
        "os",
        r"(?P<os>-apple-darwin[0-9.]*|-w64-mingw32|-(?:[a-z0-9_]+-)?freebsd[0-9.]*|-(?:[a-z0-9_]+-)?linux)",
    ),
    ("libc", r"(?P<libc>-gnu|-musl)?"),
    ("call_abi", r"(?P<call_abi>eabihf)?"),
    ("gcc", r"(?P<gcc>-gcc[0-9]+)?"),
    ("cxx", r"(?P<cxx>-cxx[0-9]+)?"),
];

fn triplet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let mut pattern = String::from("^");
        for (_, family_pattern) in FAMILIES {
            pattern.push_str(family_pattern);
        }
        pattern.push('$');
        Regex::new(&pattern).expect("static triplet pattern compiles")
    })
}

#[cfg(test)]
pub(crate) fn family_pattern(family: &str) -> Option<&'static str> {
    FAMILIES
        .iter()
        .find(|(name, _)| *name == family)
        .map(|(_, pattern)| *pattern)
}

fn parse_arch(token: &str) -> Result<Arch, PlatformError> {
    match token {
        "x86_64" | "amd64" => Ok(Arch::X86_64),
        "aarch64" => Ok(Arch::Aarch64),
        "armv7l" | "arm" => Ok(Arch::Armv7l),
        "powerpc64le" | "ppc64le" => Ok(Arch::Powerpc64le),
        t if t.starts_with('i') && t.ends_with("86") => Ok(Arch::I686),
        t => Err(PlatformError::Unparsable(t.to_string())),
    }
}

fn parse_gcc(token: Option<&str>) -> Result<GccVersion, PlatformError> {
    match token {
        None => Ok(GccVersion::Any),
        Some("-gcc4") => Ok(GccVersion::Gcc4),
        Some("-gcc5") => Ok(GccVersion::Gcc5),
        Some("-gcc6") => Ok(GccVersion::Gcc6),
        Some("-gcc7") => Ok(GccVersion::Gcc7),
        Some("-gcc8") => Ok(GccVersion::Gcc8),
        Some(t) => Err(PlatformError::Unparsable(t.to_string())),
    }
}

fn parse_cxx(token: Option<&str>) -> Result<CxxAbi, PlatformError> {
    match token {
        None => Ok(CxxAbi::Any),
        Some("-cxx03") => Ok(CxxAbi::Cxx03),
        Some("-cxx11") => Ok(CxxAbi::Cxx11),
        Some(t) => Err(PlatformError::Unparsable(t.to_string())),
    }
}

fn parse_concrete(triplet: &str) -> Result<Platform, PlatformError> {
    let caps = triplet_regex()
        .captures(triplet)
        .ok_or_else(|| PlatformError::Unparsable(triplet.to_string()))?;

    let arch = parse_arch(&caps["arch"])?;
    let os = &caps["os"];
    let libc_token = caps.name("libc").map(|m| m.as_str());
    let call_abi = caps.name("call_abi").map(|_| CallAbi::Eabihf);
    let compiler_abi = CompilerAbi::new(
        parse_gcc(caps.name("gcc").map(|m| m.as_str()))?,
        parse_cxx(caps.name("cxx").map(|m| m.as_str()))?,
    );

    let reject_libc = |os_name: &'static str| match libc_token {
        None => Ok(()),
        Some(_) => Err(PlatformError::UnsupportedLibc {
            os: os_name,
            libc: if libc_token == Some("-musl") {
                Libc::Musl
            } else {
                Libc::Glibc
            },
        }),
    };

    if os.starts_with("-apple-darwin") {
        reject_libc("macOS")?;
        if let Some(abi) = call_abi {
            return Err(PlatformError::InvalidCallAbi { abi, arch });
        }
        Platform::macos(arch, compiler_abi)
    } else if os == "-w64-mingw32" {
        reject_libc("Windows")?;
        if let Some(abi) = call_abi {
            return Err(PlatformError::InvalidCallAbi { abi, arch });
        }
        Platform::windows(arch, compiler_abi)
    } else if os.contains("freebsd") {
        reject_libc("FreeBSD")?;
        Platform::freebsd(arch, call_abi, compiler_abi)
    } else {
        let libc = match libc_token {
            Some("-musl") => Libc::Musl,
            _ => Libc::Glibc,
        };
        Platform::linux(arch, libc, call_abi, compiler_abi)
    }
}

fn gcc_suffix(gcc: GccVersion) -> &'static str {
    match gcc {
        GccVersion::Any => "",
        GccVersion::Gcc4 => "-gcc4",
        GccVersion::Gcc5 => "-gcc5",
        GccVersion::Gcc6 => "-gcc6",
        GccVersion::Gcc7 => "-gcc7",
        GccVersion::Gcc8 => "-gcc8",
    }
}

fn cxx_suffix(cxx: CxxAbi) -> &'static str {
    match cxx {
        CxxAbi::Any => "",
        CxxAbi::Cxx03 => "-cxx03",
        CxxAbi::Cxx11 => "-cxx11",
    }
}

fn call_abi_suffix(call_abi: Option<CallAbi>) -> &'static str {
    match call_abi {
        Some(CallAbi::Eabihf) => "eabihf",
        None => "",
    }
}

impl Platform {
    /// Parse a triplet. Anything unrecognized, including recognizable
    /// tokens in an incoherent combination, yields [`Platform::Unknown`];
    /// callers that need a concrete platform must check for it.
    pub fn parse(triplet: &str) -> Self {
        parse_concrete(triplet).unwrap_or(Self::Unknown)
    }

    /// Canonical triplet. Left inverse of [`Platform::parse`] for every
    /// constructible concrete platform; wildcard compiler-ABI fields are
    /// omitted rather than serialized.
    pub fn triplet(&self) -> String {
        match self {
            Self::Linux {
                arch,
                libc,
                call_abi,
                compiler_abi,
            } => {
                let libc_part = match libc {
                    Libc::Glibc => "gnu",
                    Libc::Musl => "musl",
                };
                format!(
                    "{}-linux-{}{}{}{}",
                    arch,
                    libc_part,
                    call_abi_suffix(*call_abi),
                    gcc_suffix(compiler_abi.gcc),
                    cxx_suffix(compiler_abi.cxx),
                )
            }
            Self::MacOs { arch, compiler_abi } => format!(
                "{}-apple-darwin14{}{}",
                arch,
                gcc_suffix(compiler_abi.gcc),
                cxx_suffix(compiler_abi.cxx),
            ),
            Self::Windows { arch, compiler_abi } => format!(
                "{}-w64-mingw32{}{}",
                arch,
                gcc_suffix(compiler_abi.gcc),
                cxx_suffix(compiler_abi.cxx),
            ),
            Self::FreeBsd {
                arch,
                call_abi,
                compiler_abi,
            } => format!(
                "{}-unknown-freebsd11.1{}{}{}",
                arch,
                call_abi_suffix(*call_abi),
                gcc_suffix(compiler_abi.gcc),
                cxx_suffix(compiler_abi.cxx),
            ),
            Self::Unknown => UNKNOWN_TRIPLET.to_string(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.triplet())
    }
}
