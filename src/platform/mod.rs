//! Platform descriptors for prebuilt binary artifacts.
//!
//! A [`Platform`] captures everything that decides whether a prebuilt binary
//! can run on a host: OS kind, architecture, libc, calling ABI and the
//! compiler ABI pair (libgcc generation, C++ string ABI). Values are built
//! through the validating constructors and are immutable afterwards.

mod triplet;

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("unrecognized platform triplet: {0}")]
    Unparsable(String),

    #[error("artifact platform {artifact} is not compatible with host {host}")]
    Mismatch { artifact: String, host: String },

    #[error("{os} artifacts are not built for the {arch} architecture")]
    UnsupportedArch { os: &'static str, arch: Arch },

    #[error("{os} artifacts cannot link against {libc}")]
    UnsupportedLibc { os: &'static str, libc: Libc },

    #[error("the {abi} calling ABI requires armv7l, got {arch}")]
    InvalidCallAbi { abi: CallAbi, arch: Arch },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    I686,
    Aarch64,
    Armv7l,
    Powerpc64le,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::I686 => "i686",
            Self::Aarch64 => "aarch64",
            Self::Armv7l => "armv7l",
            Self::Powerpc64le => "powerpc64le",
        }
    }

    /// Architecture of the running host.
    pub fn current() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self::X86_64
        }
        #[cfg(target_arch = "x86")]
        {
            Self::I686
        }
        #[cfg(target_arch = "aarch64")]
        {
            Self::Aarch64
        }
        #[cfg(target_arch = "arm")]
        {
            Self::Armv7l
        }
        #[cfg(target_arch = "powerpc64")]
        {
            Self::Powerpc64le
        }
        #[cfg(not(any(
            target_arch = "x86_64",
            target_arch = "x86",
            target_arch = "aarch64",
            target_arch = "arm",
            target_arch = "powerpc64"
        )))]
        {
            Self::X86_64
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Libc {
    #[default]
    Glibc,
    Musl,
}

impl Libc {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Glibc => "glibc",
            Self::Musl => "musl",
        }
    }
}

impl fmt::Display for Libc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallAbi {
    Eabihf,
}

impl fmt::Display for CallAbi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eabihf")
    }
}

/// GCC major version an artifact was built with.
///
/// `Any` is a matching wildcard; it never appears in a serialized triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GccVersion {
    #[default]
    Any,
    Gcc4,
    Gcc5,
    Gcc6,
    Gcc7,
    Gcc8,
}

impl GccVersion {
    /// libgcc runtime generation. GCC 4 through 6 ship a mutually
    /// compatible libgcc, 7 and 8 each broke compatibility.
    fn generation(self) -> u32 {
        match self {
            Self::Any => 0,
            Self::Gcc4 | Self::Gcc5 | Self::Gcc6 => 6,
            Self::Gcc7 => 7,
            Self::Gcc8 => 8,
        }
    }

    pub fn matches(self, other: Self) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            _ => self.generation() == other.generation(),
        }
    }
}

/// C++ string ABI (pre/post GCC 5 `std::string` layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CxxAbi {
    #[default]
    Any,
    Cxx03,
    Cxx11,
}

impl CxxAbi {
    pub fn matches(self, other: Self) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            _ => self == other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CompilerAbi {
    pub gcc: GccVersion,
    pub cxx: CxxAbi,
}

impl CompilerAbi {
    /// Wildcard on both fields: matches every concrete compiler ABI.
    pub const ANY: Self = Self {
        gcc: GccVersion::Any,
        cxx: CxxAbi::Any,
    };

    pub fn new(gcc: GccVersion, cxx: CxxAbi) -> Self {
        Self { gcc, cxx }
    }

    pub fn matches(&self, other: &Self) -> bool {
        self.gcc.matches(other.gcc) && self.cxx.matches(other.cxx)
    }
}

/// A platform a prebuilt artifact targets, or `Unknown` when a triplet
/// could not be recognized. `Unknown` matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux {
        arch: Arch,
        libc: Libc,
        call_abi: Option<CallAbi>,
        compiler_abi: CompilerAbi,
    },
    MacOs {
        arch: Arch,
        compiler_abi: CompilerAbi,
    },
    Windows {
        arch: Arch,
        compiler_abi: CompilerAbi,
    },
    FreeBsd {
        arch: Arch,
        call_abi: Option<CallAbi>,
        compiler_abi: CompilerAbi,
    },
    Unknown,
}

fn validate_call_abi(arch: Arch, call_abi: Option<CallAbi>) -> Result<(), PlatformError> {
    match call_abi {
        Some(abi) if arch != Arch::Armv7l => Err(PlatformError::InvalidCallAbi { abi, arch }),
        _ => Ok(()),
    }
}

impl Platform {
    pub fn linux(
        arch: Arch,
        libc: Libc,
        call_abi: Option<CallAbi>,
        compiler_abi: CompilerAbi,
    ) -> Result<Self, PlatformError> {
        validate_call_abi(arch, call_abi)?;
        Ok(Self::Linux {
            arch,
            libc,
            call_abi,
            compiler_abi,
        })
    }

    pub fn macos(arch: Arch, compiler_abi: CompilerAbi) -> Result<Self, PlatformError> {
        match arch {
            Arch::X86_64 | Arch::Aarch64 => Ok(Self::MacOs { arch, compiler_abi }),
            _ => Err(PlatformError::UnsupportedArch { os: "macOS", arch }),
        }
    }

    pub fn windows(arch: Arch, compiler_abi: CompilerAbi) -> Result<Self, PlatformError> {
        match arch {
            Arch::X86_64 | Arch::I686 => Ok(Self::Windows { arch, compiler_abi }),
            _ => Err(PlatformError::UnsupportedArch { os: "Windows", arch }),
        }
    }

    pub fn freebsd(
        arch: Arch,
        call_abi: Option<CallAbi>,
        compiler_abi: CompilerAbi,
    ) -> Result<Self, PlatformError> {
        validate_call_abi(arch, call_abi)?;
        Ok(Self::FreeBsd {
            arch,
            call_abi,
            compiler_abi,
        })
    }

    /// Platform of the running host, with a wildcard compiler ABI so it
    /// matches artifacts built by any compatible toolchain.
    pub fn current() -> Self {
        let arch = Arch::current();
        #[cfg(target_os = "linux")]
        {
            let call_abi = (arch == Arch::Armv7l).then_some(CallAbi::Eabihf);
            Self::Linux {
                arch,
                libc: Libc::Glibc,
                call_abi,
                compiler_abi: CompilerAbi::ANY,
            }
        }
        #[cfg(target_os = "macos")]
        {
            Self::MacOs {
                arch,
                compiler_abi: CompilerAbi::ANY,
            }
        }
        #[cfg(target_os = "windows")]
        {
            Self::Windows {
                arch,
                compiler_abi: CompilerAbi::ANY,
            }
        }
        #[cfg(target_os = "freebsd")]
        {
            let call_abi = (arch == Arch::Armv7l).then_some(CallAbi::Eabihf);
            Self::FreeBsd {
                arch,
                call_abi,
                compiler_abi: CompilerAbi::ANY,
            }
        }
        #[cfg(not(any(
            target_os = "linux",
            target_os = "macos",
            target_os = "windows",
            target_os = "freebsd"
        )))]
        {
            let _ = arch;
            Self::Unknown
        }
    }

    pub fn arch(&self) -> Option<Arch> {
        match self {
            Self::Linux { arch, .. }
            | Self::MacOs { arch, .. }
            | Self::Windows { arch, .. }
            | Self::FreeBsd { arch, .. } => Some(*arch),
            Self::Unknown => None,
        }
    }

    pub fn compiler_abi(&self) -> Option<CompilerAbi> {
        match self {
            Self::Linux { compiler_abi, .. }
            | Self::MacOs { compiler_abi, .. }
            | Self::Windows { compiler_abi, .. }
            | Self::FreeBsd { compiler_abi, .. } => Some(*compiler_abi),
            Self::Unknown => None,
        }
    }

    /// Binary compatibility check. Kind, architecture, libc and calling ABI
    /// must be equal; the compiler ABI fields absorb wildcards. Symmetric.
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Linux {
                    arch: a1,
                    libc: l1,
                    call_abi: c1,
                    compiler_abi: abi1,
                },
                Self::Linux {
                    arch: a2,
                    libc: l2,
                    call_abi: c2,
                    compiler_abi: abi2,
                },
            ) => a1 == a2 && l1 == l2 && c1 == c2 && abi1.matches(abi2),
            (
                Self::MacOs {
                    arch: a1,
                    compiler_abi: abi1,
                },
                Self::MacOs {
                    arch: a2,
                    compiler_abi: abi2,
                },
            ) => a1 == a2 && abi1.matches(abi2),
            (
                Self::Windows {
                    arch: a1,
                    compiler_abi: abi1,
                },
                Self::Windows {
                    arch: a2,
                    compiler_abi: abi2,
                },
            ) => a1 == a2 && abi1.matches(abi2),
            (
                Self::FreeBsd {
                    arch: a1,
                    call_abi: c1,
                    compiler_abi: abi1,
                },
                Self::FreeBsd {
                    arch: a2,
                    call_abi: c2,
                    compiler_abi: abi2,
                },
            ) => a1 == a2 && c1 == c2 && abi1.matches(abi2),
            _ => false,
        }
    }
}

/// Pick the best candidate matching `target`.
///
/// Ties between several matching candidates are broken by comparing their
/// canonical triplets and taking the lexicographically greatest, which
/// prefers newer runtime generations (`-gcc8` over `-gcc7`).
pub fn select_best(candidates: &[Platform], target: &Platform) -> Option<Platform> {
    candidates
        .iter()
        .filter(|c| c.matches(target))
        .max_by(|a, b| a.triplet().cmp(&b.triplet()))
        .copied()
}

#[cfg(test)]
pub(crate) fn all_concrete() -> Vec<Platform> {
    let mut platforms = Vec::new();
    let abis = [
        CompilerAbi::ANY,
        CompilerAbi::new(GccVersion::Gcc4, CxxAbi::Any),
        CompilerAbi::new(GccVersion::Gcc7, CxxAbi::Cxx11),
        CompilerAbi::new(GccVersion::Gcc8, CxxAbi::Cxx03),
        CompilerAbi::new(GccVersion::Any, CxxAbi::Cxx11),
    ];
    for abi in abis {
        for arch in [
            Arch::X86_64,
            Arch::I686,
            Arch::Aarch64,
            Arch::Armv7l,
            Arch::Powerpc64le,
        ] {
            for libc in [Libc::Glibc, Libc::Musl] {
                let call_abi = (arch == Arch::Armv7l).then_some(CallAbi::Eabihf);
                platforms.push(Platform::linux(arch, libc, call_abi, abi).unwrap());
            }
            platforms.push(Platform::freebsd(arch, None, abi).unwrap());
        }
        platforms.push(Platform::macos(Arch::X86_64, abi).unwrap());
        platforms.push(Platform::macos(Arch::Aarch64, abi).unwrap());
        platforms.push(Platform::windows(Arch::X86_64, abi).unwrap());
        platforms.push(Platform::windows(Arch::I686, abi).unwrap());
    }
    platforms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_reject_incoherent_combinations() {
        assert!(matches!(
            Platform::linux(
                Arch::X86_64,
                Libc::Glibc,
                Some(CallAbi::Eabihf),
                CompilerAbi::ANY
            ),
            Err(PlatformError::InvalidCallAbi { .. })
        ));
        assert!(matches!(
            Platform::macos(Arch::Armv7l, CompilerAbi::ANY),
            Err(PlatformError::UnsupportedArch { .. })
        ));
        assert!(matches!(
            Platform::windows(Arch::Powerpc64le, CompilerAbi::ANY),
            Err(PlatformError::UnsupportedArch { .. })
        ));
    }

    #[test]
    fn matching_is_symmetric() {
        let platforms = all_concrete();
        for a in &platforms {
            for b in &platforms {
                assert_eq!(a.matches(b), b.matches(a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn wildcard_absorbs_concrete_compiler_abi() {
        let any = Platform::linux(Arch::X86_64, Libc::Glibc, None, CompilerAbi::ANY).unwrap();
        for gcc in [
            GccVersion::Gcc4,
            GccVersion::Gcc5,
            GccVersion::Gcc6,
            GccVersion::Gcc7,
            GccVersion::Gcc8,
        ] {
            for cxx in [CxxAbi::Cxx03, CxxAbi::Cxx11] {
                let concrete = Platform::linux(
                    Arch::X86_64,
                    Libc::Glibc,
                    None,
                    CompilerAbi::new(gcc, cxx),
                )
                .unwrap();
                assert!(any.matches(&concrete));
                assert!(concrete.matches(&any));
            }
        }
    }

    #[test]
    fn wildcard_fields_absorb_independently() {
        let gcc_only = Platform::linux(
            Arch::X86_64,
            Libc::Glibc,
            None,
            CompilerAbi::new(GccVersion::Gcc7, CxxAbi::Any),
        )
        .unwrap();
        let cxx_only = Platform::linux(
            Arch::X86_64,
            Libc::Glibc,
            None,
            CompilerAbi::new(GccVersion::Any, CxxAbi::Cxx11),
        )
        .unwrap();
        assert!(gcc_only.matches(&cxx_only));
    }

    #[test]
    fn gcc_four_through_six_share_a_generation() {
        assert!(GccVersion::Gcc4.matches(GccVersion::Gcc6));
        assert!(GccVersion::Gcc5.matches(GccVersion::Gcc4));
        assert!(!GccVersion::Gcc6.matches(GccVersion::Gcc7));
        assert!(!GccVersion::Gcc7.matches(GccVersion::Gcc8));
    }

    #[test]
    fn rigid_fields_must_be_equal() {
        let glibc = Platform::linux(Arch::X86_64, Libc::Glibc, None, CompilerAbi::ANY).unwrap();
        let musl = Platform::linux(Arch::X86_64, Libc::Musl, None, CompilerAbi::ANY).unwrap();
        let i686 = Platform::linux(Arch::I686, Libc::Glibc, None, CompilerAbi::ANY).unwrap();
        let mac = Platform::macos(Arch::X86_64, CompilerAbi::ANY).unwrap();
        assert!(!glibc.matches(&musl));
        assert!(!glibc.matches(&i686));
        assert!(!glibc.matches(&mac));
    }

    #[test]
    fn unknown_matches_nothing() {
        let host = Platform::current();
        assert!(!Platform::Unknown.matches(&host));
        assert!(!host.matches(&Platform::Unknown));
        assert!(!Platform::Unknown.matches(&Platform::Unknown));
    }

    #[test]
    fn select_best_prefers_greatest_triplet() {
        let target = Platform::linux(Arch::X86_64, Libc::Glibc, None, CompilerAbi::ANY).unwrap();
        let gcc7 = Platform::linux(
            Arch::X86_64,
            Libc::Glibc,
            None,
            CompilerAbi::new(GccVersion::Gcc7, CxxAbi::Any),
        )
        .unwrap();
        let gcc8 = Platform::linux(
            Arch::X86_64,
            Libc::Glibc,
            None,
            CompilerAbi::new(GccVersion::Gcc8, CxxAbi::Any),
        )
        .unwrap();
        let foreign = Platform::windows(Arch::X86_64, CompilerAbi::ANY).unwrap();
        let candidates = [gcc7, foreign, gcc8];
        assert_eq!(select_best(&candidates, &target), Some(gcc8));
    }

    #[test]
    fn select_best_is_deterministic() {
        let target = Platform::current();
        let candidates = all_concrete();
        let first = select_best(&candidates, &target);
        for _ in 0..10 {
            assert_eq!(select_best(&candidates, &target), first);
        }
    }

    #[test]
    fn select_best_with_no_match_is_none() {
        let target = Platform::macos(Arch::X86_64, CompilerAbi::ANY).unwrap();
        let candidates =
            [Platform::linux(Arch::X86_64, Libc::Glibc, None, CompilerAbi::ANY).unwrap()];
        assert_eq!(select_best(&candidates, &target), None);
    }
}
