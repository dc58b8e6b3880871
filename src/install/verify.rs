//! Content verification with a sidecar hash cache.
//!
//! Every verified file gets a `<path>.sha256` sidecar holding its digest.
//! The sidecar is purely an accelerator: its modification time tells us
//! whether the file changed since the last check, and its content lets a
//! clean re-check skip rehashing entirely. The final verdict always comes
//! from comparing against the caller's expected digest; the cache can
//! cause a redundant recomputation at worst, never a wrong answer.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::InstallError;

/// Outcome of consulting the sidecar cache during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// No sidecar existed; the digest was computed and cached.
    Missing,
    /// Sidecar matched the expected digest and the file has not changed
    /// since it was written; nothing was recomputed.
    Consistent,
    /// The file is newer than its sidecar; the digest was recomputed.
    FileModified,
    /// The sidecar digest disagreed; the digest was recomputed.
    Mismatch,
}

/// SHA-256 of a file, streamed in chunks, as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String, InstallError> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Sidecar location for `path`: the same name with `.sha256` appended.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".sha256");
    PathBuf::from(name)
}

fn check_digest(path: &Path, expected: &str, actual: &str) -> Result<(), InstallError> {
    if actual == expected {
        Ok(())
    } else {
        Err(InstallError::Integrity {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Verify `path` against `expected`, consulting and refreshing the
/// sidecar cache. A digest mismatch against `expected` is fatal no matter
/// what the cache said.
pub fn verify(path: &Path, expected: &str) -> Result<CacheStatus, InstallError> {
    let expected = expected.trim().to_ascii_lowercase();
    let sidecar = sidecar_path(path);

    if !sidecar.exists() {
        let actual = sha256_file(path)?;
        check_digest(path, &expected, &actual)?;
        fs::write(&sidecar, &actual)?;
        return Ok(CacheStatus::Missing);
    }

    let file_mtime = fs::metadata(path)?.modified()?;
    let cache_mtime = fs::metadata(&sidecar)?.modified()?;

    let status = if file_mtime > cache_mtime {
        CacheStatus::FileModified
    } else {
        let cached = fs::read_to_string(&sidecar)?.trim().to_ascii_lowercase();
        if cached == expected {
            return Ok(CacheStatus::Consistent);
        }
        CacheStatus::Mismatch
    };

    let actual = sha256_file(path)?;
    check_digest(path, &expected, &actual)?;
    fs::write(&sidecar, &actual)?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    // Nudging mtimes forward beats sleeping through filesystem timestamp
    // granularity.
    fn bump_mtime(path: &Path, ahead: Duration) {
        let file = fs::File::options().append(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + ahead).unwrap();
    }

    const HELLO_SHA256: &str =
        "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    fn fixture(dir: &Path) -> PathBuf {
        let path = dir.join("artifact.bin");
        fs::write(&path, "hello\n").unwrap();
        path
    }

    #[test]
    fn first_verification_writes_the_cache() {
        let dir = tempdir().unwrap();
        let path = fixture(dir.path());
        assert_eq!(verify(&path, HELLO_SHA256).unwrap(), CacheStatus::Missing);
        assert_eq!(
            fs::read_to_string(sidecar_path(&path)).unwrap(),
            HELLO_SHA256
        );
    }

    #[test]
    fn recheck_hits_the_cache() {
        let dir = tempdir().unwrap();
        let path = fixture(dir.path());
        verify(&path, HELLO_SHA256).unwrap();
        assert_eq!(verify(&path, HELLO_SHA256).unwrap(), CacheStatus::Consistent);
    }

    #[test]
    fn touched_file_is_rehashed() {
        let dir = tempdir().unwrap();
        let path = fixture(dir.path());
        verify(&path, HELLO_SHA256).unwrap();
        bump_mtime(&path, Duration::from_secs(5));
        assert_eq!(
            verify(&path, HELLO_SHA256).unwrap(),
            CacheStatus::FileModified
        );
    }

    #[test]
    fn corrupted_sidecar_is_detected_and_repaired() {
        let dir = tempdir().unwrap();
        let path = fixture(dir.path());
        verify(&path, HELLO_SHA256).unwrap();
        fs::write(sidecar_path(&path), "0".repeat(64)).unwrap();
        bump_mtime(&sidecar_path(&path), Duration::from_secs(5));
        assert_eq!(verify(&path, HELLO_SHA256).unwrap(), CacheStatus::Mismatch);
        assert_eq!(
            fs::read_to_string(sidecar_path(&path)).unwrap(),
            HELLO_SHA256
        );
    }

    #[test]
    fn wrong_expected_hash_is_always_fatal() {
        let dir = tempdir().unwrap();
        let path = fixture(dir.path());
        let wrong = "f".repeat(64);

        // No cache yet.
        assert!(matches!(
            verify(&path, &wrong),
            Err(InstallError::Integrity { .. })
        ));

        // Warm, consistent cache.
        verify(&path, HELLO_SHA256).unwrap();
        assert!(matches!(
            verify(&path, &wrong),
            Err(InstallError::Integrity { .. })
        ));

        // File newer than cache.
        bump_mtime(&path, Duration::from_secs(5));
        assert!(matches!(
            verify(&path, &wrong),
            Err(InstallError::Integrity { .. })
        ));
    }

    #[test]
    fn expected_hash_is_case_insensitive() {
        let dir = tempdir().unwrap();
        let path = fixture(dir.path());
        let upper = HELLO_SHA256.to_ascii_uppercase();
        assert_eq!(verify(&path, &upper).unwrap(), CacheStatus::Missing);
    }

    #[test]
    fn sidecar_path_appends_suffix() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/foo.tar.gz")),
            PathBuf::from("/tmp/foo.tar.gz.sha256")
        );
    }
}
