//! Post-install verification of the install root.
//!
//! Every spec is evaluated and reported; nothing is modified on disk.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, info, warn};

use super::types::RequiredFileSpec;

/// Buffer size for hashing installed files.
const HASH_BUFFER_SIZE: usize = 8 * 1024;

/// How thoroughly installed files are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Presence and minimum size.
    #[default]
    Standard,
    /// Also compares content hashes where a spec declares one.
    Strict,
}

/// Result of checking one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    Passed,
    Missing,
    TooSmall { actual: u64, minimum: u64 },
    HashMismatch { expected: String, actual: String },
    /// The file exists but could not be read or its hash spec is malformed.
    Unreadable { reason: String },
}

impl EntryStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// One checked path. Serializes flat: `{"path": .., "status": "too_small", "actual": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryResult {
    pub path: String,
    #[serde(flatten)]
    pub status: EntryStatus,
}

/// Outcome of a verification run, one result per spec in manifest order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub all_passed: bool,
    pub results: Vec<EntryResult>,
}

impl VerificationReport {
    /// Paths that did not pass, in manifest order.
    pub fn failed_paths(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.status.is_passed())
            .map(|r| r.path.clone())
            .collect()
    }
}

/// Checks every spec against the files under `root`.
pub fn verify(root: &Path, specs: &[RequiredFileSpec], mode: VerifyMode) -> VerificationReport {
    let results: Vec<EntryResult> = specs
        .iter()
        .map(|spec| EntryResult {
            path: spec.path.clone(),
            status: check(root, spec, mode),
        })
        .collect();

    for result in results.iter().filter(|r| !r.status.is_passed()) {
        warn!("Verification failed for {}: {:?}", result.path, result.status);
    }

    let all_passed = results.iter().all(|r| r.status.is_passed());
    info!(
        "Verified {} paths under {} ({:?}): {}",
        specs.len(),
        root.display(),
        mode,
        if all_passed { "passed" } else { "failed" }
    );

    VerificationReport {
        all_passed,
        results,
    }
}

fn check(root: &Path, spec: &RequiredFileSpec, mode: VerifyMode) -> EntryStatus {
    let path = root.join(spec.path.trim_end_matches('/'));

    let metadata = match std::fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return EntryStatus::Missing,
        Err(e) => {
            return EntryStatus::Unreadable {
                reason: e.to_string(),
            }
        }
    };

    // A directory satisfies any spec that only asks for existence.
    if metadata.is_dir() {
        return if spec.is_directory() || (spec.min_size == 0 && spec.content_hash.is_none()) {
            EntryStatus::Passed
        } else {
            EntryStatus::Missing
        };
    }

    if spec.is_directory() || !metadata.is_file() {
        return EntryStatus::Missing;
    }

    if metadata.len() < spec.min_size {
        return EntryStatus::TooSmall {
            actual: metadata.len(),
            minimum: spec.min_size,
        };
    }

    match (&spec.content_hash, mode) {
        (Some(expected), VerifyMode::Strict) => match hash_file(&path, expected.len()) {
            Ok(actual) if actual.eq_ignore_ascii_case(expected) => EntryStatus::Passed,
            Ok(actual) => EntryStatus::HashMismatch {
                expected: expected.to_ascii_lowercase(),
                actual,
            },
            Err(e) => EntryStatus::Unreadable {
                reason: e.to_string(),
            },
        },
        _ => EntryStatus::Passed,
    }
}

/// Hashes `path` with the algorithm implied by the digest length: 40 hex
/// digits is SHA-1, 64 is SHA-256. Returns lowercase hex.
pub fn hash_file(path: &Path, hex_len: usize) -> io::Result<String> {
    match hex_len {
        40 => digest_file::<Sha1>(path),
        64 => digest_file::<Sha256>(path),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported digest length {} (expected 40 or 64)", other),
        )),
    }
}

fn digest_file<D: Digest>(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(hex, "{:02x}", byte);
    }

    debug!("Hashed {}: {}", path.display(), hex);
    Ok(hex)
}
