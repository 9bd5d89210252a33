//! Opening downloaded archives and checking their structure.
//!
//! The structural check runs before anything touches the install root, so an
//! incomplete or malformed download is rejected without side effects.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::InstallError;
use super::types::RequiredFileSpec;

/// Buffer size for copying entry contents.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

// ============================================================================
// Archive Handle
// ============================================================================

/// Metadata of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Slash-separated name as stored in the archive. Untrusted.
    pub name: String,
    pub is_directory: bool,
    pub uncompressed_size: u64,
}

/// A read-only, opened zip archive.
pub struct ArchiveHandle {
    path: PathBuf,
    zip: zip::ZipArchive<BufReader<File>>,
    entries: Vec<ArchiveEntry>,
}

impl std::fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ArchiveHandle {
    /// Opens an archive and reads its central directory.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::CorruptArchive`] if the file is missing,
    /// empty, or not a readable zip container.
    pub fn open(path: &Path) -> Result<Self, InstallError> {
        let corrupt = |msg: String| InstallError::CorruptArchive(msg);

        let metadata = std::fs::metadata(path)
            .map_err(|e| corrupt(format!("Cannot open {}: {}", path.display(), e)))?;
        if metadata.len() == 0 {
            return Err(corrupt(format!("Archive {} is empty", path.display())));
        }

        let file = File::open(path)
            .map_err(|e| corrupt(format!("Cannot open {}: {}", path.display(), e)))?;
        let mut zip = zip::ZipArchive::new(BufReader::new(file))
            .map_err(|e| corrupt(format!("Failed to read zip {}: {}", path.display(), e)))?;

        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let entry = zip
                .by_index(i)
                .map_err(|e| corrupt(format!("Unreadable entry #{}: {}", i, e)))?;
            entries.push(ArchiveEntry {
                name: entry.name().to_string(),
                is_directory: entry.is_dir(),
                uncompressed_size: entry.size(),
            });
        }

        debug!("Opened {} with {} entries", path.display(), entries.len());

        Ok(Self {
            path: path.to_path_buf(),
            zip,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries in archive order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies the content of entry `index` into `out`, checking `cancel`
    /// between chunks.
    pub(crate) fn copy_entry<W: Write>(
        &mut self,
        index: usize,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<u64, InstallError> {
        let name = self.entries[index].name.clone();
        let mut entry = self
            .zip
            .by_index(index)
            .map_err(|e| InstallError::extraction(&name, io::Error::other(e)))?;

        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        let mut copied: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(InstallError::Cancelled);
            }
            let n = match entry.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(InstallError::extraction(&name, e)),
            };
            out.write_all(&buffer[..n])
                .map_err(|e| InstallError::extraction(&name, e))?;
            copied += n as u64;
        }

        Ok(copied)
    }
}

// ============================================================================
// Structure Validation
// ============================================================================

/// Returns the required entries the archive does not satisfy, in manifest
/// order.
///
/// An entry satisfies a spec when its name matches exactly and, for a
/// non-zero `min_size`, its declared uncompressed size reaches it.
pub fn missing_entries(archive: &ArchiveHandle, required: &[RequiredFileSpec]) -> Vec<String> {
    let sizes: HashMap<&str, u64> = archive
        .entries()
        .iter()
        .map(|e| (e.name.as_str(), e.uncompressed_size))
        .collect();

    required
        .iter()
        .filter(|spec| match sizes.get(spec.path.as_str()) {
            None => {
                warn!("Archive is missing required entry: {}", spec.path);
                true
            }
            Some(&size) if size < spec.min_size => {
                warn!(
                    "Archive entry too small: {} ({} < {})",
                    spec.path, size, spec.min_size
                );
                true
            }
            Some(_) => false,
        })
        .map(|spec| spec.path.clone())
        .collect()
}

/// Returns true if every required entry is present.
pub fn validate_structure(archive: &ArchiveHandle, required: &[RequiredFileSpec]) -> bool {
    let missing = missing_entries(archive, required);
    info!(
        "Archive structure check {} ({} required, {} missing)",
        if missing.is_empty() { "passed" } else { "failed" },
        required.len(),
        missing.len()
    );
    missing.is_empty()
}

/// Opens `path` and fails with [`InstallError::InvalidArchive`] unless every
/// required entry is present.
pub fn open_validated(
    path: &Path,
    required: &[RequiredFileSpec],
) -> Result<ArchiveHandle, InstallError> {
    let archive = ArchiveHandle::open(path)?;
    let missing = missing_entries(&archive, required);
    if !missing.is_empty() {
        return Err(InstallError::InvalidArchive { missing });
    }
    Ok(archive)
}
