//! Archive extraction into the install layout.
//!
//! Entries are processed in archive order. Each one is routed through the
//! [`PathMapping`], written verbatim, and native libraries are made
//! executable on Unix systems.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::archive::ArchiveHandle;
use super::error::InstallError;
use super::mapping::{PathMapping, Resolution};

/// Extension of native libraries shipped in the archive.
pub const DEFAULT_NATIVE_LIBRARY_EXTENSION: &str = ".so";

// ============================================================================
// Options and Progress
// ============================================================================

/// Extraction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// File name suffix that marks a native library.
    pub native_library_extension: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            native_library_extension: DEFAULT_NATIVE_LIBRARY_EXTENSION.to_string(),
        }
    }
}

/// Reported once per processed archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryProgress {
    /// Original archive name of the entry.
    pub name: String,
    /// Entries processed so far, including this one.
    pub processed: usize,
    /// Total entries in the archive.
    pub total: usize,
    /// False if the mapping dropped the entry.
    pub extracted: bool,
}

// ============================================================================
// Extraction
// ============================================================================

/// Extracts every mapped entry of `archive` under `install_root`.
///
/// Returns the number of entries written (files and directories).
///
/// # Errors
///
/// - [`InstallError::PathTraversal`] for an entry resolving outside its
///   destination; nothing is written for it or any later entry.
/// - [`InstallError::Extraction`] naming the entry on any I/O failure.
/// - [`InstallError::Cancelled`] if `cancel` fires between entries or
///   between copy chunks.
pub fn extract_archive<F>(
    archive: &mut ArchiveHandle,
    mapping: &PathMapping,
    install_root: &Path,
    options: &ExtractOptions,
    cancel: &CancellationToken,
    mut on_entry: F,
) -> Result<usize, InstallError>
where
    F: FnMut(&EntryProgress),
{
    info!(
        "Extracting {} ({} entries) to {}",
        archive.path().display(),
        archive.len(),
        install_root.display()
    );

    fs::create_dir_all(install_root).map_err(|e| {
        InstallError::io(
            format!("Failed to create directory {}", install_root.display()),
            e,
        )
    })?;

    let total = archive.len();
    let mut extracted = 0;

    for index in 0..total {
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }

        let entry = archive.entries()[index].clone();
        let resolution = mapping.resolve(&entry.name, entry.is_directory, install_root)?;

        let written = match resolution {
            Resolution::Skipped => {
                debug!("Skipping unmapped entry {}", entry.name);
                false
            }
            Resolution::Mapped { target, .. } if entry.is_directory => {
                fs::create_dir_all(&target)
                    .map_err(|e| InstallError::extraction(&entry.name, e))?;
                true
            }
            Resolution::Mapped { target, .. } => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| InstallError::extraction(&entry.name, e))?;
                }

                let file = File::create(&target)
                    .map_err(|e| InstallError::extraction(&entry.name, e))?;
                let mut writer = BufWriter::new(file);
                let bytes = archive.copy_entry(index, &mut writer, cancel)?;
                writer
                    .flush()
                    .map_err(|e| InstallError::extraction(&entry.name, e))?;

                if is_native_library(&target, &options.native_library_extension) {
                    make_executable(&target)
                        .map_err(|e| InstallError::extraction(&entry.name, e))?;
                }

                debug!("Extracted {} ({} bytes) to {}", entry.name, bytes, target.display());
                true
            }
        };

        if written {
            extracted += 1;
        }

        on_entry(&EntryProgress {
            name: entry.name,
            processed: index + 1,
            total,
            extracted: written,
        });
    }

    info!("Extraction complete: {} of {} entries written", extracted, total);
    Ok(extracted)
}

fn is_native_library(path: &Path, extension: &str) -> bool {
    !extension.is_empty()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(extension))
}

// ============================================================================
// Unix Permissions
// ============================================================================

/// Sets executable permission on a file (Unix only).
///
/// On other platforms, this is a no-op.
#[allow(unused_variables)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::metadata(path)?.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        fs::set_permissions(path, permissions)?;

        debug!("Set executable permission on {}", path.display());
    }

    Ok(())
}
