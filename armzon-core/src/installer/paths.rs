//! Default on-disk locations.
//!
//! Platform directories come from the `dirs` crate; when a platform offers
//! none, the OS temp folder is used instead.
//!
//! - Install root: `{data_local}/armzon/gtasa/`
//! - Staging directory: `{cache}/armzon/downloads/`
//! - Config file: `{config}/armzon/installer.json`
//!
//! Each install root gets its own subdirectory of the staging directory,
//! holding the staged archive and the root's lock file.

use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

/// Subdirectory name under each platform directory.
const APP_DIR: &str = "armzon";

/// File name of the staged archive.
pub const DEFAULT_ARCHIVE_FILE_NAME: &str = "game_archive.zip";

/// Advisory lock held while an install root is being changed.
pub const LOCK_FILE_NAME: &str = "install.lock";

/// Hex digits of the root digest used in staging directory names.
const ROOT_DIGEST_LEN: usize = 12;

fn base(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

/// Returns the default install root.
///
/// Path: `{data_local}/armzon/gtasa/`
pub fn default_install_root() -> PathBuf {
    base(dirs::data_local_dir()).join("gtasa")
}

/// Returns the directory the archive is staged in while installing.
///
/// Path: `{cache}/armzon/downloads/`
pub fn default_download_dir() -> PathBuf {
    base(dirs::cache_dir()).join("downloads")
}

/// Returns the default config file path.
///
/// Path: `{config}/armzon/installer.json`
pub fn default_config_path() -> PathBuf {
    base(dirs::config_dir()).join("installer.json")
}

/// Absolute, symlink-resolved form of `root`, used to compare roots.
///
/// The root itself need not exist; its parent is resolved instead so the
/// key is the same before and after the root is created.
pub fn normalize_root(root: &Path) -> PathBuf {
    if let Ok(path) = fs::canonicalize(root) {
        return path;
    }

    let absolute = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    if let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) {
        if let Ok(parent) = fs::canonicalize(parent) {
            return parent.join(name);
        }
    }
    absolute
}

/// Name of the staging subdirectory for `root`: `{root name}-{digest}`.
pub fn staging_dir_name(root: &Path) -> String {
    let key = normalize_root(root);
    let digest = Sha256::digest(key.to_string_lossy().as_bytes());

    let mut name = key
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    name.push('-');
    for byte in digest.iter().take(ROOT_DIGEST_LEN / 2) {
        let _ = write!(name, "{:02x}", byte);
    }
    name
}
