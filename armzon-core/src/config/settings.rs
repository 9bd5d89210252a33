//! Installer configuration.
//!
//! Settings are persisted as pretty-printed JSON. A missing file means
//! defaults; an unparsable one is logged and replaced by defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::installer::{
    paths, DownloadSettings, ExtractOptions, PathMapping, RequiredFileSpec, VerifyMode,
    DEFAULT_NATIVE_LIBRARY_EXTENSION,
};

const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_CONNECT_TIMEOUT_SECS: u64 = 300;
const MAX_READ_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// Default Manifests
// =============================================================================

/// Entries the downloaded archive must contain before anything is extracted.
pub fn default_archive_manifest() -> Vec<RequiredFileSpec> {
    vec![
        RequiredFileSpec::exists("apk_files/classes.dex"),
        RequiredFileSpec::exists("apk_files/lib/armeabi-v7a/libsamp.so"),
        RequiredFileSpec::exists("obb/data/gta3.img"),
    ]
}

/// Files a finished installation must contain, relative to the install root.
pub fn default_install_manifest() -> Vec<RequiredFileSpec> {
    vec![
        RequiredFileSpec::new("lib/armeabi-v7a/libsamp.so", 5_000_000),
        RequiredFileSpec::new("classes.dex", 1_000_000),
        RequiredFileSpec::new("AndroidManifest.xml", 10_000),
        RequiredFileSpec::exists("res/"),
        RequiredFileSpec::exists("assets/"),
        RequiredFileSpec::new("data/gta3.img", 1_000_000_000),
        RequiredFileSpec::exists("data/gta.dat"),
        RequiredFileSpec::exists("data/default.ide"),
    ]
}

// =============================================================================
// Installer Configuration
// =============================================================================

/// Installer settings - persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Directory the game is installed into. Wiped before extraction.
    pub install_root: PathBuf,

    /// Directory the archive is staged in while installing.
    pub download_dir: PathBuf,

    /// File name of the staged archive.
    pub archive_file_name: String,

    /// Network timeouts and client header.
    pub download: DownloadSettings,

    /// Archive-internal entries checked before extraction.
    pub archive_manifest: Vec<RequiredFileSpec>,

    /// Installed files checked after extraction.
    pub install_manifest: Vec<RequiredFileSpec>,

    /// Archive prefix to install path rules.
    pub path_mapping: PathMapping,

    /// Suffix of files made executable after extraction.
    pub native_library_extension: String,

    /// Compare content hashes during verification.
    pub strict_verification: bool,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            install_root: paths::default_install_root(),
            download_dir: paths::default_download_dir(),
            archive_file_name: paths::DEFAULT_ARCHIVE_FILE_NAME.to_string(),
            download: DownloadSettings::default(),
            archive_manifest: default_archive_manifest(),
            install_manifest: default_install_manifest(),
            path_mapping: PathMapping::default(),
            native_library_extension: DEFAULT_NATIVE_LIBRARY_EXTENSION.to_string(),
            strict_verification: false,
        }
    }
}

impl InstallerConfig {
    /// Default configuration rooted at `install_root`.
    pub fn with_install_root(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::default_config_path())
    }

    /// Loads configuration from `path`, using defaults if the file is
    /// missing or cannot be parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config = match serde_json::from_str::<InstallerConfig>(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to parse config at {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        };
        config.validate();
        Ok(config)
    }

    /// Saves configuration to `path` as pretty JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// Clamps timeouts and restores empty fields to their defaults.
    pub fn validate(&mut self) {
        self.download.connect_timeout_secs = self
            .download
            .connect_timeout_secs
            .clamp(MIN_TIMEOUT_SECS, MAX_CONNECT_TIMEOUT_SECS);
        self.download.read_timeout_secs = self
            .download
            .read_timeout_secs
            .clamp(MIN_TIMEOUT_SECS, MAX_READ_TIMEOUT_SECS);

        let defaults = DownloadSettings::default();
        if self.download.user_agent.trim().is_empty() {
            self.download.user_agent = defaults.user_agent;
        }

        // The archive name must stay a bare file name inside download_dir.
        if self.archive_file_name.is_empty()
            || self.archive_file_name.contains(['/', '\\'])
            || self.archive_file_name == ".."
        {
            self.archive_file_name = paths::DEFAULT_ARCHIVE_FILE_NAME.to_string();
        }

        if self.native_library_extension.is_empty() {
            self.native_library_extension = DEFAULT_NATIVE_LIBRARY_EXTENSION.to_string();
        }

        if self.install_root.as_os_str().is_empty() {
            self.install_root = paths::default_install_root();
        }
        if self.download_dir.as_os_str().is_empty() {
            self.download_dir = paths::default_download_dir();
        }
    }

    /// Staging subdirectory owned by `install_root`.
    pub fn staging_dir(&self) -> PathBuf {
        self.download_dir
            .join(paths::staging_dir_name(&self.install_root))
    }

    /// Where the archive is written during an install.
    pub fn staged_archive_path(&self) -> PathBuf {
        self.staging_dir().join(&self.archive_file_name)
    }

    /// Lock file that serializes installs into `install_root`.
    pub fn lock_file_path(&self) -> PathBuf {
        self.staging_dir().join(paths::LOCK_FILE_NAME)
    }

    pub fn verify_mode(&self) -> VerifyMode {
        if self.strict_verification {
            VerifyMode::Strict
        } else {
            VerifyMode::Standard
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            native_library_extension: self.native_library_extension.clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::UnmatchedPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_game_layout() {
        let config = InstallerConfig::default();
        assert_eq!(config.archive_file_name, "game_archive.zip");
        assert_eq!(config.download.connect_timeout_secs, 15);
        assert_eq!(config.download.read_timeout_secs, 30);
        assert_eq!(config.download.user_agent, "MobileApp/1.0");
        assert_eq!(config.archive_manifest.len(), 3);
        assert_eq!(config.native_library_extension, ".so");
        assert_eq!(config.verify_mode(), VerifyMode::Standard);

        let paths: Vec<&str> = config
            .install_manifest
            .iter()
            .map(|s| s.path.as_str())
            .collect();
        assert_eq!(
            paths,
            vec![
                "lib/armeabi-v7a/libsamp.so",
                "classes.dex",
                "AndroidManifest.xml",
                "res/",
                "assets/",
                "data/gta3.img",
                "data/gta.dat",
                "data/default.ide",
            ]
        );
        assert!(config.install_manifest[3].is_directory());
        assert_eq!(config.install_manifest[2].min_size, 10_000);
        assert_eq!(config.path_mapping, PathMapping::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/installer.json");

        let mut config = InstallerConfig::with_install_root(temp_dir.path().join("game"));
        config.strict_verification = true;
        config.install_manifest = vec![RequiredFileSpec::new("classes.dex", 10)];
        config.save_to(&path).unwrap();

        let loaded = InstallerConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.verify_mode(), VerifyMode::Strict);
    }

    #[test]
    fn test_load_missing_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = InstallerConfig::load_from(&temp_dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded, InstallerConfig::default());
    }

    #[test]
    fn test_load_corrupt_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("installer.json");
        fs::write(&path, "{ not json").unwrap();

        let loaded = InstallerConfig::load_from(&path).unwrap();
        assert_eq!(loaded, InstallerConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("installer.json");
        fs::write(
            &path,
            r#"{
                "install_root": "/srv/game",
                "path_mapping": {"rules": [], "unmatched": "flatten"}
            }"#,
        )
        .unwrap();

        let loaded = InstallerConfig::load_from(&path).unwrap();
        assert_eq!(loaded.install_root, PathBuf::from("/srv/game"));
        assert_eq!(loaded.path_mapping.unmatched(), UnmatchedPolicy::Flatten);
        assert_eq!(loaded.archive_manifest, default_archive_manifest());
    }

    #[test]
    fn test_validate_clamps_and_restores() {
        let mut config = InstallerConfig::default();
        config.download.connect_timeout_secs = 0;
        config.download.read_timeout_secs = 100_000;
        config.download.user_agent = "  ".to_string();
        config.archive_file_name = "../escape.zip".to_string();
        config.native_library_extension = String::new();

        config.validate();

        assert_eq!(config.download.connect_timeout_secs, MIN_TIMEOUT_SECS);
        assert_eq!(config.download.read_timeout_secs, MAX_READ_TIMEOUT_SECS);
        assert_eq!(config.download.user_agent, "MobileApp/1.0");
        assert_eq!(config.archive_file_name, "game_archive.zip");
        assert_eq!(config.native_library_extension, ".so");
    }

    #[test]
    fn test_staged_archive_path() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = InstallerConfig::with_install_root(temp_dir.path().join("gtasa"));
        config.download_dir = temp_dir.path().join("staging");

        let staged = config.staged_archive_path();
        assert_eq!(staged.parent(), Some(config.staging_dir().as_path()));
        assert!(staged.starts_with(&config.download_dir));
        assert!(staged.ends_with("game_archive.zip"));
        assert_eq!(
            config.lock_file_path(),
            config.staging_dir().join("install.lock")
        );
    }

    #[test]
    fn test_roots_sharing_download_dir_stage_separately() {
        let temp_dir = TempDir::new().unwrap();
        let mut first = InstallerConfig::with_install_root(temp_dir.path().join("a/gtasa"));
        first.download_dir = temp_dir.path().join("staging");
        let mut second = first.clone();
        second.install_root = temp_dir.path().join("b/gtasa");

        assert_ne!(first.staged_archive_path(), second.staged_archive_path());
        assert_ne!(first.lock_file_path(), second.lock_file_path());
        assert_eq!(first.staged_archive_path(), first.clone().staged_archive_path());
    }
}
