//! Core types for the installation pipeline.
//!
//! This module defines the values passed between pipeline stages: the
//! download source, the installation state machine and the manifest entry
//! shape shared by the archive and install manifests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Remote Source
// ============================================================================

/// A remote archive and the local file it is downloaded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSource {
    /// The URL to download from.
    pub url: String,
    /// Local file the body is written to (truncated on every download).
    pub destination: PathBuf,
}

impl RemoteSource {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }
}

// ============================================================================
// Installation State
// ============================================================================

/// Phase of an installation attempt.
///
/// Transitions are strictly linear:
/// `Idle -> Downloading -> Validating -> Extracting -> Verifying -> Complete`.
/// Any phase may end in `Failed` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstallationState {
    #[default]
    Idle,
    Downloading,
    Validating,
    Extracting,
    Verifying,
    Complete,
    Failed,
    Cancelled,
}

impl InstallationState {
    /// Returns true for states that end an installation attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Returns true while an installation attempt is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Downloading | Self::Validating | Self::Extracting | Self::Verifying
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Validating => "validating",
            Self::Extracting => "extracting",
            Self::Verifying => "verifying",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InstallationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Manifest Entries
// ============================================================================

/// One required path in a manifest.
///
/// The same shape is used for the archive manifest (archive-internal entry
/// names) and the install manifest (paths relative to the install root).
/// A `min_size` of 0 means the path only has to exist; paths ending in `/`
/// name directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredFileSpec {
    /// Slash-separated relative path.
    pub path: String,
    /// Minimum size in bytes (files only).
    #[serde(default)]
    pub min_size: u64,
    /// Optional SHA-1 or SHA-256 digest (hex, any case), checked in strict mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl RequiredFileSpec {
    /// A path that must exist with at least `min_size` bytes.
    pub fn new(path: impl Into<String>, min_size: u64) -> Self {
        Self {
            path: path.into(),
            min_size,
            content_hash: None,
        }
    }

    /// A path that only has to exist.
    pub fn exists(path: impl Into<String>) -> Self {
        Self::new(path, 0)
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Returns true if the spec names a directory.
    pub fn is_directory(&self) -> bool {
        self.path.ends_with('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_terminal_and_active() {
        assert!(!InstallationState::Idle.is_terminal());
        assert!(!InstallationState::Idle.is_active());
        assert!(InstallationState::Downloading.is_active());
        assert!(InstallationState::Verifying.is_active());
        assert!(InstallationState::Complete.is_terminal());
        assert!(InstallationState::Failed.is_terminal());
        assert!(InstallationState::Cancelled.is_terminal());
        assert!(!InstallationState::Cancelled.is_active());
    }

    #[test]
    fn test_state_default_is_idle() {
        assert_eq!(InstallationState::default(), InstallationState::Idle);
        assert_eq!(InstallationState::Extracting.to_string(), "extracting");
    }

    #[test]
    fn test_required_file_spec() {
        let dir = RequiredFileSpec::exists("res/");
        assert!(dir.is_directory());
        assert_eq!(dir.min_size, 0);

        let lib = RequiredFileSpec::new("lib/armeabi-v7a/libsamp.so", 2_000_000)
            .with_hash("ABCDEF");
        assert!(!lib.is_directory());
        assert_eq!(lib.content_hash.as_deref(), Some("ABCDEF"));
    }

    #[test]
    fn test_required_file_spec_json_defaults() {
        let spec: RequiredFileSpec = serde_json::from_str(r#"{"path":"classes.dex"}"#).unwrap();
        assert_eq!(spec, RequiredFileSpec::exists("classes.dex"));

        let json = serde_json::to_string(&spec).unwrap();
        assert!(!json.contains("content_hash"));
    }
}
