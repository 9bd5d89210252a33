//! Error taxonomy for the installation pipeline.
//!
//! Every component returns [`InstallError`]. The orchestrator is the only
//! place that turns one into a terminal event, using [`InstallError::kind`]
//! as the machine-checkable part and the `Display` text as the detail.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while installing.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Archive is missing required entries: {}", missing.join(", "))]
    InvalidArchive { missing: Vec<String> },

    #[error("Archive entry escapes the install root: {entry}")]
    PathTraversal { entry: String },

    #[error("Failed to extract '{entry}': {source}")]
    Extraction {
        entry: String,
        #[source]
        source: io::Error,
    },

    #[error("Integrity check failed for: {}", failed.join(", "))]
    Integrity { failed: Vec<String> },

    #[error("Installation cancelled")]
    Cancelled,

    #[error("An installation is already running for {}", root.display())]
    AlreadyRunning { root: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl InstallError {
    /// Wraps an I/O error with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wraps an I/O error raised while writing a specific archive entry.
    pub fn extraction(entry: impl Into<String>, source: io::Error) -> Self {
        Self::Extraction {
            entry: entry.into(),
            source,
        }
    }

    /// Returns the machine-checkable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::CorruptArchive(_) => ErrorKind::CorruptArchive,
            Self::InvalidArchive { .. } => ErrorKind::InvalidArchive,
            Self::PathTraversal { .. } => ErrorKind::PathTraversal,
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Returns true if this error was caused by a cancel request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for InstallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {}", err))
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {}", err))
        } else {
            Self::Network(err.to_string())
        }
    }
}

// =============================================================================
// Error Kind
// =============================================================================

/// Flat, copyable classification of an [`InstallError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    CorruptArchive,
    InvalidArchive,
    PathTraversal,
    Extraction,
    Integrity,
    Cancelled,
    AlreadyRunning,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::CorruptArchive => "corrupt_archive",
            Self::InvalidArchive => "invalid_archive",
            Self::PathTraversal => "path_traversal",
            Self::Extraction => "extraction",
            Self::Integrity => "integrity",
            Self::Cancelled => "cancelled",
            Self::AlreadyRunning => "already_running",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            InstallError::Network("boom".into()).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            InstallError::PathTraversal {
                entry: "../x".into()
            }
            .kind(),
            ErrorKind::PathTraversal
        );
        assert_eq!(InstallError::Cancelled.kind(), ErrorKind::Cancelled);
        assert!(InstallError::Cancelled.is_cancelled());
        assert!(!InstallError::Network("x".into()).is_cancelled());
    }

    #[test]
    fn test_display_lists_every_path() {
        let err = InstallError::Integrity {
            failed: vec!["classes.dex".into(), "data/gta3.img".into()],
        };
        let text = err.to_string();
        assert!(text.contains("classes.dex"));
        assert!(text.contains("data/gta3.img"));

        let err = InstallError::InvalidArchive {
            missing: vec!["obb/data/gta3.img".into()],
        };
        assert!(err.to_string().contains("obb/data/gta3.img"));
    }

    #[test]
    fn test_extraction_error_names_entry() {
        let err = InstallError::extraction(
            "apk_files/classes.dex",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::Extraction);
        assert!(err.to_string().contains("apk_files/classes.dex"));
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::CorruptArchive).unwrap();
        assert_eq!(json, "\"corrupt_archive\"");
        assert_eq!(ErrorKind::InvalidArchive.to_string(), "invalid_archive");
    }
}
