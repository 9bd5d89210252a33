//! Armzon Core Library
//!
//! This crate provides the game installer used by the Armzon launcher. It
//! includes:
//!
//! - Archive download with progress reporting and cancellation
//! - Structural validation of the downloaded archive
//! - Extraction with prefix remapping and a path traversal guard
//! - Post-install integrity verification
//! - An orchestrator that sequences the pipeline and rolls back on failure
//! - Configuration management (JSON settings, manifests, path rules)

pub mod config;
pub mod installer;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenience
pub use config::InstallerConfig;

// Re-export installer
pub use installer::{
    event_channel, ErrorKind, EventReceiver, EventSender, InstallError, InstallEvent,
    InstallHandle, InstallationOrchestrator, InstallationState, Outcome, ProgressEvent,
    RequiredFileSpec, VerificationReport,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
