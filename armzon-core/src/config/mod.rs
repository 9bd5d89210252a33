//! Configuration module for the installer.
//!
//! Manages installer settings stored as a JSON file.

mod settings;

pub use settings::{default_archive_manifest, default_install_manifest, InstallerConfig};
