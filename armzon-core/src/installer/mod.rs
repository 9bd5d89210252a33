//! Archive-based game installation.
//!
//! This module downloads a game archive, checks its structure, extracts it
//! into the install layout and verifies the result. The install root is
//! cleaned before extraction and cleaned again if a later step fails.
//!
//! # Architecture
//!
//! - `types`: Core types (RemoteSource, InstallationState, RequiredFileSpec)
//! - `error`: Error taxonomy and `ErrorKind`
//! - `events`: Progress and terminal events, event channel
//! - `paths`: Default install, staging and config locations
//! - `downloader`: Async download with progress reporting
//! - `archive`: Opening archives and structural validation
//! - `mapping`: Prefix rules and path traversal guard
//! - `extractor`: Extraction into the install layout
//! - `integrity`: Post-install verification
//! - `orchestrator`: High-level API sequencing the pipeline
//!
//! # Example
//!
//! ```ignore
//! use armzon_core::config::InstallerConfig;
//! use armzon_core::installer::{event_channel, InstallEvent, InstallationOrchestrator};
//!
//! let orchestrator = InstallationOrchestrator::new(InstallerConfig::load()?)?;
//! let (tx, mut rx) = event_channel();
//! let handle = orchestrator.start("https://example.com/game_archive.zip", tx)?;
//!
//! while let Some(event) = rx.recv().await {
//!     match event {
//!         InstallEvent::Progress(p) => println!("{}: {:?}", p.phase, p.percent),
//!         InstallEvent::Finished(outcome) => println!("{:?}", outcome),
//!     }
//! }
//! let outcome = handle.wait().await;
//! ```

pub mod archive;
pub mod downloader;
pub mod error;
pub mod events;
pub mod extractor;
pub mod integrity;
pub mod mapping;
pub mod orchestrator;
pub mod paths;
pub mod types;

// Re-export commonly used types
pub use archive::{missing_entries, open_validated, validate_structure, ArchiveEntry, ArchiveHandle};
pub use downloader::{DownloadProgress, DownloadSettings, Downloader, DEFAULT_USER_AGENT};
pub use error::{ErrorKind, InstallError};
pub use events::{
    event_channel, EventReceiver, EventSender, Failure, InstallEvent, Outcome, ProgressEvent,
};
pub use extractor::{
    extract_archive, make_executable, EntryProgress, ExtractOptions,
    DEFAULT_NATIVE_LIBRARY_EXTENSION,
};
pub use integrity::{verify, EntryResult, EntryStatus, VerificationReport, VerifyMode};
pub use mapping::{PathMapping, PathRule, Resolution, UnmatchedPolicy};
pub use orchestrator::{InstallHandle, InstallationOrchestrator};
pub use types::{InstallationState, RemoteSource, RequiredFileSpec};
