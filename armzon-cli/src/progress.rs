//! Terminal rendering of installation events.

use anyhow::Result;
use armzon_core::{InstallEvent, Outcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Renders the event stream of one installation as a single progress bar.
pub struct InstallProgress {
    bar: ProgressBar,
}

impl InstallProgress {
    /// Creates the bar; a hidden bar when `enabled` is false.
    pub fn new(enabled: bool) -> Result<Self> {
        if !enabled {
            return Ok(Self {
                bar: ProgressBar::hidden(),
            });
        }

        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {prefix:>11} {wide_msg}")?
                .progress_chars("#>-"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Ok(Self { bar })
    }

    pub fn handle(&self, event: &InstallEvent) {
        match event {
            InstallEvent::Progress(progress) => {
                self.bar.set_prefix(progress.phase.to_string());
                if let Some(percent) = progress.percent {
                    self.bar.set_position(u64::from(percent));
                }
                self.bar.set_message(progress.message.clone());
            }
            InstallEvent::Finished(Outcome::Complete) => {
                self.bar.finish_with_message("Installation complete");
            }
            InstallEvent::Finished(Outcome::Cancelled { phase }) => {
                self.bar
                    .abandon_with_message(format!("Cancelled during {}", phase));
            }
            InstallEvent::Finished(Outcome::Failed(failure)) => {
                self.bar
                    .abandon_with_message(format!("Failed during {}: {}", failure.phase, failure.detail));
            }
        }
    }
}

/// Helper to format bytes for display
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armzon_core::{InstallationState, ProgressEvent};

    #[test]
    fn test_hidden_bar_tracks_percent() {
        let progress = InstallProgress::new(false).unwrap();
        progress.handle(&InstallEvent::Progress(ProgressEvent {
            phase: InstallationState::Extracting,
            percent: Some(55),
            message: "Extracting classes.dex".to_string(),
        }));
        assert_eq!(progress.bar.position(), 55);

        // Indeterminate updates keep the last position.
        progress.handle(&InstallEvent::Progress(ProgressEvent {
            phase: InstallationState::Extracting,
            percent: None,
            message: String::new(),
        }));
        assert_eq!(progress.bar.position(), 55);

        progress.handle(&InstallEvent::Finished(Outcome::Complete));
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(6_000_000), "5.72 MB");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2.00 GB");
    }
}
