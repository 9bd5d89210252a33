//! Events streamed from an installation to its observer.
//!
//! An installation emits a sequence of [`InstallEvent::Progress`] values
//! followed by exactly one [`InstallEvent::Finished`]. Percent values never
//! decrease over a run.

use tokio::sync::mpsc;
use tracing::debug;

use super::error::{ErrorKind, InstallError};
use super::integrity::VerificationReport;
use super::types::InstallationState;

// =============================================================================
// Events
// =============================================================================

/// A progress update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Phase the update belongs to.
    pub phase: InstallationState,
    /// Overall progress (0 to 100), or `None` when the phase cannot tell.
    pub percent: Option<u8>,
    /// Human-readable status line.
    pub message: String,
}

/// Details of a failed installation.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// Phase that was running when the failure happened.
    pub phase: InstallationState,
    /// Machine-checkable error kind.
    pub kind: ErrorKind,
    /// Human-readable cause.
    pub detail: String,
    /// Full per-entry report when the integrity check failed.
    pub report: Option<VerificationReport>,
}

/// How an installation attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Every required file is in place.
    Complete,
    /// The attempt failed and was rolled back.
    Failed(Failure),
    /// The attempt was cancelled and rolled back.
    Cancelled { phase: InstallationState },
}

impl Outcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Builds the terminal outcome for an error raised during `phase`.
    pub fn from_error(
        phase: InstallationState,
        err: &InstallError,
        report: Option<VerificationReport>,
    ) -> Self {
        if err.is_cancelled() {
            return Self::Cancelled { phase };
        }
        Self::Failed(Failure {
            phase,
            kind: err.kind(),
            detail: err.to_string(),
            report,
        })
    }
}

/// Events sent from the orchestrator to its observer.
#[derive(Debug, Clone, PartialEq)]
pub enum InstallEvent {
    Progress(ProgressEvent),
    Finished(Outcome),
}

// =============================================================================
// Channel Types
// =============================================================================

/// Sender for installation events.
pub type EventSender = mpsc::UnboundedSender<InstallEvent>;

/// Receiver for installation events.
pub type EventReceiver = mpsc::UnboundedReceiver<InstallEvent>;

/// Create an event channel for streaming installation events.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// =============================================================================
// Emitter
// =============================================================================

/// Wraps an [`EventSender`] and holds the ordering contract: percent never
/// regresses and at most one `Finished` goes out.
#[derive(Debug, Clone)]
pub(crate) struct EventEmitter {
    sender: EventSender,
    last_percent: u8,
    finished: bool,
}

impl EventEmitter {
    pub(crate) fn new(sender: EventSender) -> Self {
        Self {
            sender,
            last_percent: 0,
            finished: false,
        }
    }

    pub(crate) fn progress(
        &mut self,
        phase: InstallationState,
        percent: Option<u8>,
        message: impl Into<String>,
    ) {
        if self.finished {
            return;
        }
        let percent = percent.map(|p| {
            let p = p.min(100).max(self.last_percent);
            self.last_percent = p;
            p
        });
        // Receiver may be gone; the installation carries on regardless.
        let _ = self.sender.send(InstallEvent::Progress(ProgressEvent {
            phase,
            percent,
            message: message.into(),
        }));
    }

    pub(crate) fn finish(&mut self, outcome: Outcome) {
        if self.finished {
            debug!("Ignoring second terminal event: {:?}", outcome);
            return;
        }
        self.finished = true;
        let _ = self.sender.send(InstallEvent::Finished(outcome));
    }
}
