// ABOUTME: Non-fatal warnings gathered while an execution runs.
// ABOUTME: Stages share one collector; the CLI prints what it holds once the run ends.

use parking_lot::Mutex;

/// What went wrong without failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Old task set survived every termination attempt; the deployment is parked in finalizing.
    StuckDeployment,
    /// Deploy lock file could not be removed.
    LockRelease,
    /// An artifact nobody consumes any more could not be released.
    ArtifactRelease,
}

impl WarningKind {
    /// Alerts need an operator; everything else is informational.
    pub fn is_alert(self) -> bool {
        matches!(self, WarningKind::StuckDeployment)
    }

    pub fn label(self) -> &'static str {
        if self.is_alert() { "ALERT" } else { "Warning" }
    }
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn stuck_deployment(message: impl Into<String>) -> Self {
        Self::new(WarningKind::StuckDeployment, message)
    }

    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    pub fn artifact_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::ArtifactRelease, message)
    }
}

/// Shared warning sink. Recording takes `&self` so stages can hold it behind an `Arc`.
#[derive(Debug, Default)]
pub struct Diagnostics {
    collected: Mutex<Vec<Warning>>,
}

impl Diagnostics {
    /// Log the warning and keep it for the end-of-run summary.
    pub fn warn(&self, warning: Warning) {
        if warning.kind.is_alert() {
            tracing::error!(kind = ?warning.kind, "{}", warning.message);
        } else {
            tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        }
        self.collected.lock().push(warning);
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.collected.lock().clone()
    }

    pub fn has_warnings(&self) -> bool {
        !self.collected.lock().is_empty()
    }
}
