//! Progress reporting for the upload and run stages.
//!
//! Stages report what happened through a [`RunObserver`] instead of writing
//! to the console, so the reporting can be asserted on in tests.

use camino::Utf8PathBuf;

use crate::api::{ConfigurationStatus, RunStatus};
use crate::outcome::RunOutcome;

/// Progress notifications emitted while driving a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunEvent {
    /// The temporary variables file is about to be written.
    VariablesFileCreated {
        /// Location of the file.
        path: Utf8PathBuf,
    },
    /// The temporary variables file could not be removed.
    VariablesFileNotRemoved {
        /// Location of the file.
        path: Utf8PathBuf,
        /// Reason reported by the file system.
        message: String,
    },
    /// The configuration directory upload started.
    UploadStarted {
        /// Directory being uploaded.
        directory: Utf8PathBuf,
    },
    /// The upload request completed.
    UploadFinished,
    /// The configuration version reached a new processing status.
    ConfigurationStatusChanged {
        /// Newly observed status.
        status: ConfigurationStatus,
    },
    /// The configuration version is usable by runs.
    ConfigurationProcessed {
        /// Configuration version identifier.
        id: String,
    },
    /// The run was created.
    RunQueued {
        /// Run identifier.
        run_id: String,
        /// Browser URL of the run.
        url: String,
    },
    /// Waiting was skipped because the run would block on confirmation.
    WaitSkipped,
    /// The run reached a status not seen before.
    RunStatusChanged {
        /// Newly observed status.
        status: RunStatus,
    },
    /// The run reached a terminal status.
    RunFinished {
        /// Classification of the terminal status.
        outcome: RunOutcome,
    },
    /// Output values were read from the current state.
    OutputsFetched {
        /// Output names and values, sorted by name.
        outputs: Vec<(String, String)>,
    },
}

/// Receives [`RunEvent`]s.
pub trait RunObserver {
    /// Called once per event, in the order events occur.
    fn on_event(&self, event: &RunEvent);
}

impl<T: RunObserver + ?Sized> RunObserver for &T {
    fn on_event(&self, event: &RunEvent) {
        (**self).on_event(event);
    }
}

/// Remembers the last status seen so repeats across poll ticks are reported
/// once.
#[derive(Clone, Debug)]
pub struct DistinctStatus<T> {
    last: Option<T>,
}

impl<T: Clone + PartialEq> DistinctStatus<T> {
    /// Creates a tracker that has not seen any status.
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Records `status`, returning `true` when it differs from the previous
    /// one.
    pub fn observe(&mut self, status: &T) -> bool {
        if self.last.as_ref() == Some(status) {
            return false;
        }
        self.last = Some(status.clone());
        true
    }
}

impl<T: Clone + PartialEq> Default for DistinctStatus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer that forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn on_event(&self, event: &RunEvent) {
        match event {
            RunEvent::VariablesFileCreated { path } => {
                tracing::info!(%path, "creating temporary variables file");
            }
            RunEvent::VariablesFileNotRemoved { path, message } => {
                tracing::warn!(%path, %message, "could not remove temporary variables file");
            }
            RunEvent::UploadStarted { directory } => {
                tracing::info!(%directory, "uploading directory");
            }
            RunEvent::UploadFinished => tracing::info!("done uploading"),
            RunEvent::ConfigurationStatusChanged { status } => {
                tracing::debug!(%status, "configuration version status");
            }
            RunEvent::ConfigurationProcessed { id } => {
                tracing::info!(%id, "configuration version is uploaded and processed");
            }
            RunEvent::RunQueued { run_id, url } => {
                tracing::info!(%run_id, %url, "run has been queued; view it online at {url}");
            }
            RunEvent::WaitSkipped => {
                tracing::info!("auto apply isn't enabled, won't wait for completion");
            }
            RunEvent::RunStatusChanged { status } => tracing::info!("run status: {status}"),
            RunEvent::RunFinished { outcome } => match outcome {
                RunOutcome::PolicySoftFailed => tracing::warn!("{outcome}"),
                RunOutcome::Failed(_) => tracing::error!("{outcome}"),
                RunOutcome::PlannedAndFinished | RunOutcome::Applied => {
                    tracing::info!("{outcome}");
                }
            },
            RunEvent::OutputsFetched { outputs } => {
                tracing::info!(count = outputs.len(), "outputs from current state");
                for (name, value) in outputs {
                    tracing::info!(" - {name}: {value}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_status_reports_each_change_once() {
        let mut tracker = DistinctStatus::new();
        let sequence = [
            RunStatus::Pending,
            RunStatus::Pending,
            RunStatus::Applying,
            RunStatus::Applying,
            RunStatus::Applied,
        ];

        let reported: Vec<RunStatus> = sequence
            .iter()
            .filter(|status| tracker.observe(status))
            .cloned()
            .collect();

        assert_eq!(
            reported,
            vec![RunStatus::Pending, RunStatus::Applying, RunStatus::Applied]
        );
    }

    #[test]
    fn distinct_status_reports_returning_values() {
        let mut tracker = DistinctStatus::new();
        assert!(tracker.observe(&"a"));
        assert!(tracker.observe(&"b"));
        assert!(tracker.observe(&"a"));
        assert!(!tracker.observe(&"a"));
    }
}
