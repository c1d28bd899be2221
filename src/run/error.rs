//! Error types for the upload and run stages.

use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::api::{ApiError, RunStatus};
use crate::poll::PollError;

/// Which of the two waits a timeout or cancellation interrupted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitStage {
    /// Waiting for an uploaded configuration version to be processed.
    ConfigurationProcessing,
    /// Waiting for a run to reach a terminal status.
    RunCompletion,
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationProcessing => f.write_str("configuration version processing"),
            Self::RunCompletion => f.write_str("run completion"),
        }
    }
}

/// Raised when a run kind is not one of `plan`, `apply` or `destroy`.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("type \"{0}\" is not supported, must be plan, apply or destroy")]
pub struct UnknownRunKind(pub String);

/// Errors surfaced while uploading configuration and driving a run.
#[derive(Debug, Error)]
pub enum RunError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the temporary variables file cannot be written.
    #[error("could not create {path}: {source}")]
    VariablesFile {
        /// Location of the variables file.
        path: Utf8PathBuf,
        /// Underlying file system error.
        #[source]
        source: std::io::Error,
    },
    /// Raised when configuration version creation answers "not found",
    /// which the service does when the token cannot upload.
    #[error(
        "could not create configuration version (404 not found), this might happen if you are not using a user or team API token"
    )]
    MissingUploadPermission(#[source] E),
    /// Raised when configuration version creation fails.
    #[error("could not create a new configuration version: {0}")]
    CreateConfigurationVersion(#[source] E),
    /// Raised when the directory upload fails.
    #[error("could not upload directory '{directory}': {source}")]
    Upload {
        /// Directory that was being uploaded.
        directory: Utf8PathBuf,
        /// Client error.
        #[source]
        source: E,
    },
    /// Raised when re-reading the configuration version fails.
    #[error("could not get current configuration version: {0}")]
    ReadConfigurationVersion(#[source] E),
    /// Raised when the service reports that processing the upload failed.
    #[error("configuration version {id} errored: {error} - {message}")]
    ConfigurationErrored {
        /// Configuration version identifier.
        id: String,
        /// Error code reported by the service.
        error: String,
        /// Error message reported by the service.
        message: String,
    },
    /// Raised when the service archived the configuration version before
    /// it could be used.
    #[error("configuration version {id} was archived before processing finished")]
    ConfigurationArchived {
        /// Configuration version identifier.
        id: String,
    },
    /// Raised when the run request is incomplete.
    #[error("invalid run request: {0}")]
    Request(#[from] ApiError),
    /// Raised when run creation fails.
    #[error("could not create run: {0}")]
    CreateRun(#[source] E),
    /// Raised when re-reading the run fails.
    #[error("could not read run: {0}")]
    ReadRun(#[source] E),
    /// Raised when a wait exceeds its budget. The remote operation keeps
    /// running.
    #[error("timed out after {}s waiting for {stage}", timeout.as_secs())]
    Timeout {
        /// Wait that timed out.
        stage: WaitStage,
        /// Budget that was exceeded.
        timeout: Duration,
    },
    /// Raised when the caller cancelled a wait.
    #[error("cancelled while waiting for {stage}")]
    Cancelled {
        /// Wait that was interrupted.
        stage: WaitStage,
    },
    /// Raised when the run finished in a failure status.
    #[error("run {run_id} finished with status {status}")]
    RunFailed {
        /// Run identifier.
        run_id: String,
        /// Terminal status, rendered with spaces.
        status: RunStatus,
    },
}

impl<E> RunError<E>
where
    E: std::error::Error + 'static,
{
    /// Converts a polling failure into the matching run error.
    pub(crate) fn from_poll(err: PollError<Self>, stage: WaitStage) -> Self {
        match err {
            PollError::Timeout { timeout } => Self::Timeout { stage, timeout },
            PollError::Cancelled => Self::Cancelled { stage },
            PollError::Operation(inner) => inner,
        }
    }

    /// Returns `true` when a wait budget was exceeded.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` when a wait was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
