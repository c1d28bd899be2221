//! Drives one Terraform Cloud run from upload to completion.
//!
//! The driver uploads the configuration, creates the run, and then decides
//! whether to wait. Runs that would stop for a human confirmation are never
//! waited on, and a wait that exceeds its budget returns locally without
//! cancelling the remote run.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tokio_util::sync::CancellationToken;

use crate::api::{RemoteApi, Run, RunRequest, RunStatus, Workspace};
use crate::observer::{DistinctStatus, RunEvent, RunObserver};
use crate::outcome::RunOutcome;
use crate::poll::{PollPolicy, poll_until};
use crate::upload::{CONFIGURATION_POLL_INTERVAL, CONFIGURATION_WAIT_TIMEOUT, UploadCoordinator};

mod error;

pub use error::{RunError, UnknownRunKind, WaitStage};

/// Host serving the Terraform Cloud web UI and API.
pub const DEFAULT_HOSTNAME: &str = "app.terraform.io";

/// Delay between run status checks.
pub const RUN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Budget for a run to reach a terminal status.
pub const RUN_WAIT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

const DEFAULT_DIRECTORY: &str = "./";

/// Kind of run to schedule.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RunKind {
    /// Speculative plan that can never be applied.
    Plan,
    /// Plan followed by an apply.
    #[default]
    Apply,
    /// Plan and apply that destroy every managed resource.
    Destroy,
}

impl RunKind {
    /// Returns `true` when the configuration version must be speculative.
    #[must_use]
    pub const fn is_speculative(self) -> bool {
        matches!(self, Self::Plan)
    }

    /// Returns `true` when the run destroys resources.
    #[must_use]
    pub const fn is_destroy(self) -> bool {
        matches!(self, Self::Destroy)
    }
}

impl FromStr for RunKind {
    type Err = UnknownRunKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "plan" => Ok(Self::Plan),
            "apply" => Ok(Self::Apply),
            "destroy" => Ok(Self::Destroy),
            other => Err(UnknownRunKind(other.to_owned())),
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plan => f.write_str("plan"),
            Self::Apply => f.write_str("apply"),
            Self::Destroy => f.write_str("destroy"),
        }
    }
}

/// Caller supplied options for a single run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOptions {
    /// Message used as the run title.
    pub message: Option<String>,
    /// Directory to upload; defaults to the current directory.
    pub directory: Option<Utf8PathBuf>,
    /// Kind of run to schedule.
    pub kind: RunKind,
    /// Resource addresses passed to `-target`. Empty means no targeting.
    pub target_addrs: Vec<String>,
    /// Resource addresses passed to `-replace`. Empty means no replacement.
    pub replace_addrs: Vec<String>,
    /// Whether to block until the run finishes.
    pub wait_for_completion: bool,
    /// Contents of a temporary `run.auto.tfvars` file.
    pub variables: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            message: None,
            directory: None,
            kind: RunKind::default(),
            target_addrs: Vec::new(),
            replace_addrs: Vec::new(),
            wait_for_completion: true,
            variables: None,
        }
    }
}

impl RunOptions {
    /// Directory that will be uploaded.
    #[must_use]
    pub fn directory(&self) -> &Utf8Path {
        self.directory
            .as_deref()
            .unwrap_or_else(|| Utf8Path::new(DEFAULT_DIRECTORY))
    }
}

/// Data produced by a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOutput {
    /// Browser URL of the run.
    pub run_url: String,
    /// Whether the run has changes. Only populated when completion was
    /// observed.
    pub has_changes: Option<bool>,
    /// Terminal status. Only populated when completion was observed.
    pub status: Option<RunStatus>,
    /// Classification of the terminal status. Only populated when
    /// completion was observed.
    pub outcome: Option<RunOutcome>,
}

/// Builds the browser URL of a run.
#[must_use]
pub fn run_url(hostname: &str, workspace: &Workspace, run_id: &str) -> String {
    format!(
        "https://{hostname}/app/{}/workspaces/{}/runs/{run_id}",
        workspace.organization, workspace.name
    )
}

/// Uploads configuration and drives a run through its lifecycle.
#[derive(Debug)]
pub struct RunDriver<A, O> {
    api: A,
    observer: O,
    hostname: String,
    upload_policy: PollPolicy,
    run_policy: PollPolicy,
}

impl<A, O> RunDriver<A, O>
where
    A: RemoteApi,
    O: RunObserver,
{
    /// Creates a driver for Terraform Cloud with the default wait policies.
    #[must_use]
    pub fn new(api: A, observer: O) -> Self {
        Self {
            api,
            observer,
            hostname: DEFAULT_HOSTNAME.to_owned(),
            upload_policy: PollPolicy::new(CONFIGURATION_POLL_INTERVAL, CONFIGURATION_WAIT_TIMEOUT),
            run_policy: PollPolicy::new(RUN_POLL_INTERVAL, RUN_WAIT_TIMEOUT),
        }
    }

    /// Overrides the host used in run URLs.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Overrides the configuration processing wait policy.
    #[must_use]
    pub const fn with_upload_policy(mut self, policy: PollPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    /// Overrides the run completion wait policy.
    #[must_use]
    pub const fn with_run_policy(mut self, policy: PollPolicy) -> Self {
        self.run_policy = policy;
        self
    }

    /// Replaces the observer, keeping every other setting.
    #[must_use]
    pub fn map_observer<P, F>(self, wrap: F) -> RunDriver<A, P>
    where
        P: RunObserver,
        F: FnOnce(O) -> P,
    {
        RunDriver {
            api: self.api,
            observer: wrap(self.observer),
            hostname: self.hostname,
            upload_policy: self.upload_policy,
            run_policy: self.run_policy,
        }
    }

    /// Returns the remote client.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Returns the observer receiving progress events.
    #[must_use]
    pub const fn observer(&self) -> &O {
        &self.observer
    }

    /// Uploads the configuration, creates a run and, when requested and
    /// safe, waits for it to finish.
    ///
    /// Waiting is skipped for non-plan runs on workspaces without
    /// auto-apply, since those stop for a human confirmation.
    ///
    /// # Errors
    ///
    /// Returns any upload error from [`UploadCoordinator`],
    /// [`RunError::CreateRun`] when the run cannot be created,
    /// [`RunError::Timeout`] or [`RunError::Cancelled`] when the wait is cut
    /// short, and [`RunError::RunFailed`] when the run finishes in a failure
    /// status.
    pub async fn run(
        &self,
        workspace: &Workspace,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, RunError<A::Error>> {
        let version = UploadCoordinator::new(&self.api, &self.observer)
            .with_policy(self.upload_policy)
            .upload_configuration(
                workspace,
                options.directory(),
                options.kind,
                options.variables.as_deref(),
                cancel,
            )
            .await?;

        let request = RunRequest::builder()
            .workspace_id(&workspace.id)
            .configuration_version_id(&version.id)
            .is_destroy(options.kind.is_destroy())
            .message(options.message.clone())
            .target_addrs(options.target_addrs.clone())
            .replace_addrs(options.replace_addrs.clone())
            .build()?;
        let run = self
            .api
            .create_run(&request)
            .await
            .map_err(RunError::CreateRun)?;

        let url = run_url(&self.hostname, workspace, &run.id);
        self.observer.on_event(&RunEvent::RunQueued {
            run_id: run.id.clone(),
            url: url.clone(),
        });

        let mut output = RunOutput {
            run_url: url,
            has_changes: None,
            status: None,
            outcome: None,
        };

        if !options.wait_for_completion {
            return Ok(output);
        }

        if !options.kind.is_speculative() && !workspace.auto_apply {
            self.observer.on_event(&RunEvent::WaitSkipped);
            return Ok(output);
        }

        let finished = self.wait_for_completion(run, cancel).await?;
        let outcome = RunOutcome::classify(&finished.status);
        self.observer.on_event(&RunEvent::RunFinished {
            outcome: outcome.clone(),
        });

        if outcome.is_failure() {
            return Err(RunError::RunFailed {
                run_id: finished.id,
                status: finished.status,
            });
        }

        output.has_changes = Some(finished.has_changes);
        output.status = Some(finished.status);
        output.outcome = Some(outcome);
        Ok(output)
    }

    async fn wait_for_completion(
        &self,
        run: Run,
        cancel: &CancellationToken,
    ) -> Result<Run, RunError<A::Error>> {
        let mut current = run;
        let mut seen = DistinctStatus::new();

        let waited = poll_until(cancel, self.run_policy, async || {
            let latest = match self.api.read_run(&current.id).await {
                Ok(latest) => latest,
                Err(err) => return Err(RunError::ReadRun(err)),
            };
            if seen.observe(&latest.status) {
                self.observer.on_event(&RunEvent::RunStatusChanged {
                    status: latest.status.clone(),
                });
            }
            let done = latest.status.is_terminal();
            current = latest;
            Ok(done)
        })
        .await;

        waited.map_err(|err| RunError::from_poll(err, WaitStage::RunCompletion))?;
        Ok(current)
    }
}
