//! End-to-end action flow: resolve the workspace, drive the run, fetch the
//! state outputs, and publish everything as step outputs.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::api::{RemoteApi, Workspace};
use crate::gha::{OutputSink, OutputSinkError};
use crate::observer::{RunEvent, RunObserver};
use crate::outputs::{OutputError, fetch_outputs};
use crate::run::{RunDriver, RunError, RunOptions, RunOutput};

/// Output holding the browser URL of the run.
pub const RUN_URL_OUTPUT: &str = "run-url";
/// Output holding `true` or `false` once completion was observed.
pub const HAS_CHANGES_OUTPUT: &str = "has-changes";
/// Output holding the raw terminal status once completion was observed.
pub const RUN_STATUS_OUTPUT: &str = "run-status";
/// Prefix applied to every state output name.
pub const STATE_OUTPUT_PREFIX: &str = "tf-";

/// Errors surfaced by [`execute`] and [`resolve_workspace`].
#[derive(Debug, Error)]
pub enum ActionError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the workspace cannot be resolved.
    #[error("could not read workspace {organization}/{name}: {source}")]
    Workspace {
        /// Organisation that was queried.
        organization: String,
        /// Workspace name that was queried.
        name: String,
        /// Client error.
        #[source]
        source: E,
    },
    /// Raised when the run step fails.
    #[error(transparent)]
    Run(#[from] RunError<E>),
    /// Raised when the outputs step fails.
    #[error(transparent)]
    Outputs(#[from] OutputError<E>),
    /// Raised when a step output cannot be written.
    #[error(transparent)]
    Sink(#[from] OutputSinkError),
}

/// Everything the action produced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActionReport {
    /// Result of the run step.
    pub run: RunOutput,
    /// Outputs read from the current state, by name.
    pub outputs: BTreeMap<String, String>,
}

/// Resolves the workspace once, before any other remote call.
///
/// # Errors
///
/// Returns [`ActionError::Workspace`] when the lookup fails.
pub async fn resolve_workspace<A>(
    api: &A,
    organization: &str,
    name: &str,
) -> Result<Workspace, ActionError<A::Error>>
where
    A: RemoteApi,
{
    api.read_workspace(organization, name)
        .await
        .map_err(|source| ActionError::Workspace {
            organization: organization.to_owned(),
            name: name.to_owned(),
            source,
        })
}

/// Observer wrapper that publishes the run URL as soon as the run exists.
struct PublishingObserver<'a, O, S> {
    inner: O,
    sink: &'a S,
    failure: Mutex<Option<OutputSinkError>>,
}

impl<O, S> PublishingObserver<'_, O, S> {
    fn take_failure(&self) -> Option<OutputSinkError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<O: RunObserver, S: OutputSink> RunObserver for PublishingObserver<'_, O, S> {
    fn on_event(&self, event: &RunEvent) {
        self.inner.on_event(event);
        if let RunEvent::RunQueued { url, .. } = event
            && let Err(err) = self.sink.set_output(RUN_URL_OUTPUT, url)
        {
            self.failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert(err);
        }
    }
}

/// Runs the run step and then the outputs step, publishing outputs to
/// `sink` as they become known.
///
/// `run-url` is published as soon as the run is created, so it is available
/// even when the wait later fails. The outputs step is attempted whenever
/// the run step succeeded, including when the wait was skipped.
///
/// # Errors
///
/// Returns [`ActionError::Run`] when the run step fails,
/// [`ActionError::Outputs`] when the outputs cannot be read, and
/// [`ActionError::Sink`] when an output cannot be written.
pub async fn execute<A, O, S>(
    driver: RunDriver<A, O>,
    workspace: &Workspace,
    options: &RunOptions,
    sink: &S,
    cancel: &CancellationToken,
) -> Result<ActionReport, ActionError<A::Error>>
where
    A: RemoteApi,
    O: RunObserver,
    S: OutputSink,
{
    let publishing = driver.map_observer(|inner| PublishingObserver {
        inner,
        sink,
        failure: Mutex::new(None),
    });

    let run = publishing.run(workspace, options, cancel).await?;
    if let Some(err) = publishing.observer().take_failure() {
        return Err(ActionError::Sink(err));
    }
    if let Some(has_changes) = run.has_changes {
        sink.set_output(HAS_CHANGES_OUTPUT, if has_changes { "true" } else { "false" })?;
    }
    if let Some(status) = &run.status {
        sink.set_output(RUN_STATUS_OUTPUT, status.as_str())?;
    }

    let outputs = fetch_outputs(publishing.api(), workspace).await?;
    publishing.observer().on_event(&RunEvent::OutputsFetched {
        outputs: outputs
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    });
    for (name, value) in &outputs {
        sink.set_output(&format!("{STATE_OUTPUT_PREFIX}{name}"), value)?;
    }

    Ok(ActionReport { run, outputs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RunStatus;
    use crate::run::RunKind;
    use crate::test_support::{
        MemoryOutputs, RecordingObserver, ScriptedApi, ScriptedApiError, ScriptedCall, workspace,
    };

    const STATE: &str = r#"{"outputs":{"endpoint":{"type":"string","value":"db.internal"},"port":{"type":"number","value":5432}}}"#;

    fn options(kind: RunKind) -> RunOptions {
        RunOptions {
            kind,
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn resolve_workspace_wraps_lookup_failures() {
        let api = ScriptedApi::new(workspace("", true));

        let err = resolve_workspace(&api, "acme", "unknown")
            .await
            .expect_err("unknown workspace should fail");

        assert_eq!(
            err.to_string(),
            "could not read workspace acme/unknown: resource not found"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_run_and_state_outputs() {
        let api = ScriptedApi::new(workspace("", true))
            .with_run_statuses([RunStatus::Planning, RunStatus::Applied])
            .with_has_changes(true)
            .with_state(STATE);
        let sink = MemoryOutputs::new();

        let report = execute(
            RunDriver::new(api.clone(), RecordingObserver::new()),
            &workspace("", true),
            &options(RunKind::Apply),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .expect("action should succeed");

        assert_eq!(report.outputs.len(), 2);
        assert_eq!(
            sink.outputs(),
            vec![
                (
                    String::from("run-url"),
                    String::from(
                        "https://app.terraform.io/app/acme/workspaces/networking/runs/run-1"
                    )
                ),
                (String::from("has-changes"), String::from("true")),
                (String::from("run-status"), String::from("applied")),
                (String::from("tf-endpoint"), String::from("db.internal")),
                (String::from("tf-port"), String::from("5432")),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_wait_still_fetches_outputs_without_has_changes() {
        let api = ScriptedApi::new(workspace("", false)).with_state(STATE);
        let sink = MemoryOutputs::new();

        execute(
            RunDriver::new(api.clone(), RecordingObserver::new()),
            &workspace("", false),
            &options(RunKind::Apply),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .expect("action should succeed");

        assert_eq!(sink.get(HAS_CHANGES_OUTPUT), None);
        assert_eq!(sink.get(RUN_STATUS_OUTPUT), None);
        assert_eq!(sink.get("tf-endpoint").as_deref(), Some("db.internal"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_run_still_publishes_the_url() {
        let api = ScriptedApi::new(workspace("", true))
            .with_run_statuses([RunStatus::Errored])
            .with_state(STATE);
        let sink = MemoryOutputs::new();

        let err = execute(
            RunDriver::new(api.clone(), RecordingObserver::new()),
            &workspace("", true),
            &options(RunKind::Apply),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .expect_err("errored run should fail");

        assert!(matches!(err, ActionError::Run(RunError::RunFailed { .. })));
        assert!(sink.get(RUN_URL_OUTPUT).is_some());
        assert_eq!(api.call_count(ScriptedCall::ReadStateVersion), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn output_failure_is_reported_separately_from_the_run() {
        let api = ScriptedApi::new(workspace("", true)).failing(
            ScriptedCall::ReadStateVersion,
            ScriptedApiError::Failure(String::from("500")),
        );
        let sink = MemoryOutputs::new();

        let err = execute(
            RunDriver::new(api.clone(), RecordingObserver::new()),
            &workspace("", true),
            &options(RunKind::Plan),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .expect_err("outputs step should fail");

        assert!(matches!(err, ActionError::Outputs(OutputError::ReadStateVersion(_))));
        assert_eq!(sink.get(RUN_STATUS_OUTPUT).as_deref(), Some("applied"));
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_for_run_url_is_surfaced() {
        let api = ScriptedApi::new(workspace("", true)).with_state(STATE);
        let sink = MemoryOutputs::failing_on(RUN_URL_OUTPUT);

        let err = execute(
            RunDriver::new(api.clone(), RecordingObserver::new()),
            &workspace("", true),
            &options(RunKind::Plan),
            &sink,
            &CancellationToken::new(),
        )
        .await
        .expect_err("sink failure should surface");

        assert!(matches!(err, ActionError::Sink(_)));
    }
}
