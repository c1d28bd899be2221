//! BDD step definitions for the run workflow.

use rstest_bdd_macros::{given, then, when};
use tfe_run::test_support::ScriptedCall;
use tfe_run::upload::VARIABLES_FILE_NAME;
use tfe_run::{ConfigurationStatus, RunDriver, RunEvent, RunKind, RunStatus, execute};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{FAST_POLL, RunContext, RunResult, RunTestError, expected_run_url};

const STATE: &str = r#"{"version":4,"outputs":{"endpoint":{"type":"string","value":"db.internal"},"port":{"type":"number","value":5432}}}"#;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] RunTestError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a workspace with auto-apply \"{mode}\"")]
fn workspace_auto_apply(mut run_context: RunContext, mode: String) -> RunContext {
    run_context.workspace.auto_apply = mode.trim() == "enabled";
    run_context
}

#[given("the run passes through \"{first}\" before ending as \"{last}\"")]
fn run_statuses(mut run_context: RunContext, first: String, last: String) -> RunContext {
    run_context.api = run_context.api.with_run_statuses([
        RunStatus::Pending,
        RunStatus::from(first.as_str()),
        RunStatus::from(last.as_str()),
    ]);
    run_context
}

#[given("the run has changes")]
fn run_has_changes(mut run_context: RunContext) -> RunContext {
    run_context.api = run_context.api.with_has_changes(true);
    run_context
}

#[given("run variables \"{contents}\"")]
fn run_variables(mut run_context: RunContext, contents: String) -> RunContext {
    run_context.options.variables = Some(contents);
    run_context
}

#[given("the current state has outputs")]
fn state_outputs(mut run_context: RunContext) -> RunContext {
    run_context.api = run_context.api.with_state(STATE);
    run_context
}

#[given("configuration processing fails with \"{code}\"")]
fn configuration_fails(mut run_context: RunContext, code: String) -> RunContext {
    run_context.api = run_context
        .api
        .with_configuration_statuses([ConfigurationStatus::Pending, ConfigurationStatus::Errored])
        .with_configuration_error(&code, "unable to parse main.tf");
    run_context
}

#[when("I execute a \"{kind}\" run")]
fn execute_run(mut run_context: RunContext, kind: String) -> Result<RunContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    run_context.options.kind = kind
        .trim()
        .parse::<RunKind>()
        .map_err(|err| StepError::Assertion(err.to_string()))?;

    let driver = RunDriver::new(run_context.api.clone(), run_context.observer.clone())
        .with_upload_policy(FAST_POLL)
        .with_run_policy(FAST_POLL);
    let result = runtime.block_on(execute(
        driver,
        &run_context.workspace,
        &run_context.options,
        &run_context.sink,
        &CancellationToken::new(),
    ));

    run_context.outcome = Some(match result {
        Ok(report) => RunResult::Success(report),
        Err(err) => RunResult::Failure(err.to_string()),
    });
    Ok(run_context)
}

#[then("the action succeeds")]
fn action_succeeds(run_context: &RunContext) -> Result<(), StepError> {
    match &run_context.outcome {
        Some(RunResult::Success(_)) => Ok(()),
        Some(RunResult::Failure(message)) => Err(StepError::Assertion(format!(
            "expected success, action failed: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("action did not run"))),
    }
}

#[then("the action fails with \"{fragment}\"")]
fn action_fails(run_context: &RunContext, fragment: String) -> Result<(), StepError> {
    match &run_context.outcome {
        Some(RunResult::Failure(message)) if message.contains(fragment.trim()) => Ok(()),
        Some(RunResult::Failure(message)) => Err(StepError::Assertion(format!(
            "error `{message}` does not mention `{fragment}`"
        ))),
        Some(RunResult::Success(report)) => Err(StepError::Assertion(format!(
            "expected failure, action succeeded: {report:?}"
        ))),
        None => Err(StepError::Assertion(String::from("action did not run"))),
    }
}

#[then("the step output \"{name}\" is \"{value}\"")]
fn step_output_is(run_context: &RunContext, name: String, value: String) -> Result<(), StepError> {
    let actual = run_context.sink.get(&name);
    if actual.as_deref() == Some(value.as_str()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected output {name}={value}, found {actual:?}"
        )))
    }
}

#[then("the step output \"run-url\" points at the run")]
fn run_url_published(run_context: &RunContext) -> Result<(), StepError> {
    let expected = expected_run_url(run_context);
    let actual = run_context.sink.get("run-url");
    if actual.as_deref() == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected run-url {expected}, found {actual:?}"
        )))
    }
}

#[then("no step output \"{name}\" was published")]
fn step_output_absent(run_context: &RunContext, name: String) -> Result<(), StepError> {
    match run_context.sink.get(&name) {
        None => Ok(()),
        Some(value) => Err(StepError::Assertion(format!(
            "unexpected output {name}={value}"
        ))),
    }
}

#[then("the wait was skipped")]
fn wait_skipped(run_context: &RunContext) -> Result<(), StepError> {
    if run_context.observer.events().contains(&RunEvent::WaitSkipped) {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from(
            "expected the wait to be skipped",
        )))
    }
}

#[then("the run was never read")]
fn run_never_read(run_context: &RunContext) -> Result<(), StepError> {
    let reads = run_context.api.call_count(ScriptedCall::ReadRun);
    if reads == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("run was read {reads} times")))
    }
}

#[then("no run was created")]
fn no_run_created(run_context: &RunContext) -> Result<(), StepError> {
    if run_context.api.run_requests().is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from("a run was created")))
    }
}

#[then("the upload saw variables \"{contents}\"")]
fn upload_saw_variables(run_context: &RunContext, contents: String) -> Result<(), StepError> {
    let uploads = run_context.api.uploads();
    let Some(upload) = uploads.first() else {
        return Err(StepError::Assertion(String::from("nothing was uploaded")));
    };
    if upload.variables.as_deref() == Some(contents.as_str()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "upload saw variables {:?}",
            upload.variables
        )))
    }
}

#[then("no variables file remains in the directory")]
fn variables_file_removed(run_context: &RunContext) -> Result<(), StepError> {
    let path = run_context.directory.join(VARIABLES_FILE_NAME);
    if path.exists() {
        Err(StepError::Assertion(format!("{path} was left behind")))
    } else {
        Ok(())
    }
}
