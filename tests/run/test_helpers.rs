//! Shared fixtures for run BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::fixture;
use tempfile::TempDir;
use thiserror::Error;
use tfe_run::test_support::{MemoryOutputs, RecordingObserver, ScriptedApi, workspace};
use tfe_run::{ActionReport, PollPolicy, RunOptions, Workspace};

/// Poll quickly so scenarios finish in real time.
pub const FAST_POLL: PollPolicy =
    PollPolicy::new(Duration::from_millis(1), Duration::from_secs(5));

#[derive(Clone, Debug)]
pub struct RunContext {
    pub api: ScriptedApi,
    pub observer: RecordingObserver,
    pub sink: MemoryOutputs,
    pub workspace: Workspace,
    pub options: RunOptions,
    pub directory: Utf8PathBuf,
    pub outcome: Option<RunResult>,
    pub(crate) directory_tmp: Arc<TempDir>,
}

#[derive(Clone, Debug)]
pub enum RunResult {
    Success(ActionReport),
    Failure(String),
}

#[derive(Clone, Debug, Error)]
pub enum RunTestError {
    #[error("failed to create configuration directory: {0}")]
    Directory(String),
}

#[fixture]
pub fn run_context_result() -> Result<RunContext, RunTestError> {
    build_run_context()
}

#[fixture]
pub fn run_context(run_context_result: Result<RunContext, RunTestError>) -> RunContext {
    run_context_result.unwrap_or_else(|err| panic!("run context fixture should initialise: {err}"))
}

pub fn build_run_context() -> Result<RunContext, RunTestError> {
    let tmp_dir =
        TempDir::new().map_err(|err| RunTestError::Directory(format!("tempdir: {err}")))?;
    let directory = Utf8PathBuf::from_path_buf(tmp_dir.path().to_path_buf()).map_err(|path| {
        RunTestError::Directory(format!("non-utf8 tempdir path: {}", path.display()))
    })?;
    std::fs::write(directory.join("main.tf"), "terraform {}\n")
        .map_err(|err| RunTestError::Directory(format!("main.tf: {err}")))?;

    let ws = workspace("", true);
    Ok(RunContext {
        api: ScriptedApi::new(ws.clone()).with_state(r#"{"version":4,"outputs":{}}"#),
        observer: RecordingObserver::new(),
        sink: MemoryOutputs::new(),
        workspace: ws,
        options: RunOptions {
            directory: Some(directory.clone()),
            ..RunOptions::default()
        },
        directory,
        outcome: None,
        directory_tmp: Arc::new(tmp_dir),
    })
}

/// Browser URL the scripted service assigns to the first run.
pub fn expected_run_url(context: &RunContext) -> String {
    format!(
        "https://app.terraform.io/app/{}/workspaces/{}/runs/run-1",
        context.workspace.organization, context.workspace.name
    )
}
