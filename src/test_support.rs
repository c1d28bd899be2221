//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::api::{
    ApiFuture, ConfigurationStatus, ConfigurationVersion, ConfigurationVersionRequest, RemoteApi,
    RemoteError, Run, RunRequest, RunStatus, StateVersion, Workspace,
};
use crate::gha::{OutputSink, OutputSinkError};
use crate::observer::{RunEvent, RunObserver};
use crate::process::{CommandOutput, CommandRunner, ProcessError};
use crate::upload::VARIABLES_FILE_NAME;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds a workspace fixture.
#[must_use]
pub fn workspace(working_directory: &str, auto_apply: bool) -> Workspace {
    Workspace {
        id: String::from("ws-test"),
        organization: String::from("acme"),
        name: String::from("networking"),
        working_directory: working_directory.to_owned(),
        auto_apply,
    }
}

/// Error produced by [`ScriptedApi`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedApiError {
    /// Simulates a 404 answer.
    #[error("resource not found")]
    NotFound,
    /// Simulates any other failure.
    #[error("scripted failure: {0}")]
    Failure(String),
}

impl RemoteError for ScriptedApiError {
    fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Operation a [`ScriptedApi`] can be told to fail.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ScriptedCall {
    /// [`RemoteApi::read_workspace`].
    ReadWorkspace,
    /// [`RemoteApi::create_configuration_version`].
    CreateConfigurationVersion,
    /// [`RemoteApi::upload_configuration`].
    Upload,
    /// [`RemoteApi::read_configuration_version`].
    ReadConfigurationVersion,
    /// [`RemoteApi::create_run`].
    CreateRun,
    /// [`RemoteApi::read_run`].
    ReadRun,
    /// [`RemoteApi::read_current_state_version`].
    ReadStateVersion,
    /// [`RemoteApi::download_state`].
    DownloadState,
}

/// What the service saw when the directory was uploaded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadRecord {
    /// Configuration version the upload targeted.
    pub configuration_version_id: String,
    /// Uploaded directory.
    pub directory: Utf8PathBuf,
    /// Contents of the variables file at upload time, if present.
    pub variables: Option<String>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    workspace: Option<Workspace>,
    configuration_statuses: VecDeque<ConfigurationStatus>,
    configuration_error: Option<(String, String)>,
    run_statuses: VecDeque<RunStatus>,
    has_changes: bool,
    state: Option<Vec<u8>>,
    failures: Vec<(ScriptedCall, ScriptedApiError)>,
    calls: Vec<ScriptedCall>,
    configuration_requests: Vec<ConfigurationVersionRequest>,
    run_requests: Vec<RunRequest>,
    uploads: Vec<UploadRecord>,
}

impl ScriptedState {
    fn record(&mut self, call: ScriptedCall) -> Result<(), ScriptedApiError> {
        self.calls.push(call);
        match self.failures.iter().find(|(failing, _)| *failing == call) {
            Some((_, err)) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Pops the next scripted value, repeating the last one once the queue is
/// down to a single entry.
fn next_status<T: Clone>(queue: &mut VecDeque<T>, fallback: T) -> T {
    if queue.len() > 1 {
        queue.pop_front().unwrap_or(fallback)
    } else {
        queue.front().cloned().unwrap_or(fallback)
    }
}

/// Scripted [`RemoteApi`] that replays status sequences and records every
/// request it receives.
///
/// Configuration versions are reported as `uploaded` and runs as `applied`
/// unless other statuses are scripted.
#[derive(Clone, Debug, Default)]
pub struct ScriptedApi {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedApi {
    /// Creates an API that knows a single workspace.
    #[must_use]
    pub fn new(workspace: Workspace) -> Self {
        let api = Self::default();
        lock(&api.state).workspace = Some(workspace);
        api
    }

    /// Scripts the statuses returned by successive configuration version
    /// reads.
    #[must_use]
    pub fn with_configuration_statuses(
        self,
        statuses: impl IntoIterator<Item = ConfigurationStatus>,
    ) -> Self {
        lock(&self.state).configuration_statuses = statuses.into_iter().collect();
        self
    }

    /// Sets the error reported alongside an `errored` configuration version.
    #[must_use]
    pub fn with_configuration_error(self, code: &str, message: &str) -> Self {
        lock(&self.state).configuration_error = Some((code.to_owned(), message.to_owned()));
        self
    }

    /// Scripts the statuses returned by successive run reads.
    #[must_use]
    pub fn with_run_statuses(self, statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        lock(&self.state).run_statuses = statuses.into_iter().collect();
        self
    }

    /// Sets the `has-changes` flag reported for the run.
    #[must_use]
    pub fn with_has_changes(self, has_changes: bool) -> Self {
        lock(&self.state).has_changes = has_changes;
        self
    }

    /// Sets the raw state document served for the workspace.
    #[must_use]
    pub fn with_state(self, state: impl Into<Vec<u8>>) -> Self {
        lock(&self.state).state = Some(state.into());
        self
    }

    /// Makes every call of `call` fail with `err`.
    #[must_use]
    pub fn failing(self, call: ScriptedCall, err: ScriptedApiError) -> Self {
        lock(&self.state).failures.push((call, err));
        self
    }

    /// Returns every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ScriptedCall> {
        lock(&self.state).calls.clone()
    }

    /// Returns how often `call` was made.
    #[must_use]
    pub fn call_count(&self, call: ScriptedCall) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|made| **made == call)
            .count()
    }

    /// Returns the configuration version requests received.
    #[must_use]
    pub fn configuration_requests(&self) -> Vec<ConfigurationVersionRequest> {
        lock(&self.state).configuration_requests.clone()
    }

    /// Returns the run requests received.
    #[must_use]
    pub fn run_requests(&self) -> Vec<RunRequest> {
        lock(&self.state).run_requests.clone()
    }

    /// Returns the uploads received.
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadRecord> {
        lock(&self.state).uploads.clone()
    }

    fn working_directory(&self) -> String {
        lock(&self.state)
            .workspace
            .as_ref()
            .map(|workspace| workspace.working_directory.clone())
            .unwrap_or_default()
    }
}

fn read_variables(directory: &Utf8Path, working_directory: &str) -> Option<String> {
    let dir = Dir::open_ambient_dir(
        directory.join(working_directory.trim_start_matches('/')),
        ambient_authority(),
    )
    .ok()?;
    dir.read_to_string(VARIABLES_FILE_NAME).ok()
}

impl RemoteApi for ScriptedApi {
    type Error = ScriptedApiError;

    fn read_workspace<'a>(
        &'a self,
        organization: &'a str,
        name: &'a str,
    ) -> ApiFuture<'a, Workspace, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(ScriptedCall::ReadWorkspace)?;
            state
                .workspace
                .clone()
                .filter(|workspace| workspace.organization == organization && workspace.name == name)
                .ok_or(ScriptedApiError::NotFound)
        })
    }

    fn create_configuration_version<'a>(
        &'a self,
        workspace: &'a Workspace,
        request: ConfigurationVersionRequest,
    ) -> ApiFuture<'a, ConfigurationVersion, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(ScriptedCall::CreateConfigurationVersion)?;
            state.configuration_requests.push(request);
            let id = format!("cv-{}", state.configuration_requests.len());
            Ok(ConfigurationVersion {
                upload_url: format!("https://archivist.test/{}/{id}", workspace.id),
                id,
                status: ConfigurationStatus::Pending,
                error: None,
                error_message: None,
            })
        })
    }

    fn upload_configuration<'a>(
        &'a self,
        version: &'a ConfigurationVersion,
        directory: &'a Utf8Path,
    ) -> ApiFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let variables = read_variables(directory, &self.working_directory());
            let mut state = lock(&self.state);
            state.uploads.push(UploadRecord {
                configuration_version_id: version.id.clone(),
                directory: directory.to_path_buf(),
                variables,
            });
            state.record(ScriptedCall::Upload)
        })
    }

    fn read_configuration_version<'a>(
        &'a self,
        id: &'a str,
    ) -> ApiFuture<'a, ConfigurationVersion, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(ScriptedCall::ReadConfigurationVersion)?;
            let status = next_status(
                &mut state.configuration_statuses,
                ConfigurationStatus::Uploaded,
            );
            let (error, error_message) = match (&status, &state.configuration_error) {
                (ConfigurationStatus::Errored, Some((code, message))) => {
                    (Some(code.clone()), Some(message.clone()))
                }
                _ => (None, None),
            };
            Ok(ConfigurationVersion {
                id: id.to_owned(),
                upload_url: String::new(),
                status,
                error,
                error_message,
            })
        })
    }

    fn create_run<'a>(&'a self, request: &'a RunRequest) -> ApiFuture<'a, Run, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(ScriptedCall::CreateRun)?;
            state.run_requests.push(request.clone());
            Ok(Run {
                id: format!("run-{}", state.run_requests.len()),
                status: RunStatus::Pending,
                has_changes: false,
            })
        })
    }

    fn read_run<'a>(&'a self, id: &'a str) -> ApiFuture<'a, Run, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(ScriptedCall::ReadRun)?;
            let status = next_status(&mut state.run_statuses, RunStatus::Applied);
            Ok(Run {
                id: id.to_owned(),
                status,
                has_changes: state.has_changes,
            })
        })
    }

    fn read_current_state_version<'a>(
        &'a self,
        workspace: &'a Workspace,
    ) -> ApiFuture<'a, StateVersion, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(ScriptedCall::ReadStateVersion)?;
            if state.state.is_none() {
                return Err(ScriptedApiError::NotFound);
            }
            Ok(StateVersion {
                id: String::from("sv-1"),
                download_url: format!("https://archivist.test/{}/state", workspace.id),
            })
        })
    }

    fn download_state<'a>(
        &'a self,
        _version: &'a StateVersion,
    ) -> ApiFuture<'a, Vec<u8>, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(ScriptedCall::DownloadState)?;
            state.state.clone().ok_or(ScriptedApiError::NotFound)
        })
    }
}

/// Observer that keeps every event for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<RunEvent>>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        lock(&self.events).clone()
    }

    /// Returns the run statuses reported, in order.
    #[must_use]
    pub fn run_statuses(&self) -> Vec<RunStatus> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                RunEvent::RunStatusChanged { status } => Some(status.clone()),
                _ => None,
            })
            .collect()
    }
}

impl RunObserver for RecordingObserver {
    fn on_event(&self, event: &RunEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Output sink that keeps outputs in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryOutputs {
    outputs: Arc<Mutex<Vec<(String, String)>>>,
    fail_on: Option<String>,
}

impl MemoryOutputs {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that rejects the named output.
    #[must_use]
    pub fn failing_on(name: &str) -> Self {
        Self {
            outputs: Arc::default(),
            fail_on: Some(name.to_owned()),
        }
    }

    /// Returns every output written, in order.
    #[must_use]
    pub fn outputs(&self) -> Vec<(String, String)> {
        lock(&self.outputs).clone()
    }

    /// Returns the last value written for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        lock(&self.outputs)
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }
}

impl OutputSink for MemoryOutputs {
    fn set_output(&self, name: &str, value: &str) -> Result<(), OutputSinkError> {
        if self.fail_on.as_deref() == Some(name) {
            return Err(OutputSinkError::Stdout {
                name: name.to_owned(),
                source: std::io::Error::other("scripted sink failure"),
            });
        }
        lock(&self.outputs).push((name.to_owned(), value.to_owned()));
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct ScriptedResponse {
    output: CommandOutput,
    artifact: Option<Vec<u8>>,
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// A response may carry an artifact, written to the path following `-czf`
/// the way `tar` would.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status that produces `artifact`.
    pub fn push_archive(&self, artifact: impl Into<Vec<u8>>) {
        lock(&self.responses).push_back(ScriptedResponse {
            output: CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            },
            artifact: Some(artifact.into()),
        });
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        lock(&self.responses).push_back(ScriptedResponse {
            output: CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.into(),
            },
            artifact: None,
        });
    }
}

fn write_artifact(args: &[OsString], contents: &[u8]) {
    let Some(target) = args
        .iter()
        .skip_while(|arg| arg.as_os_str() != "-czf")
        .nth(1)
        .and_then(|arg| arg.to_str())
    else {
        return;
    };
    let path = Utf8Path::new(target);
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return;
    };
    if let Ok(dir) = Dir::open_ambient_dir(parent, ambient_authority()) {
        dir.write(name, contents).ok();
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, ProcessError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        let response = lock(&self.responses)
            .pop_front()
            .ok_or_else(|| ProcessError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })?;
        if let Some(artifact) = &response.artifact {
            write_artifact(args, artifact);
        }
        Ok(response.output)
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    ///
    /// `None` values remove the variable for the lifetime of the guard.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(new_value) => env::set_var(key, new_value),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
