//! Core library for the `tfe-run` tool.
//!
//! The crate uploads a configuration directory to a Terraform Cloud
//! workspace, drives one run through its lifecycle (upload → process → run →
//! wait), classifies how it ended, and reads the resulting state outputs.
//! Remote access goes through the [`RemoteApi`] seam so every stage can be
//! exercised against a scripted double.

pub mod action;
pub mod api;
pub mod config;
pub mod gha;
pub mod observer;
pub mod outcome;
pub mod outputs;
pub mod poll;
pub mod process;
pub mod run;
pub mod test_support;
pub mod tfe;
pub mod upload;

pub use action::{ActionError, ActionReport, execute, resolve_workspace};
pub use api::{
    ConfigurationStatus, ConfigurationVersion, RemoteApi, RemoteError, Run, RunRequest,
    RunRequestBuilder, RunStatus, StateVersion, Workspace,
};
pub use config::{ActionConfig, ConfigError};
pub use gha::{GithubOutput, OutputSink, OutputSinkError};
pub use observer::{RunEvent, RunObserver, TracingObserver};
pub use outcome::RunOutcome;
pub use outputs::{OutputError, fetch_outputs};
pub use poll::{PollError, PollPolicy, poll_until};
pub use process::{CommandOutput, CommandRunner, ProcessCommandRunner, ProcessError};
pub use run::{RunDriver, RunError, RunKind, RunOptions, RunOutput, WaitStage};
pub use tfe::{TfeClient, TfeError};
pub use upload::{UploadCoordinator, VariablesFile};
