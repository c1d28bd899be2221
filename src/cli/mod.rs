//! Command-line interface definitions for the `tfe-run` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `tfe-run` binary.
///
/// Every flag overrides the matching `TFE_RUN_*` environment variable or
/// `tfe-run.toml` key. The API token is only read from the environment or
/// the configuration file.
#[derive(Debug, Default, Parser)]
#[command(
    name = "tfe-run",
    about = "Upload a configuration to Terraform Cloud and drive a single run",
    version
)]
pub(crate) struct Cli {
    /// Organisation that owns the workspace.
    #[arg(long, value_name = "ORG")]
    pub(crate) organization: Option<String>,
    /// Workspace name.
    #[arg(long, value_name = "NAME")]
    pub(crate) workspace: Option<String>,
    /// Terraform Cloud or Enterprise host.
    #[arg(long, value_name = "HOST")]
    pub(crate) hostname: Option<String>,
    /// Run title shown in the web UI.
    #[arg(long, value_name = "TEXT")]
    pub(crate) message: Option<String>,
    /// Directory to upload.
    #[arg(long, value_name = "DIR")]
    pub(crate) directory: Option<String>,
    /// Run type: plan, apply or destroy.
    #[arg(long = "type", value_name = "TYPE")]
    pub(crate) run_type: Option<String>,
    /// Resource address to target; repeat for several.
    #[arg(long = "target", value_name = "ADDRESS")]
    pub(crate) targets: Vec<String>,
    /// Resource address to replace; repeat for several.
    #[arg(long = "replace", value_name = "ADDRESS")]
    pub(crate) replacements: Vec<String>,
    /// Return as soon as the run is queued.
    #[arg(long)]
    pub(crate) no_wait: bool,
    /// Contents of a temporary `run.auto.tfvars` file.
    #[arg(long, value_name = "HCL")]
    pub(crate) tf_vars: Option<String>,
}
