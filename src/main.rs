//! Binary entry point for the `tfe-run` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tfe_run::{
    ActionConfig, ActionError, ConfigError, GithubOutput, RunDriver, TfeClient, TfeError,
    TracingObserver, execute, resolve_workspace,
};

mod cli;

use cli::Cli;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("client error: {0}")]
    Client(#[source] TfeError),
    #[error(transparent)]
    Action(#[from] ActionError<TfeError>),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ActionConfig::load_without_cli_args()?;
    apply_overrides(&mut config, cli);
    config.validate()?;
    let options = config.run_options()?;

    let client = TfeClient::new(&config.hostname, &config.token).map_err(CliError::Client)?;
    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    let workspace = resolve_workspace(&client, &config.organization, &config.workspace).await?;
    tracing::debug!(
        id = %workspace.id,
        auto_apply = workspace.auto_apply,
        working_directory = %workspace.working_directory,
        "resolved workspace"
    );

    let driver = RunDriver::new(client, TracingObserver).with_hostname(web_host(&config.hostname));
    execute(
        driver,
        &workspace,
        &options,
        &GithubOutput::from_env(),
        &cancel,
    )
    .await?;
    Ok(())
}

fn apply_overrides(config: &mut ActionConfig, cli: Cli) {
    let Cli {
        organization,
        workspace,
        hostname,
        message,
        directory,
        run_type,
        targets,
        replacements,
        no_wait,
        tf_vars,
    } = cli;

    if let Some(value) = organization {
        config.organization = value;
    }
    if let Some(value) = workspace {
        config.workspace = value;
    }
    if let Some(value) = hostname {
        config.hostname = value;
    }
    if message.is_some() {
        config.message = message;
    }
    if let Some(value) = directory {
        config.directory = value;
    }
    if let Some(value) = run_type {
        config.run_type = value;
    }
    if !targets.is_empty() {
        config.targets = Some(targets.join("\n"));
    }
    if !replacements.is_empty() {
        config.replacements = Some(replacements.join("\n"));
    }
    if no_wait {
        config.wait_for_completion = Some(false);
    }
    if tf_vars.is_some() {
        config.tf_vars = tf_vars;
    }
}

/// Host name used in browser URLs.
fn web_host(hostname: &str) -> &str {
    let trimmed = hostname.trim().trim_end_matches('/');
    trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed)
}

fn cancel_on_shutdown(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("shutdown requested, no longer waiting; the remote run is not cancelled");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "could not install SIGTERM handler");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "Error: {err}").ok();
}
