//! Behavioural tests for the `tfe-run` CLI entrypoint.
//!
//! Every case fails during configuration validation, before any request is
//! sent.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

fn isolated_command(home: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tfe-run");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .env_remove("TFE_RUN_CONFIG_PATH")
        .env_remove("TFE_RUN_RUN_TYPE")
        .env_remove("GITHUB_OUTPUT")
        .env("TFE_RUN_TOKEN", "user-token")
        .env("TFE_RUN_ORGANIZATION", "acme")
        .env("TFE_RUN_WORKSPACE", "networking");
    cmd
}

fn temp_home() -> TempDir {
    TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"))
}

#[test]
fn cli_rejects_unknown_run_type() {
    let home = temp_home();
    let mut cmd = isolated_command(&home);
    cmd.args(["--type", "refresh"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("type \"refresh\" is not supported"));
}

#[test]
fn cli_reports_missing_token() {
    let home = temp_home();
    let mut cmd = isolated_command(&home);
    cmd.env_remove("TFE_RUN_TOKEN");

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("TFE_RUN_TOKEN"));
}

#[test]
fn cli_reads_project_configuration_file() {
    let home = temp_home();
    std::fs::write(home.path().join("tfe-run.toml"), "run_type = \"import\"\n")
        .unwrap_or_else(|err| panic!("write project configuration: {err}"));
    let mut cmd = isolated_command(&home);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("type \"import\" is not supported"));
}

#[test]
fn cli_help_lists_run_flags() {
    let mut cmd = cargo_bin_cmd!("tfe-run");
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(contains("--type"))
        .stdout(contains("--no-wait"))
        .stdout(contains("--tf-vars"));
}
