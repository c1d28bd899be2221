//! BDD scenarios for the run workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{RunContext, run_context};

#[scenario(
    path = "tests/features/run.feature",
    name = "Speculative plan reports pending changes"
)]
fn scenario_plan_reports_changes(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "Apply without auto-apply does not wait"
)]
fn scenario_apply_skips_wait(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "Errored run fails the action after publishing its URL"
)]
fn scenario_errored_run(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "Soft-failed policy check is not a failure"
)]
fn scenario_soft_failed_policy(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "Variables file exists only while the upload runs"
)]
fn scenario_variables_file(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "State outputs are published with a prefix"
)]
fn scenario_state_outputs(run_context: RunContext) {
    let _ = run_context;
}

#[scenario(
    path = "tests/features/run.feature",
    name = "Configuration errors stop the action before a run exists"
)]
fn scenario_configuration_errors(run_context: RunContext) {
    let _ = run_context;
}
