//! Classification of terminal run statuses.

use std::fmt;

use crate::api::RunStatus;

/// How a finished run ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// The plan finished and nothing will be applied.
    PlannedAndFinished,
    /// The run was applied.
    Applied,
    /// A soft-mandatory policy failed. The run stopped but this is not
    /// treated as an operation failure.
    PolicySoftFailed,
    /// Any other terminal status, including ones this client does not know.
    Failed(RunStatus),
}

impl RunOutcome {
    /// Classifies an observed terminal status.
    #[must_use]
    pub fn classify(status: &RunStatus) -> Self {
        match status {
            RunStatus::PlannedAndFinished => Self::PlannedAndFinished,
            RunStatus::Applied => Self::Applied,
            RunStatus::PolicySoftFailed => Self::PolicySoftFailed,
            other => Self::Failed(other.clone()),
        }
    }

    /// Returns `true` for outcomes reported to the caller as a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns `true` for the two plain success outcomes.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::PlannedAndFinished | Self::Applied)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlannedAndFinished => f.write_str("run is planned and finished"),
            Self::Applied => f.write_str("run has been applied"),
            Self::PolicySoftFailed => f.write_str("run stopped on a soft-failed policy check"),
            Self::Failed(status) => write!(f, "run finished with status {status}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RunStatus::Applied, RunOutcome::Applied)]
    #[case(RunStatus::PlannedAndFinished, RunOutcome::PlannedAndFinished)]
    #[case(RunStatus::PolicySoftFailed, RunOutcome::PolicySoftFailed)]
    #[case(RunStatus::Errored, RunOutcome::Failed(RunStatus::Errored))]
    #[case(RunStatus::Discarded, RunOutcome::Failed(RunStatus::Discarded))]
    #[case(RunStatus::Canceled, RunOutcome::Failed(RunStatus::Canceled))]
    fn classifies_terminal_statuses(#[case] status: RunStatus, #[case] expected: RunOutcome) {
        assert_eq!(RunOutcome::classify(&status), expected);
    }

    #[test]
    fn unknown_status_is_a_failure_not_a_success() {
        let outcome = RunOutcome::classify(&RunStatus::from("mystery_state"));
        assert!(outcome.is_failure());
        assert!(!outcome.is_success());
        assert_eq!(outcome.to_string(), "run finished with status mystery state");
    }

    #[test]
    fn policy_soft_failed_is_neither_success_nor_failure() {
        let outcome = RunOutcome::classify(&RunStatus::PolicySoftFailed);
        assert!(!outcome.is_failure());
        assert!(!outcome.is_success());
    }
}
