//! Closed enumerations over the status tokens returned by the service.
//!
//! Unknown tokens are preserved in an `Other` variant rather than being
//! mapped onto a known state.

use std::fmt;

macro_rules! status_tokens {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $token:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, Hash, PartialEq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// Token not known to this client, preserved verbatim.
            Other(String),
        }

        impl $name {
            /// Returns the raw token as sent by the service.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $token, )+
                    Self::Other(token) => token.as_str(),
                }
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                match value {
                    $( $token => Self::$variant, )+
                    other => Self::Other(other.to_owned()),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::from(value.as_str())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.as_str().replace('_', " "))
            }
        }
    };
}

status_tokens! {
    /// Processing status of a configuration version.
    ConfigurationStatus {
        /// Created, waiting for content.
        Pending => "pending",
        /// The service is fetching content from a VCS provider.
        Fetching => "fetching",
        /// Content was received and processed; runs may use it.
        Uploaded => "uploaded",
        /// Content was discarded by the service.
        Archived => "archived",
        /// Processing failed.
        Errored => "errored",
    }
}

status_tokens! {
    /// Status of a run in the service's state machine.
    RunStatus {
        /// Queued behind other runs in the workspace.
        Pending => "pending",
        /// Fetching configuration.
        Fetching => "fetching",
        /// Configuration fetched.
        FetchingCompleted => "fetching_completed",
        /// Pre-plan tasks running.
        PrePlanRunning => "pre_plan_running",
        /// Pre-plan tasks finished.
        PrePlanCompleted => "pre_plan_completed",
        /// Waiting for a plan slot.
        PlanQueued => "plan_queued",
        /// Plan in progress.
        Planning => "planning",
        /// Plan finished and awaits confirmation or policy checks.
        Planned => "planned",
        /// Cost estimation running.
        CostEstimating => "cost_estimating",
        /// Cost estimation finished.
        CostEstimated => "cost_estimated",
        /// Sentinel policies running.
        PolicyChecking => "policy_checking",
        /// A policy failure awaits an override.
        PolicyOverride => "policy_override",
        /// Policies passed.
        PolicyChecked => "policy_checked",
        /// Advisory or soft-mandatory policy failed; the run stops here.
        PolicySoftFailed => "policy_soft_failed",
        /// Post-plan tasks running.
        PostPlanRunning => "post_plan_running",
        /// Post-plan tasks finished.
        PostPlanCompleted => "post_plan_completed",
        /// Apply was confirmed.
        Confirmed => "confirmed",
        /// Waiting for an apply slot.
        ApplyQueued => "apply_queued",
        /// Apply in progress.
        Applying => "applying",
        /// Apply finished successfully.
        Applied => "applied",
        /// Plan finished and nothing further will happen.
        PlannedAndFinished => "planned_and_finished",
        /// Plan saved for a later apply; nothing happens without a human.
        PlannedAndSaved => "planned_and_saved",
        /// Run was discarded before applying.
        Discarded => "discarded",
        /// Run failed.
        Errored => "errored",
        /// Run was cancelled.
        Canceled => "canceled",
        /// Run was forcefully cancelled.
        ForceCanceled => "force_canceled",
    }
}

impl RunStatus {
    /// Returns `true` for statuses after which the run never transitions
    /// again without human involvement.
    ///
    /// Unknown tokens are treated as in-progress; the completion wait is
    /// bounded by its timeout.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PlannedAndFinished
                | Self::PlannedAndSaved
                | Self::Applied
                | Self::PolicySoftFailed
                | Self::Discarded
                | Self::Errored
                | Self::Canceled
                | Self::ForceCanceled
        )
    }
}
