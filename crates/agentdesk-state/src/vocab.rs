//! Closed vocabularies shared by the store and the domain layer.
//!
//! Every enumerated column is parsed through `FromStr`, which rejects values
//! outside the vocabulary with [`StorageError::InvalidField`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

macro_rules! closed_vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident ($field:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// Every member of the vocabulary, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = StorageError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(StorageError::invalid(
                        $field,
                        format!(
                            "'{}' is not one of: {}",
                            other,
                            Self::ALL
                                .iter()
                                .map(|v| v.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    )),
                }
            }
        }
    };
}

closed_vocabulary! {
    /// Lifecycle state of an agent run.
    RunStatus ("run_status") {
        Queued => "queued",
        Running => "running",
        Success => "success",
        Failed => "failed",
        Cancelled => "cancelled",
        Timeout => "timeout",
    }
}

closed_vocabulary! {
    /// What caused an agent run to be recorded.
    TriggerSource ("trigger_source") {
        Manual => "manual",
        Schedule => "schedule",
        Event => "event",
        Api => "api",
    }
}

closed_vocabulary! {
    /// A user's role, either inside one project or globally.
    MemberRole ("member_role") {
        Admin => "admin",
        Operator => "operator",
        Viewer => "viewer",
    }
}

closed_vocabulary! {
    LifecycleStatus ("lifecycle_status") {
        Draft => "draft",
        Active => "active",
        Paused => "paused",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

closed_vocabulary! {
    /// Progress state of one pipeline stage inside a project.
    StageStatus ("stage_status") {
        NotStarted => "not_started",
        InProgress => "in_progress",
        Blocked => "blocked",
        Done => "done",
        Failed => "failed",
        Skipped => "skipped",
    }
}

closed_vocabulary! {
    AssignmentStatus ("assignment_status") {
        Active => "active",
        Paused => "paused",
        Disabled => "disabled",
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        RunStatus::Queued
    }
}

impl Default for TriggerSource {
    fn default() -> Self {
        TriggerSource::Manual
    }
}

impl Default for LifecycleStatus {
    fn default() -> Self {
        LifecycleStatus::Draft
    }
}

impl Default for AssignmentStatus {
    fn default() -> Self {
        AssignmentStatus::Active
    }
}

impl StageStatus {
    /// Terminal statuses stamp `completed_at`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Done | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_round_trips_through_str() {
        for status in RunStatus::ALL {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn unknown_run_status_is_rejected() {
        let err = "finished".parse::<RunStatus>().unwrap_err();
        match err {
            StorageError::InvalidField { field, reason } => {
                assert_eq!(field, "run_status");
                assert!(reason.contains("queued, running, success, failed, cancelled, timeout"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn trigger_source_rejects_case_variants() {
        assert!("API".parse::<TriggerSource>().is_err());
        assert_eq!("api".parse::<TriggerSource>().unwrap(), TriggerSource::Api);
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&StageStatus::NotStarted).unwrap();
        assert_eq!(json, "\"not_started\"");
        let back: StageStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(back, StageStatus::InProgress);
    }

    #[test]
    fn defaults_match_creation_defaults() {
        assert_eq!(RunStatus::default(), RunStatus::Queued);
        assert_eq!(TriggerSource::default(), TriggerSource::Manual);
        assert_eq!(LifecycleStatus::default(), LifecycleStatus::Draft);
        assert_eq!(AssignmentStatus::default(), AssignmentStatus::Active);
    }

    #[test]
    fn terminal_stage_statuses() {
        assert!(StageStatus::Done.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
        assert!(!StageStatus::Blocked.is_terminal());
    }
}
