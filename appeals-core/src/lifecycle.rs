//! The appeal lifecycle as data.
//!
//! States: `New -> InProgress -> {Completed, Cancelled}` plus `New -> Cancelled`.
//! `Completed` and `Cancelled` are terminal. Each transition verb fixes the
//! set of statuses it may start from; the store enforces that set with a
//! conditional update, so this table is the single source of truth for both
//! storage backends and the controller.

use std::fmt;

use crate::appeal::AppealStatus;

/// Transition verbs that act on existing appeals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Take,
    Complete,
    Cancel,
    CancelAllInWork,
}

/// Preconditions and outcome of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    /// Statuses the appeal must currently be in.
    pub expected: &'static [AppealStatus],
    pub target: AppealStatus,
    /// Whether an accepted transition writes an audit response row.
    pub records_response: bool,
}

impl TransitionRule {
    pub fn accepts(&self, current: AppealStatus) -> bool {
        self.expected.contains(&current)
    }
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Take,
        Operation::Complete,
        Operation::Cancel,
        Operation::CancelAllInWork,
    ];

    pub fn rule(&self) -> TransitionRule {
        match self {
            Self::Take => TransitionRule {
                expected: &[AppealStatus::New],
                target: AppealStatus::InProgress,
                records_response: false,
            },
            Self::Complete => TransitionRule {
                expected: &[AppealStatus::InProgress],
                target: AppealStatus::Completed,
                records_response: true,
            },
            Self::Cancel => TransitionRule {
                expected: &[AppealStatus::New, AppealStatus::InProgress],
                target: AppealStatus::Cancelled,
                records_response: true,
            },
            Self::CancelAllInWork => TransitionRule {
                expected: &[AppealStatus::InProgress],
                target: AppealStatus::Cancelled,
                records_response: true,
            },
        }
    }

    /// Status an appeal in `current` ends up in, or `None` if the verb is
    /// not allowed from there.
    pub fn apply(&self, current: AppealStatus) -> Option<AppealStatus> {
        let rule = self.rule();
        rule.accepts(current).then_some(rule.target)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Take => "take",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::CancelAllInWork => "cancel-all-in-work",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl AppealStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// True exactly for the edges of the lifecycle graph.
    pub fn can_transition_to(&self, next: AppealStatus) -> bool {
        matches!(
            (self, next),
            (Self::New, AppealStatus::InProgress)
                | (Self::New, AppealStatus::Cancelled)
                | (Self::InProgress, AppealStatus::Completed)
                | (Self::InProgress, AppealStatus::Cancelled)
        )
    }
}
