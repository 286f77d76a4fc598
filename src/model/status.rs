//! Global and branch status enums, and the legal transition graph of §4.1.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalStatus {
    Begin,
    Committing,
    CommitRetrying,
    AsyncCommitting,
    Committed,
    CommitFailed,
    RollingBack,
    RollbackRetrying,
    RolledBack,
    RollbackFailed,
    TimeoutRollingBack,
    TimeoutRollbackRetrying,
    TimeoutRolledBack,
    TimeoutRollbackFailed,
    /// Not a real stored state: returned by `GetStatus`/`Commit`/`Rollback`
    /// when no `GlobalSession` exists for the XID.
    Finished,
}

impl GlobalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GlobalStatus::Committed
                | GlobalStatus::CommitFailed
                | GlobalStatus::RolledBack
                | GlobalStatus::RollbackFailed
                | GlobalStatus::TimeoutRolledBack
                | GlobalStatus::TimeoutRollbackFailed
        )
    }

    /// Whether `from -> to` is a legal transition under §4.1's graph.
    /// Retrying states may repeat themselves (the reconciliation loops
    /// re-enter `doGlobalCommit`/`doGlobalRollback` without bumping
    /// status on every tick) — self-loops on retry states are legal.
    pub fn can_transition(from: GlobalStatus, to: GlobalStatus) -> bool {
        use GlobalStatus::*;
        matches!(
            (from, to),
            (Begin, Committing)
                | (Begin, AsyncCommitting)
                | (Begin, RollingBack)
                | (Begin, TimeoutRollingBack)
                | (Committing, Committed)
                | (Committing, CommitFailed)
                | (Committing, CommitRetrying)
                | (Committing, AsyncCommitting)
                | (AsyncCommitting, Committed)
                | (AsyncCommitting, CommitFailed)
                | (AsyncCommitting, AsyncCommitting)
                | (CommitRetrying, Committed)
                | (CommitRetrying, CommitFailed)
                | (CommitRetrying, CommitRetrying)
                | (RollingBack, RolledBack)
                | (RollingBack, RollbackFailed)
                | (RollingBack, RollbackRetrying)
                | (RollingBack, RollingBack)
                | (RollbackRetrying, RolledBack)
                | (RollbackRetrying, RollbackFailed)
                | (RollbackRetrying, RollbackRetrying)
                | (TimeoutRollingBack, TimeoutRolledBack)
                | (TimeoutRollingBack, TimeoutRollbackFailed)
                | (TimeoutRollingBack, TimeoutRollbackRetrying)
                | (TimeoutRollingBack, TimeoutRollingBack)
                | (TimeoutRollbackRetrying, TimeoutRolledBack)
                | (TimeoutRollbackRetrying, TimeoutRollbackFailed)
                | (TimeoutRollbackRetrying, TimeoutRollbackRetrying)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchStatus {
    Registered,
    PhaseOneFailed,
    PhaseTwoCommitted,
    PhaseTwoCommitFailedCanNotRetry,
    PhaseTwoCommitFailedRetryable,
    PhaseTwoRolledBack,
    PhaseTwoRollbackFailedCanNotRetry,
    PhaseTwoRollbackFailedRetryable,
}

impl BranchStatus {
    /// Branches in these states are complete and should be dropped from
    /// storage by the orchestration loop (§4.2/§4.3).
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            BranchStatus::PhaseOneFailed
                | BranchStatus::PhaseTwoCommitted
                | BranchStatus::PhaseTwoRolledBack
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GlobalStatus::*;

    #[test]
    fn begin_can_reach_committing_or_rolling_back() {
        assert!(GlobalStatus::can_transition(Begin, Committing));
        assert!(GlobalStatus::can_transition(Begin, RollingBack));
        assert!(GlobalStatus::can_transition(Begin, TimeoutRollingBack));
    }

    #[test]
    fn begin_cannot_jump_to_committed_directly() {
        assert!(!GlobalStatus::can_transition(Begin, Committed));
    }

    #[test]
    fn terminal_states_are_flagged() {
        assert!(Committed.is_terminal());
        assert!(RollbackFailed.is_terminal());
        assert!(!Committing.is_terminal());
    }

    #[test]
    fn branch_settled_states() {
        assert!(BranchStatus::PhaseOneFailed.is_settled());
        assert!(BranchStatus::PhaseTwoCommitted.is_settled());
        assert!(!BranchStatus::Registered.is_settled());
        assert!(!BranchStatus::PhaseTwoCommitFailedRetryable.is_settled());
    }
}
