//! `Rollback(XID)` and `doGlobalRollback` (§4.3). Structurally symmetric to
//! `commit.rs` but with no async fast path, and a timeout/non-timeout
//! status fork instead of one.

use std::time::Duration;

use crate::error::{CoordinatorError, Result};
use crate::model::{BranchSession, BranchStatus, GlobalStatus, GlobalTransaction};
use crate::rpc::wire::{BranchMessage, ResultCode};

use super::stream::BranchCallOutcome;
use super::Coordinator;

const GLOBAL_LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

impl Coordinator {
    /// §4.3: same pre-amble as `commit`, no async fork.
    pub async fn rollback(&self, xid: &str) -> Result<GlobalStatus> {
        let _guard = self
            .locker
            .try_lock(xid, GLOBAL_LOCK_ACQUIRE_TIMEOUT)
            .await
            .ok_or_else(|| CoordinatorError::FailedLockGlobalTransaction(xid.to_string()))?;

        let Some(mut gt) = self.holder.find_global_transaction(xid).await? else {
            return Ok(GlobalStatus::Finished);
        };

        if gt.global_session.active {
            self.holder.inactivate_global_session(xid).await?;
            gt.global_session.active = false;
        }

        self.lock_manager.release_global_session_lock(&gt).await?;

        if gt.global_session.status != GlobalStatus::Begin {
            return Ok(gt.global_session.status);
        }

        self.transition(&mut gt, GlobalStatus::RollingBack).await?;
        self.do_global_rollback(&mut gt, false).await?;
        Ok(gt.global_session.status)
    }

    /// Also entered directly by the timeout-check loop (§4.6 loop 1), which
    /// sets `TimeoutRollingBack` on the global before this ever runs, and by
    /// loop 4 with `retrying = true`.
    pub(crate) async fn do_global_rollback(&self, gt: &mut GlobalTransaction, retrying: bool) -> Result<()> {
        if gt.is_saga() {
            return Err(CoordinatorError::Unimplemented("SAGA rollback"));
        }

        let is_timeout = matches!(
            gt.global_session.status,
            GlobalStatus::TimeoutRollingBack | GlobalStatus::TimeoutRollbackRetrying
        );
        let retrying_status = if is_timeout {
            GlobalStatus::TimeoutRollbackRetrying
        } else {
            GlobalStatus::RollbackRetrying
        };
        let failed_status = if is_timeout {
            GlobalStatus::TimeoutRollbackFailed
        } else {
            GlobalStatus::RollbackFailed
        };
        let success_status = if is_timeout {
            GlobalStatus::TimeoutRolledBack
        } else {
            GlobalStatus::RolledBack
        };

        let branches = gt.branch_sessions.clone();
        for branch in &branches {
            if branch.status == BranchStatus::PhaseOneFailed {
                self.holder
                    .release_branch_and_remove(&self.lock_manager, gt, branch)
                    .await?;
                continue;
            }

            match self.branch_rollback(branch).await {
                Err(err) => {
                    if !retrying {
                        self.transition(gt, retrying_status).await?;
                    }
                    return Err(err);
                }
                Ok(BranchStatus::PhaseTwoRolledBack) => {
                    self.holder
                        .release_branch_and_remove(&self.lock_manager, gt, branch)
                        .await?;
                }
                Ok(BranchStatus::PhaseTwoRollbackFailedCanNotRetry) => {
                    self.transition(gt, failed_status).await?;
                    self.lock_manager.release_global_session_lock(gt).await?;
                    self.holder.remove_global_transaction(gt).await?;
                    self.events.emit_rollback_failed(gt.xid());
                    return Ok(());
                }
                Ok(_) => {
                    if !retrying {
                        self.transition(gt, retrying_status).await?;
                        return Ok(());
                    }
                }
            }
        }

        match self.holder.find_global_transaction(gt.xid()).await? {
            None => Ok(()),
            Some(mut refreshed) => {
                if refreshed.has_branches() {
                    *gt = refreshed;
                } else {
                    self.transition(&mut refreshed, success_status).await?;
                    self.lock_manager.release_global_session_lock(&refreshed).await?;
                    self.holder.remove_global_transaction(&refreshed).await?;
                    self.events.emit_rolled_back(refreshed.xid());
                    *gt = refreshed;
                }
                Ok(())
            }
        }
    }

    /// `branchRollback(bs)`, the rollback mirror of `branchCommit` (§4.4).
    async fn branch_rollback(&self, branch: &BranchSession) -> Result<BranchStatus> {
        let message = BranchMessage::BranchRollback {
            id: self.stream_hub.next_message_id(),
            xid: branch.xid.clone(),
            branch_id: branch.branch_id,
            transaction_id: branch.transaction_id,
            resource_id: branch.resource_id.clone(),
            lock_key: branch.lock_key.clone(),
            branch_type: branch.branch_type,
            application_data: branch.application_data.clone(),
        };

        let outcome = self
            .stream_hub
            .send_and_wait(&branch.addressing, message, self.config.stream_message_timeout())
            .await?;

        match outcome {
            BranchCallOutcome::NotConnected => Ok(branch.status),
            BranchCallOutcome::Delivered(BranchMessage::BranchRollbackResult {
                result_code,
                branch_status,
                message,
                ..
            }) => match result_code {
                ResultCode::Success => Ok(branch_status.unwrap_or(branch.status)),
                ResultCode::Failed => Err(CoordinatorError::BranchReportFailed(
                    message.unwrap_or_else(|| "branch rollback failed".to_string()),
                )),
            },
            BranchCallOutcome::Delivered(_) => Err(CoordinatorError::Internal(
                "RM replied with an unexpected message type for a rollback request".to_string(),
            )),
        }
    }
}
