//! `Commit(XID)` and `doGlobalCommit` (§4.2).

use std::time::Duration;

use crate::error::{CoordinatorError, Result};
use crate::model::{BranchSession, BranchStatus, GlobalStatus, GlobalTransaction};
use crate::rpc::wire::{BranchMessage, ResultCode};

use super::stream::BranchCallOutcome;
use super::Coordinator;

/// How long `Commit`/`Rollback` wait to acquire the per-XID critical
/// section before giving up; this is a best-effort serialization guard, not
/// the overall call's deadline, so it stays short.
const GLOBAL_LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

impl Coordinator {
    /// §4.2, steps 1-7.
    pub async fn commit(&self, xid: &str) -> Result<GlobalStatus> {
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

        self.transition(&mut gt, GlobalStatus::Committing).await?;

        if self.config.async_commit_enabled && gt.can_be_committed_async() {
            self.transition(&mut gt, GlobalStatus::AsyncCommitting).await?;
            return Ok(gt.global_session.status);
        }

        self.do_global_commit(&mut gt, false).await?;
        Ok(gt.global_session.status)
    }

    /// `doGlobalCommit(gt, retrying)`. Called inline by `commit` for the
    /// synchronous (TCC-containing) path, and by the async-committing and
    /// commit-retry reconciliation loops with `retrying = true`.
    pub(crate) async fn do_global_commit(&self, gt: &mut GlobalTransaction, retrying: bool) -> Result<()> {
        if gt.is_saga() {
            return Err(CoordinatorError::Unimplemented("SAGA commit"));
        }

        let branches = gt.branch_sessions.clone();
        for branch in &branches {
            if branch.status == BranchStatus::PhaseOneFailed {
                self.holder
                    .release_branch_and_remove(&self.lock_manager, gt, branch)
                    .await?;
                continue;
            }

            match self.branch_commit(branch).await {
                Err(err) => {
                    if !retrying {
                        self.transition(gt, GlobalStatus::CommitRetrying).await?;
                    }
                    return Err(err);
                }
                Ok(BranchStatus::PhaseTwoCommitted) => {
                    self.holder
                        .release_branch_and_remove(&self.lock_manager, gt, branch)
                        .await?;
                }
                Ok(BranchStatus::PhaseTwoCommitFailedCanNotRetry) => {
                    if !gt.can_be_committed_async() {
                        self.transition(gt, GlobalStatus::CommitFailed).await?;
                        self.lock_manager.release_global_session_lock(gt).await?;
                        self.holder.remove_global_transaction(gt).await?;
                        self.events.emit_commit_failed(gt.xid());
                        return Ok(());
                    }
                    tracing::warn!(
                        xid = gt.xid(),
                        branch_id = branch.branch_id,
                        "branch commit failed and cannot retry; continuing with other branches"
                    );
                }
                Ok(_) => {
                    if !retrying {
                        self.transition(gt, GlobalStatus::CommitRetrying).await?;
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
                    self.transition(&mut refreshed, GlobalStatus::Committed).await?;
                    self.lock_manager.release_global_session_lock(&refreshed).await?;
                    self.holder.remove_global_transaction(&refreshed).await?;
                    self.events.emit_committed(refreshed.xid());
                    *gt = refreshed;
                }
                Ok(())
            }
        }
    }

    /// `branchCommit(bs)` (§4.4).
    async fn branch_commit(&self, branch: &BranchSession) -> Result<BranchStatus> {
        let message = BranchMessage::BranchCommit {
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
            BranchCallOutcome::Delivered(BranchMessage::BranchCommitResult {
                result_code,
                branch_status,
                message,
                ..
            }) => match result_code {
                ResultCode::Success => Ok(branch_status.unwrap_or(branch.status)),
                ResultCode::Failed => Err(CoordinatorError::BranchReportFailed(
                    message.unwrap_or_else(|| "branch commit failed".to_string()),
                )),
            },
            BranchCallOutcome::Delivered(_) => Err(CoordinatorError::Internal(
                "RM replied with an unexpected message type for a commit request".to_string(),
            )),
        }
    }
}
