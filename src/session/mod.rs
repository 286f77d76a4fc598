//! Session Holder (§4.7): a thin aggregation over the storage driver that
//! composes the `GlobalTransaction` view and answers the reconciliation
//! loops' status/address queries.

use std::collections::HashSet;
use std::sync::Arc;

use crate::common::BranchId;
use crate::error::Result;
use crate::model::{BranchSession, BranchStatus, GlobalSession, GlobalStatus, GlobalTransaction};
use crate::storage::SessionStore;

pub struct SessionHolder {
    store: Arc<dyn SessionStore>,
}

impl SessionHolder {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn add_global_session(&self, session: GlobalSession) -> Result<()> {
        self.store.add_global_session(session).await
    }

    pub async fn find_global_session(&self, xid: &str) -> Result<Option<GlobalSession>> {
        self.store.find_global_session(xid).await
    }

    pub async fn update_global_session_status(
        &self,
        xid: &str,
        status: GlobalStatus,
    ) -> Result<()> {
        self.store.update_global_session_status(xid, status).await
    }

    pub async fn inactivate_global_session(&self, xid: &str) -> Result<()> {
        self.store.inactivate_global_session(xid).await
    }

    pub async fn add_branch_session(&self, branch: BranchSession) -> Result<()> {
        self.store.add_branch_session(branch).await
    }

    pub async fn update_branch_status(
        &self,
        xid: &str,
        branch_id: BranchId,
        status: BranchStatus,
    ) -> Result<()> {
        self.store.update_branch_status(xid, branch_id, status).await
    }

    pub async fn remove_branch_session(&self, xid: &str, branch_id: BranchId) -> Result<()> {
        self.store.remove_branch_session(xid, branch_id).await
    }

    /// Composes the `GlobalTransaction` view: the global session plus the
    /// set of branches sharing its XID, in creation order (§3, §4.2).
    pub async fn find_global_transaction(&self, xid: &str) -> Result<Option<GlobalTransaction>> {
        let Some(global_session) = self.store.find_global_session(xid).await? else {
            return Ok(None);
        };
        let branch_sessions = self.store.find_branch_sessions(xid).await?;
        Ok(Some(GlobalTransaction {
            global_session,
            branch_sessions,
        }))
    }

    /// Removes every row referencing `xid` across all three tables — the
    /// global row, any remaining branch rows, and any remaining locks.
    /// Invariant 5 (§3) means "zero rows reference the XID" is the
    /// post-condition the coordinator core relies on after a terminal
    /// transition (§8).
    pub async fn remove_global_transaction(&self, gt: &GlobalTransaction) -> Result<()> {
        for branch in &gt.branch_sessions {
            self.store
                .remove_branch_session(&gt.global_session.xid, branch.branch_id)
                .await?;
        }
        self.store
            .delete_row_locks_for_xid(&gt.global_session.xid)
            .await?;
        self.store.remove_global_session(&gt.global_session.xid).await
    }

    /// Backs the timeout-check loop: globals in `Begin`, oldest first,
    /// bounded page (§4.6 loop 1).
    pub async fn find_timeout_candidates(&self, limit: usize) -> Result<Vec<GlobalSession>> {
        self.store
            .find_global_sessions_by_status(&[GlobalStatus::Begin], limit)
            .await
    }

    /// Backs the async-committing loop (§4.6 loop 2), filtered down to
    /// globals whose RM addressing is currently connected.
    pub async fn find_async_committing(
        &self,
        connected: &HashSet<String>,
    ) -> Result<Vec<GlobalTransaction>> {
        self.find_by_status_and_connected(&[GlobalStatus::AsyncCommitting], connected)
            .await
    }

    /// Backs the retry-committing loop (§4.6 loop 3).
    pub async fn find_retry_committing(
        &self,
        connected: &HashSet<String>,
    ) -> Result<Vec<GlobalTransaction>> {
        self.find_by_status_and_connected(&[GlobalStatus::CommitRetrying], connected)
            .await
    }

    /// Backs the retry-rolling-back loop (§4.6 loop 4).
    pub async fn find_retry_rollback(
        &self,
        connected: &HashSet<String>,
    ) -> Result<Vec<GlobalTransaction>> {
        self.find_by_status_and_connected(
            &[
                GlobalStatus::RollingBack,
                GlobalStatus::RollbackRetrying,
                GlobalStatus::TimeoutRollingBack,
                GlobalStatus::TimeoutRollbackRetrying,
            ],
            connected,
        )
        .await
    }

    async fn find_by_status_and_connected(
        &self,
        statuses: &[GlobalStatus],
        connected: &HashSet<String>,
    ) -> Result<Vec<GlobalTransaction>> {
        let globals = self
            .store
            .find_global_sessions_by_status(statuses, usize::MAX)
            .await?;
        let mut out = Vec::new();
        for global_session in globals {
            if !connected.contains(&global_session.addressing) {
                continue;
            }
            let branch_sessions = self.store.find_branch_sessions(&global_session.xid).await?;
            // A global may legitimately have branches on multiple
            // addressings; we only require *a* connected addressing on the
            // global itself (the original keys solely on the global's own
            // `Addressing` field, which is the originating TM, not the
            // branches' RM addressings).
            out.push(GlobalTransaction {
                global_session,
                branch_sessions,
            });
        }
        Ok(out)
    }

    pub async fn release_branch_and_remove(
        &self,
        lock_manager: &crate::lock::LockManager,
        gt: &GlobalTransaction,
        branch: &BranchSession,
    ) -> Result<()> {
        lock_manager.release_lock(branch).await?;
        self.store
            .remove_branch_session(&gt.global_session.xid, branch.branch_id)
            .await
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}
