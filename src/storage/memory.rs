//! In-memory `SessionStore`. Reference implementation and the one used by
//! the coordinator's own test suite; a production deployment would swap in
//! a relational driver behind the same trait.

use async_trait::async_trait;
use dashmap::DashMap;

use super::SessionStore;
use crate::common::{BranchId, TransactionId};
use crate::error::{CoordinatorError, Result};
use crate::model::{BranchSession, BranchStatus, GlobalSession, GlobalStatus, RowLock};

#[derive(Default)]
pub struct MemoryStore {
    globals: DashMap<String, GlobalSession>,
    branches: DashMap<BranchId, BranchSession>,
    locks: DashMap<String, RowLock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn add_global_session(&self, session: GlobalSession) -> Result<()> {
        if self.globals.contains_key(&session.xid) {
            return Err(CoordinatorError::Storage(format!(
                "global session {} already exists",
                session.xid
            )));
        }
        self.globals.insert(session.xid.clone(), session);
        Ok(())
    }

    async fn find_global_session(&self, xid: &str) -> Result<Option<GlobalSession>> {
        Ok(self.globals.get(xid).map(|e| e.value().clone()))
    }

    async fn update_global_session_status(&self, xid: &str, status: GlobalStatus) -> Result<()> {
        let mut entry = self
            .globals
            .get_mut(xid)
            .ok_or_else(|| CoordinatorError::GlobalTransactionNotExist(xid.to_string()))?;
        entry.status = status;
        entry.touch();
        Ok(())
    }

    async fn inactivate_global_session(&self, xid: &str) -> Result<()> {
        let mut entry = self
            .globals
            .get_mut(xid)
            .ok_or_else(|| CoordinatorError::GlobalTransactionNotExist(xid.to_string()))?;
        entry.active = false;
        entry.touch();
        Ok(())
    }

    async fn remove_global_session(&self, xid: &str) -> Result<()> {
        self.globals.remove(xid);
        Ok(())
    }

    async fn find_global_sessions_by_status(
        &self,
        statuses: &[GlobalStatus],
        limit: usize,
    ) -> Result<Vec<GlobalSession>> {
        let mut matches: Vec<GlobalSession> = self
            .globals
            .iter()
            .filter(|e| statuses.contains(&e.value().status))
            .map(|e| e.value().clone())
            .collect();
        matches.sort_by_key(|g| g.begin_time);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn add_branch_session(&self, branch: BranchSession) -> Result<()> {
        if self.branches.contains_key(&branch.branch_id) {
            return Err(CoordinatorError::Storage(format!(
                "branch session {} already exists",
                branch.branch_id
            )));
        }
        self.branches.insert(branch.branch_id, branch);
        Ok(())
    }

    async fn find_branch_sessions(&self, xid: &str) -> Result<Vec<BranchSession>> {
        let mut branches: Vec<BranchSession> = self
            .branches
            .iter()
            .filter(|e| e.value().xid == xid)
            .map(|e| e.value().clone())
            .collect();
        branches.sort_by_key(|b| b.gmt_create);
        Ok(branches)
    }

    async fn update_branch_status(
        &self,
        xid: &str,
        branch_id: BranchId,
        status: BranchStatus,
    ) -> Result<()> {
        let mut entry = self
            .branches
            .get_mut(&branch_id)
            .ok_or_else(|| CoordinatorError::BranchReportFailed(format!("no such branch {branch_id}")))?;
        if entry.xid != xid {
            return Err(CoordinatorError::BranchReportFailed(format!(
                "branch {branch_id} does not belong to {xid}"
            )));
        }
        entry.touch_status(status);
        Ok(())
    }

    async fn remove_branch_session(&self, xid: &str, branch_id: BranchId) -> Result<()> {
        // `branch_id` alone is the primary key (§9 open question); `xid` is
        // accepted and checked for consistency, not used to locate the row.
        if let Some(entry) = self.branches.get(&branch_id) {
            if entry.xid != xid {
                return Err(CoordinatorError::Storage(format!(
                    "refusing to remove branch {branch_id}: belongs to {}, not {xid}",
                    entry.xid
                )));
            }
        }
        self.branches.remove(&branch_id);
        Ok(())
    }

    async fn find_row_locks(&self, row_keys: &[String]) -> Result<Vec<RowLock>> {
        Ok(row_keys
            .iter()
            .filter_map(|k| self.locks.get(k).map(|e| e.value().clone()))
            .collect())
    }

    async fn insert_row_locks(&self, locks: Vec<RowLock>) -> Result<()> {
        for lock in &locks {
            if self.locks.contains_key(&lock.row_key) {
                return Err(CoordinatorError::Storage(format!(
                    "row lock {} already exists",
                    lock.row_key
                )));
            }
        }
        for lock in locks {
            self.locks.insert(lock.row_key.clone(), lock);
        }
        Ok(())
    }

    async fn delete_row_locks(&self, xid: &str, row_keys: &[String]) -> Result<()> {
        for key in row_keys {
            if let Some(entry) = self.locks.get(key) {
                if entry.xid != xid {
                    continue;
                }
            } else {
                continue;
            }
            self.locks.remove(key);
        }
        Ok(())
    }

    async fn delete_row_locks_for_xid(&self, xid: &str) -> Result<()> {
        let keys: Vec<String> = self
            .locks
            .iter()
            .filter(|e| e.value().xid == xid)
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            self.locks.remove(&key);
        }
        Ok(())
    }

    async fn find_global_session_by_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<GlobalSession>> {
        Ok(self
            .globals
            .iter()
            .find(|e| e.value().transaction_id == transaction_id)
            .map(|e| e.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(addressing: &str, tid: TransactionId) -> GlobalSession {
        GlobalSession::new(addressing.into(), tid, "t".into(), 60_000)
    }

    #[tokio::test]
    async fn add_and_find_global_session() {
        let store = MemoryStore::new();
        let gs = session("svc", 1);
        store.add_global_session(gs.clone()).await.unwrap();
        let found = store.find_global_session(&gs.xid).await.unwrap().unwrap();
        assert_eq!(found.xid, gs.xid);
    }

    #[tokio::test]
    async fn duplicate_global_session_rejected() {
        let store = MemoryStore::new();
        let gs = session("svc", 1);
        store.add_global_session(gs.clone()).await.unwrap();
        assert!(store.add_global_session(gs).await.is_err());
    }

    #[tokio::test]
    async fn remove_branch_session_checks_xid() {
        let store = MemoryStore::new();
        let branch = BranchSession::new(
            "svc:1".into(),
            42,
            1,
            "rm".into(),
            "res".into(),
            "t:1".into(),
            crate::model::BranchType::At,
            vec![],
        );
        store.add_branch_session(branch).await.unwrap();
        assert!(store.remove_branch_session("other:9", 42).await.is_err());
        store.remove_branch_session("svc:1", 42).await.unwrap();
        assert!(store.find_branch_sessions("svc:1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_row_locks_rejects_duplicate_row_key() {
        let store = MemoryStore::new();
        let lock = RowLock {
            row_key: "orderDB^^^so^^^1".into(),
            xid: "svc:1".into(),
            transaction_id: 1,
            branch_id: 1,
            resource_id: "orderDB".into(),
            table_name: "so".into(),
            pk: "1".into(),
        };
        store.insert_row_locks(vec![lock.clone()]).await.unwrap();
        assert!(store.insert_row_locks(vec![lock]).await.is_err());
    }

    #[tokio::test]
    async fn find_global_sessions_by_status_orders_oldest_first() {
        let store = MemoryStore::new();
        let mut first = session("svc", 1);
        first.begin_time = 100;
        let mut second = session("svc", 2);
        second.begin_time = 200;
        store.add_global_session(second).await.unwrap();
        store.add_global_session(first).await.unwrap();

        let found = store
            .find_global_sessions_by_status(&[GlobalStatus::Begin], 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].transaction_id, 1);
        assert_eq!(found[1].transaction_id, 2);
    }
}
