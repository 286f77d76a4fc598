//! Row-level resource locking (§4.5) and the per-XID critical-section
//! mutex (§5, §9).

mod locker;

pub use locker::GlobalSessionLocker;

use std::collections::HashSet;
use std::sync::Arc;

use crate::common::row_key;
use crate::error::{CoordinatorError, Result};
use crate::model::{BranchSession, GlobalTransaction, RowLock};
use crate::storage::SessionStore;

/// Parses a `lockKey` string into `(table, pk)` pairs.
///
/// Grammar (§4.5): `lockKey := ( table ':' pks ';' )*`, `pks := pk (',' pk)*`.
/// A trailing `;`, empty `pks`, or an empty string are all valid and yield
/// zero locks (§8 boundary behaviors).
pub fn parse_lock_key(lock_key: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for clause in lock_key.split(';') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let (table, pks) = clause.split_once(':').ok_or_else(|| {
            CoordinatorError::InvalidLockKey(format!("missing ':' in clause '{clause}'"))
        })?;
        if table.is_empty() {
            return Err(CoordinatorError::InvalidLockKey(format!(
                "empty table name in clause '{clause}'"
            )));
        }
        for pk in pks.split(',') {
            let pk = pk.trim();
            if pk.is_empty() {
                continue;
            }
            out.push((table.to_string(), pk.to_string()));
        }
    }
    Ok(out)
}

fn candidate_locks(branch: &BranchSession) -> Result<Vec<RowLock>> {
    let pairs = parse_lock_key(&branch.lock_key)?;
    let mut seen = HashSet::new();
    let mut locks = Vec::new();
    for (table, pk) in pairs {
        let key = row_key(&branch.resource_id, &table, &pk);
        if !seen.insert(key.clone()) {
            continue;
        }
        locks.push(RowLock {
            row_key: key,
            xid: branch.xid.clone(),
            transaction_id: branch.transaction_id,
            branch_id: branch.branch_id,
            resource_id: branch.resource_id.clone(),
            table_name: table,
            pk,
        });
    }
    Ok(locks)
}

/// Acquires, releases, and queries row locks through the storage driver.
pub struct LockManager {
    store: Arc<dyn SessionStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Implements §4.5's `AcquireLock`. AT/XA branches call this during
    /// registration, before the branch row is written (§6).
    pub async fn acquire_lock(&self, branch: &BranchSession) -> Result<bool> {
        let candidates = candidate_locks(branch)?;
        if candidates.is_empty() {
            return Ok(true);
        }

        let row_keys: Vec<String> = candidates.iter().map(|l| l.row_key.clone()).collect();
        let existing = self.store.find_row_locks(&row_keys).await?;

        for lock in &existing {
            if lock.xid != branch.xid {
                return Ok(false);
            }
        }

        let existing_keys: HashSet<&str> = existing.iter().map(|l| l.row_key.as_str()).collect();
        let to_insert: Vec<RowLock> = candidates
            .into_iter()
            .filter(|l| !existing_keys.contains(l.row_key.as_str()))
            .collect();

        if to_insert.is_empty() {
            return Ok(true);
        }

        match self.store.insert_row_locks(to_insert).await {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    /// Releases the given branch's locks, scoped to its own XID (§4.5).
    pub async fn release_lock(&self, branch: &BranchSession) -> Result<()> {
        let candidates = candidate_locks(branch)?;
        if candidates.is_empty() {
            return Ok(());
        }
        let row_keys: Vec<String> = candidates.into_iter().map(|l| l.row_key).collect();
        self.store.delete_row_locks(&branch.xid, &row_keys).await
    }

    /// Releases every row lock owned by the global's XID — the union of
    /// all its branches' locks (§4.5).
    pub async fn release_global_session_lock(&self, gt: &GlobalTransaction) -> Result<()> {
        self.store.delete_row_locks_for_xid(gt.xid()).await
    }

    /// §4.5's `IsLockable`: true iff every parsed row key is either free or
    /// already held by `xid`.
    pub async fn is_lockable(&self, xid: &str, resource_id: &str, lock_key: &str) -> Result<bool> {
        let pairs = parse_lock_key(lock_key)?;
        if pairs.is_empty() {
            return Ok(true);
        }
        let row_keys: Vec<String> = pairs
            .iter()
            .map(|(table, pk)| row_key(resource_id, table, pk))
            .collect();
        let existing = self.store.find_row_locks(&row_keys).await?;
        Ok(existing.iter().all(|l| l.xid == xid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BranchType;
    use crate::storage::MemoryStore;

    fn branch(xid: &str, branch_id: i64, resource: &str, lock_key: &str) -> BranchSession {
        BranchSession::new(
            xid.into(),
            branch_id,
            1,
            "rm".into(),
            resource.into(),
            lock_key.into(),
            BranchType::At,
            vec![],
        )
    }

    #[test]
    fn parse_lock_key_grammar() {
        assert_eq!(
            parse_lock_key("so:1,2;item:9").unwrap(),
            vec![
                ("so".into(), "1".into()),
                ("so".into(), "2".into()),
                ("item".into(), "9".into()),
            ]
        );
    }

    #[test]
    fn parse_lock_key_boundary_cases_yield_no_locks() {
        assert!(parse_lock_key("").unwrap().is_empty());
        assert!(parse_lock_key("so:;").unwrap().is_empty());
        assert!(parse_lock_key("so:1,2;").unwrap().len() == 2);
    }

    #[tokio::test]
    async fn acquire_lock_succeeds_for_fresh_rows() {
        let store = Arc::new(MemoryStore::new());
        let lm = LockManager::new(store);
        let b = branch("svc:1", 1, "orderDB", "so:1");
        assert!(lm.acquire_lock(&b).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_lock_is_idempotent_for_same_xid() {
        let store = Arc::new(MemoryStore::new());
        let lm = LockManager::new(store);
        let b = branch("svc:1", 1, "orderDB", "so:1");
        assert!(lm.acquire_lock(&b).await.unwrap());
        assert!(lm.acquire_lock(&b).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_lock_conflicts_across_xids() {
        let store = Arc::new(MemoryStore::new());
        let lm = LockManager::new(store);
        let a = branch("svc:1", 1, "orderDB", "so:1");
        let b = branch("svc:2", 2, "orderDB", "so:1");
        assert!(lm.acquire_lock(&a).await.unwrap());
        assert!(!lm.acquire_lock(&b).await.unwrap());
    }

    #[tokio::test]
    async fn release_lock_frees_row_for_other_xids() {
        let store = Arc::new(MemoryStore::new());
        let lm = LockManager::new(store);
        let a = branch("svc:1", 1, "orderDB", "so:1");
        let b = branch("svc:2", 2, "orderDB", "so:1");
        assert!(lm.acquire_lock(&a).await.unwrap());
        lm.release_lock(&a).await.unwrap();
        assert!(lm.acquire_lock(&b).await.unwrap());
    }

    #[tokio::test]
    async fn is_lockable_reports_conflict() {
        let store = Arc::new(MemoryStore::new());
        let lm = LockManager::new(store);
        let a = branch("svc:1", 1, "orderDB", "so:1");
        lm.acquire_lock(&a).await.unwrap();
        assert!(lm.is_lockable("svc:1", "orderDB", "so:1").await.unwrap());
        assert!(!lm.is_lockable("svc:2", "orderDB", "so:1").await.unwrap());
    }
}
