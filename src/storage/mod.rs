//! Pluggable storage contract (§6) and the in-memory reference
//! implementation. Only the interface is specified here — a relational
//! backend (MySQL, Postgres, ...) implements the same trait; no SQL
//! dialect leaks above it.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::common::{BranchId, TransactionId};
use crate::error::Result;
use crate::model::{BranchSession, GlobalSession, GlobalStatus, RowLock};

/// Persists `GlobalSession`/`BranchSession`/`RowLock` rows and answers the
/// status/address queries the reconciliation loops need. Every method is
/// atomic with respect to the rows it touches — a real RDBMS-backed
/// implementation would wrap each in a single transaction or rely on
/// row-level atomicity (e.g. a single `UPDATE ... WHERE xid = ?`).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn add_global_session(&self, session: GlobalSession) -> Result<()>;
    async fn find_global_session(&self, xid: &str) -> Result<Option<GlobalSession>>;
    async fn update_global_session_status(&self, xid: &str, status: GlobalStatus) -> Result<()>;
    async fn inactivate_global_session(&self, xid: &str) -> Result<()>;
    async fn remove_global_session(&self, xid: &str) -> Result<()>;

    /// Globals in any of `statuses`, oldest-`begin_time`-first, capped at
    /// `limit` rows — backs the timeout scan and the retry loops (§4.6).
    async fn find_global_sessions_by_status(
        &self,
        statuses: &[GlobalStatus],
        limit: usize,
    ) -> Result<Vec<GlobalSession>>;

    async fn add_branch_session(&self, branch: BranchSession) -> Result<()>;
    async fn find_branch_sessions(&self, xid: &str) -> Result<Vec<BranchSession>>;
    async fn update_branch_status(
        &self,
        xid: &str,
        branch_id: BranchId,
        status: crate::model::BranchStatus,
    ) -> Result<()>;
    async fn remove_branch_session(&self, xid: &str, branch_id: BranchId) -> Result<()>;

    /// Loads any already-held locks among `row_keys`, used by
    /// `AcquireLock`'s conflict check (§4.5).
    async fn find_row_locks(&self, row_keys: &[String]) -> Result<Vec<RowLock>>;
    /// Inserts `locks` that are not already present; callers have already
    /// checked for cross-XID conflicts. Returns `Ok(())` unless a
    /// uniqueness violation slips through under contention.
    async fn insert_row_locks(&self, locks: Vec<RowLock>) -> Result<()>;
    async fn delete_row_locks(&self, xid: &str, row_keys: &[String]) -> Result<()>;
    async fn delete_row_locks_for_xid(&self, xid: &str) -> Result<()>;

    /// Transaction id for id-generator derived lookups; unused by the
    /// coordinator core directly, kept for parity with the `transaction_id`
    /// index named in §6's schema.
    async fn find_global_session_by_transaction_id(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<GlobalSession>>;
}
