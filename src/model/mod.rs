//! The transaction data model: `GlobalSession`, `BranchSession`, `RowLock`,
//! and the composite `GlobalTransaction` view. See spec §3.

mod status;

pub use status::{BranchStatus, GlobalStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{generate_xid, BranchId, TransactionId};

/// Branch transaction mode. SAGA is accepted into the model (it can be
/// registered) but rejected at commit/rollback orchestration time, per §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchType {
    At,
    Tcc,
    Saga,
    Xa,
}

/// One global transaction, per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSession {
    pub xid: String,
    pub transaction_id: TransactionId,
    pub addressing: String,
    pub transaction_name: String,
    pub timeout_ms: i64,
    pub begin_time: i64,
    pub status: GlobalStatus,
    pub active: bool,
    pub gmt_create: DateTime<Utc>,
    pub gmt_modified: DateTime<Utc>,
}

impl GlobalSession {
    pub fn new(
        addressing: String,
        transaction_id: TransactionId,
        transaction_name: String,
        timeout_ms: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            xid: generate_xid(&addressing, transaction_id),
            transaction_id,
            addressing,
            transaction_name,
            timeout_ms,
            begin_time: now.timestamp_millis(),
            status: GlobalStatus::Begin,
            active: true,
            gmt_create: now,
            gmt_modified: now,
        }
    }

    pub fn is_timed_out(&self, now_ms: i64) -> bool {
        now_ms - self.begin_time > self.timeout_ms
    }

    /// True only while the global is in `Begin`; once the decision is made,
    /// the non-TCC fast path (`AsyncCommitting`) is still "can be committed
    /// async", which is modeled separately on `GlobalTransaction`.
    pub fn touch(&mut self) {
        self.gmt_modified = Utc::now();
    }
}

/// One branch's enlistment in a global transaction, per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSession {
    pub xid: String,
    pub branch_id: BranchId,
    pub transaction_id: TransactionId,
    pub addressing: String,
    pub resource_id: String,
    pub lock_key: String,
    pub branch_type: BranchType,
    pub status: BranchStatus,
    pub application_data: Vec<u8>,
    pub gmt_create: DateTime<Utc>,
    pub gmt_modified: DateTime<Utc>,
}

impl BranchSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        xid: String,
        branch_id: BranchId,
        transaction_id: TransactionId,
        addressing: String,
        resource_id: String,
        lock_key: String,
        branch_type: BranchType,
        application_data: Vec<u8>,
    ) -> Self {
        let now = Utc::now();
        Self {
            xid,
            branch_id,
            transaction_id,
            addressing,
            resource_id,
            lock_key,
            branch_type,
            status: BranchStatus::Registered,
            application_data,
            gmt_create: now,
            gmt_modified: now,
        }
    }

    pub fn touch_status(&mut self, status: BranchStatus) {
        self.status = status;
        self.gmt_modified = Utc::now();
    }
}

/// A single held row lock, per spec §3. `row_key` is the primary key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RowLock {
    pub row_key: String,
    pub xid: String,
    pub transaction_id: TransactionId,
    pub branch_id: BranchId,
    pub resource_id: String,
    pub table_name: String,
    pub pk: String,
}

/// Composite, non-persisted view: one `GlobalSession` plus its branches,
/// ordered by creation (insertion order from storage), per spec §3.
#[derive(Debug, Clone)]
pub struct GlobalTransaction {
    pub global_session: GlobalSession,
    pub branch_sessions: Vec<BranchSession>,
}

impl GlobalTransaction {
    pub fn new(global_session: GlobalSession) -> Self {
        Self {
            global_session,
            branch_sessions: Vec::new(),
        }
    }

    pub fn xid(&self) -> &str {
        &self.global_session.xid
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.global_session.transaction_id
    }

    pub fn has_branches(&self) -> bool {
        !self.branch_sessions.is_empty()
    }

    pub fn is_saga(&self) -> bool {
        self.branch_sessions
            .iter()
            .any(|b| b.branch_type == BranchType::Saga)
    }

    /// Non-TCC globals take the optimistic `AsyncCommitting` fast path;
    /// any TCC branch forces synchronous, in-line second-phase commit.
    pub fn can_be_committed_async(&self) -> bool {
        !self
            .branch_sessions
            .iter()
            .any(|b| b.branch_type == BranchType::Tcc)
    }

    pub fn all_lock_keys(&self) -> Vec<(&str, &str)> {
        self.branch_sessions
            .iter()
            .map(|b| (b.resource_id.as_str(), b.lock_key.as_str()))
            .collect()
    }
}
