//! The coordinator core: owns every subsystem (session storage, locking,
//! the stream hub, id generation) and exposes the TM/RM-facing operations
//! of §4.

mod commit;
mod reconcile;
mod rollback;
pub mod stream;

pub use reconcile::run_reconciliation_loops;
pub use stream::{BranchCallOutcome, StreamHub};

use std::sync::Arc;

use crate::common::idgen::IdGenerator;
use crate::config::ServerConfig;
use crate::error::{CoordinatorError, Result};
use crate::events::EventBus;
use crate::lock::{GlobalSessionLocker, LockManager};
use crate::model::{BranchId, BranchSession, BranchStatus, BranchType, GlobalStatus, GlobalTransaction};
use crate::session::SessionHolder;
use crate::storage::SessionStore;

pub struct Coordinator {
    pub(crate) holder: SessionHolder,
    pub(crate) lock_manager: LockManager,
    pub(crate) locker: GlobalSessionLocker,
    pub(crate) stream_hub: Arc<StreamHub>,
    pub(crate) id_gen: IdGenerator,
    pub(crate) events: EventBus,
    pub(crate) config: ServerConfig,
}

impl Coordinator {
    pub fn new(store: Arc<dyn SessionStore>, config: ServerConfig, events: EventBus) -> Self {
        let id_gen = match config.worker_id {
            Some(worker_id) => IdGenerator::new(worker_id),
            None => IdGenerator::with_random_worker_id(),
        };
        Self {
            holder: SessionHolder::new(store.clone()),
            lock_manager: LockManager::new(store),
            locker: GlobalSessionLocker::new(config.global_session_locker_enabled),
            stream_hub: Arc::new(StreamHub::new()),
            id_gen,
            events,
            config,
        }
    }

    pub fn stream_hub(&self) -> Arc<StreamHub> {
        self.stream_hub.clone()
    }

    /// Begin: allocates a transaction id, derives the XID, and writes the
    /// `GlobalSession` row in `Begin` status (§4.1, §6).
    pub async fn begin(
        &self,
        addressing: String,
        transaction_name: String,
        timeout_ms: i64,
    ) -> Result<String> {
        let transaction_id = self.id_gen.next_id();
        let session =
            crate::model::GlobalSession::new(addressing, transaction_id, transaction_name, timeout_ms);
        let xid = session.xid.clone();
        self.holder.add_global_session(session).await?;
        self.events.emit_begin(&xid);
        Ok(xid)
    }

    /// §4.5's `AcquireLock` gate plus branch-row creation, backing the RM's
    /// `BranchRegister` call (§6).
    pub async fn branch_register(
        &self,
        xid: &str,
        resource_id: String,
        lock_key: String,
        branch_type: BranchType,
        application_data: Vec<u8>,
    ) -> Result<BranchId> {
        let global = self
            .holder
            .find_global_session(xid)
            .await?
            .ok_or_else(|| CoordinatorError::GlobalTransactionNotExist(xid.to_string()))?;
        if !global.active {
            return Err(CoordinatorError::GlobalTransactionNotActive(xid.to_string()));
        }
        if global.status != GlobalStatus::Begin {
            return Err(CoordinatorError::GlobalTransactionStatusInvalid(
                xid.to_string(),
                format!("{:?}", global.status),
            ));
        }

        let branch_id = self.id_gen.next_id();
        let branch = BranchSession::new(
            xid.to_string(),
            branch_id,
            global.transaction_id,
            global.addressing.clone(),
            resource_id,
            lock_key,
            branch_type,
            application_data,
        );

        if matches!(branch_type, BranchType::At | BranchType::Xa) {
            let locked = self.lock_manager.acquire_lock(&branch).await?;
            if !locked {
                return Err(CoordinatorError::LockKeyConflict(branch.resource_id.clone()));
            }
        }

        self.holder.add_branch_session(branch).await?;
        Ok(branch_id)
    }

    /// RM's `BranchReport` call: records the phase-two outcome of a branch
    /// that settled out-of-band (§6).
    pub async fn branch_report(
        &self,
        xid: &str,
        branch_id: BranchId,
        status: BranchStatus,
    ) -> Result<()> {
        self.holder.update_branch_status(xid, branch_id, status).await
    }

    /// §4.5's `IsLockable`, backing the RM's `LockQuery` call (§6).
    pub async fn lock_query(&self, xid: &str, resource_id: &str, lock_key: &str) -> Result<bool> {
        self.lock_manager.is_lockable(xid, resource_id, lock_key).await
    }

    /// `GetStatus`: returns `Finished` rather than an error when no global
    /// session exists, per §4.1's boundary behavior.
    pub async fn get_status(&self, xid: &str) -> Result<GlobalStatus> {
        match self.holder.find_global_session(xid).await? {
            Some(session) => Ok(session.status),
            None => Ok(GlobalStatus::Finished),
        }
    }

    /// Advertised but unimplemented, matching the original's own stub: a
    /// full implementation would aggregate durable per-branch outcome
    /// history the in-memory store doesn't retain once a branch settles.
    pub async fn global_report(&self, _xid: &str, _status: GlobalStatus) -> Result<()> {
        Err(CoordinatorError::Unimplemented("GlobalReport"))
    }

    pub async fn find_global_transaction(&self, xid: &str) -> Result<Option<GlobalTransaction>> {
        self.holder.find_global_transaction(xid).await
    }

    /// Applies `to`, persisting first, and keeps the in-memory `gt` view in
    /// sync. Every orchestration step routes status changes through here so
    /// §4.1's transition graph is checked in exactly one place.
    pub(crate) async fn transition(&self, gt: &mut GlobalTransaction, to: GlobalStatus) -> Result<()> {
        let from = gt.global_session.status;
        if !GlobalStatus::can_transition(from, to) {
            return Err(CoordinatorError::GlobalTransactionStatusInvalid(
                gt.xid().to_string(),
                format!("{from:?} -> {to:?}"),
            ));
        }
        self.holder.update_global_session_status(gt.xid(), to).await?;
        gt.global_session.status = to;
        Ok(())
    }
}
