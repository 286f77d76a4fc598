//! Wire types exchanged with application services: the TM's unary
//! begin/commit/rollback/status requests (§6), and the `BranchMessage`
//! envelope carried over the RM's bidirectional stream (§4.4, §6).

use serde::{Deserialize, Serialize};

use crate::common::{BranchId, TransactionId};
use crate::model::{BranchStatus, BranchType, GlobalStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    Success,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeginRequest {
    pub addressing: String,
    pub transaction_name: String,
    pub timeout_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BeginResponse {
    pub xid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalStatusResponse {
    pub global_status: GlobalStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalReportRequest {
    pub global_status: GlobalStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchRegisterRequest {
    pub xid: String,
    pub resource_id: String,
    pub lock_key: String,
    pub branch_type: BranchType,
    #[serde(default)]
    pub application_data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchRegisterResponse {
    pub branch_id: BranchId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchReportRequest {
    pub xid: String,
    pub branch_id: BranchId,
    pub branch_status: BranchStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockQueryRequest {
    pub xid: String,
    pub resource_id: String,
    pub lock_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LockQueryResponse {
    pub lockable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub exception_code: crate::error::ExceptionCode,
    pub message: String,
}

/// Envelope carried over the RM stream, keyed on `id` for request/response
/// correlation (§4.4). The coordinator initiates `BranchCommit`/
/// `BranchRollback`; the RM replies with the matching `*Result` variant
/// carrying the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BranchMessage {
    BranchCommit {
        id: i64,
        xid: String,
        branch_id: BranchId,
        transaction_id: TransactionId,
        resource_id: String,
        lock_key: String,
        branch_type: BranchType,
        application_data: Vec<u8>,
    },
    BranchRollback {
        id: i64,
        xid: String,
        branch_id: BranchId,
        transaction_id: TransactionId,
        resource_id: String,
        lock_key: String,
        branch_type: BranchType,
        application_data: Vec<u8>,
    },
    BranchCommitResult {
        id: i64,
        result_code: ResultCode,
        branch_status: Option<BranchStatus>,
        message: Option<String>,
    },
    BranchRollbackResult {
        id: i64,
        result_code: ResultCode,
        branch_status: Option<BranchStatus>,
        message: Option<String>,
    },
    /// Sent by the RM immediately after the stream upgrade so the
    /// coordinator can key `activeApplications`/`callBackMessages` by
    /// addressing (§4.4).
    RegisterRm {
        addressing: String,
    },
}

impl BranchMessage {
    pub fn id(&self) -> i64 {
        match self {
            BranchMessage::BranchCommit { id, .. }
            | BranchMessage::BranchRollback { id, .. }
            | BranchMessage::BranchCommitResult { id, .. }
            | BranchMessage::BranchRollbackResult { id, .. } => *id,
            BranchMessage::RegisterRm { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_message_round_trips_through_json() {
        let msg = BranchMessage::BranchCommit {
            id: 7,
            xid: "svc:1".into(),
            branch_id: 1,
            transaction_id: 1,
            resource_id: "orderDB".into(),
            lock_key: "so:1".into(),
            branch_type: BranchType::At,
            application_data: vec![],
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: BranchMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), 7);
    }

    #[test]
    fn result_message_carries_branch_status() {
        let msg = BranchMessage::BranchCommitResult {
            id: 3,
            result_code: ResultCode::Success,
            branch_status: Some(BranchStatus::PhaseTwoCommitted),
            message: None,
        };
        match msg {
            BranchMessage::BranchCommitResult { branch_status, .. } => {
                assert_eq!(branch_status, Some(BranchStatus::PhaseTwoCommitted));
            }
            _ => panic!("wrong variant"),
        }
    }
}
