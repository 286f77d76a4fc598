use thiserror::Error;

/// Exception codes carried on RPC responses, per the wire contract every
/// TM/RM call returns: `{ResultCode, payload, ExceptionCode?, Message?}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExceptionCode {
    BeginFailed,
    GlobalTransactionNotExist,
    GlobalTransactionNotActive,
    GlobalTransactionStatusInvalid,
    FailedLockGlobalTransaction,
    LockKeyConflict,
    BranchRegisterFailed,
    BranchReportFailed,
    Unimplemented,
    UnknownErr,
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("global transaction not found: {0}")]
    GlobalTransactionNotExist(String),

    #[error("global transaction {0} is not active")]
    GlobalTransactionNotActive(String),

    #[error("global transaction {0} is in status {1:?}, which does not allow this operation")]
    GlobalTransactionStatusInvalid(String, String),

    #[error("failed to lock global transaction {0}")]
    FailedLockGlobalTransaction(String),

    #[error("lock key conflict on resource {0}")]
    LockKeyConflict(String),

    #[error("branch registration failed: {0}")]
    BranchRegisterFailed(String),

    #[error("branch report failed: {0}")]
    BranchReportFailed(String),

    #[error("method not implemented: {0}")]
    Unimplemented(&'static str),

    #[error("branch RPC timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid lock key: {0}")]
    InvalidLockKey(String),

    #[error("invalid XID: {0}")]
    InvalidXid(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Maps an internal error to the wire-level exception code, per §7.
    pub fn exception_code(&self) -> ExceptionCode {
        match self {
            CoordinatorError::GlobalTransactionNotExist(_) => {
                ExceptionCode::GlobalTransactionNotExist
            }
            CoordinatorError::GlobalTransactionNotActive(_) => {
                ExceptionCode::GlobalTransactionNotActive
            }
            CoordinatorError::GlobalTransactionStatusInvalid(_, _) => {
                ExceptionCode::GlobalTransactionStatusInvalid
            }
            CoordinatorError::FailedLockGlobalTransaction(_) => {
                ExceptionCode::FailedLockGlobalTransaction
            }
            CoordinatorError::LockKeyConflict(_) => ExceptionCode::LockKeyConflict,
            CoordinatorError::BranchRegisterFailed(_) => ExceptionCode::BranchRegisterFailed,
            CoordinatorError::BranchReportFailed(_) => ExceptionCode::BranchReportFailed,
            CoordinatorError::Unimplemented(_) => ExceptionCode::Unimplemented,
            _ => ExceptionCode::UnknownErr,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
