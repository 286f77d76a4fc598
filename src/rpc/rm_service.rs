//! RM-facing unary endpoints: `BranchRegister`, `BranchReport`,
//! `LockQuery` (§6).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::coordinator::Coordinator;

use super::wire::{
    BranchRegisterRequest, BranchRegisterResponse, BranchReportRequest, LockQueryRequest,
    LockQueryResponse,
};
use super::{ApiError, ApiResult};

pub async fn branch_register(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<BranchRegisterRequest>,
) -> ApiResult<BranchRegisterResponse> {
    let branch_id = coordinator
        .branch_register(
            &req.xid,
            req.resource_id,
            req.lock_key,
            req.branch_type,
            req.application_data,
        )
        .await
        .map_err(ApiError::from)?;
    Ok(Json(BranchRegisterResponse { branch_id }))
}

pub async fn branch_report(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<BranchReportRequest>,
) -> ApiResult<()> {
    coordinator
        .branch_report(&req.xid, req.branch_id, req.branch_status)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(()))
}

pub async fn lock_query(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<LockQueryRequest>,
) -> ApiResult<LockQueryResponse> {
    let lockable = coordinator
        .lock_query(&req.xid, &req.resource_id, &req.lock_key)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(LockQueryResponse { lockable }))
}
