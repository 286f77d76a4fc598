//! TM-facing unary endpoints: `Begin`, `GetStatus`, `Commit`, `Rollback`,
//! `GlobalReport` (§6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::coordinator::Coordinator;

use super::wire::{BeginRequest, BeginResponse, GlobalReportRequest, GlobalStatusResponse};
use super::{ApiError, ApiResult};

pub async fn begin(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<BeginRequest>,
) -> ApiResult<BeginResponse> {
    let xid = coordinator
        .begin(req.addressing, req.transaction_name, req.timeout_ms)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(BeginResponse { xid }))
}

pub async fn get_status(
    State(coordinator): State<Arc<Coordinator>>,
    Path(xid): Path<String>,
) -> ApiResult<GlobalStatusResponse> {
    let global_status = coordinator.get_status(&xid).await.map_err(ApiError::from)?;
    Ok(Json(GlobalStatusResponse { global_status }))
}

pub async fn commit(
    State(coordinator): State<Arc<Coordinator>>,
    Path(xid): Path<String>,
) -> ApiResult<GlobalStatusResponse> {
    let global_status = coordinator.commit(&xid).await.map_err(ApiError::from)?;
    Ok(Json(GlobalStatusResponse { global_status }))
}

pub async fn rollback(
    State(coordinator): State<Arc<Coordinator>>,
    Path(xid): Path<String>,
) -> ApiResult<GlobalStatusResponse> {
    let global_status = coordinator.rollback(&xid).await.map_err(ApiError::from)?;
    Ok(Json(GlobalStatusResponse { global_status }))
}

/// Advertised but unimplemented (§9): always returns `501` via
/// `CoordinatorError::Unimplemented`.
pub async fn global_report(
    State(coordinator): State<Arc<Coordinator>>,
    Path(xid): Path<String>,
    Json(req): Json<GlobalReportRequest>,
) -> ApiResult<()> {
    coordinator
        .global_report(&xid, req.global_status)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(()))
}
