//! The network surface: TM-facing unary endpoints, RM-facing unary
//! endpoints, and the RM's bidirectional stream, all served over axum (§6).

pub mod rm_service;
pub mod stream_handler;
pub mod tm_service;
pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::coordinator::Coordinator;
use crate::error::{CoordinatorError, ExceptionCode};
use wire::ErrorResponse;

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Wraps `CoordinatorError` so handlers can return it directly as an axum
/// response body shaped like §7's `{ExceptionCode, Message}` error contract.
pub struct ApiError(pub CoordinatorError);

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let exception_code = self.0.exception_code();
        let status = match exception_code {
            ExceptionCode::GlobalTransactionNotExist => StatusCode::NOT_FOUND,
            ExceptionCode::GlobalTransactionNotActive
            | ExceptionCode::GlobalTransactionStatusInvalid
            | ExceptionCode::LockKeyConflict
            | ExceptionCode::FailedLockGlobalTransaction
            | ExceptionCode::BranchRegisterFailed
            | ExceptionCode::BranchReportFailed => StatusCode::CONFLICT,
            ExceptionCode::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            ExceptionCode::BeginFailed | ExceptionCode::UnknownErr => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorResponse {
            exception_code,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn build_router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/tm/begin", post(tm_service::begin))
        .route("/tm/{xid}/status", get(tm_service::get_status))
        .route("/tm/{xid}/commit", post(tm_service::commit))
        .route("/tm/{xid}/rollback", post(tm_service::rollback))
        .route("/tm/{xid}/report", post(tm_service::global_report))
        .route("/rm/branch", post(rm_service::branch_register))
        .route("/rm/branch/report", post(rm_service::branch_report))
        .route("/rm/lock", post(rm_service::lock_query))
        .route("/rm/stream", get(stream_handler::upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .with_state(coordinator)
}
