//! The four independent reconciliation loops (§4.6), each on its own
//! tokio interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::model::GlobalStatus;

use super::Coordinator;

/// Spawns the four loops and returns immediately; each loop runs until the
/// process exits (there is no graceful-shutdown signal in scope here, same
/// as the teacher's background workers).
pub fn run_reconciliation_loops(coordinator: Arc<Coordinator>) {
    tokio::spawn(timeout_check_loop(coordinator.clone()));
    tokio::spawn(async_committing_loop(coordinator.clone()));
    tokio::spawn(retry_committing_loop(coordinator.clone()));
    tokio::spawn(retry_rollback_loop(coordinator));
}

/// Loop 1: globals stuck in `Begin` past their timeout move to
/// `TimeoutRollingBack`; loop 4 drives them from there.
async fn timeout_check_loop(coordinator: Arc<Coordinator>) {
    let period = Duration::from_millis(coordinator.config.timeout_check_period_ms);
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let page_size = coordinator.config.timeout_scan_page_size;
        let candidates = match coordinator.holder.find_timeout_candidates(page_size).await {
            Ok(c) => c,
            Err(err) => {
                warn!(%err, "timeout-check scan failed");
                continue;
            }
        };

        let now_ms = Utc::now().timestamp_millis();
        for global in candidates {
            if !global.is_timed_out(now_ms) {
                continue;
            }
            if let Err(err) = coordinator.holder.inactivate_global_session(&global.xid).await {
                warn!(xid = %global.xid, %err, "failed to inactivate timed-out global");
                continue;
            }
            if let Err(err) = coordinator
                .holder
                .update_global_session_status(&global.xid, GlobalStatus::TimeoutRollingBack)
                .await
            {
                warn!(xid = %global.xid, %err, "failed to transition timed-out global");
                continue;
            }
            coordinator.events.emit_timed_out(&global.xid);
            info!(xid = %global.xid, "global transaction timed out");
        }
    }
}

/// Loop 2: the non-TCC fast path's actual per-branch work happens here.
async fn async_committing_loop(coordinator: Arc<Coordinator>) {
    let period = Duration::from_millis(coordinator.config.async_committing_period_ms);
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let connected = coordinator.stream_hub.connected_addressings();
        let candidates = match coordinator.holder.find_async_committing(&connected).await {
            Ok(c) => c,
            Err(err) => {
                warn!(%err, "async-committing scan failed");
                continue;
            }
        };
        for mut gt in candidates {
            if let Err(err) = coordinator.do_global_commit(&mut gt, true).await {
                warn!(xid = %gt.xid(), %err, "async-committing retry failed");
            }
        }
    }
}

/// Loop 3: globals that hit an RPC error on their first synchronous commit
/// attempt get driven here until they settle, with the same abandon-after-
/// timeout ceiling loop 4 applies on the rollback side.
async fn retry_committing_loop(coordinator: Arc<Coordinator>) {
    let period = Duration::from_millis(coordinator.config.committing_retry_period_ms);
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let connected = coordinator.stream_hub.connected_addressings();
        let candidates = match coordinator.holder.find_retry_committing(&connected).await {
            Ok(c) => c,
            Err(err) => {
                warn!(%err, "commit-retry scan failed");
                continue;
            }
        };

        let now = Utc::now();
        for mut gt in candidates {
            if let Some(max_timeout) = coordinator.config.max_commit_retry_timeout_ms {
                let age_ms = now.timestamp_millis() - gt.global_session.begin_time;
                if age_ms > max_timeout as i64 {
                    if let Err(err) = coordinator.holder.remove_global_transaction(&gt).await {
                        warn!(xid = %gt.xid(), %err, "failed to abandon commit-retry global past max timeout");
                    } else {
                        warn!(xid = %gt.xid(), "abandoned commit-retry global past max_commit_retry_timeout");
                    }
                    continue;
                }
            }

            if let Err(err) = coordinator.do_global_commit(&mut gt, true).await {
                warn!(xid = %gt.xid(), %err, "commit retry attempt failed");
            }
        }
    }
}

/// Loop 4: drives every flavor of rollback-in-progress global, with the
/// "rolling-back dead window" guard (§4.6) to avoid racing a rollback that
/// just started, and an optional abandon-after-timeout ceiling.
async fn retry_rollback_loop(coordinator: Arc<Coordinator>) {
    let period = Duration::from_millis(coordinator.config.rollback_retry_period_ms);
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let connected = coordinator.stream_hub.connected_addressings();
        let candidates = match coordinator.holder.find_retry_rollback(&connected).await {
            Ok(c) => c,
            Err(err) => {
                warn!(%err, "retry-rollback scan failed");
                continue;
            }
        };

        let now = Utc::now();
        for mut gt in candidates {
            if gt.global_session.status == GlobalStatus::RollingBack {
                let age = now.signed_duration_since(gt.global_session.gmt_modified);
                let dead_window = chrono::Duration::from_std(coordinator.config.rollback_dead_window())
                    .unwrap_or(chrono::Duration::zero());
                if age < dead_window {
                    continue;
                }
            }

            if let Some(max_timeout) = coordinator.config.max_rollback_retry_timeout_ms {
                let age_ms = now.timestamp_millis() - gt.global_session.begin_time;
                if age_ms > max_timeout as i64 {
                    if coordinator.config.rollback_retry_timeout_unlock_enable {
                        let _ = coordinator.lock_manager.release_global_session_lock(&gt).await;
                    }
                    if let Err(err) = coordinator.holder.remove_global_transaction(&gt).await {
                        warn!(xid = %gt.xid(), %err, "failed to abandon rollback-retry global past max timeout");
                    } else {
                        warn!(xid = %gt.xid(), "abandoned rollback-retry global past max_rollback_retry_timeout");
                    }
                    continue;
                }
            }

            if let Err(err) = coordinator.do_global_rollback(&mut gt, true).await {
                warn!(xid = %gt.xid(), %err, "rollback retry attempt failed");
            }
        }
    }
}
