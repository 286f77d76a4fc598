//! Request/response correlation over the RM's bidirectional stream (§4.4).
//!
//! Each connected RM addressing gets an outbound channel; a task reads from
//! it and forwards onto the live WebSocket. Inbound `*Result` messages are
//! dispatched back to whichever caller is awaiting that message id via a
//! one-shot future.
//!
//! The original keys the per-addressing channel with `sync.Map.LoadOrStore`
//! and keeps it alive across reconnects, which a Rust `mpsc::Receiver` can't
//! do (it has a single owner). Instead `connect` mints a fresh channel on
//! every stream upgrade and replaces the old entry — any sender still
//! racing against a just-closed receiver simply fails the `try_send`, which
//! is exactly the "RM not reachable" case the original treats as a non-error.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::error::{CoordinatorError, Result};
use crate::rpc::wire::BranchMessage;

const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Outcome of a single branch RPC dispatched through the stream.
pub enum BranchCallOutcome {
    /// The RM replied before the timeout.
    Delivered(BranchMessage),
    /// No live stream for that addressing (never connected, or the
    /// previous connection dropped). The original returns the branch's
    /// prior status and a nil error in this case; callers should do the
    /// same rather than treating this as a hard failure.
    NotConnected,
}

pub struct StreamHub {
    callbacks: DashMap<String, mpsc::Sender<BranchMessage>>,
    futures: DashMap<i64, oneshot::Sender<BranchMessage>>,
    active_applications: DashMap<String, AtomicI64>,
    message_ids: crate::common::idgen::MessageIdGenerator,
}

impl StreamHub {
    pub fn new() -> Self {
        Self {
            callbacks: DashMap::new(),
            futures: DashMap::new(),
            active_applications: DashMap::new(),
            message_ids: crate::common::idgen::MessageIdGenerator::new(),
        }
    }

    pub fn next_message_id(&self) -> i64 {
        self.message_ids.next_id()
    }

    /// Registers a new stream connection for `addressing`, replacing any
    /// previous outbound channel, and returns the receiving half for the
    /// caller to forward onto the wire. Increments the connection counter
    /// that the reconciliation loops use to filter which globals to drive.
    pub fn connect(&self, addressing: &str) -> mpsc::Receiver<BranchMessage> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        self.callbacks.insert(addressing.to_string(), tx);
        self.active_applications
            .entry(addressing.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::SeqCst);
        rx
    }

    /// Called when a stream ends. Decrements the connection counter; does
    /// not remove the outbound channel entry, since `connect` always
    /// replaces it on the next reconnect.
    pub fn disconnect(&self, addressing: &str) {
        if let Some(counter) = self.active_applications.get(addressing) {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Addressings with at least one live stream, used to filter the
    /// reconciliation loops (§4.6) to globals whose RM is actually
    /// reachable right now.
    pub fn connected_addressings(&self) -> HashSet<String> {
        self.active_applications
            .iter()
            .filter(|e| e.value().load(Ordering::SeqCst) > 0)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Dispatches an inbound `*Result` message to whichever caller
    /// registered a future for its id. A miss (already timed out, or a
    /// duplicate/unsolicited reply) is silently ignored.
    pub fn dispatch_response(&self, message: BranchMessage) {
        if let Some((_, sender)) = self.futures.remove(&message.id()) {
            let _ = sender.send(message);
        }
    }

    /// Sends `message` to `addressing` and waits up to `timeout` for the
    /// matching response. The future is registered *before* the message is
    /// published, fixing the ordering hazard the original leaves as an
    /// inline TODO: publishing first risks the response arriving before the
    /// future exists, silently dropping it in `dispatch_response`.
    pub async fn send_and_wait(
        &self,
        addressing: &str,
        message: BranchMessage,
        timeout: Duration,
    ) -> Result<BranchCallOutcome> {
        let id = message.id();
        let (tx, rx) = oneshot::channel();
        self.futures.insert(id, tx);

        let Some(sender) = self.callbacks.get(addressing).map(|e| e.clone()) else {
            self.futures.remove(&id);
            return Ok(BranchCallOutcome::NotConnected);
        };

        if sender.try_send(message).is_err() {
            self.futures.remove(&id);
            return Ok(BranchCallOutcome::NotConnected);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(BranchCallOutcome::Delivered(response)),
            Ok(Err(_)) => {
                // Sender half dropped without a reply; treat like a timeout.
                Err(CoordinatorError::Timeout(timeout))
            }
            Err(_) => {
                self.futures.remove(&id);
                Err(CoordinatorError::Timeout(timeout))
            }
        }
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BranchType;

    fn commit_message(id: i64) -> BranchMessage {
        BranchMessage::BranchCommit {
            id,
            xid: "svc:1".into(),
            branch_id: 1,
            transaction_id: 1,
            resource_id: "orderDB".into(),
            lock_key: "so:1".into(),
            branch_type: BranchType::At,
            application_data: vec![],
        }
    }

    #[tokio::test]
    async fn send_and_wait_reports_not_connected_without_stream() {
        let hub = StreamHub::new();
        let outcome = hub
            .send_and_wait("svc", commit_message(1), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(matches!(outcome, BranchCallOutcome::NotConnected));
    }

    #[tokio::test]
    async fn send_and_wait_delivers_matching_response() {
        let hub = StreamHub::new();
        let mut rx = hub.connect("svc");

        let hub_clone = std::sync::Arc::new(hub);
        let hub_for_responder = hub_clone.clone();
        tokio::spawn(async move {
            let msg = rx.recv().await.unwrap();
            let id = msg.id();
            hub_for_responder.dispatch_response(BranchMessage::BranchCommitResult {
                id,
                result_code: crate::rpc::wire::ResultCode::Success,
                branch_status: Some(crate::model::BranchStatus::PhaseTwoCommitted),
                message: None,
            });
        });

        let outcome = hub_clone
            .send_and_wait("svc", commit_message(1), Duration::from_millis(500))
            .await
            .unwrap();
        match outcome {
            BranchCallOutcome::Delivered(BranchMessage::BranchCommitResult { id, .. }) => {
                assert_eq!(id, 1);
            }
            _ => panic!("expected delivered commit result"),
        }
    }

    #[tokio::test]
    async fn send_and_wait_times_out_without_response() {
        let hub = StreamHub::new();
        let _rx = hub.connect("svc");
        let result = hub
            .send_and_wait("svc", commit_message(2), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(CoordinatorError::Timeout(_))));
    }

    #[test]
    fn connected_addressings_reflects_counter() {
        let hub = StreamHub::new();
        assert!(hub.connected_addressings().is_empty());
        let _rx = hub.connect("svc");
        assert!(hub.connected_addressings().contains("svc"));
        hub.disconnect("svc");
        assert!(hub.connected_addressings().is_empty());
    }
}
