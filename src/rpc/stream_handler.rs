//! `GET /rm/stream`: the RM's long-lived bidirectional stream (§4.4).
//!
//! The first frame the RM sends must be `BranchMessage::RegisterRm`,
//! carrying its addressing; everything after that is either an inbound
//! `*Result` (dispatched to whatever `send_and_wait` call is waiting) or,
//! from the coordinator's side, an outbound `BranchCommit`/`BranchRollback`
//! forwarded from the per-addressing channel.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::coordinator::Coordinator;
use crate::rpc::wire::BranchMessage;

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(coordinator): State<Arc<Coordinator>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, coordinator))
}

async fn handle_stream(socket: WebSocket, coordinator: Arc<Coordinator>) {
    let (mut sink, mut stream) = socket.split();

    let addressing = match stream.next().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<BranchMessage>(&text) {
            Ok(BranchMessage::RegisterRm { addressing }) => addressing,
            _ => {
                warn!("RM stream's first frame was not a RegisterRm message; closing");
                return;
            }
        },
        _ => {
            warn!("RM stream closed before sending RegisterRm");
            return;
        }
    };

    info!(%addressing, "RM stream connected");
    let stream_hub = coordinator.stream_hub();
    let mut outbound = stream_hub.connect(&addressing);

    let sender_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let Ok(json) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<BranchMessage>(&text) {
                Ok(message) => stream_hub.dispatch_response(message),
                Err(err) => warn!(%addressing, %err, "failed to parse inbound branch message"),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    stream_hub.disconnect(&addressing);
    sender_task.abort();
    info!(%addressing, "RM stream disconnected");
}
