use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::session::Session;
use crate::models::caller::Caller;
use crate::models::message::{ClientMessage, PushMessage};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, caller))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, caller: Caller) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<PushMessage>(state.hub.capacity());
    let mut session = Session::open(state, caller, outbound_tx.clone());
    let connection_id = session.id();

    info!(connection_id, user_id = %caller.id, role = ?caller.role, "websocket client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize push message for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let reply = match ClientMessage::parse(&text) {
                Ok(message) => session.handle(message).await,
                Err(err) => {
                    debug!(connection_id = session.id(), error = %err, "malformed client message");
                    Some(PushMessage::Error {
                        message: err.to_string(),
                    })
                }
            };

            if let Some(reply) = reply {
                if outbound_tx.send(reply).await.is_err() {
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(connection_id, "websocket client disconnected");
}
