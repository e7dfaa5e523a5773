//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use pwchat_shared::dto::{REPLACED_CLOSE_CODE, REPLACED_CLOSE_REASON};
use tokio::sync::mpsc;

use crate::{
    domain::{RoomId, UserId},
    usecase::FrameOutcome,
    ui::state::AppState,
};

/// `GET /ws/chat/{room_id}/{user_id}`
///
/// Path segments arrive percent-decoded.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, StatusCode> {
    let room = RoomId::new(room_id).map_err(|e| {
        tracing::warn!("Rejecting connection: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let user = UserId::new(user_id).map_err(|e| {
        tracing::warn!("Rejecting connection: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, room, user)))
}

/// Spawns a task that receives messages from the rx channel and pushes them to the WebSocket sender.
///
/// The hub drops a live participant's channel only when the same user joins
/// the room again, so a closed channel ends the socket with
/// [`REPLACED_CLOSE_CODE`].
///
/// # Arguments
///
/// * `rx` - Channel receiver for frames addressed to this participant
/// * `sender` - WebSocket sink to send messages to this client
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                return;
            }
        }

        let replaced = CloseFrame {
            code: REPLACED_CLOSE_CODE,
            reason: REPLACED_CLOSE_REASON.into(),
        };
        if let Err(e) = sender.send(Message::Close(Some(replaced))).await {
            tracing::debug!("Failed to close replaced connection: {}", e);
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room: RoomId, user: UserId) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    // The history frame goes through the channel so it precedes any broadcast.
    let connection = state.room_chat_usecase.join(&room, &user, tx).await;

    let usecase = state.room_chat_usecase.clone();
    let recv_room = room.clone();
    let recv_user = user.clone();

    // Returns whether the participant sent an explicit leave notice
    let mut recv_task = tokio::spawn(async move {
        let mut announced = false;
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error: {}", e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    tracing::debug!("Received text: {}", text.as_str());
                    if usecase
                        .handle_text(&recv_room, &recv_user, text.as_str())
                        .await
                        == FrameOutcome::Left
                    {
                        announced = true;
                    }
                }
                Message::Close(_) => {
                    tracing::debug!("Client '{}' requested close", recv_user.as_str());
                    break;
                }
                _ => {}
            }
        }
        announced
    });

    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    let announced = tokio::select! {
        result = &mut recv_task => {
            send_task.abort();
            result.unwrap_or(false)
        }
        _ = &mut send_task => {
            recv_task.abort();
            false
        }
    };

    state
        .room_chat_usecase
        .leave(&room, &user, connection, announced)
        .await;
}
