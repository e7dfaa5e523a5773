//! In-memory room hub.
//!
//! ## 責務
//!
//! - ルームごとの参加者と、その WebSocket 送信チャネルの管理
//! - ルームごとのメッセージ履歴（上限付き）の保持
//! - 参加者へのメッセージ送信（push_to, broadcast_except）
//!
//! ## 設計ノート
//!
//! WebSocket の生成は UI 層（`ui/handler/websocket.rs`）で行われます。
//! このハブは生成された `UnboundedSender` を受け取り、送信にのみ使用します。
//!
//! 同じ user_id で再接続した場合は新しい接続が古い接続を置き換えます。
//! 古い接続の後片付けが新しい登録を消さないよう、登録ごとに接続 ID を払い出します。

use std::collections::{HashMap, VecDeque};

use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::domain::{RoomId, RoomMessage, UserId};

/// Outbound channel of one participant's WebSocket
pub type PusherChannel = mpsc::UnboundedSender<String>;

struct Participant {
    connection: Uuid,
    sender: PusherChannel,
}

#[derive(Default)]
struct RoomState {
    participants: HashMap<String, Participant>,
    log: VecDeque<RoomMessage>,
}

/// Rooms keyed by room id
pub struct RoomHub {
    rooms: Mutex<HashMap<String, RoomState>>,
    history_limit: usize,
}

impl RoomHub {
    /// Create a hub keeping at most `history_limit` messages per room
    pub fn new(history_limit: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    /// Register a participant and return its connection id and the room backlog.
    ///
    /// An existing registration for the same user is replaced.
    pub async fn join(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        sender: PusherChannel,
    ) -> (Uuid, Vec<RoomMessage>) {
        let connection = Uuid::new_v4();
        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(room_id.as_str().to_string()).or_default();

        let previous = room.participants.insert(
            user_id.as_str().to_string(),
            Participant { connection, sender },
        );
        if previous.is_some() {
            tracing::warn!(
                "[room {}] '{}' reconnected; replacing the previous connection",
                room_id.as_str(),
                user_id.as_str()
            );
        }

        (connection, room.log.iter().cloned().collect())
    }

    /// Remove a participant if `connection` is still its current registration.
    ///
    /// Returns `true` when the participant was removed.
    pub async fn leave(&self, room_id: &RoomId, user_id: &UserId, connection: Uuid) -> bool {
        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.get_mut(room_id.as_str()) else {
            return false;
        };

        let is_current = room
            .participants
            .get(user_id.as_str())
            .is_some_and(|p| p.connection == connection);
        if is_current {
            room.participants.remove(user_id.as_str());
        }

        if room.participants.is_empty() && room.log.is_empty() {
            rooms.remove(room_id.as_str());
        }

        is_current
    }

    /// Append a message to the room backlog, dropping the oldest beyond the limit
    pub async fn record(&self, room_id: &RoomId, message: RoomMessage) {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(room_id.as_str().to_string()).or_default();
        room.log.push_back(message);
        while room.log.len() > self.history_limit {
            room.log.pop_front();
        }
    }

    /// Send `content` to one participant. Returns `false` if it is not connected.
    pub async fn push_to(&self, room_id: &RoomId, user_id: &UserId, content: &str) -> bool {
        let rooms = self.rooms.lock().await;
        let Some(participant) = rooms
            .get(room_id.as_str())
            .and_then(|room| room.participants.get(user_id.as_str()))
        else {
            return false;
        };

        participant.sender.send(content.to_string()).is_ok()
    }

    /// Send `content` to everyone in the room except `exclude`.
    ///
    /// Partial failures are logged and skipped; returns the number of deliveries.
    pub async fn broadcast_except(&self, room_id: &RoomId, exclude: &UserId, content: &str) -> usize {
        let rooms = self.rooms.lock().await;
        let Some(room) = rooms.get(room_id.as_str()) else {
            return 0;
        };

        let mut delivered = 0;
        for (user, participant) in &room.participants {
            if user == exclude.as_str() {
                continue;
            }
            if let Err(e) = participant.sender.send(content.to_string()) {
                tracing::warn!(
                    "[room {}] failed to push to '{}': {}",
                    room_id.as_str(),
                    user,
                    e
                );
            } else {
                delivered += 1;
            }
        }

        delivered
    }

    /// Sorted user ids currently in the room
    pub async fn participants(&self, room_id: &RoomId) -> Vec<String> {
        let rooms = self.rooms.lock().await;
        let mut users: Vec<String> = rooms
            .get(room_id.as_str())
            .map(|room| room.participants.keys().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }
}
