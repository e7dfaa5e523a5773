//! UseCase: ルームチャット（参加・発言・退出）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - RoomChatUseCase の join / handle_text / leave
//!
//! ### なぜこのテストが必要か
//! - 送信者には自分のメッセージがエコーされないこと（クライアントは楽観的に表示済み）
//! - 参加時に history フレームが届くこと
//! - 不正なフレームや空メッセージは送信者にだけエラーとして返ること
//!
//! ### どのような状況を想定しているか
//! - 正常系：参加、発言のブロードキャスト、明示的な退出
//! - 異常系：空メッセージ、JSON でないフレーム
//! - エッジケース：明示的に退出した参加者の切断（二重の退出通知を出さない）

use std::sync::Arc;

use pwchat_shared::{
    dto::{ClientFrame, FrameType, HistoryFrame, HistoryItem, MessageFrame, NoticeFrame},
    time::{Clock, timestamp_to_rfc3339},
};
use uuid::Uuid;

use crate::{
    domain::{MessageContent, RoomId, RoomMessage, UserId, ValueError},
    infrastructure::{PusherChannel, RoomHub},
};

/// What the connection handler should do after an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Keep reading
    Continue,
    /// The participant announced an explicit departure
    Left,
}

/// ルームチャットのユースケース
pub struct RoomChatUseCase {
    hub: Arc<RoomHub>,
    clock: Arc<dyn Clock>,
}

fn to_json<T: serde::Serialize>(frame: &T) -> String {
    // The DTOs only contain strings and enums, so serialization cannot fail.
    serde_json::to_string(frame).unwrap_or_default()
}

impl RoomChatUseCase {
    pub fn new(hub: Arc<RoomHub>, clock: Arc<dyn Clock>) -> Self {
        Self { hub, clock }
    }

    /// 参加者を登録し、履歴を本人に、参加通知を他の参加者に送る
    ///
    /// # Returns
    ///
    /// 接続 ID（退出時に `leave` へ渡す）
    pub async fn join(&self, room: &RoomId, user: &UserId, sender: PusherChannel) -> Uuid {
        let (connection, backlog) = self.hub.join(room, user, sender).await;

        let history = HistoryFrame {
            r#type: FrameType::History,
            items: backlog
                .into_iter()
                .map(|m| HistoryItem {
                    r#type: FrameType::Message,
                    from: m.from.as_str().to_string(),
                    content: m.content.as_str().to_string(),
                })
                .collect(),
        };
        self.hub.push_to(room, user, &to_json(&history)).await;

        let joined = NoticeFrame::about(
            FrameType::Join,
            user.as_str(),
            format!("{} joined the room", user.as_str()),
        );
        let notified = self
            .hub
            .broadcast_except(room, user, &to_json(&joined))
            .await;
        tracing::info!(
            "[room {}] '{}' joined ({} other participants notified)",
            room.as_str(),
            user.as_str(),
            notified
        );

        connection
    }

    /// クライアントから届いたテキストフレームを処理
    pub async fn handle_text(&self, room: &RoomId, user: &UserId, text: &str) -> FrameOutcome {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    "[room {}] undecodable frame from '{}': {}",
                    room.as_str(),
                    user.as_str(),
                    e
                );
                let error = NoticeFrame::error("invalid frame: expected JSON object");
                self.hub.push_to(room, user, &to_json(&error)).await;
                return FrameOutcome::Continue;
            }
        };

        if frame.is_leave() {
            let left = NoticeFrame::about(
                FrameType::Leave,
                user.as_str(),
                format!("{} left the room", user.as_str()),
            );
            self.hub.broadcast_except(room, user, &to_json(&left)).await;
            tracing::info!("[room {}] '{}' left", room.as_str(), user.as_str());
            return FrameOutcome::Left;
        }

        let content = match MessageContent::new(frame.message.unwrap_or_default()) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!("[room {}] rejected message: {}", room.as_str(), e);
                let detail = match e {
                    ValueError::Empty(_) => "empty message".to_string(),
                    other => other.to_string(),
                };
                let error = NoticeFrame::error(&detail);
                self.hub.push_to(room, user, &to_json(&error)).await;
                return FrameOutcome::Continue;
            }
        };

        let outbound = MessageFrame {
            r#type: FrameType::Message,
            from: user.as_str().to_string(),
            content: content.as_str().to_string(),
        };
        let sent_at = self.clock.now_millis();
        self.hub
            .record(
                room,
                RoomMessage {
                    from: user.clone(),
                    content,
                    sent_at,
                },
            )
            .await;
        let delivered = self
            .hub
            .broadcast_except(room, user, &to_json(&outbound))
            .await;
        tracing::debug!(
            "[room {}] message from '{}' at {} delivered to {} participants",
            room.as_str(),
            user.as_str(),
            timestamp_to_rfc3339(sent_at),
            delivered
        );

        FrameOutcome::Continue
    }

    /// 接続終了時の後片付け
    ///
    /// 明示的に退出していない場合のみ、他の参加者に退出を通知する。
    pub async fn leave(&self, room: &RoomId, user: &UserId, connection: Uuid, announced: bool) {
        let removed = self.hub.leave(room, user, connection).await;
        if removed && !announced {
            let left = NoticeFrame::about(
                FrameType::Leave,
                user.as_str(),
                format!("{} disconnected", user.as_str()),
            );
            self.hub.broadcast_except(room, user, &to_json(&left)).await;
        }
        tracing::info!(
            "[room {}] '{}' connection closed (removed: {})",
            room.as_str(),
            user.as_str(),
            removed
        );
    }
}
