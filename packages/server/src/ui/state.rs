//! Shared application state.

use std::sync::Arc;

use crate::usecase::{McpControlUseCase, RoomChatUseCase};

/// Shared application state
pub struct AppState {
    /// RoomChatUseCase（ルームチャットのユースケース）
    pub room_chat_usecase: Arc<RoomChatUseCase>,
    /// McpControlUseCase（MCP 接続制御のユースケース）
    pub mcp_control_usecase: Arc<McpControlUseCase>,
}
