//! UseCase layer.

pub mod mcp_control;
pub mod room_chat;

pub use mcp_control::McpControlUseCase;
pub use room_chat::{FrameOutcome, RoomChatUseCase};
