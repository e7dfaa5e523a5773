//! Domain layer: value objects for rooms and the MCP link abstraction.

pub mod mcp;
pub mod room;

pub use mcp::{McpConnector, McpError, McpLinkState};
pub use room::{MessageContent, RoomId, RoomMessage, UserId, ValueError};
