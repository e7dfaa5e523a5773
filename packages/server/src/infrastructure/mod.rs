//! Infrastructure layer: concrete room hub and MCP connector.

pub mod mcp_probe;
pub mod room_hub;

pub use mcp_probe::HttpProbeConnector;
pub use room_hub::{PusherChannel, RoomHub};
