//! Route handlers.

pub mod http;
pub mod websocket;

pub use http::{health_check, mcp_connect, mcp_disconnect, mcp_reconnect, mcp_status};
pub use websocket::websocket_handler;
