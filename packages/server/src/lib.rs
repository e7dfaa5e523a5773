//! Development server for pwchat.
//!
//! Serves the room WebSocket (`/ws/chat/{room_id}/{user_id}`) and the MCP
//! status/control API (`/mcp/*`) that the pwchat client consumes.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
