//! Code shared by the pwchat client and server.
//!
//! - `dto`: JSON frames exchanged over the room WebSocket and the MCP control API
//! - `logger`: tracing subscriber setup for the binaries
//! - `time`: clock abstraction used for cooldowns and timestamps

pub mod dto;
pub mod logger;
pub mod time;
