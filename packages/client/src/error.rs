//! Error types for the pwchat client.

use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Missing or malformed input (room id, user id, server URL, message)
    #[error("{0}")]
    Validation(String),

    /// Socket-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A message was sent without an open room connection
    #[error("not connected to a room")]
    NotConnected,

    /// `GET /mcp/status` failed or returned something unusable
    #[error("status fetch failed: {0}")]
    StatusFetch(String),

    /// An MCP connect/disconnect/reconnect request failed
    #[error("MCP {command} failed: {detail}")]
    Command {
        command: &'static str,
        detail: String,
    },

    /// The local state file could not be read or written
    #[error("storage error: {0}")]
    Storage(String),

    /// The connection manager task is no longer running
    #[error("connection manager has stopped")]
    Closed,
}
