//! MCP link abstraction.
//!
//! The JSON-RPC transport itself belongs to the MCP client library. The server
//! only needs to know whether the configured MCP endpoint can be opened, so the
//! link is reduced to an `open`/`close` pair behind a trait.

use async_trait::async_trait;
use thiserror::Error;

/// MCP link errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum McpError {
    /// The MCP endpoint could not be reached at all
    #[error("MCP server unreachable: {0}")]
    Unreachable(String),

    /// The link could not be shut down cleanly
    #[error("MCP shutdown failed: {0}")]
    ShutdownFailed(String),
}

/// Current state of the server's MCP link
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum McpLinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Last connection attempt failed with the given detail
    Failed(String),
}

impl McpLinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(detail) => Some(detail),
            _ => None,
        }
    }
}

/// Opens and closes the link to an MCP server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait McpConnector: Send + Sync {
    /// Establish the link to `server_url`
    async fn open(&self, server_url: &str) -> Result<(), McpError>;

    /// Tear the link down
    async fn close(&self) -> Result<(), McpError>;
}
