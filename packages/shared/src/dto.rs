//! Data Transfer Objects for the room WebSocket and the MCP control API.
//!
//! The server serializes these types. The client only uses the outbound
//! request types strictly; inbound frames are classified leniently on the
//! client side because the server may push types this crate does not know.

use serde::{Deserialize, Serialize};

/// WebSocket close code sent to a connection displaced by a newer one for the
/// same room and user id. Clients must not reconnect automatically after it.
pub const REPLACED_CLOSE_CODE: u16 = 4000;

pub const REPLACED_CLOSE_REASON: &str = "replaced by a newer connection";

/// Discriminator carried in the `type` field of room frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    /// Backlog of the room, sent once to a joining client
    History,
    /// A chat message from another participant
    Message,
    /// A participant entered the room
    Join,
    /// A participant announced an explicit departure
    Leave,
    /// Something the sender did was rejected
    Error,
}

/// A chat message sent by the client: `{"message": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// An explicit departure notice sent by the client: `{"type": "leave"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub r#type: FrameType,
}

impl Default for LeaveRequest {
    fn default() -> Self {
        Self {
            r#type: FrameType::Leave,
        }
    }
}

/// Any frame a client may send, as read by the server.
///
/// Both fields are optional so one struct accepts chat messages and leave notices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ClientFrame {
    /// Whether the frame is an explicit leave notice
    pub fn is_leave(&self) -> bool {
        self.r#type.as_deref() == Some("leave")
    }
}

/// One entry of a `history` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub r#type: FrameType,
    pub from: String,
    pub content: String,
}

/// `{"type": "history", "items": [...]}`, oldest item first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFrame {
    pub r#type: FrameType,
    pub items: Vec<HistoryItem>,
}

/// `{"type": "message", "from": "...", "content": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFrame {
    pub r#type: FrameType,
    pub from: String,
    pub content: String,
}

/// Join, leave and error notices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeFrame {
    pub r#type: FrameType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NoticeFrame {
    /// Notice about another participant (join / leave)
    pub fn about(r#type: FrameType, from: &str, content: String) -> Self {
        Self {
            r#type,
            from: Some(from.to_string()),
            content: Some(content),
            error: None,
        }
    }

    /// Error sent back to the offending client only
    pub fn error(detail: &str) -> Self {
        Self {
            r#type: FrameType::Error,
            from: None,
            content: None,
            error: Some(detail.to_string()),
        }
    }
}

/// Response body of `GET /mcp/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpStatusDto {
    pub connected: bool,
    pub connecting: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub llm_model: String,
    pub mcp_server_url: String,
}

/// Success body of the MCP command endpoints: `{"status": "connected"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpCommandReply {
    pub status: String,
}

/// Failure body of the MCP command endpoints.
///
/// Either field may carry the detail; `message` wins when both are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl McpErrorBody {
    /// The human readable failure detail, if the body carried one
    pub fn detail(&self) -> Option<&str> {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .filter(|d| !d.trim().is_empty())
    }
}
