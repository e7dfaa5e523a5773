//! Domain logic for client-side operations.
//!
//! This module contains pure functions that implement business logic
//! without side effects, making them easy to test.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::ClientError;

// ========================================
// Connection Manager
// ========================================

/// Exponential backoff for automatic room reconnects.
///
/// The delay before retry `n` (0-based) is `min(cap, base * 2^n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(30_000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait before retry number `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Check that both session identifiers are present.
pub fn validate_session(room_id: &str, user_id: &str) -> Result<(), ClientError> {
    if room_id.trim().is_empty() {
        return Err(ClientError::Validation("room id is required".to_string()));
    }
    if user_id.trim().is_empty() {
        return Err(ClientError::Validation("user id is required".to_string()));
    }
    Ok(())
}

/// Derive the room WebSocket URL from the server base URL.
///
/// `http` maps to `ws` and `https` to `wss`; any path, query or fragment on the
/// base URL is dropped. Both identifiers are percent-encoded as single path
/// segments. A base URL that does not parse, or has no host, is a validation
/// error rather than something to retry.
///
/// # Examples
///
/// ```
/// use pwchat_client::domain::room_url;
///
/// let url = room_url("https://chat.example.com/app", "war room", "bob").unwrap();
/// assert_eq!(url, "wss://chat.example.com/ws/chat/war%20room/bob");
/// ```
pub fn room_url(base_url: &str, room_id: &str, user_id: &str) -> Result<String, ClientError> {
    let invalid = || ClientError::Validation(format!("invalid server URL '{}'", base_url));

    let mut url = Url::parse(base_url.trim()).map_err(|e| {
        ClientError::Validation(format!("invalid server URL '{}': {}", base_url, e))
    })?;
    let ws_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid()),
    };
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid());
    }

    url.set_scheme(ws_scheme).map_err(|()| invalid())?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| invalid())?
        .clear()
        .extend(["ws", "chat", room_id, user_id]);
    Ok(url.into())
}

/// Who a rendered chat line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineKind {
    /// Sent by the local user
    #[serde(rename = "self")]
    Own,
    /// Sent by another participant
    #[serde(rename = "peer")]
    Peer,
    /// Server notices, errors and anything unrecognized
    #[serde(rename = "system")]
    System,
}

/// One line to render in the chat transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub kind: LineKind,
    pub from: Option<String>,
    pub content: String,
}

impl ChatLine {
    pub fn own(from: &str, content: &str) -> Self {
        Self {
            kind: LineKind::Own,
            from: Some(from.to_string()),
            content: content.to_string(),
        }
    }

    pub fn peer(from: &str, content: &str) -> Self {
        Self {
            kind: LineKind::Peer,
            from: Some(from.to_string()),
            content: content.to_string(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: LineKind::System,
            from: None,
            content: content.into(),
        }
    }
}

/// Classified inbound text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Room backlog, oldest first
    History(Vec<ChatLine>),
    /// A message from another participant
    Peer(ChatLine),
    /// The server relayed our own message; it was already shown on send
    OwnEcho,
    /// Anything else, rendered as a plain line
    System(String),
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn history_line(item: &Value, self_id: &str) -> Option<ChatLine> {
    let content = str_field(item, "content").or_else(|| str_field(item, "message"))?;
    Some(match str_field(item, "from") {
        Some(from) if from == self_id => ChatLine::own(from, content),
        Some(from) => ChatLine::peer(from, content),
        None => ChatLine::system(content),
    })
}

/// Classify one inbound text frame by its `type` discriminator.
///
/// Never fails: text that is not JSON, or JSON of an unknown shape, becomes a
/// system line carrying the most useful text available.
pub fn classify_inbound(text: &str, self_id: &str) -> Inbound {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Inbound::System(text.to_string());
    };

    match str_field(&value, "type") {
        Some("history") => {
            if let Some(items) = value.get("items").and_then(Value::as_array) {
                return Inbound::History(
                    items
                        .iter()
                        .filter_map(|item| history_line(item, self_id))
                        .collect(),
                );
            }
        }
        Some("message") => {
            if let (Some(from), Some(content)) =
                (str_field(&value, "from"), str_field(&value, "content"))
            {
                if from == self_id {
                    return Inbound::OwnEcho;
                }
                return Inbound::Peer(ChatLine::peer(from, content));
            }
        }
        _ => {}
    }

    let summary = ["content", "message", "error"]
        .iter()
        .find_map(|key| str_field(&value, key))
        .map(str::to_string)
        .unwrap_or_else(|| text.to_string());
    Inbound::System(summary)
}

// ========================================
// Status Poller
// ========================================

/// Canonical MCP connection status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum McpStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for McpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Everything the status badge shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBadge {
    pub status: McpStatus,
    /// Failure detail for `Error`
    pub detail: Option<String>,
    /// Display hints reported by the server
    pub llm_model: Option<String>,
    pub server_url: Option<String>,
}

impl StatusBadge {
    pub fn new(status: McpStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: McpStatus::Error,
            detail: Some(detail.into()),
            ..Self::default()
        }
    }
}

/// Interpret a loosely typed flag.
///
/// Booleans, non-zero numbers and the strings `true`/`1`/`yes`/`on` are true.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        _ => false,
    }
}

/// Map a raw `/mcp/status` body to a badge.
///
/// Precedence: `connecting`, then `connected`, then a non-empty `error`.
pub fn map_status(raw: &Value) -> Result<StatusBadge, ClientError> {
    let Some(fields) = raw.as_object() else {
        return Err(ClientError::StatusFetch(
            "status payload is not a JSON object".to_string(),
        ));
    };

    let error = fields
        .get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|e| !e.is_empty());

    let status = if truthy(fields.get("connecting")) {
        McpStatus::Connecting
    } else if truthy(fields.get("connected")) {
        McpStatus::Connected
    } else if error.is_some() {
        McpStatus::Error
    } else {
        McpStatus::Disconnected
    };

    let hint = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Ok(StatusBadge {
        status,
        detail: error.map(str::to_string),
        llm_model: hint("llm_model"),
        server_url: hint("mcp_server_url"),
    })
}

/// Whether moving from `previous` to `next` deserves a one-shot notification
pub fn is_notifiable_transition(previous: McpStatus, next: McpStatus) -> bool {
    previous != next && matches!(next, McpStatus::Connected | McpStatus::Disconnected)
}

/// Polling periods for each observed condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub connecting: Duration,
    pub normal: Duration,
    pub failure: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            connecting: Duration::from_millis(500),
            normal: Duration::from_millis(1500),
            failure: Duration::from_millis(4000),
        }
    }
}

impl PollIntervals {
    /// Period after a successful fetch reporting `status`
    pub fn after_success(&self, status: McpStatus) -> Duration {
        if status == McpStatus::Connecting {
            self.connecting
        } else {
            self.normal
        }
    }
}
