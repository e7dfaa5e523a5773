//! Room value objects.
//!
//! Identifiers arrive as URL path segments and message bodies as client JSON,
//! so both are validated once at the boundary and carried as typed values.

use thiserror::Error;

/// Maximum length of a single chat message (in characters)
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Maximum length of a room or user id (in characters)
pub const MAX_ID_CHARS: usize = 128;

/// Validation errors for room value objects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
}

fn validated(field: &'static str, value: String, max: usize) -> Result<String, ValueError> {
    if value.trim().is_empty() {
        return Err(ValueError::Empty(field));
    }
    if value.chars().count() > max {
        return Err(ValueError::TooLong { field, max });
    }
    Ok(value)
}

/// Chat room identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: String) -> Result<Self, ValueError> {
        validated("room_id", value, MAX_ID_CHARS).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Participant identifier, unique within a room
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: String) -> Result<Self, ValueError> {
        validated("user_id", value, MAX_ID_CHARS).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Trimmed, non-empty chat message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: String) -> Result<Self, ValueError> {
        let trimmed = value.trim().to_string();
        validated("message", trimmed, MAX_MESSAGE_CHARS).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A message kept in a room's backlog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMessage {
    pub from: UserId,
    pub content: MessageContent,
    /// Unix timestamp (milliseconds)
    pub sent_at: i64,
}
