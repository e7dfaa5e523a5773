//! Message formatting utilities for client display.

use pwchat_shared::time::timestamp_to_local_hms;

use crate::{
    domain::{ChatLine, LineKind, McpStatus, StatusBadge},
    store::HistoryEntry,
    ui::{LinkState, NotifyLevel},
};

const RULE: &str = "------------------------------------------------------------";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format one chat line received or sent at `at_ms`
    ///
    /// # Arguments
    ///
    /// * `line` - The classified line
    /// * `at_ms` - Unix timestamp (milliseconds) shown next to the line
    ///
    /// # Returns
    ///
    /// A formatted string ending in a newline
    pub fn format_line(line: &ChatLine, at_ms: i64) -> String {
        let time = timestamp_to_local_hms(at_ms);
        let from = line.from.as_deref().unwrap_or("?");
        match line.kind {
            LineKind::Own => format!("[{}] me ({}): {}\n", time, from, line.content),
            LineKind::Peer => format!("[{}] @{}: {}\n", time, from, line.content),
            LineKind::System => format!("[{}] * {}\n", time, line.content),
        }
    }

    /// Format a replayed history entry, using its stored timestamp
    pub fn format_history_entry(entry: &HistoryEntry) -> String {
        let line = ChatLine {
            kind: entry.kind,
            from: entry.from.clone(),
            content: entry.content.clone(),
        };
        Self::format_line(&line, entry.at_ms)
    }

    /// Format the separator printed before locally cached history
    ///
    /// # Arguments
    ///
    /// * `count` - Number of cached entries that follow
    pub fn format_replay_header(count: usize) -> String {
        format!("{}\nlocal history ({} lines)\n{}\n", RULE, count, RULE)
    }

    /// Format a change of the room connection state
    pub fn format_link_state(state: LinkState) -> String {
        match state {
            LinkState::Disconnected => "* disconnected\n".to_string(),
            LinkState::Connecting { room, user } => {
                format!("* connecting to '{}' as '{}'...\n", room, user)
            }
            LinkState::Connected { room, user } => {
                format!("* connected to '{}' as '{}'\n", room, user)
            }
            LinkState::Reconnecting { attempt, delay } => format!(
                "* connection lost, reconnecting in {:.1}s (attempt {})\n",
                delay.as_secs_f64(),
                attempt
            ),
        }
    }

    /// Format the MCP status badge
    pub fn format_badge(badge: &StatusBadge) -> String {
        let mut output = format!("[MCP: {}", badge.status);
        if badge.status == McpStatus::Error
            && let Some(detail) = &badge.detail
        {
            output.push_str(&format!(" ({})", detail));
        }
        if let Some(model) = &badge.llm_model {
            output.push_str(&format!(" | {}", model));
        }
        output.push_str("]\n");
        output
    }

    /// Format a one-shot notification
    pub fn format_notification(level: NotifyLevel, message: &str) -> String {
        let marker = match level {
            NotifyLevel::Success => "+",
            NotifyLevel::Warning => "!",
            NotifyLevel::Error => "x",
        };
        format!("({}) {}\n", marker, message)
    }

    /// Format a binary message notification
    ///
    /// # Arguments
    ///
    /// * `byte_count` - The number of bytes received
    ///
    /// # Returns
    ///
    /// A formatted string with the binary data notification
    pub fn format_binary_message(byte_count: usize) -> String {
        format!("received {} bytes of binary data", byte_count)
    }
}
