//! UI seams for the client and the terminal implementation of them.

use std::{
    io::Write,
    sync::Mutex,
    time::Duration,
};

use crate::{
    domain::{ChatLine, StatusBadge},
    formatter::MessageFormatter,
    store::HistoryEntry,
};

pub const PROMPT: &str = "pwchat> ";

/// Room connection state as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting { room: String, user: String },
    Connected { room: String, user: String },
    /// A retry is scheduled after `delay`; `attempt` is 1-based
    Reconnecting { attempt: u32, delay: Duration },
}

/// Output side of the Connection Manager
pub trait ChatView: Send + Sync {
    /// Show one chat line that arrived or was sent at `at_ms`
    fn render(&self, line: &ChatLine, at_ms: i64);

    /// Show locally cached lines after a successful open
    fn replay(&self, entries: &[HistoryEntry]);

    fn link_changed(&self, state: LinkState);

    /// Show a transient notice (validation failures, send errors)
    fn notice(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Success,
    Warning,
    Error,
}

/// Output side of the Status Poller
pub trait StatusSink: Send + Sync {
    /// Called after every refresh and command, changed or not. Implementations
    /// may skip redrawing a badge equal to the one already shown.
    fn show_status(&self, badge: &StatusBadge);

    fn notify(&self, level: NotifyLevel, message: &str);
}

/// Sink used when no status UI is attached
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn show_status(&self, _badge: &StatusBadge) {}

    fn notify(&self, _level: NotifyLevel, _message: &str) {}
}

/// Prints everything to stdout and keeps the input prompt visible.
#[derive(Debug, Default)]
pub struct ConsoleView {
    last_badge: Mutex<Option<StatusBadge>>,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self::default()
    }

    fn print(&self, text: &str) {
        print!("\r{}", text);
        redisplay_prompt();
    }
}

/// Redisplay the prompt after printing asynchronous output
pub fn redisplay_prompt() {
    print!("{}", PROMPT);
    std::io::stdout().flush().ok();
}

impl ChatView for ConsoleView {
    fn render(&self, line: &ChatLine, at_ms: i64) {
        self.print(&MessageFormatter::format_line(line, at_ms));
    }

    fn replay(&self, entries: &[HistoryEntry]) {
        if entries.is_empty() {
            return;
        }
        let mut output = MessageFormatter::format_replay_header(entries.len());
        for entry in entries {
            output.push_str(&MessageFormatter::format_history_entry(entry));
        }
        self.print(&output);
    }

    fn link_changed(&self, state: LinkState) {
        self.print(&MessageFormatter::format_link_state(state));
    }

    fn notice(&self, message: &str) {
        self.print(&format!("* {}\n", message));
    }
}

impl StatusSink for ConsoleView {
    fn show_status(&self, badge: &StatusBadge) {
        let mut last = self.last_badge.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_ref() == Some(badge) {
            return;
        }
        *last = Some(badge.clone());
        drop(last);
        self.print(&MessageFormatter::format_badge(badge));
    }

    fn notify(&self, level: NotifyLevel, message: &str) {
        self.print(&MessageFormatter::format_notification(level, message));
    }
}
