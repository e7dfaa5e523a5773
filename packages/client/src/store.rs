//! Persisted client state: last session, reconnect preference and room history.
//!
//! The whole state is one JSON document. Every mutation rewrites it through a
//! temporary file and a rename so a crash never leaves a truncated file.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatLine, LineKind},
    error::ClientError,
};

/// Entries kept per room
pub const HISTORY_LIMIT: usize = 500;

const STATE_FILE_NAME: &str = "state.json";

/// A rendered chat line as persisted for replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: LineKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub content: String,
    pub at_ms: i64,
}

impl HistoryEntry {
    pub fn from_line(line: &ChatLine, at_ms: i64) -> Self {
        Self {
            kind: line.kind,
            from: line.from.clone(),
            content: line.content.clone(),
            at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    last_room: Option<String>,
    #[serde(default)]
    last_user: Option<String>,
    #[serde(default = "default_auto_reconnect")]
    auto_reconnect: bool,
    #[serde(default)]
    history: HashMap<String, Vec<HistoryEntry>>,
}

fn default_auto_reconnect() -> bool {
    true
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            last_room: None,
            last_user: None,
            auto_reconnect: default_auto_reconnect(),
            history: HashMap::new(),
        }
    }
}

/// Client-local key/value state, optionally backed by a JSON file
#[derive(Debug)]
pub struct LocalStore {
    state: Mutex<PersistedState>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// A store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(PersistedState::default()),
            path: None,
        }
    }

    /// Load the state file at `path`, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ClientError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                ClientError::Storage(format!("cannot parse {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => {
                return Err(ClientError::Storage(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        tracing::debug!("Loaded client state from {}", path.display());

        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
        })
    }

    /// `<config dir>/pwchat/state.json`, or the working directory when the
    /// platform has no config directory.
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("pwchat").join(STATE_FILE_NAME),
            None => PathBuf::from("pwchat-state.json"),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Last room and user that connected successfully
    pub fn last_session(&self) -> Option<(String, String)> {
        let state = self.lock();
        match (&state.last_room, &state.last_user) {
            (Some(room), Some(user)) => Some((room.clone(), user.clone())),
            _ => None,
        }
    }

    pub fn set_last_session(&self, room_id: &str, user_id: &str) -> Result<(), ClientError> {
        self.update(|state| {
            state.last_room = Some(room_id.to_string());
            state.last_user = Some(user_id.to_string());
        })
    }

    pub fn auto_reconnect(&self) -> bool {
        self.lock().auto_reconnect
    }

    pub fn set_auto_reconnect(&self, enabled: bool) -> Result<(), ClientError> {
        self.update(|state| state.auto_reconnect = enabled)
    }

    /// Cached lines for a room, oldest first
    pub fn room_history(&self, room_id: &str) -> Vec<HistoryEntry> {
        self.lock().history.get(room_id).cloned().unwrap_or_default()
    }

    /// Append one line, dropping the oldest entries beyond [`HISTORY_LIMIT`].
    pub fn append_history(&self, room_id: &str, entry: HistoryEntry) -> Result<(), ClientError> {
        self.update(|state| {
            let entries = state.history.entry(room_id.to_string()).or_default();
            entries.push(entry);
            if entries.len() > HISTORY_LIMIT {
                let excess = entries.len() - HISTORY_LIMIT;
                entries.drain(..excess);
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PersistedState> {
        // The state is plain data; a panic mid-update cannot break an invariant.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, mutate: impl FnOnce(&mut PersistedState)) -> Result<(), ClientError> {
        let snapshot = {
            let mut state = self.lock();
            mutate(&mut state);
            state.clone()
        };
        match &self.path {
            Some(path) => write_atomically(path, &snapshot),
            None => Ok(()),
        }
    }
}

fn write_atomically(path: &Path, state: &PersistedState) -> Result<(), ClientError> {
    let storage = |e: std::io::Error| ClientError::Storage(format!("{}: {}", path.display(), e));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(storage)?;
    }
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| ClientError::Storage(format!("cannot encode state: {}", e)))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(storage)?;
    std::fs::rename(&tmp, path).map_err(storage)
}
