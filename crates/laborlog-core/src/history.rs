//! Append-only audit trail for session lifecycle events.
//!
//! Events are stored as JSONL at `~/.config/laborlog/history.jsonl`.
//! Each line is a self-contained [`SessionEvent`] that records what happened to
//! which session and when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::HistoryConfig;

/// What happened to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Started,
    Paused,
    Resumed,
    WorkersChanged,
    Ended,
    Discarded,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Paused => write!(f, "paused"),
            Self::Resumed => write!(f, "resumed"),
            Self::WorkersChanged => write!(f, "workers_changed"),
            Self::Ended => write!(f, "ended"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}

/// A single field change carried by an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

impl FieldChange {
    pub fn new(field: &str, old_value: impl ToString, new_value: impl ToString) -> Self {
        Self {
            field: field.to_string(),
            old_value: old_value.to_string(),
            new_value: new_value.to_string(),
        }
    }
}

/// A single audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub action: EventAction,
    /// Wall-clock time the transition took effect.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SessionEvent {
    pub fn new(session_id: Uuid, action: EventAction, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            action,
            timestamp,
            changes: Vec::new(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes = changes;
        self
    }
}

/// Append-only JSONL logger for session events.
pub struct HistoryLogger {
    path: PathBuf,
    enabled: bool,
}

impl HistoryLogger {
    pub fn new(enabled: bool) -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("laborlog")
            .join("history.jsonl");
        Self { path, enabled }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        match config.path {
            Some(ref p) => Self::at_path(PathBuf::from(p), config.enabled),
            None => Self::new(config.enabled),
        }
    }

    pub fn at_path(path: PathBuf, enabled: bool) -> Self {
        Self { path, enabled }
    }

    /// A logger that records nothing.
    pub fn disabled() -> Self {
        Self::at_path(PathBuf::new(), false)
    }

    /// Log a single event by appending one JSON line. Failures are logged, never returned.
    pub fn log(&self, event: &SessionEvent) {
        if !self.enabled {
            return;
        }
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let line = match serde_json::to_string(event) {
            Ok(l) => l,
            Err(e) => {
                tracing::debug!("history: failed to serialize event: {e}");
                return;
            }
        };
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path);
        match file {
            Ok(mut f) => {
                let _ = writeln!(f, "{}", line);
            }
            Err(e) => {
                tracing::debug!("history: failed to open log: {e}");
            }
        }
    }

    /// Get all events for a specific session, most recent first.
    pub fn history_for(&self, session_id: Uuid) -> Vec<SessionEvent> {
        let mut events = self.read_all();
        events.retain(|e| e.session_id == session_id);
        events.reverse();
        events
    }

    /// Get the N most recent events across all sessions.
    pub fn recent(&self, limit: usize) -> Vec<SessionEvent> {
        let mut events = self.read_all();
        events.reverse();
        events.truncate(limit);
        events
    }

    /// Distinct session ids whose id starts with `key` (4+ chars) or whose
    /// label equals `key`, most recently active first.
    pub fn matching_sessions(&self, key: &str) -> Vec<Uuid> {
        let key = key.trim();
        let mut ids: Vec<Uuid> = Vec::new();
        for event in self.recent(usize::MAX) {
            let by_label = event.label.as_deref() == Some(key);
            let by_prefix = key.len() >= 4 && event.session_id.to_string().starts_with(key);
            if (by_label || by_prefix) && !ids.contains(&event.session_id) {
                ids.push(event.session_id);
            }
        }
        ids
    }

    fn read_all(&self) -> Vec<SessionEvent> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}
