use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::TaskKind;

/// A finalized, per-day work log produced when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkLogRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub label: String,
    pub work_date: NaiveDate,
    pub task_kind: TaskKind,
    pub workers: u32,
    pub quantity: u64,
    /// Labor-hours attributed to `work_date` (worker count already applied).
    pub duration_hours: f64,
    #[serde(default)]
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkLogRecord {
    /// Units produced per labor-hour. `None` when no labor was recorded.
    pub fn lph(&self) -> Option<f64> {
        if self.duration_hours > 0.0 {
            Some(self.quantity as f64 / self.duration_hours)
        } else {
            None
        }
    }
}

/// Filters for listing committed work logs. Results are newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkLogQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub task_kind: Option<TaskKind>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

impl Default for WorkLogQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            task_kind: None,
            label: None,
            session_id: None,
            limit: default_limit(),
        }
    }
}

impl WorkLogQuery {
    /// In-process filter, shared by backends that do not push filters down.
    pub fn matches(&self, record: &WorkLogRecord) -> bool {
        if let Some(from) = self.from {
            if record.work_date < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.work_date > to {
                return false;
            }
        }
        if let Some(kind) = self.task_kind {
            if record.task_kind != kind {
                return false;
            }
        }
        if let Some(ref label) = self.label {
            if record.label != *label {
                return false;
            }
        }
        if let Some(session_id) = self.session_id {
            if record.session_id != session_id {
                return false;
            }
        }
        true
    }
}
