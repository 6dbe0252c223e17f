use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::apportion;
use crate::error::{LaborlogError, Result};

use super::labor::{DailyLabor, LaborTime};

pub const MAX_LABEL_LENGTH: usize = 100;
pub const MAX_MEMO_LENGTH: usize = 2_000;

/// Validate inputs for starting a new work session.
pub fn validate_start_input(label: &str, workers: u32, memo: Option<&str>) -> Result<()> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(LaborlogError::InvalidInput("label cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_LABEL_LENGTH {
        return Err(LaborlogError::InvalidInput(format!(
            "label exceeds maximum length of {MAX_LABEL_LENGTH} characters"
        )));
    }
    validate_workers(workers)?;
    if let Some(memo) = memo {
        if memo.chars().count() > MAX_MEMO_LENGTH {
            return Err(LaborlogError::InvalidInput(format!(
                "memo exceeds maximum length of {MAX_MEMO_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

pub fn validate_workers(workers: u32) -> Result<()> {
    if workers < 1 {
        return Err(LaborlogError::InvalidInput(
            "worker count must be at least 1".into(),
        ));
    }
    Ok(())
}

/// A live (running or paused) work session.
///
/// `history` holds every closed segment, bucketed by local calendar date.
/// The open segment, if any, starts at `segment_start` and is attributed to
/// the current `worker_count` when it closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSession {
    pub id: Uuid,
    pub label: String,
    pub task_kind: TaskKind,
    pub worker_count: u32,
    pub target_quantity: u64,
    pub status: SessionStatus,
    pub segment_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<DailyLabor>,
    #[serde(default)]
    pub memo: Option<String>,
    /// Write counter for optimistic concurrency. A freshly started session is version 1.
    pub version: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkSession {
    pub fn new(
        label: String,
        task_kind: TaskKind,
        worker_count: u32,
        target_quantity: u64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            label: label.trim().to_string(),
            task_kind,
            worker_count,
            target_quantity,
            status: SessionStatus::Running,
            segment_start: Some(at),
            history: Vec::new(),
            memo: None,
            version: 1,
            started_at: at,
            updated_at: at,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        let memo = memo.into();
        self.memo = if memo.trim().is_empty() {
            None
        } else {
            Some(memo)
        };
        self
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Labor from closed segments only.
    pub fn closed_labor(&self) -> LaborTime {
        self.history.iter().map(|d| d.labor).sum()
    }

    /// Labor including the open segment up to `now`, without mutating the session.
    pub fn labor_at(&self, now: DateTime<Utc>) -> LaborTime {
        let open = match (self.status, self.segment_start) {
            (SessionStatus::Running, Some(start)) => {
                LaborTime::for_workers(now - start, self.worker_count)
            }
            _ => LaborTime::ZERO,
        };
        self.closed_labor() + open
    }

    /// Per-date labor including the open segment up to `now`.
    pub fn daily_labor_at(&self, now: DateTime<Utc>, offset: FixedOffset) -> Vec<DailyLabor> {
        match (self.status, self.segment_start) {
            (SessionStatus::Running, Some(start)) => apportion::merge(
                self.history.clone(),
                &apportion::split(start, now, self.worker_count, offset),
            ),
            _ => self.history.clone(),
        }
    }

    /// Check field-level invariants. Used when rows are loaded from storage.
    pub fn validate(&self) -> Result<()> {
        validate_workers(self.worker_count)?;
        match (self.status, self.segment_start) {
            (SessionStatus::Running, None) => Err(LaborlogError::InvalidInput(format!(
                "session {} is running but has no segment start",
                self.id
            ))),
            (SessionStatus::Paused, Some(_)) => Err(LaborlogError::InvalidInput(format!(
                "session {} is paused but has an open segment",
                self.id
            ))),
            _ if self.version == 0 => Err(LaborlogError::InvalidInput(format!(
                "session {} has version 0",
                self.id
            ))),
            _ if self.history.iter().any(|d| d.labor.as_millis() < 0) => {
                Err(LaborlogError::InvalidInput(format!(
                    "session {} has negative labor in its history",
                    self.id
                )))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            _ => Err(format!("unknown session status: {s}")),
        }
    }
}

/// Warehouse work categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Inbound,
    Outbound,
    Packaging,
    Repacking,
    Other,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        Self::Inbound,
        Self::Outbound,
        Self::Packaging,
        Self::Repacking,
        Self::Other,
    ];

    /// Label used on the floor terminals.
    pub fn local_name(self) -> &'static str {
        match self {
            Self::Inbound => "입고",
            Self::Outbound => "출고",
            Self::Packaging => "패키징",
            Self::Repacking => "소분(까대기)",
            Self::Other => "기타",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
            Self::Packaging => write!(f, "packaging"),
            Self::Repacking => write!(f, "repacking"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inbound" | "입고" => Ok(Self::Inbound),
            "outbound" | "출고" => Ok(Self::Outbound),
            "packaging" | "패키징" => Ok(Self::Packaging),
            "repacking" | "소분" | "까대기" | "소분(까대기)" => Ok(Self::Repacking),
            "other" | "기타" => Ok(Self::Other),
            _ => Err(format!("unknown task kind: {s}")),
        }
    }
}
