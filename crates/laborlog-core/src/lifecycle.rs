//! Session state transitions, without any I/O.
//!
//! ```text
//! start ──▶ RUNNING ──pause──▶ PAUSED
//!              ▲                  │
//!              └─────resume───────┘
//! RUNNING / PAUSED ──change_workers──▶ same status
//! RUNNING / PAUSED ──end──▶ records
//! ```
//!
//! Transition times never move backwards: an event stamped earlier than the
//! session's last transition takes effect at the last transition instead,
//! so no interval can be counted twice.

use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::apportion;
use crate::error::{LaborlogError, Result};
use crate::model::{validate_workers, SessionStatus, WorkLogRecord, WorkSession};

impl WorkSession {
    /// Close the running segment into history and stop the clock.
    pub fn pause(&mut self, at: DateTime<Utc>, offset: FixedOffset) -> Result<()> {
        self.require(SessionStatus::Running, "pause")?;
        let at = self.effective(at);
        self.close_segment(at, offset);
        self.status = SessionStatus::Paused;
        self.updated_at = at;
        Ok(())
    }

    /// Open a new running segment.
    pub fn resume(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.require(SessionStatus::Paused, "resume")?;
        let at = self.effective(at);
        self.status = SessionStatus::Running;
        self.segment_start = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Change the crew size. A running segment is closed at the old count and
    /// reopened at the new one; a paused session only records the new count.
    pub fn change_workers(
        &mut self,
        workers: u32,
        at: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<()> {
        validate_workers(workers)?;
        let at = self.effective(at);
        if self.is_running() {
            self.close_segment(at, offset);
            self.segment_start = Some(at);
        }
        self.worker_count = workers;
        self.updated_at = at;
        Ok(())
    }

    /// Close any open segment and build one finalized record per date bucket.
    ///
    /// The session's target quantity is distributed by labor share. A session
    /// that accumulated no labor at all produces no records.
    pub fn finish(&mut self, at: DateTime<Utc>, offset: FixedOffset) -> Vec<WorkLogRecord> {
        let at = self.effective(at);
        if self.is_running() {
            self.close_segment(at, offset);
        }
        self.updated_at = at;

        apportion::distribute(&self.history, self.target_quantity)
            .into_iter()
            .map(|share| WorkLogRecord {
                id: Uuid::now_v7(),
                session_id: self.id,
                label: self.label.clone(),
                work_date: share.date,
                task_kind: self.task_kind,
                workers: self.worker_count,
                quantity: share.quantity,
                duration_hours: share.labor.as_hours_f64(),
                memo: self.memo.clone(),
                created_at: at,
            })
            .collect()
    }

    fn close_segment(&mut self, at: DateTime<Utc>, offset: FixedOffset) {
        if let Some(start) = self.segment_start.take() {
            let pieces = apportion::split(start, at, self.worker_count, offset);
            self.history = apportion::merge(std::mem::take(&mut self.history), &pieces);
        }
    }

    fn effective(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.max(self.updated_at)
    }

    fn require(&self, status: SessionStatus, event: &str) -> Result<()> {
        if self.status == status {
            Ok(())
        } else {
            Err(LaborlogError::InvalidTransition {
                event: event.to_string(),
                status: self.status.to_string(),
            })
        }
    }
}
