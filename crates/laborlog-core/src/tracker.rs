//! Drives the session lifecycle against an injected store.
//!
//! Every transition loads the session, applies the pure state change from
//! [`crate::lifecycle`], and writes it back with an optimistic version check.
//! A caller that loses a race receives `LaborlogError::Conflict` and should
//! reload before retrying.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LaborlogError, Result};
use crate::history::{EventAction, FieldChange, HistoryLogger, SessionEvent};
use crate::model::*;
use crate::storage::SessionStore;

/// Parameters for starting a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSession {
    pub label: String,
    pub task_kind: TaskKind,
    pub workers: u32,
    #[serde(default)]
    pub target_quantity: u64,
    #[serde(default)]
    pub memo: Option<String>,
}

/// A session that has been closed, with the records it committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndedSession {
    pub session: WorkSession,
    pub records: Vec<WorkLogRecord>,
}

impl EndedSession {
    pub fn total_labor(&self) -> LaborTime {
        self.session.closed_labor()
    }

    pub fn total_quantity(&self) -> u64 {
        self.records.iter().map(|r| r.quantity).sum()
    }
}

pub struct SessionTracker<S> {
    store: S,
    offset: FixedOffset,
    history: HistoryLogger,
}

impl<S: SessionStore> SessionTracker<S> {
    pub fn new(store: S, offset: FixedOffset) -> Self {
        Self {
            store,
            offset,
            history: HistoryLogger::disabled(),
        }
    }

    pub fn with_history(mut self, history: HistoryLogger) -> Self {
        self.history = history;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub async fn start(&self, input: StartSession, at: DateTime<Utc>) -> Result<WorkSession> {
        validate_start_input(&input.label, input.workers, input.memo.as_deref())?;
        let mut session = WorkSession::new(
            input.label,
            input.task_kind,
            input.workers,
            input.target_quantity,
            at,
        );
        if let Some(memo) = input.memo {
            session = session.with_memo(memo);
        }

        self.store.put_session(&session).await?;
        tracing::info!(
            session = %session.id,
            label = %session.label,
            task = %session.task_kind,
            workers = session.worker_count,
            "session started"
        );
        self.record(&session, EventAction::Started, Vec::new());
        Ok(session)
    }

    pub async fn pause(&self, id: Uuid, at: DateTime<Utc>) -> Result<WorkSession> {
        let mut session = self.load(id).await?;
        session.pause(at, self.offset)?;
        self.save(&mut session).await?;
        tracing::info!(session = %id, labor = %session.closed_labor(), "session paused");
        self.record(&session, EventAction::Paused, Vec::new());
        Ok(session)
    }

    pub async fn resume(&self, id: Uuid, at: DateTime<Utc>) -> Result<WorkSession> {
        let mut session = self.load(id).await?;
        session.resume(at)?;
        self.save(&mut session).await?;
        tracing::info!(session = %id, "session resumed");
        self.record(&session, EventAction::Resumed, Vec::new());
        Ok(session)
    }

    pub async fn change_workers(
        &self,
        id: Uuid,
        workers: u32,
        at: DateTime<Utc>,
    ) -> Result<WorkSession> {
        let mut session = self.load(id).await?;
        let previous = session.worker_count;
        session.change_workers(workers, at, self.offset)?;
        self.save(&mut session).await?;
        tracing::info!(session = %id, from = previous, to = workers, "worker count changed");
        self.record(
            &session,
            EventAction::WorkersChanged,
            vec![FieldChange::new("worker_count", previous, workers)],
        );
        Ok(session)
    }

    /// Close the session, commit its per-day records and remove it.
    pub async fn end(&self, id: Uuid, at: DateTime<Utc>) -> Result<EndedSession> {
        let mut session = self.load(id).await?;
        let records = session.finish(at, self.offset);
        if records.is_empty() {
            tracing::warn!(
                session = %id,
                "session ended with no recorded labor; no work logs written"
            );
        }

        // The stored row is still at the loaded version; commit checks against it.
        self.store.commit_session(&session, &records).await?;
        tracing::info!(
            session = %id,
            days = records.len(),
            labor = %session.closed_labor(),
            "session ended"
        );
        let changes = records
            .iter()
            .map(|r| FieldChange::new(&r.work_date.to_string(), "-", r.quantity))
            .collect();
        self.record(&session, EventAction::Ended, changes);
        Ok(EndedSession { session, records })
    }

    /// Remove a session without committing anything.
    pub async fn discard(&self, id: Uuid, at: DateTime<Utc>) -> Result<WorkSession> {
        let session = self.load(id).await?;
        self.store.delete_session(id, session.version).await?;
        tracing::info!(session = %id, "session discarded");
        let event = SessionEvent::new(id, EventAction::Discarded, at.max(session.updated_at))
            .with_label(session.label.clone());
        self.history.log(&event);
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<WorkSession> {
        self.load(id).await
    }

    /// All live sessions, oldest first.
    pub async fn active(&self) -> Result<Vec<WorkSession>> {
        self.store.list_sessions().await
    }

    /// Resolve a session by full id, id prefix, or label.
    ///
    /// A label shared by several live sessions is ambiguous and rejected.
    pub async fn resolve(&self, key: &str) -> Result<WorkSession> {
        let key = key.trim();
        if let Ok(id) = Uuid::parse_str(key) {
            return self.load(id).await;
        }

        let mut matches = self.store.find_sessions(key).await?;
        if matches.is_empty() && key.len() >= 4 {
            matches = self
                .store
                .list_sessions()
                .await?
                .into_iter()
                .filter(|s| s.id.to_string().starts_with(key))
                .collect();
        }

        match matches.as_slice() {
            [] => Err(LaborlogError::NotFound(format!("no live session matching '{key}'"))),
            [one] => Ok(one.clone()),
            many => Err(LaborlogError::InvalidInput(format!(
                "'{key}' matches {} live sessions; use the session id",
                many.len()
            ))),
        }
    }

    async fn load(&self, id: Uuid) -> Result<WorkSession> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| LaborlogError::NotFound(format!("session {id}")))
    }

    async fn save(&self, session: &mut WorkSession) -> Result<()> {
        session.version += 1;
        self.store.put_session(session).await
    }

    fn record(&self, session: &WorkSession, action: EventAction, changes: Vec<FieldChange>) {
        let event = SessionEvent::new(session.id, action, session.updated_at)
            .with_label(session.label.clone())
            .with_changes(changes);
        self.history.log(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::{NaiveDate, TimeZone};

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn at(d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        kst()
            .with_ymd_and_hms(2024, 3, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn tracker() -> SessionTracker<MemoryStorage> {
        SessionTracker::new(MemoryStorage::new(), kst())
    }

    fn start_input(label: &str, workers: u32, qty: u64) -> StartSession {
        StartSession {
            label: label.to_string(),
            task_kind: TaskKind::Outbound,
            workers,
            target_quantity: qty,
            memo: None,
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_scenario() {
        let tracker = tracker();
        let s = tracker
            .start(start_input("dock-2", 3, 1200), at(10, 22, 0))
            .await
            .unwrap();
        tracker.change_workers(s.id, 5, at(10, 23, 30)).await.unwrap();
        let ended = tracker.end(s.id, at(11, 1, 0)).await.unwrap();

        assert_eq!(ended.total_labor(), LaborTime::from_secs(43_200));
        assert_eq!(ended.records.len(), 2);
        let first = &ended.records[0];
        let second = &ended.records[1];
        assert_eq!(first.work_date, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert!((first.duration_hours - 7.0).abs() < 1e-9);
        assert!((second.duration_hours - 5.0).abs() < 1e-9);
        assert_eq!(first.quantity, 700);
        assert_eq!(second.quantity, 500);
        assert_eq!(first.workers, 5);

        assert!(tracker.store().get_session(s.id).await.unwrap().is_none());
        let logs = tracker
            .store()
            .list_work_logs(&WorkLogQuery::default())
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test]
    async fn test_start_rejects_zero_workers() {
        let tracker = tracker();
        let err = tracker
            .start(start_input("dock-2", 0, 10), at(10, 9, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LaborlogError::InvalidInput(_)));
        assert!(tracker.active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_rejects_blank_label() {
        let tracker = tracker();
        let err = tracker
            .start(start_input("   ", 2, 10), at(10, 9, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LaborlogError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_transitions_bump_version() {
        let tracker = tracker();
        let s = tracker
            .start(start_input("dock-2", 2, 0), at(10, 9, 0))
            .await
            .unwrap();
        assert_eq!(s.version, 1);
        let s = tracker.pause(s.id, at(10, 10, 0)).await.unwrap();
        assert_eq!(s.version, 2);
        let s = tracker.resume(s.id, at(10, 10, 30)).await.unwrap();
        assert_eq!(s.version, 3);
        let stored = tracker.get(s.id).await.unwrap();
        assert_eq!(stored.version, 3);
        assert_eq!(stored.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_store_untouched() {
        let tracker = tracker();
        let s = tracker
            .start(start_input("dock-2", 2, 0), at(10, 9, 0))
            .await
            .unwrap();
        let err = tracker.resume(s.id, at(10, 9, 30)).await.unwrap_err();
        assert!(matches!(err, LaborlogError::InvalidTransition { .. }));
        assert_eq!(tracker.get(s.id).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let tracker = tracker();
        let err = tracker.pause(Uuid::now_v7(), at(10, 9, 0)).await.unwrap_err();
        assert!(matches!(err, LaborlogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_events_after_end_are_rejected() {
        let tracker = tracker();
        let s = tracker
            .start(start_input("dock-2", 2, 0), at(10, 9, 0))
            .await
            .unwrap();
        tracker.end(s.id, at(10, 10, 0)).await.unwrap();
        let err = tracker.pause(s.id, at(10, 11, 0)).await.unwrap_err();
        assert!(matches!(err, LaborlogError::NotFound(_)));
        let err = tracker.end(s.id, at(10, 11, 0)).await.unwrap_err();
        assert!(matches!(err, LaborlogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_end_without_labor_writes_no_logs() {
        let tracker = tracker();
        let s = tracker
            .start(start_input("dock-2", 4, 300), at(10, 9, 0))
            .await
            .unwrap();
        let ended = tracker.end(s.id, at(10, 9, 0)).await.unwrap();
        assert!(ended.records.is_empty());
        assert!(tracker.active().await.unwrap().is_empty());
        let logs = tracker
            .store()
            .list_work_logs(&WorkLogQuery::default())
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_discard_drops_session_without_logs() {
        let tracker = tracker();
        let s = tracker
            .start(start_input("dock-2", 4, 300), at(10, 9, 0))
            .await
            .unwrap();
        tracker.discard(s.id, at(10, 12, 0)).await.unwrap();
        assert!(tracker.active().await.unwrap().is_empty());
        let logs = tracker
            .store()
            .list_work_logs(&WorkLogQuery::default())
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn test_stale_writer_gets_conflict() {
        let tracker = tracker();
        let s = tracker
            .start(start_input("dock-2", 2, 0), at(10, 9, 0))
            .await
            .unwrap();

        // Two observers load version 1; the first to write wins.
        let mut a = tracker.get(s.id).await.unwrap();
        let mut b = tracker.get(s.id).await.unwrap();
        a.pause(at(10, 10, 0), kst()).unwrap();
        a.version += 1;
        tracker.store().put_session(&a).await.unwrap();

        b.change_workers(6, at(10, 10, 5), kst()).unwrap();
        b.version += 1;
        let err = tracker.store().put_session(&b).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_resolve_by_label_prefix_and_id() {
        let tracker = tracker();
        let a = tracker
            .start(start_input("dock-2", 2, 0), at(10, 9, 0))
            .await
            .unwrap();
        let b = tracker
            .start(start_input("yard", 2, 0), at(10, 9, 5))
            .await
            .unwrap();

        assert_eq!(tracker.resolve("dock-2").await.unwrap().id, a.id);
        assert_eq!(tracker.resolve(&b.id.to_string()).await.unwrap().id, b.id);

        let err = tracker.resolve("nowhere").await.unwrap_err();
        assert!(matches!(err, LaborlogError::NotFound(_)));

        tracker
            .start(start_input("dock-2", 1, 0), at(10, 9, 10))
            .await
            .unwrap();
        let err = tracker.resolve("dock-2").await.unwrap_err();
        assert!(matches!(err, LaborlogError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_history_records_lifecycle() {
        let dir = std::env::temp_dir().join(format!("laborlog-tracker-{}", Uuid::now_v7()));
        let tracker = tracker().with_history(HistoryLogger::at_path(
            dir.join("history.jsonl"),
            true,
        ));
        let s = tracker
            .start(start_input("dock-2", 2, 10), at(10, 9, 0))
            .await
            .unwrap();
        tracker.change_workers(s.id, 3, at(10, 9, 30)).await.unwrap();
        tracker.pause(s.id, at(10, 10, 0)).await.unwrap();
        tracker.end(s.id, at(10, 10, 30)).await.unwrap();

        let events = HistoryLogger::at_path(dir.join("history.jsonl"), true).history_for(s.id);
        let actions: Vec<EventAction> = events.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                EventAction::Ended,
                EventAction::Paused,
                EventAction::WorkersChanged,
                EventAction::Started,
            ]
        );
        assert_eq!(events[2].changes[0].new_value, "3");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
