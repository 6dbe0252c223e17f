use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::backend::SessionStore;
use crate::error::{LaborlogError, Result};
use crate::model::*;

/// In-process session store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, WorkSession>,
    logs: Vec<WorkLogRecord>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| LaborlogError::Storage(format!("failed to acquire store lock: {e}")))
    }
}

fn check_version(stored: Option<&WorkSession>, id: Uuid, expected: u64) -> Result<()> {
    match stored {
        Some(s) if s.version == expected => Ok(()),
        Some(s) => Err(LaborlogError::Conflict(format!(
            "session {id} is at version {}, expected {expected}",
            s.version
        ))),
        None => Err(LaborlogError::NotFound(format!("session {id}"))),
    }
}

impl SessionStore for MemoryStorage {
    async fn get_session(&self, id: Uuid) -> Result<Option<WorkSession>> {
        Ok(self.lock()?.sessions.get(&id).cloned())
    }

    async fn put_session(&self, session: &WorkSession) -> Result<()> {
        let mut inner = self.lock()?;
        if session.version <= 1 {
            if inner.sessions.contains_key(&session.id) {
                return Err(LaborlogError::Conflict(format!(
                    "session {} already exists",
                    session.id
                )));
            }
        } else {
            check_version(
                inner.sessions.get(&session.id),
                session.id,
                session.version - 1,
            )?;
        }
        inner.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn delete_session(&self, id: Uuid, version: u64) -> Result<()> {
        let mut inner = self.lock()?;
        check_version(inner.sessions.get(&id), id, version)?;
        inner.sessions.remove(&id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<WorkSession>> {
        let mut sessions: Vec<WorkSession> = self.lock()?.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| (s.started_at, s.id));
        Ok(sessions)
    }

    async fn find_sessions(&self, label: &str) -> Result<Vec<WorkSession>> {
        let mut sessions = self.list_sessions().await?;
        sessions.retain(|s| s.label == label);
        Ok(sessions)
    }

    async fn commit_session(&self, session: &WorkSession, records: &[WorkLogRecord]) -> Result<()> {
        let mut inner = self.lock()?;
        check_version(inner.sessions.get(&session.id), session.id, session.version)?;
        inner.sessions.remove(&session.id);
        inner.logs.extend_from_slice(records);
        Ok(())
    }

    async fn list_work_logs(&self, query: &WorkLogQuery) -> Result<Vec<WorkLogRecord>> {
        let inner = self.lock()?;
        let mut logs: Vec<WorkLogRecord> = inner
            .logs
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        logs.sort_by(|a, b| {
            b.work_date
                .cmp(&a.work_date)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        logs.truncate(query.limit);
        Ok(logs)
    }
}
