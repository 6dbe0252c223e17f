use crate::error::Result;
use crate::model::*;
use uuid::Uuid;

/// Abstract session store. SQLite is the primary implementation; the
/// in-memory store backs tests and throwaway runs.
///
/// Writes are optimistic: every session carries a `version`, and a write
/// only succeeds if the stored row is still at the version the caller
/// loaded. A stale write fails with `LaborlogError::Conflict`.
pub trait SessionStore: Send + Sync {
    // -- Live sessions --

    fn get_session(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkSession>>> + Send;

    /// Insert (when `session.version == 1`) or replace the stored row, which
    /// must currently be at `session.version - 1`.
    fn put_session(
        &self,
        session: &WorkSession,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete a session whose stored row is at `version`.
    fn delete_session(
        &self,
        id: Uuid,
        version: u64,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// All live sessions, oldest first.
    fn list_sessions(&self) -> impl std::future::Future<Output = Result<Vec<WorkSession>>> + Send;

    /// Live sessions with the given label, oldest first.
    fn find_sessions(
        &self,
        label: &str,
    ) -> impl std::future::Future<Output = Result<Vec<WorkSession>>> + Send;

    // -- Commit --

    /// Atomically remove the session (stored at `session.version`) and
    /// persist its finalized records.
    fn commit_session(
        &self,
        session: &WorkSession,
        records: &[WorkLogRecord],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    // -- Work logs --

    fn list_work_logs(
        &self,
        query: &WorkLogQuery,
    ) -> impl std::future::Future<Output = Result<Vec<WorkLogRecord>>> + Send;
}
