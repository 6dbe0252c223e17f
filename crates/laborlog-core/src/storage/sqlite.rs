use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

use super::backend::SessionStore;
use crate::error::{LaborlogError, Result};
use crate::model::*;

const SESSION_COLUMNS: &str = "id, label, task_kind, worker_count, target_quantity, status, \
     segment_start, history, memo, version, started_at, updated_at";

const WORK_LOG_COLUMNS: &str = "id, session_id, label, work_date, task_kind, workers, quantity, \
     duration_hours, memo, created_at";

/// SQLite-backed storage for live sessions and committed work logs.
///
/// Uses a single `Connection` behind `Arc<Mutex<>>` so it can be shared
/// across async tasks.  All blocking SQLite calls go through
/// [`with_conn`](Self::with_conn) which runs them on the Tokio blocking
/// thread-pool.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStorage {
    /// Open (or create) a file-backed SQLite database at `path`.
    ///
    /// Sets WAL journal mode, then creates all tables and indexes if they
    /// don't already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LaborlogError::Storage(format!("failed to create database directory: {e}"))
                })?;
            }
        }
        let conn = Connection::open(&path)
            .map_err(|e| LaborlogError::Storage(format!("failed to open SQLite database: {e}")))?;

        Self::configure_and_init(conn, path)
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LaborlogError::Storage(format!("failed to open in-memory SQLite database: {e}"))
        })?;

        Self::configure_and_init(conn, PathBuf::from(":memory:"))
    }

    /// Return the path this database was opened with (`:memory:` for in-memory).
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── helpers ────────────────────────────────────────────────────────

    /// Shared initialisation: pragmas + table creation.
    fn configure_and_init(conn: Connection, path: PathBuf) -> Result<Self> {
        // WAL mode for better concurrent-read performance.
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| LaborlogError::Storage(format!("failed to set WAL mode: {e}")))?;

        // Wait on a busy database instead of failing immediately.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| LaborlogError::Storage(format!("failed to set busy timeout: {e}")))?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };

        storage.create_tables()?;
        Ok(storage)
    }

    /// Create all tables and indexes (idempotent).
    fn create_tables(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| LaborlogError::Storage(format!("failed to acquire database lock: {e}")))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                task_kind TEXT NOT NULL,
                worker_count INTEGER NOT NULL CHECK (worker_count >= 1),
                target_quantity INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                segment_start TEXT,
                history TEXT NOT NULL DEFAULT '[]',
                memo TEXT,
                version INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS work_logs (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                label TEXT NOT NULL,
                work_date TEXT NOT NULL,
                task_kind TEXT NOT NULL,
                workers INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                duration_hours REAL NOT NULL,
                memo TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_label ON sessions(label);
            CREATE INDEX IF NOT EXISTS idx_work_logs_work_date ON work_logs(work_date DESC);
            CREATE INDEX IF NOT EXISTS idx_work_logs_session_id ON work_logs(session_id);
            ",
        )
        .map_err(|e| LaborlogError::Storage(format!("failed to create tables: {e}")))?;

        Ok(())
    }

    /// Run a blocking closure against the SQLite connection on the Tokio
    /// blocking thread-pool.
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                LaborlogError::Storage(format!("failed to acquire database lock: {e}"))
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| LaborlogError::Storage(format!("task join error: {e}")))?
    }
}

// ── row mapping ────────────────────────────────────────────────────────

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LaborlogError::Storage(format!("invalid {field} timestamp '{raw}': {e}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| LaborlogError::Storage(format!("invalid work_date '{raw}': {e}")))
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| LaborlogError::Storage(format!("invalid {field} '{raw}': {e}")))
}

fn to_i64(field: &str, n: u64) -> Result<i64> {
    i64::try_from(n).map_err(|_| LaborlogError::InvalidInput(format!("{field} {n} is too large")))
}

fn from_i64<T: TryFrom<i64>>(field: &str, n: i64) -> Result<T> {
    T::try_from(n).map_err(|_| LaborlogError::Storage(format!("invalid {field} value {n}")))
}

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> LaborlogError + '_ {
    move |e| LaborlogError::Storage(format!("{context}: {e}"))
}

/// Columns exactly as stored, before any validation.
struct SessionRow {
    id: String,
    label: String,
    task_kind: String,
    worker_count: i64,
    target_quantity: i64,
    status: String,
    segment_start: Option<String>,
    history: String,
    memo: Option<String>,
    version: i64,
    started_at: String,
    updated_at: String,
}

impl SessionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            task_kind: row.get(2)?,
            worker_count: row.get(3)?,
            target_quantity: row.get(4)?,
            status: row.get(5)?,
            segment_start: row.get(6)?,
            history: row.get(7)?,
            memo: row.get(8)?,
            version: row.get(9)?,
            started_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl TryFrom<SessionRow> for WorkSession {
    type Error = LaborlogError;

    fn try_from(row: SessionRow) -> Result<Self> {
        let session = WorkSession {
            id: parse_uuid("session id", &row.id)?,
            label: row.label,
            task_kind: row
                .task_kind
                .parse()
                .map_err(LaborlogError::Storage)?,
            worker_count: from_i64("worker_count", row.worker_count)?,
            target_quantity: from_i64("target_quantity", row.target_quantity)?,
            status: row.status.parse().map_err(LaborlogError::Storage)?,
            segment_start: row
                .segment_start
                .as_deref()
                .map(|raw| parse_ts("segment_start", raw))
                .transpose()?,
            history: serde_json::from_str(&row.history)?,
            memo: row.memo,
            version: from_i64("version", row.version)?,
            started_at: parse_ts("started_at", &row.started_at)?,
            updated_at: parse_ts("updated_at", &row.updated_at)?,
        };
        session
            .validate()
            .map_err(|e| LaborlogError::Storage(format!("rejected stored session: {e}")))?;
        Ok(session)
    }
}

struct WorkLogRow {
    id: String,
    session_id: String,
    label: String,
    work_date: String,
    task_kind: String,
    workers: i64,
    quantity: i64,
    duration_hours: f64,
    memo: Option<String>,
    created_at: String,
}

impl WorkLogRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            label: row.get(2)?,
            work_date: row.get(3)?,
            task_kind: row.get(4)?,
            workers: row.get(5)?,
            quantity: row.get(6)?,
            duration_hours: row.get(7)?,
            memo: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl TryFrom<WorkLogRow> for WorkLogRecord {
    type Error = LaborlogError;

    fn try_from(row: WorkLogRow) -> Result<Self> {
        Ok(WorkLogRecord {
            id: parse_uuid("work log id", &row.id)?,
            session_id: parse_uuid("session id", &row.session_id)?,
            label: row.label,
            work_date: parse_date(&row.work_date)?,
            task_kind: row.task_kind.parse().map_err(LaborlogError::Storage)?,
            workers: from_i64("workers", row.workers)?,
            quantity: from_i64("quantity", row.quantity)?,
            duration_hours: row.duration_hours,
            memo: row.memo,
            created_at: parse_ts("created_at", &row.created_at)?,
        })
    }
}

fn load_session(conn: &Connection, id: Uuid) -> Result<Option<WorkSession>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], SessionRow::read)
        .optional()
        .map_err(storage_err("failed to load session"))?;
    row.map(WorkSession::try_from).transpose()
}

fn load_sessions(conn: &Connection, label: Option<&str>) -> Result<Vec<WorkSession>> {
    let rows = match label {
        Some(label) => {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE label = ?1 ORDER BY started_at, id"
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(storage_err("failed to prepare session query"))?;
            let rows = stmt
                .query_map(params![label], SessionRow::read)
                .map_err(storage_err("failed to query sessions"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err("failed to read session row"))?;
            rows
        }
        None => {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at, id");
            let mut stmt = conn
                .prepare(&sql)
                .map_err(storage_err("failed to prepare session query"))?;
            let rows = stmt
                .query_map([], SessionRow::read)
                .map_err(storage_err("failed to query sessions"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err("failed to read session row"))?;
            rows
        }
    };
    rows.into_iter().map(WorkSession::try_from).collect()
}

/// Explain why a versioned write touched no rows.
fn version_mismatch(conn: &Connection, id: Uuid, expected: u64) -> LaborlogError {
    let stored: rusqlite::Result<Option<i64>> = conn
        .query_row(
            "SELECT version FROM sessions WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional();
    match stored {
        Ok(Some(v)) => LaborlogError::Conflict(format!(
            "session {id} is at version {v}, expected {expected}"
        )),
        Ok(None) => LaborlogError::NotFound(format!("session {id}")),
        Err(e) => LaborlogError::Storage(format!("failed to check session version: {e}")),
    }
}

fn insert_session(conn: &Connection, s: &WorkSession) -> Result<()> {
    let history = serde_json::to_string(&s.history)?;
    let sql = format!(
        "INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
    );
    conn.execute(
        &sql,
        params![
            s.id.to_string(),
            s.label,
            s.task_kind.to_string(),
            i64::from(s.worker_count),
            to_i64("target_quantity", s.target_quantity)?,
            s.status.to_string(),
            s.segment_start.as_ref().map(ts),
            history,
            s.memo,
            to_i64("version", s.version)?,
            ts(&s.started_at),
            ts(&s.updated_at),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref f, _) if f.code == ErrorCode::ConstraintViolation => {
            LaborlogError::Conflict(format!("session {} already exists", s.id))
        }
        other => LaborlogError::Storage(format!("failed to insert session: {other}")),
    })?;
    Ok(())
}

fn update_session(conn: &Connection, s: &WorkSession) -> Result<()> {
    let history = serde_json::to_string(&s.history)?;
    let expected = s.version - 1;
    let changed = conn
        .execute(
            "UPDATE sessions SET label = ?2, task_kind = ?3, worker_count = ?4,
                 target_quantity = ?5, status = ?6, segment_start = ?7, history = ?8,
                 memo = ?9, version = ?10, updated_at = ?11
             WHERE id = ?1 AND version = ?12",
            params![
                s.id.to_string(),
                s.label,
                s.task_kind.to_string(),
                i64::from(s.worker_count),
                to_i64("target_quantity", s.target_quantity)?,
                s.status.to_string(),
                s.segment_start.as_ref().map(ts),
                history,
                s.memo,
                to_i64("version", s.version)?,
                ts(&s.updated_at),
                to_i64("version", expected)?,
            ],
        )
        .map_err(storage_err("failed to update session"))?;
    if changed == 0 {
        return Err(version_mismatch(conn, s.id, expected));
    }
    Ok(())
}

fn delete_versioned(conn: &Connection, id: Uuid, version: u64) -> Result<()> {
    let changed = conn
        .execute(
            "DELETE FROM sessions WHERE id = ?1 AND version = ?2",
            params![id.to_string(), to_i64("version", version)?],
        )
        .map_err(storage_err("failed to delete session"))?;
    if changed == 0 {
        return Err(version_mismatch(conn, id, version));
    }
    Ok(())
}

fn insert_work_log(conn: &Connection, r: &WorkLogRecord) -> Result<()> {
    let sql = format!(
        "INSERT INTO work_logs ({WORK_LOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
    );
    conn.execute(
        &sql,
        params![
            r.id.to_string(),
            r.session_id.to_string(),
            r.label,
            r.work_date.format("%Y-%m-%d").to_string(),
            r.task_kind.to_string(),
            i64::from(r.workers),
            to_i64("quantity", r.quantity)?,
            r.duration_hours,
            r.memo,
            ts(&r.created_at),
        ],
    )
    .map_err(storage_err("failed to insert work log"))?;
    Ok(())
}

fn query_work_logs(conn: &Connection, query: &WorkLogQuery) -> Result<Vec<WorkLogRecord>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(from) = query.from {
        clauses.push("work_date >= ?");
        values.push(Value::Text(from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = query.to {
        clauses.push("work_date <= ?");
        values.push(Value::Text(to.format("%Y-%m-%d").to_string()));
    }
    if let Some(kind) = query.task_kind {
        clauses.push("task_kind = ?");
        values.push(Value::Text(kind.to_string()));
    }
    if let Some(ref label) = query.label {
        clauses.push("label = ?");
        values.push(Value::Text(label.clone()));
    }
    if let Some(session_id) = query.session_id {
        clauses.push("session_id = ?");
        values.push(Value::Text(session_id.to_string()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
    values.push(Value::Integer(limit));

    let sql = format!(
        "SELECT {WORK_LOG_COLUMNS} FROM work_logs{where_sql} \
         ORDER BY work_date DESC, created_at DESC, id DESC LIMIT ?"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(storage_err("failed to prepare work log query"))?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), WorkLogRow::read)
        .map_err(storage_err("failed to query work logs"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage_err("failed to read work log row"))?;

    rows.into_iter().map(WorkLogRecord::try_from).collect()
}

impl SessionStore for SqliteStorage {
    async fn get_session(&self, id: Uuid) -> Result<Option<WorkSession>> {
        self.with_conn(move |conn| load_session(conn, id)).await
    }

    async fn put_session(&self, session: &WorkSession) -> Result<()> {
        let session = session.clone();
        self.with_conn(move |conn| {
            if session.version <= 1 {
                insert_session(conn, &session)
            } else {
                update_session(conn, &session)
            }
        })
        .await
    }

    async fn delete_session(&self, id: Uuid, version: u64) -> Result<()> {
        self.with_conn(move |conn| delete_versioned(conn, id, version))
            .await
    }

    async fn list_sessions(&self) -> Result<Vec<WorkSession>> {
        self.with_conn(|conn| load_sessions(conn, None)).await
    }

    async fn find_sessions(&self, label: &str) -> Result<Vec<WorkSession>> {
        let label = label.to_string();
        self.with_conn(move |conn| load_sessions(conn, Some(&label)))
            .await
    }

    async fn commit_session(&self, session: &WorkSession, records: &[WorkLogRecord]) -> Result<()> {
        let id = session.id;
        let version = session.version;
        let records = records.to_vec();
        self.with_conn(move |conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage_err("failed to begin transaction"))?;
            delete_versioned(&tx, id, version)?;
            for record in &records {
                insert_work_log(&tx, record)?;
            }
            tx.commit()
                .map_err(storage_err("failed to commit transaction"))?;
            Ok(())
        })
        .await
    }

    async fn list_work_logs(&self, query: &WorkLogQuery) -> Result<Vec<WorkLogRecord>> {
        let query = query.clone();
        self.with_conn(move |conn| query_work_logs(conn, &query))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    fn sample_session() -> WorkSession {
        WorkSession::new("dock-3".to_string(), TaskKind::Inbound, 3, 120, t(13, 0))
            .with_memo("pallets from supplier A")
    }

    fn sample_record(session: &WorkSession, date: &str, quantity: u64) -> WorkLogRecord {
        WorkLogRecord {
            id: Uuid::now_v7(),
            session_id: session.id,
            label: session.label.clone(),
            work_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            task_kind: session.task_kind,
            workers: session.worker_count,
            quantity,
            duration_hours: 1.5,
            memo: session.memo.clone(),
            created_at: t(16, 0),
        }
    }

    #[test]
    fn open_in_memory_creates_tables() {
        let storage = SqliteStorage::open_in_memory().expect("should open in-memory DB");
        assert_eq!(storage.path().to_str().unwrap(), ":memory:");

        let conn = storage.conn.lock().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"work_logs".to_string()));
    }

    #[test]
    fn create_tables_is_idempotent() {
        let storage = SqliteStorage::open_in_memory().expect("should open in-memory DB");
        storage.create_tables().expect("idempotent create_tables");
    }

    #[tokio::test]
    async fn session_roundtrip() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut session = sample_session();
        session.history = vec![DailyLabor::new(
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            LaborTime::from_secs(5400),
        )];
        storage.put_session(&session).await.unwrap();

        let loaded = storage.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn get_missing_session_is_none() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert!(storage.get_session(Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let session = sample_session();
        storage.put_session(&session).await.unwrap();
        let err = storage.put_session(&session).await.unwrap_err();
        assert!(err.is_conflict(), "got {err}");
    }

    #[tokio::test]
    async fn versioned_update_and_stale_write() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let session = sample_session();
        storage.put_session(&session).await.unwrap();

        let mut first = session.clone();
        first.worker_count = 5;
        first.version = 2;
        storage.put_session(&first).await.unwrap();

        // A second writer that loaded version 1 is rejected.
        let mut stale = session.clone();
        stale.worker_count = 7;
        stale.version = 2;
        let err = storage.put_session(&stale).await.unwrap_err();
        assert!(err.is_conflict(), "got {err}");

        let loaded = storage.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.worker_count, 5);
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn update_missing_session_is_not_found() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut session = sample_session();
        session.version = 4;
        let err = storage.put_session(&session).await.unwrap_err();
        assert!(matches!(err, LaborlogError::NotFound(_)), "got {err}");
    }

    #[tokio::test]
    async fn delete_checks_version() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let session = sample_session();
        storage.put_session(&session).await.unwrap();

        let err = storage.delete_session(session.id, 9).await.unwrap_err();
        assert!(err.is_conflict());

        storage.delete_session(session.id, 1).await.unwrap();
        assert!(storage.get_session(session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_sessions_by_label() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let a = sample_session();
        let b = WorkSession::new("dock-3".to_string(), TaskKind::Outbound, 2, 0, t(14, 0));
        let c = WorkSession::new("mezzanine".to_string(), TaskKind::Packaging, 1, 0, t(12, 0));
        for s in [&a, &b, &c] {
            storage.put_session(s).await.unwrap();
        }

        let found = storage.find_sessions("dock-3").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, a.id);
        assert_eq!(found[1].id, b.id);

        let all = storage.list_sessions().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, c.id, "oldest first");
    }

    #[tokio::test]
    async fn commit_moves_session_to_work_logs() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let session = sample_session();
        storage.put_session(&session).await.unwrap();

        let records = vec![
            sample_record(&session, "2024-03-10", 70),
            sample_record(&session, "2024-03-11", 50),
        ];
        storage.commit_session(&session, &records).await.unwrap();

        assert!(storage.get_session(session.id).await.unwrap().is_none());
        let logs = storage
            .list_work_logs(&WorkLogQuery::default())
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].work_date.to_string(), "2024-03-11", "newest first");
        assert_eq!(logs[0].quantity, 50);
        assert_eq!(logs[1].memo.as_deref(), Some("pallets from supplier A"));
    }

    #[tokio::test]
    async fn stale_commit_writes_nothing() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let session = sample_session();
        storage.put_session(&session).await.unwrap();

        let mut stale = session.clone();
        stale.version = 3;
        let records = vec![sample_record(&session, "2024-03-10", 10)];
        let err = storage.commit_session(&stale, &records).await.unwrap_err();
        assert!(err.is_conflict());

        assert!(storage.get_session(session.id).await.unwrap().is_some());
        let logs = storage
            .list_work_logs(&WorkLogQuery::default())
            .await
            .unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn work_log_filters() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let inbound = sample_session();
        let outbound = WorkSession::new("yard".to_string(), TaskKind::Outbound, 2, 40, t(9, 0));
        storage.put_session(&inbound).await.unwrap();
        storage.put_session(&outbound).await.unwrap();
        storage
            .commit_session(
                &inbound,
                &[
                    sample_record(&inbound, "2024-03-09", 1),
                    sample_record(&inbound, "2024-03-10", 2),
                ],
            )
            .await
            .unwrap();
        storage
            .commit_session(&outbound, &[sample_record(&outbound, "2024-03-10", 3)])
            .await
            .unwrap();

        let by_kind = storage
            .list_work_logs(&WorkLogQuery {
                task_kind: Some(TaskKind::Outbound),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_kind.len(), 1);
        assert_eq!(by_kind[0].label, "yard");

        let by_date = storage
            .list_work_logs(&WorkLogQuery {
                from: NaiveDate::from_ymd_opt(2024, 3, 10),
                to: NaiveDate::from_ymd_opt(2024, 3, 10),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_date.len(), 2);

        let limited = storage
            .list_work_logs(&WorkLogQuery {
                label: Some("dock-3".to_string()),
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].quantity, 2);
    }

    #[tokio::test]
    async fn malformed_row_is_rejected() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let session = sample_session();
        storage.put_session(&session).await.unwrap();
        let id = session.id;
        storage
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE sessions SET task_kind = 'forklift' WHERE id = ?1",
                    params![id.to_string()],
                )
                .map_err(|e| LaborlogError::Storage(e.to_string()))?;
                Ok(())
            })
            .await
            .unwrap();

        let err = storage.get_session(id).await.unwrap_err();
        assert!(matches!(err, LaborlogError::Storage(_)), "got {err}");
    }

    #[test]
    fn open_file_based_db() {
        let dir = std::env::temp_dir().join(format!("laborlog-test-{}", uuid::Uuid::now_v7()));
        let db_path = dir.join("nested").join("test.db");

        let storage = SqliteStorage::open(&db_path).expect("should open file DB");
        assert_eq!(storage.path(), db_path);

        drop(storage);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
