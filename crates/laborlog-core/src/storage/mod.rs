mod backend;
mod memory;
mod sqlite;

pub use backend::SessionStore;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::config::LaborlogConfig;
use crate::error::{LaborlogError, Result};
use crate::model::*;
use uuid::Uuid;

/// Enum wrapper for storage backends. Dispatches to the concrete implementation.
/// Using an enum instead of `Box<dyn SessionStore>` because the trait uses RPITIT.
pub enum Storage {
    Sqlite(SqliteStorage),
    Memory(MemoryStorage),
}

impl SessionStore for Storage {
    async fn get_session(&self, id: Uuid) -> Result<Option<WorkSession>> {
        match self {
            Storage::Sqlite(s) => s.get_session(id).await,
            Storage::Memory(s) => s.get_session(id).await,
        }
    }

    async fn put_session(&self, session: &WorkSession) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.put_session(session).await,
            Storage::Memory(s) => s.put_session(session).await,
        }
    }

    async fn delete_session(&self, id: Uuid, version: u64) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.delete_session(id, version).await,
            Storage::Memory(s) => s.delete_session(id, version).await,
        }
    }

    async fn list_sessions(&self) -> Result<Vec<WorkSession>> {
        match self {
            Storage::Sqlite(s) => s.list_sessions().await,
            Storage::Memory(s) => s.list_sessions().await,
        }
    }

    async fn find_sessions(&self, label: &str) -> Result<Vec<WorkSession>> {
        match self {
            Storage::Sqlite(s) => s.find_sessions(label).await,
            Storage::Memory(s) => s.find_sessions(label).await,
        }
    }

    async fn commit_session(&self, session: &WorkSession, records: &[WorkLogRecord]) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.commit_session(session, records).await,
            Storage::Memory(s) => s.commit_session(session, records).await,
        }
    }

    async fn list_work_logs(&self, query: &WorkLogQuery) -> Result<Vec<WorkLogRecord>> {
        match self {
            Storage::Sqlite(s) => s.list_work_logs(query).await,
            Storage::Memory(s) => s.list_work_logs(query).await,
        }
    }
}

impl Storage {
    /// Human-readable location of the backing data.
    pub fn describe(&self) -> String {
        match self {
            Storage::Sqlite(s) => format!("sqlite ({})", s.path().display()),
            Storage::Memory(_) => "memory (not persisted)".to_string(),
        }
    }
}

/// Create a storage backend from the given configuration.
pub fn create_backend(config: &LaborlogConfig) -> Result<Storage> {
    match config.storage.backend.as_str() {
        "sqlite" => {
            let path = match &config.storage.path {
                Some(p) => std::path::PathBuf::from(p),
                None => default_sqlite_path()?,
            };
            let storage = SqliteStorage::open(&path)?;
            tracing::debug!("opened sqlite store at {}", path.display());
            Ok(Storage::Sqlite(storage))
        }
        "memory" => Ok(Storage::Memory(MemoryStorage::new())),
        other => Err(LaborlogError::Config(format!(
            "unknown storage backend: {other}"
        ))),
    }
}

/// Default SQLite path: `~/.config/laborlog/laborlog.db`
fn default_sqlite_path() -> Result<std::path::PathBuf> {
    dirs::config_dir()
        .map(|p| p.join("laborlog").join("laborlog.db"))
        .ok_or_else(|| LaborlogError::Config("cannot determine config directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_memory_backend() {
        let mut config = LaborlogConfig::default_config();
        config.storage.backend = "memory".to_string();
        let storage = create_backend(&config).unwrap();
        assert!(matches!(storage, Storage::Memory(_)));
        assert_eq!(storage.describe(), "memory (not persisted)");
    }

    #[test]
    fn test_create_sqlite_backend_custom_path() {
        let dir = std::env::temp_dir().join(format!("laborlog-backend-{}", Uuid::now_v7()));
        let mut config = LaborlogConfig::default_config();
        config.storage.path = Some(dir.join("logs.db").to_string_lossy().into_owned());
        let storage = create_backend(&config).unwrap();
        assert!(storage.describe().starts_with("sqlite ("));
        drop(storage);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unknown_backend_errors() {
        let mut config = LaborlogConfig::default_config();
        config.storage.backend = "supabase".to_string();
        let err = create_backend(&config).err().unwrap();
        assert!(matches!(err, LaborlogError::Config(_)));
    }
}
