use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaborlogError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid transition: cannot {event} a {status} session")]
    InvalidTransition { event: String, status: String },

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl LaborlogError {
    /// Returns `true` when the caller should reload the session and retry
    /// the transition (another writer got there first).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` when the error is likely transient at the storage layer
    /// (a busy or locked SQLite database).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(msg) => is_transient_message(msg),
            _ => false,
        }
    }
}

fn is_transient_message(msg: &str) -> bool {
    let msg_lower = msg.to_lowercase();
    let patterns = [
        "database is locked",
        "database is busy",
        "sqlite_busy",
        "timed out",
        "temporarily unavailable",
    ];
    patterns.iter().any(|p| msg_lower.contains(p))
}

pub type Result<T> = std::result::Result<T, LaborlogError>;
