use rusqlite;

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Persistence-specific errors
#[derive(Debug)]
pub enum PersistenceError {
    /// SQLite errors
    Database(rusqlite::Error),

    /// JSON encoding of list columns
    Serialization(serde_json::Error),

    /// Duplicate entry errors
    Duplicate(String),

    /// Image id not present
    NotFound(i64),

    /// Errors during database initialization
    Initialization(String),

    /// General errors
    Other(String),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::Database(err)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err)
    }
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database(err) => write!(f, "Database error: {}", err),
            Self::Serialization(err) => write!(f, "Serialization error: {}", err),
            Self::Duplicate(msg) => write!(f, "Duplicate entry: {}", msg),
            Self::NotFound(id) => write!(f, "Image with ID {} not found", id),
            Self::Initialization(msg) => write!(f, "Database initialization error: {}", msg),
            Self::Other(msg) => write!(f, "Persistence error: {}", msg),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

// Implement conversion from PersistenceError to the main Error type
impl From<PersistenceError> for crate::Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(id) => crate::Error::AssetNotFound(id),
            other => crate::Error::Database(other.to_string()),
        }
    }
}
