use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors raised by the local store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file is damaged or not a database; fatal for any command
    #[error("Store corruption: {0}")]
    Corruption(String),

    #[error("Database error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("Migration {version} failed: {message}")]
    Migration { version: u32, message: String },

    #[error("Invalid stored value: {0}")]
    Decode(String),

    #[error("Paper not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database connection lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Integrity failures abort the running command
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Corruption(_) | StoreError::Poisoned)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, ref msg)
                if matches!(err.code, ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) =>
            {
                StoreError::Corruption(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            other => StoreError::Sqlite(other),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_is_classified() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            Some("database disk image is malformed".to_string()),
        );
        let store_err = StoreError::from(err);
        assert!(matches!(store_err, StoreError::Corruption(_)));
        assert!(store_err.is_fatal());
    }

    #[test]
    fn test_other_errors_are_not_fatal() {
        let store_err = StoreError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(store_err, StoreError::Sqlite(_)));
        assert!(!store_err.is_fatal());
    }
}
