use thiserror::Error;

/// SQLSTATE raised when `lock_timeout` expires while waiting for a row lock.
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Waiting for a row lock (or the in-memory transaction lock) timed out.
    /// The operation can be retried.
    #[error("Timed out waiting for a lock")]
    LockTimeout,

    /// The write lost a race with a concurrent transaction (deadlock,
    /// serialization failure or unique constraint). The operation can be retried.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// A stored value could not be decoded into its domain range.
    #[error("Invalid value in column {column}: {reason}")]
    Decode { column: &'static str, reason: String },

    /// A row that the transaction just wrote could not be read back.
    #[error("Expected {0} row is missing")]
    MissingRow(&'static str),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout | StoreError::Conflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            match db_err.code().as_deref() {
                Some(LOCK_NOT_AVAILABLE) => return StoreError::LockTimeout,
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => {
                    return StoreError::Conflict(db_err.message().to_string());
                }
                Some(UNIQUE_VIOLATION) => {
                    let constraint = db_err.constraint().unwrap_or("unique constraint");
                    return StoreError::Conflict(format!("{constraint} violated"));
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
