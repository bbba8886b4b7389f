use analytics::{Retryable, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("The requested data was not found in the database.")]
    NotFound,
}

/// SQLSTATE codes after which the same work may succeed on a fresh attempt.
const TRANSIENT_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "57P01", // admin_shutdown
    "57P02", // crash_shutdown
    "57P03", // cannot_connect_now
    "53300", // too_many_connections
];

impl DbError {
    /// Whether retrying the whole unit of work could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Query(err) => is_transient_sqlx(err),
            _ => false,
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| {
            // Class 08: connection exceptions.
            code.starts_with("08") || TRANSIENT_SQLSTATES.contains(&&*code)
        }),
        _ => false,
    }
}

impl Retryable for DbError {
    fn is_transient(&self) -> bool {
        DbError::is_transient(self)
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_transient() {
            StoreError::transient(err)
        } else {
            StoreError::failed(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_and_io_failures_are_transient() {
        assert!(DbError::Query(sqlx::Error::PoolTimedOut).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(DbError::Query(sqlx::Error::Io(io)).is_transient());
    }

    #[test]
    fn logical_failures_are_not_transient() {
        assert!(!DbError::NotFound.is_transient());
        assert!(!DbError::Query(sqlx::Error::RowNotFound).is_transient());
        assert!(!DbError::ConnectionConfigError("missing".into()).is_transient());
    }

    #[test]
    fn store_error_keeps_the_retry_class() {
        assert!(matches!(
            StoreError::from(DbError::Query(sqlx::Error::PoolTimedOut)),
            StoreError::Transient(_)
        ));
        assert!(matches!(StoreError::from(DbError::NotFound), StoreError::Failed(_)));
    }
}
