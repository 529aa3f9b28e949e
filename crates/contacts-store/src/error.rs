//! sqlx error classification

use contacts_core::CoreError;

/// SQLSTATE codes worth retrying: serialization failure, deadlock
const RETRYABLE_SQLSTATES: &[&str] = &["40001", "40P01"];

/// Map a driver error onto the store error taxonomy.
///
/// Connection-level failures are transient; constraint violations and
/// everything else are not.
pub fn store_error(err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => CoreError::Unavailable(err.to_string()),
        sqlx::Error::Database(ref db)
            if db
                .code()
                .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&&*code)) =>
        {
            CoreError::Conflict(err.to_string())
        }
        sqlx::Error::RowNotFound => CoreError::NotFound(err.to_string()),
        other => CoreError::Store(other.to_string()),
    }
}
