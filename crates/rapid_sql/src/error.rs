use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Table {0} needs at least one field")]
    NoFields(String),
    #[error("Savepoints are unavailable in auto-commit mode")]
    AutoCommit,
}

pub type SqlResult<T> = Result<T, SqlError>;

/// Errors after which the connection is unusable and must be reopened.
pub(crate) fn is_connection_lost(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed | sqlx::Error::PoolClosed => true,
        // SQLSTATE class 08: connection does not exist / connection failure
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("08003") | Some("08006")),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_lost_classification() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(is_connection_lost(&sqlx::Error::Io(io)));
        assert!(is_connection_lost(&sqlx::Error::WorkerCrashed));
        assert!(!is_connection_lost(&sqlx::Error::RowNotFound));
    }
}
