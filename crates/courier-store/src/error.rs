use thiserror::Error;

/// Errors produced by the store layer.
///
/// Any of these returned from a write means the message was not recorded.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error, including constraint violations and busy timeouts.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The store cannot currently be used (poisoned lock, worker died).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
