use thiserror::Error;

/// Errors surfaced by the store. Read-path integrity problems are not here
/// on purpose: they are filtered and logged, never returned to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The schema catalog could not be read. Planning is impossible without
    /// knowing the current shape, so this aborts the boot.
    #[error("schema introspection failed: {0}")]
    Introspection(#[source] rusqlite::Error),

    /// The constraint probe failed for a reason other than the expected
    /// constraint violation. The affected rebuild is skipped this boot.
    #[error("migration planning failed: {0}")]
    Planning(String),

    /// One migration action failed during execution.
    #[error("migration step `{action}` failed: {source}")]
    MigrationStep {
        action: String,
        #[source]
        source: rusqlite::Error,
    },

    /// An entity write referenced an id that does not resolve, or a required
    /// link set was empty. The one error callers are expected to handle.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// A rebuilt table's row count does not match its backup. Triggers the
    /// restore-or-degrade path instead of propagating out of the boot.
    #[error("rebuild verification failed for {table}: expected {expected} rows, found {actual}")]
    Verification { table: String, expected: u64, actual: u64 },

    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    #[error(transparent)]
    Domain(#[from] atelier_core::DomainError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
