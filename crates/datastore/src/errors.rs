#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller's data can't be written as given, e.g. a null in a unique key.  Raised before touching the store.
    #[error("Invalid data: {0}")]
    Database(String),

    /// A read hit a table which doesn't exist.  Writes repair this instead of raising it.
    #[error("{0}")]
    NoSuchTable(String),

    #[error("Schema repair failed running `{statement}`: {message}")]
    Schema { statement: String, message: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Anything the store reported which we don't know how to repair, or which came back after a repair.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Unable to render SQL: {0}")]
    Template(#[from] tera::Error),

    #[error("Sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Unable to convert row: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// How a store failure surfaces when nothing is going to repair it.
impl From<crate::StoreFailure> for Error {
    fn from(failure: crate::StoreFailure) -> Error {
        match failure.get_kind() {
            crate::FailureKind::TableMissing => Error::NoSuchTable(failure.into_message()),
            crate::FailureKind::ConstraintViolation => {
                Error::ConstraintViolation(failure.into_message())
            }
            crate::FailureKind::ColumnMissing | crate::FailureKind::Other => {
                Error::Store(failure.into_message())
            }
        }
    }
}
