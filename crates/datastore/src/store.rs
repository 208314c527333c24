//! The boundary between this crate and the relational engine underneath it.
//!
//! Implementations classify their failures into a [FailureKind] once, here, so that the writer never looks at error
//! text.
use crate::Row;

/// What kind of failure a store reported.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// The statement names a table which doesn't exist.
    TableMissing,
    /// The statement names a column the table doesn't have.
    ColumnMissing,
    /// A unique constraint rejected the write.
    ConstraintViolation,
    Other,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct StoreFailure {
    kind: FailureKind,
    message: String,
}

impl StoreFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> StoreFailure {
        StoreFailure {
            kind,
            message: message.into(),
        }
    }

    pub fn get_kind(&self) -> FailureKind {
        self.kind
    }

    /// The store's original message, for diagnostics.
    pub fn get_message(&self) -> &str {
        &self.message
    }

    pub(crate) fn into_message(self) -> String {
        self.message
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreFailure>;

/// A relational store which can run statements and describe its tables.
///
/// Calls block until the store answers.  Implementations don't need to be thread safe: a store is used by one writer
/// at a time.
pub trait RelationalStore {
    /// Run a statement, returning any rows it produced keyed by result column name.
    ///
    /// `params` maps placeholder names (without the leading `:`) to values.  Placeholders with no entry bind `NULL`;
    /// entries matching no placeholder are ignored.
    fn execute(&mut self, query: &str, params: Option<&Row>) -> StoreResult<Vec<Row>>;

    /// The table's columns, in declaration order.  A table which doesn't exist has no columns.
    fn columns_of(&mut self, table: &str) -> StoreResult<Vec<String>>;

    /// Run a `CREATE` or `ALTER` statement.
    fn execute_ddl(&mut self, statement: &str) -> StoreResult<()>;
}

impl<S: RelationalStore + ?Sized> RelationalStore for &mut S {
    fn execute(&mut self, query: &str, params: Option<&Row>) -> StoreResult<Vec<Row>> {
        (**self).execute(query, params)
    }

    fn columns_of(&mut self, table: &str) -> StoreResult<Vec<String>> {
        (**self).columns_of(table)
    }

    fn execute_ddl(&mut self, statement: &str) -> StoreResult<()> {
        (**self).execute_ddl(statement)
    }
}
