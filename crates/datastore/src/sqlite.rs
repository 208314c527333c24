//! The sqlite store, over rusqlite.
//!
//! Both connections and transactions are stores, so a batch can be made atomic by writing through a [Transaction]
//! instead of the [Database] directly.
use std::time::Duration;

use log::*;
use rusqlite::types::{ToSqlOutput, ValueRef};

use crate::{
    AdaptiveWriter, DatabaseOptions, FailureKind, RelationalStore, Result, Row, StoreFailure,
    StoreResult, Value,
};

/// An adaptive writer over an sqlite connection it owns.
pub type Database = AdaptiveWriter<rusqlite::Connection>;

/// A transaction like that from rusqlite: drop rolls back, calling commit commits.
pub type Transaction<'a> = AdaptiveWriter<rusqlite::Transaction<'a>>;

lazy_static::lazy_static! {
    static ref NO_SUCH_TABLE: regex::Regex =
        regex::Regex::new(r"no such table").expect("Regex should compile");
    static ref HAS_NO_COLUMN: regex::Regex =
        regex::Regex::new(r"has no column").expect("Regex should compile");
}

/// Sqlite reports most failures as a generic error with a message, so for missing tables and columns the message is
/// all there is to go on.
fn classify(err: rusqlite::Error) -> StoreFailure {
    let message = err.to_string();
    let kind = match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            FailureKind::ConstraintViolation
        }
        _ if NO_SUCH_TABLE.is_match(&message) => FailureKind::TableMissing,
        _ if HAS_NO_COLUMN.is_match(&message) => FailureKind::ColumnMissing,
        _ => FailureKind::Other,
    };

    debug!("Sqlite failure classified as {:?}: {}", kind, message);
    StoreFailure::new(kind, message)
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Bool(b) => ToSqlOutput::from(*b),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Value {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

/// Bind every parameter of the statement from `params`.
///
/// `:name`, `@name` and `$name` placeholders look up `name`; `?NNN` and bare `?` look up their 1-based position as a
/// string.  Anything not found binds `NULL`.  The statement may come from the cache, so every parameter is bound
/// every time.
fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: Option<&Row>) -> rusqlite::Result<()> {
    for i in 1..=stmt.parameter_count() {
        let position = i.to_string();
        let value = params
            .and_then(|p| {
                let key = stmt
                    .parameter_name(i)
                    .map(|n| n.trim_start_matches(|c: char| matches!(c, ':' | '@' | '$' | '?')))
                    .unwrap_or(position.as_str());
                p.get(key)
            })
            .cloned()
            .unwrap_or(Value::Null);
        stmt.raw_bind_parameter(i, value)?;
    }

    Ok(())
}

fn run_query(
    conn: &rusqlite::Connection,
    query: &str,
    params: Option<&Row>,
) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare_cached(query)?;
    bind_params(&mut stmt, params)?;

    let names = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    let mut ret = vec![];
    let mut rows = stmt.raw_query();
    while let Some(r) = rows.next()? {
        let row = names
            .iter()
            .enumerate()
            .map(|(i, name)| Ok((name.as_str(), Value::from(r.get_ref(i)?))))
            .collect::<rusqlite::Result<Row>>()?;
        ret.push(row);
    }

    Ok(ret)
}

fn table_columns(conn: &rusqlite::Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map(rusqlite::params![table], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Run exactly one statement.  Anything after the first statement other than whitespace or comments is refused
/// before the first one runs.
fn run_single_statement(conn: &rusqlite::Connection, statement: &str) -> StoreResult<()> {
    let mut batch = rusqlite::Batch::new(conn, statement);
    let mut stmt = batch
        .next()
        .map_err(classify)?
        .ok_or_else(|| StoreFailure::new(FailureKind::Other, "Empty statement".to_string()))?;
    if batch.next().map_err(classify)?.is_some() {
        return Err(StoreFailure::new(
            FailureKind::Other,
            format!("Expected a single statement, got {:?}", statement),
        ));
    }

    stmt.raw_execute().map_err(classify)?;
    Ok(())
}

impl RelationalStore for rusqlite::Connection {
    fn execute(&mut self, query: &str, params: Option<&Row>) -> StoreResult<Vec<Row>> {
        run_query(self, query, params).map_err(classify)
    }

    fn columns_of(&mut self, table: &str) -> StoreResult<Vec<String>> {
        table_columns(self, table).map_err(classify)
    }

    fn execute_ddl(&mut self, statement: &str) -> StoreResult<()> {
        run_single_statement(self, statement)
    }
}

impl RelationalStore for rusqlite::Transaction<'_> {
    fn execute(&mut self, query: &str, params: Option<&Row>) -> StoreResult<Vec<Row>> {
        run_query(self, query, params).map_err(classify)
    }

    fn columns_of(&mut self, table: &str) -> StoreResult<Vec<String>> {
        table_columns(self, table).map_err(classify)
    }

    fn execute_ddl(&mut self, statement: &str) -> StoreResult<()> {
        run_single_statement(self, statement)
    }
}

impl AdaptiveWriter<rusqlite::Connection> {
    pub fn open(options: &DatabaseOptions) -> Result<Database> {
        info!("Opening database at {}", options.path.display());
        let conn = rusqlite::Connection::open(&options.path)?;

        if let Some(ms) = options.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))?;
        }

        if options.wal {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }

        Ok(Database::with_connection(conn))
    }

    pub fn open_in_memory() -> Result<Database> {
        Ok(Database::with_connection(
            rusqlite::Connection::open_in_memory()?,
        ))
    }

    /// Build a database from an already-existing connection.
    pub fn with_connection(conn: rusqlite::Connection) -> Database {
        AdaptiveWriter::new(conn)
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(AdaptiveWriter::new(self.store_mut().transaction()?))
    }

    pub fn close(self) -> Result<()> {
        self.into_store().close().map_err(|(_, e)| e.into())
    }
}

impl AdaptiveWriter<rusqlite::Transaction<'_>> {
    pub fn commit(self) -> Result<()> {
        Ok(self.into_store().commit()?)
    }
}
