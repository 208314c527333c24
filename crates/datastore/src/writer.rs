//! The adaptive writer: inserts, replaces and updates rows, repairing the schema when the store says it doesn't fit.
//!
//! Every write follows the same loop.  Attempt the statement.  If the store says the table is missing, create it; if
//! it says a column is missing, add the columns.  Then attempt again.  Each kind of repair happens at most once per
//! call, so a store which keeps reporting the same problem after its repair gets an error rather than a retry.
//!
//! Nothing about the schema is cached between calls.  The store is the only source of truth for what exists.
use itertools::Itertools;
use log::*;

use crate::schema;
use crate::sql;
use crate::{
    Error, FailureKind, RelationalStore, Result, Row, StoreFailure, StoreResult, UpsertOptions,
    Value,
};

/// What happened to one row.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WriteResult {
    /// A new row went in.
    Inserted,
    /// The row was written with insert-or-replace semantics, overwriting any row with the same unique keys.
    Replaced,
    /// A row with the same unique keys already existed and was updated in place.
    Updated,
}

fn check_identifiers<'a>(table: &'a str, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    match sql::first_bad_identifier(std::iter::once(table).chain(names)) {
        Some(name) => Err(Error::Database(format!(
            "{:?} can't be used as a table or column name",
            name
        ))),
        None => Ok(()),
    }
}

/// One attempt per kind of repair, plus the first.
const MAX_ATTEMPTS: usize = 3;

/// What a repair should build, should one be needed.
struct RepairTarget<'a> {
    table: &'a str,
    columns: &'a [&'a str],
    unique_keys: &'a [&'a str],
}

enum Repair {
    CreateTable,
    AddColumns,
}

/// The repairs already done by one call.  Shared by every row of a batch.
#[derive(Default)]
struct Repairs {
    table_created: bool,
    columns_added: bool,
}

impl Repairs {
    /// Decide how to repair `failure`, or turn it into the error the caller gets.
    fn plan(&mut self, table: &str, failure: StoreFailure) -> Result<Repair> {
        let (repair, already_done) = match failure.get_kind() {
            FailureKind::TableMissing => (
                Repair::CreateTable,
                std::mem::replace(&mut self.table_created, true),
            ),
            FailureKind::ColumnMissing => (
                Repair::AddColumns,
                std::mem::replace(&mut self.columns_added, true),
            ),
            FailureKind::ConstraintViolation | FailureKind::Other => return Err(failure.into()),
        };

        if already_done {
            return Err(Error::Store(format!(
                "Writing to {} still fails after repairing its schema: {}",
                table,
                failure.get_message()
            )));
        }

        warn!("Write to {} failed, repairing: {}", table, failure);
        Ok(repair)
    }
}

/// Writes heterogeneous rows to a store, creating tables and columns as they turn out to be needed.
pub struct AdaptiveWriter<S> {
    store: S,
}

impl<S: RelationalStore> AdaptiveWriter<S> {
    pub fn new(store: S) -> Self {
        AdaptiveWriter { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Run a query against the store as-is.
    ///
    /// Nothing is repaired here: reading a table which doesn't exist is [Error::NoSuchTable].
    pub fn execute(&mut self, query: &str, params: Option<&Row>) -> Result<Vec<Row>> {
        Ok(self.store.execute(query, params)?)
    }

    /// See [schema::create_table].
    pub fn create_table(&mut self, table: &str, columns: &[&str], unique_keys: &[&str]) -> Result<()> {
        schema::create_table(&mut self.store, table, columns, unique_keys)
    }

    /// See [schema::add_columns].
    pub fn add_columns(&mut self, table: &str, columns: &[&str]) -> Result<()> {
        schema::add_columns(&mut self.store, table, columns)
    }

    /// Run `attempt` until it succeeds, repairing the schema between attempts.
    fn write_with_repair<T>(
        &mut self,
        target: &RepairTarget<'_>,
        repairs: &mut Repairs,
        mut attempt: impl FnMut(&mut S) -> StoreResult<T>,
    ) -> Result<T> {
        for _ in 0..MAX_ATTEMPTS {
            let failure = match attempt(&mut self.store) {
                Ok(x) => return Ok(x),
                Err(f) => f,
            };

            match repairs.plan(target.table, failure)? {
                Repair::CreateTable => schema::create_table(
                    &mut self.store,
                    target.table,
                    target.columns,
                    target.unique_keys,
                )?,
                Repair::AddColumns => {
                    schema::add_columns(&mut self.store, target.table, target.columns)?
                }
            }
        }

        // Repairs::plan refuses a second repair of either kind, so the last attempt always returns above.
        Err(Error::Store(format!(
            "Gave up writing to {} after {} attempts",
            target.table, MAX_ATTEMPTS
        )))
    }

    /// Insert `row`, or if a row with the same `unique_keys` already exists, update it.
    ///
    /// Unique key columns are left out of the update unless [UpsertOptions::update_unique_keys] is set.  A second
    /// constraint violation, from the update itself, is an error.
    ///
    /// `unique_keys` name columns of `row` exactly, case included.
    pub fn insert_or_update<K: AsRef<str>>(
        &mut self,
        unique_keys: &[K],
        row: &Row,
        table: &str,
        options: &UpsertOptions,
    ) -> Result<WriteResult> {
        if row.is_empty() {
            return Err(Error::Database(format!(
                "Refusing to write a row with no columns to {}",
                table
            )));
        }
        let unique_keys = unique_keys.iter().map(AsRef::as_ref).collect::<Vec<&str>>();
        let columns = row.keys().collect::<Vec<_>>();
        check_identifiers(table, unique_keys.iter().chain(columns.iter()).copied())?;

        let insert_stmt = sql::build_insert(table, &columns, false)?;
        let update_columns = columns
            .iter()
            .copied()
            .filter(|c| options.update_unique_keys || !unique_keys.contains(c))
            .collect::<Vec<_>>();
        // Without anything to set there is nothing to do: the row is already there with these keys.
        let update_stmt = if update_columns.is_empty() || unique_keys.is_empty() {
            None
        } else {
            Some(sql::build_update(table, &update_columns, &unique_keys)?)
        };

        let target = RepairTarget {
            table,
            columns: &columns,
            unique_keys: &unique_keys,
        };
        let mut repairs = Repairs::default();

        self.write_with_repair(&target, &mut repairs, |store| {
            let failure = match store.execute(&insert_stmt, Some(row)) {
                Ok(_) => return Ok(WriteResult::Inserted),
                Err(f) => f,
            };

            // With no unique keys there's nothing to find the existing row by.
            if failure.get_kind() != FailureKind::ConstraintViolation || unique_keys.is_empty() {
                return Err(failure);
            }

            match &update_stmt {
                Some(stmt) => {
                    store.execute(stmt, Some(row))?;
                }
                None => debug!("{}: row has only unique keys, nothing to update", table),
            }
            Ok(WriteResult::Updated)
        })
    }

    /// Write a batch of rows with insert-or-replace semantics: a row whose unique keys match an existing row
    /// overwrites it entirely.
    ///
    /// Rows may have different columns.  Every row is written with the union of all of them, with `NULL` for
    /// whatever a row lacks.  A null or missing unique key in any row rejects the whole batch before anything is
    /// written.  Keys are looked up in rows by exact name: a row with `Id` has no value for a unique key `id`, even
    /// though sqlite would treat the two as the same column.
    ///
    /// This isn't atomic.  If a row fails, the rows before it stay written; wrap the call in a
    /// [crate::Transaction] if that matters.
    pub fn save_data<K: AsRef<str>>(
        &mut self,
        unique_keys: &[K],
        rows: &[Row],
        table: &str,
    ) -> Result<Vec<WriteResult>> {
        let unique_keys = unique_keys.iter().map(AsRef::as_ref).collect::<Vec<&str>>();
        if rows.is_empty() {
            return Ok(vec![]);
        }

        // Sqlite considers nulls distinct from each other in unique indexes, so a null key would let duplicates in.
        for (i, row) in rows.iter().enumerate() {
            if let Some(key) = unique_keys.iter().find(|k| row.is_null(k)) {
                return Err(Error::Database(format!(
                    "Row {} has a null value for unique key {}. Unique keys are [{}]. Offending data: {:?}",
                    i,
                    key,
                    unique_keys.iter().join(", "),
                    row
                )));
            }
        }

        let columns = rows.iter().flat_map(|r| r.keys()).unique().collect::<Vec<_>>();
        if columns.is_empty() {
            return Err(Error::Database(format!(
                "Refusing to write rows with no columns to {}",
                table
            )));
        }
        check_identifiers(table, unique_keys.iter().chain(columns.iter()).copied())?;

        let stmt = sql::build_insert(table, &columns, true)?;
        let target = RepairTarget {
            table,
            columns: &columns,
            unique_keys: &unique_keys,
        };
        let mut repairs = Repairs::default();
        let mut results = Vec::with_capacity(rows.len());

        for row in rows {
            let params = columns
                .iter()
                .map(|c| (*c, row.get(c).cloned().unwrap_or(Value::Null)))
                .collect::<Row>();
            let result = self.write_with_repair(&target, &mut repairs, |store| {
                store
                    .execute(&stmt, Some(&params))
                    .map(|_| WriteResult::Replaced)
            })?;
            results.push(result);
        }

        debug!("Saved {} rows to {}", results.len(), table);
        Ok(results)
    }
}
