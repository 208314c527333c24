//! Schema repair: creating tables and appending columns.
//!
//! Both operations are additive and safe to repeat.  Nothing here renames, retypes or drops anything, and columns are
//! declared without a type so that the store keeps whatever type each value has.
use itertools::Itertools;
use log::*;

use crate::sql;
use crate::{Error, RelationalStore, Result, StoreFailure};

fn schema_error(statement: &str, failure: StoreFailure) -> Error {
    Error::Schema {
        statement: statement.to_string(),
        message: failure.into_message(),
    }
}

/// Names go straight into the DDL, so anything other than a plain identifier is refused before it gets there.
fn check_identifiers<'a>(
    operation: &str,
    table: &'a str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
    match sql::first_bad_identifier(std::iter::once(table).chain(names)) {
        Some(name) => Err(Error::Schema {
            statement: format!("<{} {}>", operation, table),
            message: format!("{:?} can't be used as a table or column name", name),
        }),
        None => Ok(()),
    }
}

fn run_ddl<S: RelationalStore + ?Sized>(store: &mut S, statement: &str) -> Result<()> {
    store
        .execute_ddl(statement)
        .map_err(|f| schema_error(statement, f))
}

/// Create `table` with `columns`, in order.
///
/// With a non-empty `unique_keys`, the table also gets a `UNIQUE` constraint over those columns and a unique index
/// named after them.  Calling this again for a table which already exists does nothing.
pub fn create_table<S: RelationalStore + ?Sized>(
    store: &mut S,
    table: &str,
    columns: &[&str],
    unique_keys: &[&str],
) -> Result<()> {
    check_identifiers(
        "create table",
        table,
        columns.iter().chain(unique_keys).copied(),
    )?;

    info!(
        "Creating table {} with columns {} and unique keys [{}]",
        table,
        columns.iter().join(", "),
        unique_keys.iter().join(", ")
    );

    run_ddl(store, &sql::build_create_table(table, columns, unique_keys)?)?;

    if !unique_keys.is_empty() {
        run_ddl(store, &sql::build_create_unique_index(table, unique_keys)?)?;
    }

    Ok(())
}

/// Add whichever of `columns` `table` doesn't have yet, in the order given.
///
/// Sqlite compares column names case-insensitively, so we do too.
pub fn add_columns<S: RelationalStore + ?Sized>(
    store: &mut S,
    table: &str,
    columns: &[&str],
) -> Result<()> {
    check_identifiers("add columns to", table, columns.iter().copied())?;

    let existing = store
        .columns_of(table)
        .map_err(|f| schema_error(&format!("<columns of {}>", table), f))?;

    let missing = columns
        .iter()
        .copied()
        .unique()
        .filter(|c| !existing.iter().any(|e| e.eq_ignore_ascii_case(c)))
        .collect::<Vec<_>>();

    if missing.is_empty() {
        debug!("{} already has columns {}", table, columns.iter().join(", "));
        return Ok(());
    }

    info!("Adding columns {} to {}", missing.iter().join(", "), table);
    for column in missing {
        run_ddl(store, &sql::build_add_column(table, column))?;
    }

    Ok(())
}
