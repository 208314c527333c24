//! Statement rendering.
//!
//! Identifiers are interpolated as-is, so callers must check them with [first_bad_identifier] first.  Values never
//! are: every value goes through a `:name` placeholder named after its column.
use log::*;

use crate::Result;

lazy_static::lazy_static! {
    static ref IDENTIFIER: regex::Regex =
        regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Identifier regex should compile");
}

/// The first of `names` which isn't a plain identifier, if any.
pub(crate) fn first_bad_identifier<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    names.into_iter().find(|n| !IDENTIFIER.is_match(n))
}

const INSERT_TEMPLATE: &str = "INSERT {% if replace %}OR REPLACE {% endif %}INTO {{ table }} \
({{ columns | join(sep=\",\") }}) VALUES \
({% for c in columns %}:{{ c }}{% if not loop.last %},{% endif %}{% endfor %})";

const UPDATE_TEMPLATE: &str = "UPDATE {{ table }} SET \
{% for c in columns %}{{ c }}=:{{ c }}{% if not loop.last %}, {% endif %}{% endfor %} WHERE \
{% for k in unique_keys %}{{ k }}=:{{ k }}{% if not loop.last %} AND {% endif %}{% endfor %}";

const CREATE_TABLE_TEMPLATE: &str = "CREATE TABLE IF NOT EXISTS {{ table }} \
({{ columns | join(sep=\",\") }}{% if unique_keys %}, UNIQUE ({{ unique_keys | join(sep=\",\") }}){% endif %})";

const CREATE_INDEX_TEMPLATE: &str = "CREATE UNIQUE INDEX IF NOT EXISTS {{ index }} ON {{ table }} \
({{ unique_keys | join(sep=\",\") }})";

fn render(template: &str, context: &tera::Context) -> Result<String> {
    let stmt = tera::Tera::one_off(template, context, false)?;
    debug!("Rendered statement: {}", stmt);
    Ok(stmt)
}

/// `INSERT INTO` when `replace` is false, otherwise `INSERT OR REPLACE INTO`.
pub(crate) fn build_insert(table: &str, columns: &[&str], replace: bool) -> Result<String> {
    let mut context = tera::Context::new();
    context.insert("table", table);
    context.insert("columns", columns);
    context.insert("replace", &replace);
    render(INSERT_TEMPLATE, &context)
}

/// Set `columns` on the rows matching every one of `unique_keys`.  Both lists must be non-empty.
pub(crate) fn build_update(table: &str, columns: &[&str], unique_keys: &[&str]) -> Result<String> {
    let mut context = tera::Context::new();
    context.insert("table", table);
    context.insert("columns", columns);
    context.insert("unique_keys", unique_keys);
    render(UPDATE_TEMPLATE, &context)
}

pub(crate) fn build_create_table(
    table: &str,
    columns: &[&str],
    unique_keys: &[&str],
) -> Result<String> {
    let mut context = tera::Context::new();
    context.insert("table", table);
    context.insert("columns", columns);
    context.insert("unique_keys", unique_keys);
    render(CREATE_TABLE_TEMPLATE, &context)
}

/// The index is named after its columns, so building it for the same keys twice names the same index.
pub(crate) fn build_create_unique_index(table: &str, unique_keys: &[&str]) -> Result<String> {
    let mut context = tera::Context::new();
    context.insert("index", &unique_keys.join("_"));
    context.insert("table", table);
    context.insert("unique_keys", unique_keys);
    render(CREATE_INDEX_TEMPLATE, &context)
}

pub(crate) fn build_add_column(table: &str, column: &str) -> String {
    format!("ALTER TABLE {} ADD COLUMN {}", table, column)
}
