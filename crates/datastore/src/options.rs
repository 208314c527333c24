//! Configuration.
use std::path::PathBuf;

use crate::Result;

/// The table callers write to when they don't have a reason to pick one.
pub const DEFAULT_TABLE: &str = "main_table";

/// How to open a [crate::Database].
///
/// Deserializable so that it can live in an application's config file; every field has a default.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseOptions {
    /// Where the sqlite file lives.  Created if it doesn't exist.
    pub path: PathBuf,

    /// How long to wait on a locked database before giving up, in milliseconds.  By default we don't wait at all.
    pub busy_timeout_ms: Option<u64>,

    /// Switch the database to write-ahead logging on open.
    pub wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        DatabaseOptions {
            path: "sqlite.db".into(),
            busy_timeout_ms: None,
            wal: false,
        }
    }
}

impl DatabaseOptions {
    pub fn new(path: impl Into<PathBuf>) -> DatabaseOptions {
        DatabaseOptions {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<DatabaseOptions> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Options for [crate::AdaptiveWriter::insert_or_update].
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct UpsertOptions {
    /// When updating an existing row, also write the unique key columns.  They hold the same values either way, since
    /// those are what found the row.
    pub update_unique_keys: bool,
}
