//! End to end tests against real sqlite databases.
use std::collections::{BTreeMap, BTreeSet};

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use tabula_datastore::*;

/// The directory has to outlive the database, so hang on to both.
fn open_db() -> (tempfile::TempDir, Database) {
    tabula_logging::log_for_tests();

    let tdir = tempfile::TempDir::new().unwrap();
    let db = Database::open(&DatabaseOptions::new(tdir.path().join("database.sqlite")))
        .expect("Database should open");
    (tdir, db)
}

fn columns(db: &mut Database, table: &str) -> Vec<String> {
    db.store_mut().columns_of(table).unwrap()
}

fn table_sql(db: &mut Database) -> Vec<Row> {
    db.execute(
        "SELECT type, name, sql FROM sqlite_master ORDER BY type, name",
        None,
    )
    .unwrap()
}

fn select_all(db: &mut Database, table: &str) -> Vec<Row> {
    db.execute(&format!("SELECT * FROM {} ORDER BY rowid", table), None)
        .unwrap()
}

#[test]
fn null_unique_keys_write_nothing() {
    let (_tdir, mut db) = open_db();
    let rows = vec![
        Row::new().with("id", 1).with("name", "ok"),
        Row::new().with("id", Value::Null).with("name", "bad"),
    ];

    let err = db.save_data(&["id"], &rows, "people").unwrap_err();
    assert!(matches!(err, Error::Database(_)), "{:?}", err);
    // Not even the table was created.
    assert!(table_sql(&mut db).is_empty());
}

#[test]
fn heterogeneous_rows_get_the_union_of_columns() {
    let (_tdir, mut db) = open_db();
    let rows = vec![
        Row::new().with("a", 1).with("b", "x"),
        Row::new().with("b", "y").with("c", 2.5),
    ];

    let results = db.save_data(&["b"], &rows, "things").unwrap();
    assert_eq!(results, vec![WriteResult::Replaced, WriteResult::Replaced]);
    assert_eq!(columns(&mut db, "things"), vec!["a", "b", "c"]);
    assert_eq!(
        select_all(&mut db, "things"),
        vec![
            Row::new().with("a", 1).with("b", "x").with("c", Value::Null),
            Row::new().with("a", Value::Null).with("b", "y").with("c", 2.5),
        ]
    );
}

#[test]
fn save_data_replaces_rows_with_the_same_keys() {
    let (_tdir, mut db) = open_db();
    db.save_data(
        &["id"],
        &[Row::new().with("id", 1).with("name", "a").with("age", 3)],
        "people",
    )
    .unwrap();
    db.save_data(&["id"], &[Row::new().with("id", 1).with("name", "b")], "people")
        .unwrap();

    // A replace, not a merge: age is gone.
    assert_eq!(
        select_all(&mut db, "people"),
        vec![Row::new().with("id", 1).with("name", "b").with("age", Value::Null)]
    );
}

#[test]
fn later_batches_extend_the_table() {
    let (_tdir, mut db) = open_db();
    db.save_data(&["id"], &[Row::new().with("id", 1).with("name", "a")], "people")
        .unwrap();
    db.save_data(
        &["id"],
        &[
            Row::new().with("id", 2).with("email", "e@example.com"),
            Row::new().with("id", 3).with("phone", "555"),
        ],
        "people",
    )
    .unwrap();

    assert_eq!(
        columns(&mut db, "people"),
        vec!["id", "name", "email", "phone"]
    );
    assert_eq!(select_all(&mut db, "people").len(), 3);
}

#[test]
fn insert_or_update_inserts_then_updates() {
    let (_tdir, mut db) = open_db();
    let opts = UpsertOptions::default();

    let first = Row::new().with("id", 1).with("name", "a").with("age", 3);
    assert_eq!(
        db.insert_or_update(&["id"], &first, DEFAULT_TABLE, &opts).unwrap(),
        WriteResult::Inserted
    );

    let second = Row::new().with("id", 1).with("name", "b");
    assert_eq!(
        db.insert_or_update(&["id"], &second, DEFAULT_TABLE, &opts).unwrap(),
        WriteResult::Updated
    );

    // An update merges: age survives.
    assert_eq!(
        select_all(&mut db, DEFAULT_TABLE),
        vec![Row::new().with("id", 1).with("name", "b").with("age", 3)]
    );

    let opts = UpsertOptions {
        update_unique_keys: true,
    };
    let third = Row::new().with("id", 1).with("name", "c");
    assert_eq!(
        db.insert_or_update(&["id"], &third, DEFAULT_TABLE, &opts).unwrap(),
        WriteResult::Updated
    );
    assert_eq!(
        select_all(&mut db, DEFAULT_TABLE),
        vec![Row::new().with("id", 1).with("name", "c").with("age", 3)]
    );
}

#[test]
fn insert_or_update_adds_missing_columns_without_losing_data() {
    let (_tdir, mut db) = open_db();
    let opts = UpsertOptions::default();
    db.insert_or_update(&["id"], &Row::new().with("id", 1).with("a", "x"), "t", &opts)
        .unwrap();
    db.insert_or_update(
        &["id"],
        &Row::new().with("id", 2).with("a", "y").with("d", 4),
        "t",
        &opts,
    )
    .unwrap();

    assert_eq!(columns(&mut db, "t"), vec!["id", "a", "d"]);
    assert_eq!(
        select_all(&mut db, "t"),
        vec![
            Row::new().with("id", 1).with("a", "x").with("d", Value::Null),
            Row::new().with("id", 2).with("a", "y").with("d", 4),
        ]
    );
}

#[test]
fn create_table_is_idempotent() {
    let (_tdir, mut db) = open_db();
    db.create_table("t", &["a", "b", "c"], &["a", "c"]).unwrap();
    let once = table_sql(&mut db);
    db.create_table("t", &["a", "b", "c"], &["a", "c"]).unwrap();
    assert_eq!(table_sql(&mut db), once);
}

#[test]
fn create_table_with_bad_names_is_a_schema_error() {
    let (_tdir, mut db) = open_db();
    let err = db.create_table("t", &["(oops"], &[]).unwrap_err();
    assert!(matches!(err, Error::Schema { .. }), "{:?}", err);
}

#[test]
fn names_carrying_statements_dont_touch_other_tables() {
    let (_tdir, mut db) = open_db();
    db.save_data(&["id"], &[Row::new().with("id", 1)], "people")
        .unwrap();
    db.create_table("t", &["a"], &[]).unwrap();

    let err = db
        .create_table("u", &["a); DROP TABLE people; CREATE TABLE x (b"], &[])
        .unwrap_err();
    assert!(matches!(err, Error::Schema { .. }), "{:?}", err);
    let err = db.add_columns("t", &["z; DROP TABLE people"]).unwrap_err();
    assert!(matches!(err, Error::Schema { .. }), "{:?}", err);

    let tables = db
        .execute(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            None,
        )
        .unwrap();
    assert_eq!(
        tables,
        vec![Row::new().with("name", "people"), Row::new().with("name", "t")]
    );
    assert_eq!(select_all(&mut db, "people"), vec![Row::new().with("id", 1)]);
}

#[test]
fn add_columns_with_existing_columns_is_a_noop() {
    let (_tdir, mut db) = open_db();
    db.create_table("t", &["a", "b", "c"], &[]).unwrap();
    let before = table_sql(&mut db);
    db.add_columns("t", &["c", "a"]).unwrap();
    assert_eq!(table_sql(&mut db), before);

    db.add_columns("t", &["a", "z", "y"]).unwrap();
    assert_eq!(columns(&mut db, "t"), vec!["a", "b", "c", "z", "y"]);
}

#[test]
fn reading_a_missing_table_is_no_such_table() {
    let (_tdir, mut db) = open_db();
    let err = db.execute("SELECT * FROM nope", None).unwrap_err();
    assert!(matches!(err, Error::NoSuchTable(_)), "{:?}", err);
}

#[test]
fn failed_rows_leave_earlier_rows_written() {
    let (_tdir, mut db) = open_db();
    db.store_mut()
        .execute_batch("CREATE TABLE t (id CHECK (typeof(id) = 'integer'), v)")
        .unwrap();
    let rows = vec![
        Row::new().with("id", 1).with("v", "a"),
        Row::new().with("id", "not a number").with("v", "b"),
        Row::new().with("id", 3).with("v", "c"),
    ];

    assert!(db.save_data(&["id"], &rows, "t").is_err());
    assert_eq!(
        select_all(&mut db, "t"),
        vec![Row::new().with("id", 1).with("v", "a")]
    );

    // Unless the caller asks for a transaction, in which case the good row goes away with the bad one.
    {
        let mut txn = db.transaction().unwrap();
        let txn_rows = [rows[2].clone(), rows[1].clone()];
        assert!(txn.save_data(&["id"], &txn_rows, "t").is_err());
    }
    assert_eq!(select_all(&mut db, "t").len(), 1);
}

/// Reports success for DDL without running it, so repairs never take.
struct ForgetfulStore(rusqlite::Connection);

impl RelationalStore for ForgetfulStore {
    fn execute(&mut self, query: &str, params: Option<&Row>) -> StoreResult<Vec<Row>> {
        RelationalStore::execute(&mut self.0, query, params)
    }

    fn columns_of(&mut self, table: &str) -> StoreResult<Vec<String>> {
        self.0.columns_of(table)
    }

    fn execute_ddl(&mut self, _statement: &str) -> StoreResult<()> {
        Ok(())
    }
}

#[test]
fn repairs_that_dont_take_are_errors() {
    tabula_logging::log_for_tests();
    let store = ForgetfulStore(rusqlite::Connection::open_in_memory().unwrap());
    let mut writer = AdaptiveWriter::new(store);

    let err = writer
        .save_data(&["id"], &[Row::new().with("id", 1)], "t")
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)), "{:?}", err);

    let err = writer
        .insert_or_update(&["id"], &Row::new().with("id", 1), "t", &Default::default())
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)), "{:?}", err);
}

#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct Company {
    company_number: String,
    name: String,
    incorporated: Option<String>,
}

#[test]
fn structs_round_trip() {
    let (_tdir, mut db) = open_db();
    let companies = vec![
        Company {
            company_number: "01".into(),
            name: "Acme".into(),
            incorporated: Some("1999-01-01".into()),
        },
        Company {
            company_number: "02".into(),
            name: "Widgets".into(),
            incorporated: None,
        },
    ];
    let rows = companies
        .iter()
        .map(Row::from_serialize)
        .collect::<Result<Vec<_>>>()
        .unwrap();
    db.save_data(&["company_number"], &rows, "companies")
        .unwrap();

    let got = db
        .execute(
            "SELECT * FROM companies WHERE company_number >= :from ORDER BY company_number",
            Some(&Row::new().with("from", "01")),
        )
        .unwrap()
        .iter()
        .map(|r| r.deserialize::<Company>())
        .collect::<Result<Vec<_>>>()
        .unwrap();
    assert_eq!(got, companies);
}

const FIELDS: [&str; 5] = ["a", "b", "c", "d", "e"];

/// Each row is a unique id plus some random subset of the fields.
fn batch_strategy() -> impl Strategy<Value = Vec<BTreeMap<&'static str, i64>>> {
    proptest::collection::vec(
        proptest::collection::btree_map(proptest::sample::select(FIELDS.to_vec()), 0..100i64, 0..5),
        1..20,
    )
}

fn save_heterogeneous_batch(
    batch: Vec<BTreeMap<&'static str, i64>>,
) -> proptest::test_runner::TestCaseResult {
    let mut db = Database::open_in_memory().unwrap();
    let rows = batch
        .iter()
        .enumerate()
        .map(|(i, fields)| {
            let mut row = Row::new().with("id", i as i64);
            for (k, v) in fields.iter() {
                row.insert(*k, *v);
            }
            row
        })
        .collect::<Vec<_>>();

    db.save_data(&["id"], &rows, "t").unwrap();

    let expected_columns = std::iter::once("id".to_string())
        .chain(
            batch
                .iter()
                .flat_map(|f| f.keys().map(|k| k.to_string()))
                .collect::<BTreeSet<_>>(),
        )
        .collect::<BTreeSet<_>>();
    let got_columns = db
        .store_mut()
        .columns_of("t")
        .unwrap()
        .into_iter()
        .collect::<BTreeSet<_>>();
    prop_assert_eq!(got_columns, expected_columns.clone());

    let got = db.execute("SELECT * FROM t ORDER BY id", None).unwrap();
    prop_assert_eq!(got.len(), rows.len());
    for (got, written) in got.iter().zip(rows.iter()) {
        for column in expected_columns.iter() {
            let expected = written.get(column).cloned().unwrap_or(Value::Null);
            prop_assert_eq!(got.get(column), Some(&expected));
        }
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..Default::default()
    })]
    #[test]
    #[allow(unreachable_code)]
    fn heterogeneous_batches_round_trip(batch in batch_strategy()) {
        return save_heterogeneous_batch(batch);
    }
}
