//! Unit tests for the connection helper and registration.

use super::*;

#[test]
fn test_open_in_memory() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT);")
        .expect("create table");
    conn.execute(
        "INSERT INTO t (id, val) VALUES (?1, ?2)",
        params![Value::Integer(1), Value::from("hello")],
    )
    .expect("insert");
    let result = conn
        .query_row("SELECT val FROM t WHERE id = ?1", params![1_i64], |stmt| {
            Ok(stmt.column_text(0))
        })
        .expect("query");
    assert_eq!(result, "hello");
}

#[test]
fn test_query_row_without_rows_is_done() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);")
        .expect("create table");
    let err = conn
        .query_row("SELECT id FROM t WHERE id = 999", &[], |stmt| {
            Ok(stmt.column_i64(0))
        })
        .expect_err("no rows");
    assert_eq!(err.code, ResultCode::DONE);
}

#[test]
fn test_column_values_keep_storage_class() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    let rows = conn
        .query_map("SELECT 1, 2.5, 'txt', x'00ff', NULL", &[], |stmt| {
            Ok(stmt.row_values())
        })
        .expect("query");
    assert_eq!(
        rows,
        vec![vec![
            Value::Integer(1),
            Value::Real(2.5),
            Value::Text("txt".to_string()),
            Value::Blob(vec![0x00, 0xff]),
            Value::Null,
        ]]
    );

    let stmt = conn.prepare("SELECT 1 AS one").expect("prepare");
    assert_eq!(stmt.column_count(), 1);
    assert_eq!(stmt.column_name(0), "one");
}

#[test]
fn test_execute_batch_reports_engine_message() {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    let err = conn.execute_batch("SELEKT 1;").expect_err("syntax error");
    assert_eq!(err.code, ResultCode::ERROR);
    assert!(err.message.contains("syntax error"), "{}", err.message);
}

#[test]
fn test_register_is_repeatable() {
    assert_eq!(register(), Ok(ResultCode::OK_LOAD_PERMANENTLY));
    let first = SqliteProvider::find(c"headervfs").expect("registered");
    assert_eq!(register(), Ok(ResultCode::OK_LOAD_PERMANENTLY));

    // The same descriptor is registered again rather than rebuilt.
    let shim = SqliteProvider::find(c"headervfs").expect("registered");
    assert_eq!(shim, first);
    assert_eq!(shim.name(), VFS_NAME);
    let default = SqliteProvider::default_vfs().expect("default vfs");
    assert_ne!(default.name(), VFS_NAME, "must not become the default");
}

#[test]
fn test_unknown_vfs_name_fails_to_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Connection::open_with_vfs(&dir.path().join("x.db"), false, Some("no-such-vfs"))
        .expect_err("unknown vfs");
    assert_eq!(err.code, ResultCode::ERROR);
}
