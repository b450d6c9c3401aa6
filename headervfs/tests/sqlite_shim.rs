//! End-to-end tests of the registered `headervfs` VFS against the linked
//! `SQLite` engine.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use headervfs::{
    params, register, Connection, FileRole, HeaderVfs, OpenFlags, Provider, ProviderFile,
    ResultCode, SqliteProvider, Value, VfsError, HEADER_LEN, HEADER_SIZE, VFS_NAME,
};

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
    register().expect("register headervfs");
}

fn open_shimmed(path: &Path) -> Connection {
    Connection::open_with_vfs(path, false, Some(VFS_NAME)).expect("open through headervfs")
}

/// `path` laid out like an engine-built database filename, with the name
/// starting at index 4.
fn db_filename(path: &Path) -> Vec<u8> {
    let mut buf = vec![0u8; 4];
    buf.extend_from_slice(path.to_string_lossy().as_bytes());
    buf.extend_from_slice(&[0, 0, 0]);
    buf
}

fn read_prefix(path: &Path, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    fs::File::open(path)
        .expect("open raw file")
        .read_exact(&mut buf)
        .expect("read raw prefix");
    buf
}

#[test]
fn test_database_starts_after_header() {
    init();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("layout.db");

    let conn = open_shimmed(&path);
    conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT);")
        .expect("create table");
    conn.execute("INSERT INTO t (val) VALUES (?1)", params!["hello"])
        .expect("insert");
    drop(conn);

    let raw = fs::read(&path).expect("read db");
    assert!(raw.len() > HEADER_LEN);
    assert!(raw[..HEADER_LEN].iter().all(|b| *b == 0), "header stays zeroed");
    assert_eq!(&raw[HEADER_LEN..HEADER_LEN + 16], SQLITE_MAGIC);
    // Logical size is a whole number of pages.
    assert_eq!((raw.len() - HEADER_LEN) % 4096, 0);
}

#[test]
fn test_header_edits_survive_and_are_invisible() {
    init();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("header.db");

    let conn = open_shimmed(&path);
    conn.execute_batch("CREATE TABLE kv (k TEXT PRIMARY KEY, v BLOB);")
        .expect("create table");
    drop(conn);

    let marker = b"app-metadata:v1";
    let mut raw = OpenOptions::new()
        .write(true)
        .open(&path)
        .expect("open raw file");
    raw.seek(SeekFrom::Start(0)).expect("seek");
    raw.write_all(marker).expect("write header");
    drop(raw);

    let conn = open_shimmed(&path);
    conn.execute("INSERT INTO kv (k, v) VALUES (?1, ?2)", params!["a", vec![1_u8, 2, 3]])
        .expect("insert");
    let v = conn
        .query_row("SELECT v FROM kv WHERE k = 'a'", &[], |stmt| Ok(stmt.column_blob(0)))
        .expect("query");
    assert_eq!(v, vec![1, 2, 3]);
    let check = conn
        .query_row("PRAGMA integrity_check", &[], |stmt| Ok(stmt.column_text(0)))
        .expect("integrity check");
    assert_eq!(check, "ok");
    drop(conn);

    assert_eq!(&read_prefix(&path, marker.len()), marker);
}

#[test]
fn test_plain_vfs_cannot_read_shimmed_file() {
    init();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("opaque.db");

    let conn = open_shimmed(&path);
    conn.execute_batch("CREATE TABLE t (id INTEGER);").expect("create table");
    drop(conn);

    // Without the shim the zeroed header is not a valid SQLite header.
    let plain = Connection::open(&path, true).expect("open lazily");
    let err = plain
        .query_row("SELECT count(*) FROM sqlite_master", &[], |stmt| Ok(stmt.column_i64(0)))
        .expect_err("not a database");
    assert_eq!(err.code.primary(), ResultCode(26));
}

#[test]
fn test_rollback_journal_and_wal_modes() {
    init();
    let dir = tempfile::tempdir().expect("tempdir");

    for mode in ["DELETE", "WAL"] {
        let path = dir.path().join(format!("{mode}.db"));
        let conn = open_shimmed(&path);
        let got = conn
            .query_row(&format!("PRAGMA journal_mode = {mode}"), &[], |stmt| {
                Ok(stmt.column_text(0))
            })
            .expect("journal mode");
        assert_eq!(got.to_uppercase(), mode);

        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, payload BLOB);
             BEGIN;
             WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 500)
             INSERT INTO t (payload) SELECT randomblob(256) FROM n;
             COMMIT;",
        )
        .expect("bulk insert");
        conn.execute_batch("BEGIN; DELETE FROM t; ROLLBACK;")
            .expect("rollback");
        let count = conn
            .query_row("SELECT count(*) FROM t", &[], |stmt| Ok(stmt.column_i64(0)))
            .expect("count");
        assert_eq!(count, 500);
        if mode == "WAL" {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
                .expect("checkpoint");
        }
        drop(conn);

        assert_eq!(&read_prefix(&path, HEADER_LEN + 16)[HEADER_LEN..], SQLITE_MAGIC);

        let conn = open_shimmed(&path);
        let count = conn
            .query_row("SELECT count(*) FROM t", &[], |stmt| Ok(stmt.column_i64(0)))
            .expect("count after reopen");
        assert_eq!(count, 500);
    }
}

#[test]
fn test_mmap_request_falls_back_to_reads() {
    init();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mmap.db");

    let conn = open_shimmed(&path);
    conn.execute_batch(
        "PRAGMA mmap_size = 268435456;
         CREATE TABLE t (v TEXT);
         INSERT INTO t VALUES ('mapped?');",
    )
    .expect("write with mmap requested");
    let rows = conn
        .query_map("SELECT v FROM t", &[], |stmt| Ok(stmt.column_value(0)))
        .expect("read");
    assert_eq!(rows, vec![Value::from("mapped?")]);
}

#[test]
fn test_sqlite_provider_through_translation_layer() {
    init();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("direct.db");
    let name = db_filename(&path);
    let c_path = std::ffi::CStr::from_bytes_until_nul(&name[4..]).expect("terminated");

    let real = SqliteProvider::default_vfs().expect("default vfs");
    let vfs = HeaderVfs::new(&real);
    let flags = OpenFlags::MAIN_DB | OpenFlags::READWRITE | OpenFlags::CREATE;

    let (mut file, _) = vfs.open(Some(c_path), flags).expect("open");
    assert_eq!(file.role(), FileRole::PrimaryContent);
    assert!(file.get_ref().is_open());
    assert_eq!(fs::metadata(&path).expect("stat").len(), 1024);

    file.write(b"HELLOABC", 0).expect("write");
    let mut buf = [0u8; 8];
    file.read(&mut buf, 0).expect("read");
    assert_eq!(&buf, b"HELLOABC");
    assert_eq!(file.file_size(), Ok(8));

    let mut past_end = [0xff_u8; 4];
    assert_eq!(
        file.read(&mut past_end, 6),
        Err(VfsError::Provider(ResultCode::IOERR_SHORT_READ))
    );
    assert_eq!(&past_end, b"BC\0\0");
    file.close().expect("close");
    file.close().expect("second close is a no-op");

    let raw = fs::read(&path).expect("read raw");
    assert_eq!(raw.len(), 1032);
    assert_eq!(&raw[1024..], b"HELLOABC");
    assert_eq!(HEADER_SIZE, 1024);

    let missing = dir.path().join("missing").join("nope.db");
    let missing_name = db_filename(&missing);
    let c_missing = std::ffi::CStr::from_bytes_until_nul(&missing_name[4..]).expect("terminated");
    let err = vfs.open(Some(c_missing), flags).expect_err("parent dir missing");
    assert_eq!(err.code().primary(), ResultCode::CANTOPEN);
}
