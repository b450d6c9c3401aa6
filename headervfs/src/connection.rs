//! Safe wrapper around a `SQLite` database connection.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::path::Path;

use crate::error::{DbError, DbResult};
use crate::ffi;
use crate::flags::OpenFlags;
use crate::statement::{Statement, StepResult};
use crate::value::Value;

/// A `SQLite` database connection.
///
/// The connection is closed when dropped. It is **not** `Sync`: all access
/// must happen from a single thread.
pub struct Connection {
    /// Raw `sqlite3*` handle.
    db: *mut c_void,
}

impl Connection {
    /// Opens (or creates) a database at `path` with the default VFS.
    ///
    /// Pass `read_only = true` for read-only access.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if the database cannot be opened.
    pub fn open(path: &Path, read_only: bool) -> DbResult<Self> {
        Self::open_with_vfs(path, read_only, None)
    }

    /// Opens (or creates) a database at `path` through the VFS named `vfs`
    /// (`None` for the default VFS).
    ///
    /// # Errors
    ///
    /// Returns the engine's error if the database cannot be opened, e.g.
    /// `SQLITE_ERROR` for an unknown VFS name.
    pub fn open_with_vfs(path: &Path, read_only: bool, vfs: Option<&str>) -> DbResult<Self> {
        let path_str = path.to_string_lossy();
        let c_path = CString::new(path_str.as_bytes())
            .map_err(|e| DbError::new(ffi::SQLITE_ERROR, format!("invalid path: {e}")))?;
        let c_vfs = vfs
            .map(CString::new)
            .transpose()
            .map_err(|e| DbError::new(ffi::SQLITE_ERROR, format!("invalid vfs name: {e}")))?;

        let flags = if read_only {
            OpenFlags::READONLY | OpenFlags::FULLMUTEX
        } else {
            OpenFlags::READWRITE | OpenFlags::CREATE | OpenFlags::FULLMUTEX
        };

        let mut db: *mut c_void = std::ptr::null_mut();
        // SAFETY: all strings are NUL-terminated and outlive the call.
        let rc = unsafe {
            ffi::sqlite3_open_v2(
                c_path.as_ptr(),
                &mut db,
                flags.0,
                c_vfs.as_ref().map_or(std::ptr::null(), |v| v.as_ptr()),
            )
        };
        if rc != ffi::SQLITE_OK {
            // If open failed but we got a handle, extract the error and close.
            let msg = if db.is_null() {
                format!("sqlite3_open_v2 returned {rc}")
            } else {
                let m = Self::errmsg_raw(db);
                // SAFETY: `db` came from the failed open and is closed once.
                unsafe {
                    ffi::sqlite3_close_v2(db);
                }
                m
            };
            return Err(DbError::new(rc, msg));
        }
        tracing::debug!(path = %path_str, vfs = vfs.unwrap_or("default"), read_only, "opened database");
        Ok(Self { db })
    }

    // ── execute_batch ───────────────────────────────────────────────────

    /// Executes one or more SQL statements separated by semicolons.
    ///
    /// No result rows are returned. This is suitable for DDL, PRAGMAs, and
    /// multi-statement scripts.
    ///
    /// # Errors
    ///
    /// Returns the engine's error for the first failing statement.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let c_sql = CString::new(sql)
            .map_err(|e| DbError::new(ffi::SQLITE_ERROR, format!("nul in SQL: {e}")))?;
        let mut errmsg: *mut c_char = std::ptr::null_mut();
        // SAFETY: `db` is live and `c_sql` is NUL-terminated.
        let rc = unsafe {
            ffi::sqlite3_exec(
                self.db,
                c_sql.as_ptr(),
                std::ptr::null(),
                std::ptr::null_mut(),
                &mut errmsg,
            )
        };
        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                self.errmsg()
            } else {
                // SAFETY: the engine allocated `errmsg`; it is freed once.
                unsafe {
                    let s = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    s
                }
            };
            return Err(DbError::new(rc, msg));
        }
        Ok(())
    }

    // ── prepare ─────────────────────────────────────────────────────────

    /// Prepares a single SQL statement.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if the SQL does not compile.
    pub fn prepare(&self, sql: &str) -> DbResult<Statement> {
        let c_sql = CString::new(sql)
            .map_err(|e| DbError::new(ffi::SQLITE_ERROR, format!("nul in SQL: {e}")))?;
        let mut stmt: *mut c_void = std::ptr::null_mut();
        // SAFETY: `db` is live and `c_sql` is NUL-terminated.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(self.db, c_sql.as_ptr(), -1, &mut stmt, std::ptr::null_mut())
        };
        if rc != ffi::SQLITE_OK {
            return Err(DbError::new(rc, self.errmsg()));
        }
        if stmt.is_null() {
            return Err(DbError::new(ffi::SQLITE_ERROR, "empty statement"));
        }
        // SAFETY: `stmt` is a fresh non-null statement owned by `db`.
        Ok(unsafe { Statement::from_raw(stmt, self.db) })
    }

    // ── execute (single statement) ──────────────────────────────────────

    /// Prepares and executes a single SQL statement with the given parameters.
    ///
    /// Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if preparing, binding or stepping fails.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        let mut stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        stmt.step()?;
        Ok(self.changes())
    }

    // ── query_row ───────────────────────────────────────────────────────

    /// Prepares and executes a statement, mapping exactly one result row.
    ///
    /// # Errors
    ///
    /// Returns an error if no row is returned, or the engine's error.
    pub fn query_row<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Statement) -> DbResult<T>,
    ) -> DbResult<T> {
        let mut stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        match stmt.step()? {
            StepResult::Row => mapper(&stmt),
            StepResult::Done => Err(DbError::new(ffi::SQLITE_DONE, "query returned no rows")),
        }
    }

    // ── Rows iteration ──────────────────────────────────────────────────

    /// Prepares a statement and collects all matching rows.
    ///
    /// # Errors
    ///
    /// Returns the first error from the engine or from `mapper`.
    pub fn query_map<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl Fn(&Statement) -> DbResult<T>,
    ) -> DbResult<Vec<T>> {
        let mut stmt = self.prepare(sql)?;
        stmt.bind_values(params)?;
        let mut results = Vec::new();
        while stmt.step()? == StepResult::Row {
            results.push(mapper(&stmt)?);
        }
        Ok(results)
    }

    // ── changes ─────────────────────────────────────────────────────────

    /// Returns the number of rows changed by the most recent statement.
    #[must_use]
    pub fn changes(&self) -> usize {
        // SAFETY: `db` is live.
        usize::try_from(unsafe { ffi::sqlite3_changes(self.db) }).unwrap_or(0)
    }

    // ── Error helpers ───────────────────────────────────────────────────

    fn errmsg(&self) -> String {
        Self::errmsg_raw(self.db)
    }

    fn errmsg_raw(db: *mut c_void) -> String {
        // SAFETY: `db` is a live (possibly failed) connection handle.
        unsafe {
            let ptr = ffi::sqlite3_errmsg(db);
            if ptr.is_null() {
                "unknown error".to_string()
            } else {
                CStr::from_ptr(ptr).to_string_lossy().into_owned()
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("db", &self.db).finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: closed exactly once; `close_v2` defers until every
            // statement is finalized.
            let rc: c_int = unsafe { ffi::sqlite3_close_v2(self.db) };
            if rc != ffi::SQLITE_OK {
                tracing::warn!(rc, "closing database failed");
            }
            self.db = std::ptr::null_mut();
        }
    }
}

#[cfg(test)]
impl Connection {
    /// Opens an in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open(Path::new(":memory:"), false)
    }
}
