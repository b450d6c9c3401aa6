//! Safe wrapper around a `SQLite` prepared statement.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};

use crate::error::{DbError, DbResult};
use crate::ffi;
use crate::value::Value;

/// Result of a single `sqlite3_step` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A result row is available (`SQLITE_ROW`).
    Row,
    /// The statement has finished executing (`SQLITE_DONE`).
    Done,
}

/// A prepared `SQLite` statement.
///
/// Statements are created via [`Connection::prepare`](crate::Connection::prepare)
/// and finalized when dropped.
pub struct Statement {
    /// Raw `sqlite3_stmt*` handle.
    stmt: *mut c_void,
    /// Raw `sqlite3*` handle, kept for error messages.
    db: *mut c_void,
}

impl Statement {
    /// Creates a new `Statement` wrapping a raw pointer pair.
    ///
    /// # Safety
    ///
    /// `stmt` must be a valid, non-null `sqlite3_stmt*`.
    /// `db` must be the owning `sqlite3*` handle.
    pub(crate) unsafe fn from_raw(stmt: *mut c_void, db: *mut c_void) -> Self {
        debug_assert!(!stmt.is_null());
        Self { stmt, db }
    }

    // ── Binding ─────────────────────────────────────────────────────────

    /// Binds a slice of [`Value`]s to the statement parameters (1-indexed).
    ///
    /// # Errors
    ///
    /// Returns the engine's error if a value cannot be bound.
    pub fn bind_values(&mut self, values: &[Value]) -> DbResult<()> {
        for (i, val) in values.iter().enumerate() {
            let idx = to_c_int(i + 1)?;
            // SAFETY: `stmt` is a live statement; SQLITE_TRANSIENT makes the
            // engine copy blob and text data before returning.
            let rc = unsafe {
                match val {
                    Value::Integer(v) => ffi::sqlite3_bind_int64(self.stmt, idx, *v),
                    Value::Real(v) => ffi::sqlite3_bind_double(self.stmt, idx, *v),
                    Value::Blob(v) => ffi::sqlite3_bind_blob(
                        self.stmt,
                        idx,
                        v.as_ptr().cast(),
                        to_c_int(v.len())?,
                        ffi::SQLITE_TRANSIENT,
                    ),
                    Value::Text(v) => ffi::sqlite3_bind_text(
                        self.stmt,
                        idx,
                        v.as_ptr().cast(),
                        to_c_int(v.len())?,
                        ffi::SQLITE_TRANSIENT,
                    ),
                    Value::Null => ffi::sqlite3_bind_null(self.stmt, idx),
                }
            };
            if rc != ffi::SQLITE_OK {
                return Err(self.last_error(rc));
            }
        }
        Ok(())
    }

    // ── Stepping ────────────────────────────────────────────────────────

    /// Executes a single step.
    ///
    /// # Errors
    ///
    /// Returns the engine's error for anything other than a row or done.
    pub fn step(&mut self) -> DbResult<StepResult> {
        // SAFETY: `stmt` is a live statement.
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc {
            ffi::SQLITE_ROW => Ok(StepResult::Row),
            ffi::SQLITE_DONE => Ok(StepResult::Done),
            _ => Err(self.last_error(rc)),
        }
    }

    // ── Column reading ──────────────────────────────────────────────────

    /// Returns the number of columns in the result set.
    #[must_use]
    pub fn column_count(&self) -> usize {
        // SAFETY: `stmt` is a live statement.
        usize::try_from(unsafe { ffi::sqlite3_column_count(self.stmt) }).unwrap_or(0)
    }

    /// Returns the name of column `idx`, or an empty string if out of range.
    #[must_use]
    pub fn column_name(&self, idx: usize) -> String {
        let Ok(idx) = c_int::try_from(idx) else {
            return String::new();
        };
        // SAFETY: `stmt` is a live statement; the name is copied out before
        // the next call on it.
        unsafe {
            let ptr = ffi::sqlite3_column_name(self.stmt, idx);
            if ptr.is_null() {
                return String::new();
            }
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }

    /// Reads a column as `i64`.
    #[must_use]
    pub fn column_i64(&self, idx: usize) -> i64 {
        let Ok(idx) = c_int::try_from(idx) else {
            return 0;
        };
        // SAFETY: `stmt` is a live statement positioned on a row.
        unsafe { ffi::sqlite3_column_int64(self.stmt, idx) }
    }

    /// Reads a column as a blob. Returns an empty `Vec` for NULL.
    #[must_use]
    pub fn column_blob(&self, idx: usize) -> Vec<u8> {
        let Ok(idx) = c_int::try_from(idx) else {
            return Vec::new();
        };
        // SAFETY: `stmt` is a live statement positioned on a row; the pointer
        // is valid for `len` bytes until the next step.
        unsafe {
            let ptr = ffi::sqlite3_column_blob(self.stmt, idx);
            let len = usize::try_from(ffi::sqlite3_column_bytes(self.stmt, idx)).unwrap_or(0);
            if ptr.is_null() || len == 0 {
                return Vec::new();
            }
            std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec()
        }
    }

    /// Reads a column as a UTF-8 string. Returns an empty string for NULL.
    #[must_use]
    pub fn column_text(&self, idx: usize) -> String {
        let Ok(idx) = c_int::try_from(idx) else {
            return String::new();
        };
        // SAFETY: `stmt` is a live statement positioned on a row.
        unsafe {
            let ptr = ffi::sqlite3_column_text(self.stmt, idx);
            if ptr.is_null() {
                return String::new();
            }
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }

    /// Reads a column with its storage class preserved.
    #[must_use]
    pub fn column_value(&self, idx: usize) -> Value {
        let Ok(c_idx) = c_int::try_from(idx) else {
            return Value::Null;
        };
        // SAFETY: `stmt` is a live statement positioned on a row.
        match unsafe { ffi::sqlite3_column_type(self.stmt, c_idx) } {
            ffi::SQLITE_INTEGER => Value::Integer(self.column_i64(idx)),
            // SAFETY: as above.
            ffi::SQLITE_FLOAT => Value::Real(unsafe { ffi::sqlite3_column_double(self.stmt, c_idx) }),
            ffi::SQLITE_TEXT => Value::Text(self.column_text(idx)),
            ffi::SQLITE_BLOB => Value::Blob(self.column_blob(idx)),
            _ => Value::Null,
        }
    }

    /// Reads every column of the current row.
    #[must_use]
    pub fn row_values(&self) -> Vec<Value> {
        (0..self.column_count()).map(|i| self.column_value(i)).collect()
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn last_error(&self, code: c_int) -> DbError {
        // SAFETY: `db` is the owning connection handle.
        let msg = unsafe {
            let ptr = ffi::sqlite3_errmsg(self.db);
            if ptr.is_null() {
                "unknown error".to_string()
            } else {
                CStr::from_ptr(ptr.cast::<c_char>())
                    .to_string_lossy()
                    .into_owned()
            }
        };
        DbError::new(code, msg)
    }
}

fn to_c_int(n: usize) -> DbResult<c_int> {
    c_int::try_from(n).map_err(|_| DbError::new(ffi::SQLITE_ERROR, "value too large"))
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("stmt", &self.stmt)
            .finish_non_exhaustive()
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if !self.stmt.is_null() {
            // SAFETY: finalized exactly once.
            unsafe {
                ffi::sqlite3_finalize(self.stmt);
            }
            self.stmt = std::ptr::null_mut();
        }
    }
}
