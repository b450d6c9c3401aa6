//! Error types for the VFS shim and the connection helper.

use std::fmt;

use thiserror::Error;

/// Raw result code as reported by a provider (`SQLITE_*` / extended codes).
///
/// Carried verbatim through the shim: a code received from the underlying
/// provider is handed back to the caller bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub i32);

impl ResultCode {
    /// `SQLITE_OK`.
    pub const OK: Self = Self(0);
    /// `SQLITE_ERROR`.
    pub const ERROR: Self = Self(1);
    /// `SQLITE_PERM`.
    pub const PERM: Self = Self(3);
    /// `SQLITE_BUSY`.
    pub const BUSY: Self = Self(5);
    /// `SQLITE_NOMEM`.
    pub const NOMEM: Self = Self(7);
    /// `SQLITE_READONLY`.
    pub const READONLY: Self = Self(8);
    /// `SQLITE_IOERR`.
    pub const IOERR: Self = Self(10);
    /// `SQLITE_NOTFOUND`, also the "unknown opcode" answer of `xFileControl`.
    pub const NOTFOUND: Self = Self(12);
    /// `SQLITE_CANTOPEN`.
    pub const CANTOPEN: Self = Self(14);
    /// `SQLITE_MISUSE`.
    pub const MISUSE: Self = Self(21);
    /// `SQLITE_ROW`.
    pub const ROW: Self = Self(100);
    /// `SQLITE_DONE`.
    pub const DONE: Self = Self(101);
    /// `SQLITE_IOERR_SHORT_READ`: the buffer was zero-filled past end of file.
    pub const IOERR_SHORT_READ: Self = Self(10 | (2 << 8));
    /// `SQLITE_IOERR_TRUNCATE`.
    pub const IOERR_TRUNCATE: Self = Self(10 | (6 << 8));
    /// `SQLITE_IOERR_FSTAT`.
    pub const IOERR_FSTAT: Self = Self(10 | (7 << 8));
    /// `SQLITE_IOERR_DELETE_NOENT`.
    pub const IOERR_DELETE_NOENT: Self = Self(10 | (23 << 8));
    /// `SQLITE_OK_LOAD_PERMANENTLY`: extension loaded and must never be
    /// unloaded.
    pub const OK_LOAD_PERMANENTLY: Self = Self(256);

    /// Returns `true` for `SQLITE_OK` and its extended forms.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        self.0 & 0xff == 0
    }

    /// The primary (low byte) result code.
    #[must_use]
    pub const fn primary(self) -> Self {
        Self(self.0 & 0xff)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced by the offset translation layer and its providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VfsError {
    /// Local allocation of an underlying file handle failed.
    #[error("out of memory allocating underlying file handle")]
    OutOfMemory,

    /// Failure reported by the underlying provider, passed through unchanged.
    #[error("underlying provider error {0}")]
    Provider(ResultCode),

    /// No default provider was installed when registering the shim.
    #[error("no default provider registered")]
    Registration,
}

impl VfsError {
    /// The raw result code to hand back across the C boundary.
    #[must_use]
    pub const fn code(self) -> ResultCode {
        match self {
            Self::OutOfMemory => ResultCode::NOMEM,
            Self::Provider(code) => code,
            Self::Registration => ResultCode::ERROR,
        }
    }

    /// Converts a raw status into `Ok(())` or a verbatim provider error.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::Provider`] for any non-OK code.
    pub const fn check(rc: i32) -> VfsResult<()> {
        if rc == ResultCode::OK.0 {
            Ok(())
        } else {
            Err(Self::Provider(ResultCode(rc)))
        }
    }
}

impl From<ResultCode> for VfsError {
    fn from(code: ResultCode) -> Self {
        Self::Provider(code)
    }
}

/// Result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// Error returned by the connection helper.
#[derive(Debug, PartialEq, Eq, Error)]
#[error("sqlite error {code}: {message}")]
pub struct DbError {
    /// `SQLite` result code.
    pub code: ResultCode,
    /// Human-readable error message (from `sqlite3_errmsg` when available).
    pub message: String,
}

impl DbError {
    /// Creates a new database error.
    pub(crate) fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: ResultCode(code),
            message: message.into(),
        }
    }
}

impl From<VfsError> for DbError {
    fn from(err: VfsError) -> Self {
        Self::new(err.code().0, err.to_string())
    }
}

/// Result type for connection helper operations.
pub type DbResult<T> = Result<T, DbError>;
