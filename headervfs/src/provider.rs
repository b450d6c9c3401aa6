//! The provider contract the shim consumes and re-exposes.
//!
//! A [`Provider`] is a pluggable storage backend (a `SQLite` VFS): it opens
//! files and answers process-level queries. Every open file is a
//! [`ProviderFile`]. The offset translation layer both consumes this contract
//! from the real provider and implements it for the host, so the two sides
//! have the same shape.
//!
//! Offsets and sizes are `i64` to match `sqlite3_int64` on the wire.

use std::ffi::{c_void, CStr};

use crate::error::VfsResult;
use crate::flags::{AccessCheck, LockLevel, OpenFlags, ShmLockFlags, SyncFlags};

/// Operations on one open file.
///
/// Implementations must not reorder, merge or split calls: every method maps
/// to exactly one underlying operation.
pub trait ProviderFile {
    /// Reads `buf.len()` bytes at `offset`.
    ///
    /// A read past end of file zero-fills the rest of `buf` and reports
    /// [`ResultCode::IOERR_SHORT_READ`](crate::ResultCode::IOERR_SHORT_READ).
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn read(&mut self, buf: &mut [u8], offset: i64) -> VfsResult<()>;

    /// Writes `buf` at `offset`, extending the file if needed.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn write(&mut self, buf: &[u8], offset: i64) -> VfsResult<()>;

    /// Truncates or extends the file to `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn truncate(&mut self, size: i64) -> VfsResult<()>;

    /// Flushes the file to stable storage.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn sync(&mut self, flags: SyncFlags) -> VfsResult<()>;

    /// Returns the current size of the file in bytes.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn file_size(&mut self) -> VfsResult<i64>;

    /// Raises the file lock to `level`.
    ///
    /// # Errors
    ///
    /// Returns the provider's status, e.g. `SQLITE_BUSY`.
    fn lock(&mut self, level: LockLevel) -> VfsResult<()>;

    /// Lowers the file lock to `level`.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn unlock(&mut self, level: LockLevel) -> VfsResult<()>;

    /// Reports whether any connection holds a RESERVED or higher lock.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn check_reserved_lock(&mut self) -> VfsResult<bool>;

    /// Forwards a file-control opcode. `arg` is opaque to the shim.
    ///
    /// # Errors
    ///
    /// Returns the provider's status; unknown opcodes report
    /// [`ResultCode::NOTFOUND`](crate::ResultCode::NOTFOUND).
    fn file_control(&mut self, op: i32, arg: *mut c_void) -> VfsResult<()>;

    /// Sector size of the underlying device.
    fn sector_size(&mut self) -> i32;

    /// `SQLITE_IOCAP_*` bitmask of the underlying device.
    fn device_characteristics(&mut self) -> i32;

    /// Maps shared-memory region `region` of `size` bytes into `out`.
    ///
    /// `out` is written even when the provider reports a non-OK status
    /// alongside a usable mapping (read-only shared memory).
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn shm_map(
        &mut self,
        region: i32,
        size: i32,
        extend: bool,
        out: &mut *mut c_void,
    ) -> VfsResult<()>;

    /// Acquires or releases shared-memory locks `offset..offset + n`.
    ///
    /// # Errors
    ///
    /// Returns the provider's status, e.g. `SQLITE_BUSY`.
    fn shm_lock(&mut self, offset: i32, n: i32, flags: ShmLockFlags) -> VfsResult<()>;

    /// Memory barrier for shared memory.
    fn shm_barrier(&mut self);

    /// Unmaps shared memory, deleting it if `delete` is set.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn shm_unmap(&mut self, delete: bool) -> VfsResult<()>;

    /// Closes the file and releases its resources.
    ///
    /// Idempotent: closing an already closed file is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the provider's close status.
    fn close(&mut self) -> VfsResult<()>;
}

/// Provider-level operations (a `SQLite` VFS).
pub trait Provider {
    /// File type produced by [`open`](Self::open).
    type File: ProviderFile;

    /// Opens `name` (`None` for an anonymous temp file) with `flags`.
    ///
    /// Returns the file and the output flags reported by the provider.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::OutOfMemory`](crate::VfsError::OutOfMemory) if the
    /// handle cannot be allocated, otherwise the provider's status. No handle
    /// or allocation outlives a failed open.
    fn open(&self, name: Option<&CStr>, flags: OpenFlags) -> VfsResult<(Self::File, OpenFlags)>;

    /// Deletes `name`, syncing its directory if `sync_dir` is set.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn delete(&self, name: &CStr, sync_dir: bool) -> VfsResult<()>;

    /// Checks `name` for existence or accessibility.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn access(&self, name: &CStr, check: AccessCheck) -> VfsResult<bool>;

    /// Writes the canonical, NUL-terminated path of `name` into `out`.
    ///
    /// # Errors
    ///
    /// Returns the provider's status, e.g. `SQLITE_CANTOPEN` if `out` is too
    /// small.
    fn full_pathname(&self, name: &CStr, out: &mut [u8]) -> VfsResult<()>;

    /// Opens a shared library; null on failure.
    fn dl_open(&self, path: Option<&CStr>) -> *mut c_void;

    /// Writes the last dynamic-loading error message into `out`.
    fn dl_error(&self, out: &mut [u8]);

    /// Resolves `symbol` in a library opened with [`dl_open`](Self::dl_open).
    fn dl_sym(&self, handle: *mut c_void, symbol: &CStr) -> Option<unsafe extern "C" fn()>;

    /// Closes a library opened with [`dl_open`](Self::dl_open).
    fn dl_close(&self, handle: *mut c_void);

    /// Fills `out` with random bytes, returning how many were written.
    fn randomness(&self, out: &mut [u8]) -> i32;

    /// Sleeps for at least `micros` microseconds, returning the time slept.
    fn sleep(&self, micros: i32) -> i32;

    /// Current time as a Julian day number.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn current_time(&self) -> VfsResult<f64>;

    /// Current time in milliseconds since the Julian epoch.
    ///
    /// # Errors
    ///
    /// Returns the provider's status for any non-OK outcome.
    fn current_time_i64(&self) -> VfsResult<i64>;

    /// Writes the last OS error message into `out`, returning the OS error
    /// code.
    fn last_error(&self, out: &mut [u8]) -> i32;
}
