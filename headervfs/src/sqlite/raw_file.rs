//! A file opened through a real `sqlite3_vfs`.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr::NonNull;

use super::api::Api;
use crate::error::{ResultCode, VfsError, VfsResult};
use crate::ffi::{self, sqlite3_file, sqlite3_io_methods};
use crate::flags::{LockLevel, ShmLockFlags, SyncFlags};
use crate::provider::ProviderFile;

/// Sector size reported when the provider has no `xSectorSize`.
const DEFAULT_SECTOR_SIZE: c_int = 4096;

/// Owns a `sqlite3_malloc`ed `sqlite3_file` of the real provider's
/// `szOsFile` bytes.
///
/// The file is closed (if the provider installed a method table) and the
/// allocation freed when dropped, by the library that allocated it.
#[derive(Debug)]
pub struct RawFile {
    ptr: NonNull<sqlite3_file>,
    free: unsafe extern "C" fn(*mut c_void),
}

impl RawFile {
    /// Allocates `size` zeroed bytes for the provider to open into.
    pub(crate) fn alloc(api: Api, size: c_int) -> VfsResult<Self> {
        let len = usize::try_from(size).map_err(|_| VfsError::OutOfMemory)?;
        // SAFETY: `sqlite3_malloc` returns null or a block of at least `size`
        // bytes, 8-byte aligned.
        let raw = unsafe { (api.malloc)(size) };
        let ptr = NonNull::new(raw.cast::<sqlite3_file>()).ok_or(VfsError::OutOfMemory)?;
        // SAFETY: the block is `len` bytes long and exclusively ours.
        unsafe { ptr.as_ptr().cast::<u8>().write_bytes(0, len) };
        Ok(Self {
            ptr,
            free: api.free,
        })
    }

    /// Raw pointer handed to the provider's `xOpen`.
    pub(crate) const fn as_ptr(&self) -> *mut sqlite3_file {
        self.ptr.as_ptr()
    }

    /// Returns `true` while the provider's method table is installed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.methods().is_some()
    }

    fn methods(&self) -> Option<&sqlite3_io_methods> {
        // SAFETY: `ptr` is a live allocation; `pMethods` is null or points
        // at a method table that outlives every file using it.
        unsafe { self.ptr.as_ref().pMethods.as_ref() }
    }

    /// Version of the provider's method table, 0 when closed.
    #[must_use]
    pub fn methods_version(&self) -> i32 {
        self.methods().map_or(0, |m| m.iVersion)
    }

    /// Shared-memory methods exist from version 2 onwards.
    fn shm_methods(&self) -> Option<&sqlite3_io_methods> {
        self.methods().filter(|m| m.iVersion >= 2)
    }
}

fn missing() -> VfsError {
    VfsError::Provider(ResultCode::MISUSE)
}

fn len_of(len: usize) -> VfsResult<c_int> {
    c_int::try_from(len).map_err(|_| VfsError::Provider(ResultCode::IOERR))
}

impl ProviderFile for RawFile {
    fn read(&mut self, buf: &mut [u8], offset: i64) -> VfsResult<()> {
        let x_read = self.methods().and_then(|m| m.xRead).ok_or_else(missing)?;
        let amount = len_of(buf.len())?;
        // SAFETY: the file is open and `buf` is valid for `amount` bytes.
        VfsError::check(unsafe { x_read(self.as_ptr(), buf.as_mut_ptr().cast(), amount, offset) })
    }

    fn write(&mut self, buf: &[u8], offset: i64) -> VfsResult<()> {
        let x_write = self.methods().and_then(|m| m.xWrite).ok_or_else(missing)?;
        let amount = len_of(buf.len())?;
        // SAFETY: the file is open and `buf` is valid for `amount` bytes.
        VfsError::check(unsafe { x_write(self.as_ptr(), buf.as_ptr().cast(), amount, offset) })
    }

    fn truncate(&mut self, size: i64) -> VfsResult<()> {
        let x_truncate = self.methods().and_then(|m| m.xTruncate).ok_or_else(missing)?;
        // SAFETY: the file is open.
        VfsError::check(unsafe { x_truncate(self.as_ptr(), size) })
    }

    fn sync(&mut self, flags: SyncFlags) -> VfsResult<()> {
        let x_sync = self.methods().and_then(|m| m.xSync).ok_or_else(missing)?;
        // SAFETY: the file is open.
        VfsError::check(unsafe { x_sync(self.as_ptr(), flags.0) })
    }

    fn file_size(&mut self) -> VfsResult<i64> {
        let x_file_size = self.methods().and_then(|m| m.xFileSize).ok_or_else(missing)?;
        let mut size = 0i64;
        // SAFETY: the file is open and `size` is a valid out-pointer.
        VfsError::check(unsafe { x_file_size(self.as_ptr(), &mut size) })?;
        Ok(size)
    }

    fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
        let x_lock = self.methods().and_then(|m| m.xLock).ok_or_else(missing)?;
        // SAFETY: the file is open.
        VfsError::check(unsafe { x_lock(self.as_ptr(), level.0) })
    }

    fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
        let x_unlock = self.methods().and_then(|m| m.xUnlock).ok_or_else(missing)?;
        // SAFETY: the file is open.
        VfsError::check(unsafe { x_unlock(self.as_ptr(), level.0) })
    }

    fn check_reserved_lock(&mut self) -> VfsResult<bool> {
        let x_check = self
            .methods()
            .and_then(|m| m.xCheckReservedLock)
            .ok_or_else(missing)?;
        let mut reserved: c_int = 0;
        // SAFETY: the file is open and `reserved` is a valid out-pointer.
        VfsError::check(unsafe { x_check(self.as_ptr(), &mut reserved) })?;
        Ok(reserved != 0)
    }

    fn file_control(&mut self, op: i32, arg: *mut c_void) -> VfsResult<()> {
        let x_file_control = self
            .methods()
            .and_then(|m| m.xFileControl)
            .ok_or(VfsError::Provider(ResultCode::NOTFOUND))?;
        // SAFETY: the file is open; `arg` is the caller's opaque pointer.
        VfsError::check(unsafe { x_file_control(self.as_ptr(), op, arg) })
    }

    fn sector_size(&mut self) -> i32 {
        match self.methods().and_then(|m| m.xSectorSize) {
            // SAFETY: the file is open.
            Some(x_sector_size) => unsafe { x_sector_size(self.as_ptr()) },
            None => DEFAULT_SECTOR_SIZE,
        }
    }

    fn device_characteristics(&mut self) -> i32 {
        match self.methods().and_then(|m| m.xDeviceCharacteristics) {
            // SAFETY: the file is open.
            Some(x_device) => unsafe { x_device(self.as_ptr()) },
            None => 0,
        }
    }

    fn shm_map(
        &mut self,
        region: i32,
        size: i32,
        extend: bool,
        out: &mut *mut c_void,
    ) -> VfsResult<()> {
        let x_shm_map = self
            .shm_methods()
            .and_then(|m| m.xShmMap)
            .ok_or(VfsError::Provider(ResultCode::IOERR))?;
        // SAFETY: the file is open and `out` is a valid out-pointer.
        VfsError::check(unsafe {
            x_shm_map(self.as_ptr(), region, size, c_int::from(extend), out)
        })
    }

    fn shm_lock(&mut self, offset: i32, n: i32, flags: ShmLockFlags) -> VfsResult<()> {
        let x_shm_lock = self
            .shm_methods()
            .and_then(|m| m.xShmLock)
            .ok_or(VfsError::Provider(ResultCode::IOERR))?;
        // SAFETY: the file is open.
        VfsError::check(unsafe { x_shm_lock(self.as_ptr(), offset, n, flags.0) })
    }

    fn shm_barrier(&mut self) {
        if let Some(x_shm_barrier) = self.shm_methods().and_then(|m| m.xShmBarrier) {
            // SAFETY: the file is open.
            unsafe { x_shm_barrier(self.as_ptr()) };
        }
    }

    fn shm_unmap(&mut self, delete: bool) -> VfsResult<()> {
        let x_shm_unmap = self
            .shm_methods()
            .and_then(|m| m.xShmUnmap)
            .ok_or(VfsError::Provider(ResultCode::IOERR))?;
        // SAFETY: the file is open.
        VfsError::check(unsafe { x_shm_unmap(self.as_ptr(), c_int::from(delete)) })
    }

    fn close(&mut self) -> VfsResult<()> {
        let Some(x_close) = self.methods().map(|m| m.xClose) else {
            return Ok(());
        };
        // SAFETY: the file is open; after `xClose` the method table must not
        // be used again, so it is cleared regardless of the status.
        let rc = x_close.map_or(ffi::SQLITE_OK, |x_close| unsafe { x_close(self.as_ptr()) });
        unsafe { (*self.as_ptr()).pMethods = std::ptr::null() };
        VfsError::check(rc)
    }
}

impl Drop for RawFile {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(%err, "closing underlying file on drop failed");
        }
        // SAFETY: allocated by the matching `malloc` in `alloc` and freed
        // only here.
        unsafe { (self.free)(self.ptr.as_ptr().cast()) };
    }
}
