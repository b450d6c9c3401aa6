//! `SQLite` side of the shim.
//!
//! [`SqliteProvider`] adapts any registered `sqlite3_vfs` to the
//! [`Provider`] contract. [`register`] builds the `headervfs` descriptor on
//! top of the default VFS and installs it as a non-default VFS.

mod api;
mod raw_file;
mod shim;
#[cfg(test)]
mod test_vfs;

use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int};
use std::ptr::NonNull;

pub use raw_file::RawFile;
pub use shim::{register, sqlite3_headervfs_init};

use self::api::Api;
use crate::error::{ResultCode, VfsError, VfsResult};
use crate::ffi::{self, sqlite3_vfs};
use crate::flags::{AccessCheck, OpenFlags};
use crate::provider::Provider;

/// Milliseconds per day, for deriving `xCurrentTimeInt64` from
/// `xCurrentTime` on version 1 VFSes.
const MS_PER_DAY: f64 = 86_400_000.0;

/// A registered `sqlite3_vfs` used as a [`Provider`].
///
/// VFS objects are never freed once registered, so the handle is freely
/// copyable. File allocations go through the allocator of the library the
/// VFS was found in.
#[derive(Debug, Clone, Copy)]
pub struct SqliteProvider {
    vfs: NonNull<sqlite3_vfs>,
    api: Api,
}

impl SqliteProvider {
    /// The process default VFS of the linked library.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::Registration`] if no default VFS is registered.
    pub fn default_vfs() -> VfsResult<Self> {
        Self::default_in(Api::LINKED)
    }

    /// The default VFS of the library behind `api`.
    pub(crate) fn default_in(api: Api) -> VfsResult<Self> {
        // SAFETY: a null name asks for the default VFS.
        let vfs = unsafe { (api.vfs_find)(std::ptr::null()) };
        NonNull::new(vfs)
            .map(|vfs| Self { vfs, api })
            .ok_or(VfsError::Registration)
    }

    /// Looks up a VFS registered with the linked library by name.
    #[must_use]
    pub fn find(name: &CStr) -> Option<Self> {
        // SAFETY: `name` is a valid C string.
        let vfs = unsafe { ffi::sqlite3_vfs_find(name.as_ptr()) };
        NonNull::new(vfs).map(|vfs| Self {
            vfs,
            api: Api::LINKED,
        })
    }

    /// Wraps a raw VFS pointer belonging to the library behind `api`.
    ///
    /// # Safety
    ///
    /// `vfs` must point at a VFS that stays valid for the process lifetime.
    #[cfg(test)]
    pub(crate) const unsafe fn from_raw(vfs: NonNull<sqlite3_vfs>, api: Api) -> Self {
        Self { vfs, api }
    }

    pub(crate) const fn api(&self) -> Api {
        self.api
    }

    /// The VFS name as registered.
    #[must_use]
    pub fn name(&self) -> String {
        let z_name = self.raw().zName;
        if z_name.is_null() {
            return String::new();
        }
        // SAFETY: non-null `zName` is a NUL-terminated string owned by the VFS.
        unsafe { CStr::from_ptr(z_name) }
            .to_string_lossy()
            .into_owned()
    }

    /// Maximum pathname length the VFS accepts.
    #[must_use]
    pub fn max_pathname(&self) -> usize {
        usize::try_from(self.raw().mxPathname).unwrap_or(0)
    }

    fn raw(&self) -> &sqlite3_vfs {
        // SAFETY: registered VFSes live for the process lifetime.
        unsafe { self.vfs.as_ref() }
    }

    const fn as_ptr(self) -> *mut sqlite3_vfs {
        self.vfs.as_ptr()
    }
}

fn buf_len(out: &[u8]) -> c_int {
    c_int::try_from(out.len()).unwrap_or(c_int::MAX)
}

fn missing() -> VfsError {
    VfsError::Provider(ResultCode::MISUSE)
}

// Two providers are the same when they wrap the same VFS.
impl PartialEq for SqliteProvider {
    fn eq(&self, other: &Self) -> bool {
        self.vfs == other.vfs
    }
}

impl Eq for SqliteProvider {}

impl Provider for SqliteProvider {
    type File = RawFile;

    fn open(&self, name: Option<&CStr>, flags: OpenFlags) -> VfsResult<(RawFile, OpenFlags)> {
        let x_open = self.raw().xOpen.ok_or_else(missing)?;
        let file = RawFile::alloc(self.api, self.raw().szOsFile)?;
        let mut out_flags: c_int = 0;
        // The name pointer is forwarded as-is: the engine reads URI
        // parameters stored after its terminator.
        let z_name = name.map_or(std::ptr::null(), CStr::as_ptr);
        // SAFETY: `file` holds `szOsFile` zeroed bytes; `z_name` is null or
        // a valid C string.
        let rc = unsafe { x_open(self.as_ptr(), z_name, file.as_ptr(), flags.0, &mut out_flags) };
        // On failure `file` is dropped: closed if a method table was
        // installed, then freed.
        VfsError::check(rc)?;
        Ok((file, OpenFlags(out_flags)))
    }

    fn delete(&self, name: &CStr, sync_dir: bool) -> VfsResult<()> {
        let x_delete = self.raw().xDelete.ok_or_else(missing)?;
        // SAFETY: `name` is a valid C string.
        VfsError::check(unsafe { x_delete(self.as_ptr(), name.as_ptr(), c_int::from(sync_dir)) })
    }

    fn access(&self, name: &CStr, check: AccessCheck) -> VfsResult<bool> {
        let x_access = self.raw().xAccess.ok_or_else(missing)?;
        let mut result: c_int = 0;
        // SAFETY: `name` is a valid C string and `result` a valid out-pointer.
        VfsError::check(unsafe { x_access(self.as_ptr(), name.as_ptr(), check.0, &mut result) })?;
        Ok(result != 0)
    }

    fn full_pathname(&self, name: &CStr, out: &mut [u8]) -> VfsResult<()> {
        let x_full_pathname = self.raw().xFullPathname.ok_or_else(missing)?;
        // SAFETY: `out` is writable for the length passed.
        VfsError::check(unsafe {
            x_full_pathname(
                self.as_ptr(),
                name.as_ptr(),
                buf_len(out),
                out.as_mut_ptr().cast::<c_char>(),
            )
        })
    }

    fn dl_open(&self, path: Option<&CStr>) -> *mut c_void {
        self.raw().xDlOpen.map_or(std::ptr::null_mut(), |x_dl_open| {
            // SAFETY: `path` is null or a valid C string.
            unsafe { x_dl_open(self.as_ptr(), path.map_or(std::ptr::null(), CStr::as_ptr)) }
        })
    }

    fn dl_error(&self, out: &mut [u8]) {
        if let Some(x_dl_error) = self.raw().xDlError {
            // SAFETY: `out` is writable for the length passed.
            unsafe { x_dl_error(self.as_ptr(), buf_len(out), out.as_mut_ptr().cast()) };
        }
    }

    fn dl_sym(&self, handle: *mut c_void, symbol: &CStr) -> Option<unsafe extern "C" fn()> {
        let x_dl_sym = self.raw().xDlSym?;
        // SAFETY: `handle` came from `dl_open`; `symbol` is a valid C string.
        unsafe { x_dl_sym(self.as_ptr(), handle, symbol.as_ptr()) }
    }

    fn dl_close(&self, handle: *mut c_void) {
        if let Some(x_dl_close) = self.raw().xDlClose {
            // SAFETY: `handle` came from `dl_open`.
            unsafe { x_dl_close(self.as_ptr(), handle) };
        }
    }

    fn randomness(&self, out: &mut [u8]) -> i32 {
        self.raw().xRandomness.map_or(0, |x_randomness| {
            // SAFETY: `out` is writable for the length passed.
            unsafe { x_randomness(self.as_ptr(), buf_len(out), out.as_mut_ptr().cast()) }
        })
    }

    fn sleep(&self, micros: i32) -> i32 {
        self.raw().xSleep.map_or(0, |x_sleep| {
            // SAFETY: plain value call.
            unsafe { x_sleep(self.as_ptr(), micros) }
        })
    }

    fn current_time(&self) -> VfsResult<f64> {
        let x_current_time = self.raw().xCurrentTime.ok_or_else(missing)?;
        let mut now = 0.0f64;
        // SAFETY: `now` is a valid out-pointer.
        VfsError::check(unsafe { x_current_time(self.as_ptr(), &mut now) })?;
        Ok(now)
    }

    fn current_time_i64(&self) -> VfsResult<i64> {
        let x_current_time_i64 = Some(self.raw())
            .filter(|vfs| vfs.iVersion >= 2)
            .and_then(|vfs| vfs.xCurrentTimeInt64);
        let Some(x_current_time_i64) = x_current_time_i64 else {
            #[allow(clippy::cast_possible_truncation)]
            return self.current_time().map(|days| (days * MS_PER_DAY) as i64);
        };
        let mut now = 0i64;
        // SAFETY: `now` is a valid out-pointer.
        VfsError::check(unsafe { x_current_time_i64(self.as_ptr(), &mut now) })?;
        Ok(now)
    }

    fn last_error(&self, out: &mut [u8]) -> i32 {
        self.raw().xGetLastError.map_or(0, |x_get_last_error| {
            // SAFETY: `out` is writable for the length passed.
            unsafe { x_get_last_error(self.as_ptr(), buf_len(out), out.as_mut_ptr().cast()) }
        })
    }
}
