//! Test doubles for the `SQLite` adapter: an allocator that counts per test
//! thread, and a scripted version 1 `sqlite3_vfs`.

use std::cell::Cell;
use std::ffi::c_void;
use std::mem::size_of;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::api::Api;
use super::SqliteProvider;
use crate::error::ResultCode;
use crate::ffi::{self, sqlite3_file, sqlite3_io_methods, sqlite3_vfs};

thread_local! {
    static MALLOCS: Cell<usize> = const { Cell::new(0) };
    static FREES: Cell<usize> = const { Cell::new(0) };
}

pub unsafe extern "C" fn counting_malloc(n: c_int) -> *mut c_void {
    MALLOCS.with(|c| c.set(c.get() + 1));
    // SAFETY: forwarded unchanged.
    unsafe { ffi::sqlite3_malloc(n) }
}

pub unsafe extern "C" fn counting_free(ptr: *mut c_void) {
    if !ptr.is_null() {
        FREES.with(|c| c.set(c.get() + 1));
    }
    // SAFETY: forwarded unchanged.
    unsafe { ffi::sqlite3_free(ptr) };
}

/// `(allocations, frees)` made through [`counting_api`] on this thread.
pub fn allocations() -> (usize, usize) {
    (MALLOCS.with(Cell::get), FREES.with(Cell::get))
}

/// The linked library with counted allocations.
pub fn counting_api() -> Api {
    Api {
        malloc: counting_malloc,
        free: counting_free,
        ..Api::LINKED
    }
}

/// `path` laid out like an engine-built database filename: four NUL bytes
/// before it and a double NUL after, so URI parameter lookups by the OS VFS
/// stay in bounds. The name starts at index 4.
pub fn db_filename(path: &Path) -> Vec<u8> {
    let mut buf = vec![0u8; 4];
    buf.extend_from_slice(path.to_string_lossy().as_bytes());
    buf.extend_from_slice(&[0, 0, 0]);
    buf
}

/// Behaviour and observations of one scripted VFS.
#[derive(Debug, Default)]
pub struct Script {
    pub fail_open: Option<ResultCode>,
    pub fail_file_size: Option<ResultCode>,
    pub fail_close: Option<ResultCode>,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

#[repr(C)]
struct ScriptedFile {
    base: sqlite3_file,
    script: *const Script,
}

static SCRIPTED_METHODS: sqlite3_io_methods = sqlite3_io_methods {
    iVersion: 1,
    xClose: Some(scripted_close),
    xRead: None,
    xWrite: None,
    xTruncate: Some(scripted_truncate),
    xSync: None,
    xFileSize: Some(scripted_file_size),
    xLock: None,
    xUnlock: None,
    xCheckReservedLock: None,
    xFileControl: None,
    xSectorSize: None,
    xDeviceCharacteristics: None,
    xShmMap: None,
    xShmLock: None,
    xShmBarrier: None,
    xShmUnmap: None,
    xFetch: None,
    xUnfetch: None,
};

unsafe fn script_of<'a>(file: *mut sqlite3_file) -> &'a Script {
    // SAFETY: every file with these methods was written by `scripted_open`.
    unsafe { &*(*file.cast::<ScriptedFile>()).script }
}

fn rc(code: Option<ResultCode>) -> c_int {
    code.map_or(ffi::SQLITE_OK, |code| code.0)
}

unsafe extern "C" fn scripted_open(
    vfs: *mut sqlite3_vfs,
    _name: *const c_char,
    file: *mut sqlite3_file,
    flags: c_int,
    out_flags: *mut c_int,
) -> c_int {
    // SAFETY: `pAppData` is the leaked script; `file` has `szOsFile` bytes.
    unsafe {
        let script = (*vfs).pAppData.cast::<Script>().cast_const();
        if let Some(code) = (*script).fail_open {
            return code.0;
        }
        (*script).opens.fetch_add(1, Ordering::SeqCst);
        file.cast::<ScriptedFile>().write(ScriptedFile {
            base: sqlite3_file {
                pMethods: &SCRIPTED_METHODS,
            },
            script,
        });
        if !out_flags.is_null() {
            *out_flags = flags;
        }
    }
    ffi::SQLITE_OK
}

unsafe extern "C" fn scripted_close(file: *mut sqlite3_file) -> c_int {
    // SAFETY: opened by `scripted_open`.
    let script = unsafe { script_of(file) };
    script.closes.fetch_add(1, Ordering::SeqCst);
    rc(script.fail_close)
}

unsafe extern "C" fn scripted_truncate(_file: *mut sqlite3_file, _size: i64) -> c_int {
    ffi::SQLITE_OK
}

unsafe extern "C" fn scripted_file_size(file: *mut sqlite3_file, size: *mut i64) -> c_int {
    // SAFETY: opened by `scripted_open`; `size` is an out-pointer.
    unsafe {
        *size = 0;
        rc(script_of(file).fail_file_size)
    }
}

/// Leaks `script` and a version 1 VFS driven by it, returned as a provider
/// using `api`.
pub fn scripted_provider(script: Script, api: Api) -> (SqliteProvider, &'static Script) {
    let script: &'static Script = Box::leak(Box::new(script));
    let vfs = sqlite3_vfs {
        iVersion: 1,
        szOsFile: c_int::try_from(size_of::<ScriptedFile>()).expect("small struct"),
        mxPathname: 512,
        pNext: std::ptr::null_mut(),
        zName: c"scripted".as_ptr(),
        pAppData: std::ptr::from_ref(script).cast_mut().cast(),
        xOpen: Some(scripted_open),
        xDelete: None,
        xAccess: None,
        xFullPathname: None,
        xDlOpen: None,
        xDlError: None,
        xDlSym: None,
        xDlClose: None,
        xRandomness: None,
        xSleep: None,
        xCurrentTime: None,
        xGetLastError: None,
        xCurrentTimeInt64: None,
        xSetSystemCall: None,
        xGetSystemCall: None,
        xNextSystemCall: None,
    };
    let vfs = NonNull::from(Box::leak(Box::new(vfs)));
    // SAFETY: leaked, so valid for the process lifetime.
    (unsafe { SqliteProvider::from_raw(vfs, api) }, script)
}
