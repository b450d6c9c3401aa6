//! The `headervfs` descriptor and its `extern "C"` callbacks.
//!
//! Every callback is a thin trampoline: it rebuilds a [`HeaderVfs`] over the
//! real provider stored in `pAppData`, or recovers the Rust file stored in the
//! shim's `sqlite3_file`, and converts the result to a raw status.

use std::ffi::{c_void, CStr};
use std::mem::size_of;
use std::os::raw::{c_char, c_int};
use std::ptr::NonNull;
use std::sync::OnceLock;

use super::api::Api;
use super::{RawFile, SqliteProvider};
use crate::error::{ResultCode, VfsError, VfsResult};
use crate::ffi::{self, sqlite3_file, sqlite3_io_methods, sqlite3_vfs};
use crate::file::{HeaderFile, OffsettingFile, PassthroughFile};
use crate::flags::{AccessCheck, LockLevel, OpenFlags, ShmLockFlags, SyncFlags};
use crate::provider::{Provider, ProviderFile};
use crate::vfs::HeaderVfs;

/// NUL-terminated registration name.
const VFS_NAME_C: &CStr = c"headervfs";

/// Layout of the shim's `sqlite3_file`: the engine-visible base followed by
/// the Rust handle. `file` is `None` once closed.
#[repr(C)]
struct ShimFile<T> {
    base: sqlite3_file,
    file: Option<T>,
}

type OffsettingShim = ShimFile<OffsettingFile<RawFile>>;
type PassthroughShim = ShimFile<PassthroughFile<RawFile>>;

/// Method tables per version, 1 to 3. A shim file advertises the version of
/// the underlying file's own table.
type MethodTables = [sqlite3_io_methods; 3];

static OFFSETTING_METHODS: MethodTables = method_tables::<OffsettingFile<RawFile>>();
static PASSTHROUGH_METHODS: MethodTables = method_tables::<PassthroughFile<RawFile>>();

const fn method_tables<T: ProviderFile>() -> MethodTables {
    [io_methods::<T>(1), io_methods::<T>(2), io_methods::<T>(3)]
}

/// Builds a method table of `version` dispatching to `T`.
const fn io_methods<T: ProviderFile>(version: c_int) -> sqlite3_io_methods {
    let shm = version >= 2;
    let mmap = version >= 3;
    sqlite3_io_methods {
        iVersion: version,
        xClose: Some(x_close::<T>),
        xRead: Some(x_read::<T>),
        xWrite: Some(x_write::<T>),
        xTruncate: Some(x_truncate::<T>),
        xSync: Some(x_sync::<T>),
        xFileSize: Some(x_file_size::<T>),
        xLock: Some(x_lock::<T>),
        xUnlock: Some(x_unlock::<T>),
        xCheckReservedLock: Some(x_check_reserved_lock::<T>),
        xFileControl: Some(x_file_control::<T>),
        xSectorSize: Some(x_sector_size::<T>),
        xDeviceCharacteristics: Some(x_device_characteristics::<T>),
        xShmMap: if shm { Some(x_shm_map::<T>) } else { None },
        xShmLock: if shm { Some(x_shm_lock::<T>) } else { None },
        xShmBarrier: if shm { Some(x_shm_barrier::<T>) } else { None },
        xShmUnmap: if shm { Some(x_shm_unmap::<T>) } else { None },
        xFetch: if mmap { Some(x_fetch) } else { None },
        xUnfetch: if mmap { Some(x_unfetch) } else { None },
    }
}

/// The table matching `underlying`'s method version, capped at 3.
fn methods_for(tables: &'static MethodTables, underlying: &RawFile) -> &'static sqlite3_io_methods {
    match underlying.methods_version() {
        ..=1 => &tables[0],
        2 => &tables[1],
        _ => &tables[2],
    }
}

/// Raw status for a result.
fn status<T>(result: VfsResult<T>) -> c_int {
    match result {
        Ok(_) => ffi::SQLITE_OK,
        Err(err) => err.code().0,
    }
}

// ── Registration ────────────────────────────────────────────────────────

/// Pointer to the leaked descriptor; written once, never freed.
struct Descriptor(NonNull<sqlite3_vfs>);

// SAFETY: the descriptor is immutable after construction and only read by
// the engine, which serialises VFS registration itself.
unsafe impl Send for Descriptor {}
// SAFETY: see above.
unsafe impl Sync for Descriptor {}

static DESCRIPTOR: OnceLock<Descriptor> = OnceLock::new();

fn build_descriptor(real: SqliteProvider) -> VfsResult<Descriptor> {
    let sz_os_file = size_of::<OffsettingShim>().max(size_of::<PassthroughShim>());
    let mut vfs = *real.raw();
    vfs.szOsFile = c_int::try_from(sz_os_file).map_err(|_| VfsError::Registration)?;
    vfs.pNext = std::ptr::null_mut();
    vfs.zName = VFS_NAME_C.as_ptr();
    // The callbacks need the real VFS and the library it belongs to.
    vfs.pAppData = std::ptr::from_mut(Box::leak(Box::new(real))).cast();
    vfs.xOpen = Some(x_open);
    vfs.xDelete = Some(x_delete);
    vfs.xAccess = Some(x_access);
    vfs.xFullPathname = Some(x_full_pathname);
    vfs.xDlOpen = Some(x_dl_open);
    vfs.xDlError = Some(x_dl_error);
    vfs.xDlSym = Some(x_dl_sym);
    vfs.xDlClose = Some(x_dl_close);
    vfs.xRandomness = Some(x_randomness);
    vfs.xSleep = Some(x_sleep);
    vfs.xCurrentTime = Some(x_current_time);
    vfs.xGetLastError = Some(x_get_last_error);
    vfs.xCurrentTimeInt64 = Some(x_current_time_i64);
    // System-call hooks stay those of the real VFS.
    tracing::debug!(real = %real.name(), sz_os_file, "built headervfs descriptor");
    Ok(Descriptor(NonNull::from(Box::leak(Box::new(vfs)))))
}

/// Registers the `headervfs` VFS as a non-default VFS on top of the current
/// default VFS of the linked library.
///
/// The descriptor is built on the first call, from the default VFS at that
/// moment, and reused afterwards. Later calls re-register the same
/// descriptor: the captured VFS is never refreshed, even if the default VFS
/// has changed since.
///
/// Returns [`ResultCode::OK_LOAD_PERMANENTLY`] on success.
///
/// # Errors
///
/// Returns [`VfsError::Registration`] if no default VFS exists, or the
/// engine's status if registration fails.
pub fn register() -> VfsResult<ResultCode> {
    register_in(Api::LINKED)
}

/// Registers with the library behind `api`. Once built, the descriptor
/// stays registered with the library it was built from.
fn register_in(api: Api) -> VfsResult<ResultCode> {
    let descriptor = match DESCRIPTOR.get() {
        Some(descriptor) => descriptor,
        None => {
            let built = build_descriptor(SqliteProvider::default_in(api)?)?;
            DESCRIPTOR.get_or_init(|| built)
        }
    };
    let vfs = descriptor.0.as_ptr();
    // SAFETY: the descriptor and its provider are leaked and therefore valid
    // forever.
    VfsError::check(unsafe { (real_provider(vfs).api().vfs_register)(vfs, 0) })?;
    tracing::debug!(name = crate::VFS_NAME, "registered vfs");
    Ok(ResultCode::OK_LOAD_PERMANENTLY)
}

/// Extension entry point: registers the `headervfs` VFS.
///
/// A host loading this library with `load_extension` passes its routine
/// table in `api`; the VFS is then found in, registered with and allocated
/// from the host's library. A null `api` (static linking, or
/// `sqlite3_auto_extension` on the linked library) uses the linked library.
/// Returns `SQLITE_OK_LOAD_PERMANENTLY` on success.
///
/// # Safety
///
/// `api` must be null or the routine table of the calling library. The other
/// arguments are not used.
#[no_mangle]
pub unsafe extern "C" fn sqlite3_headervfs_init(
    _db: *mut c_void,
    _pz_err_msg: *mut *mut c_char,
    api: *const c_void,
) -> c_int {
    let api = if api.is_null() {
        Api::LINKED
    } else {
        // SAFETY: a non-null `api` is the host's routine table.
        match unsafe { Api::from_routines(api.cast()) } {
            Some(api) => api,
            None => return ffi::SQLITE_ERROR,
        }
    };
    match register_in(api) {
        Ok(code) => code.0,
        Err(err) => err.code().0,
    }
}

// ── Provider-level callbacks ────────────────────────────────────────────

/// The real provider stored in the descriptor's `pAppData`.
///
/// # Safety
///
/// `vfs` must be a descriptor built by `build_descriptor`.
unsafe fn real_provider(vfs: *mut sqlite3_vfs) -> SqliteProvider {
    // SAFETY: `pAppData` is the leaked provider set in `build_descriptor`.
    unsafe { *(*vfs).pAppData.cast::<SqliteProvider>() }
}

/// Borrows a NUL-terminated C string, `None` for null.
unsafe fn opt_cstr<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    // SAFETY: callers pass null or a valid C string.
    (!ptr.is_null()).then(|| unsafe { CStr::from_ptr(ptr) })
}

/// Writable view of a C output buffer.
unsafe fn out_buf<'a>(ptr: *mut c_char, len: c_int) -> &'a mut [u8] {
    match usize::try_from(len) {
        // SAFETY: the engine passes a buffer of at least `len` bytes.
        Ok(len) if !ptr.is_null() => unsafe { std::slice::from_raw_parts_mut(ptr.cast(), len) },
        _ => &mut [],
    }
}

/// Writes `value` through `out` unless `out` is null.
unsafe fn put<T>(out: *mut T, value: T) {
    if !out.is_null() {
        // SAFETY: non-null out-pointers from the engine are writable.
        unsafe { out.write(value) };
    }
}

/// Moves a classified handle into the engine-allocated `sqlite3_file`.
unsafe fn install<T>(file: *mut sqlite3_file, inner: T, methods: &'static sqlite3_io_methods) {
    let shim = ShimFile {
        base: sqlite3_file { pMethods: methods },
        file: Some(inner),
    };
    // SAFETY: the engine allocated `szOsFile` bytes, which covers every
    // `ShimFile` layout.
    unsafe { file.cast::<ShimFile<T>>().write(shim) };
}

unsafe extern "C" fn x_open(
    vfs: *mut sqlite3_vfs,
    z_name: *const c_char,
    file: *mut sqlite3_file,
    flags: c_int,
    out_flags: *mut c_int,
) -> c_int {
    // SAFETY: the engine hands us its file allocation and our descriptor.
    unsafe {
        // An engine that sees a method table after a failed open would close
        // a file that was never opened.
        (*file).pMethods = std::ptr::null();
        let real = real_provider(vfs);
        match HeaderVfs::new(&real).open(opt_cstr(z_name), OpenFlags(flags)) {
            Ok((handle, reported)) => {
                put(out_flags, reported.0);
                match handle {
                    HeaderFile::Offsetting(f) => {
                        let methods = methods_for(&OFFSETTING_METHODS, f.get_ref());
                        install(file, f, methods);
                    }
                    HeaderFile::Passthrough(f) => {
                        let methods = methods_for(&PASSTHROUGH_METHODS, f.get_ref());
                        install(file, f, methods);
                    }
                }
                ffi::SQLITE_OK
            }
            Err(err) => err.code().0,
        }
    }
}

unsafe extern "C" fn x_delete(vfs: *mut sqlite3_vfs, z_name: *const c_char, sync_dir: c_int) -> c_int {
    // SAFETY: engine-provided descriptor and file name.
    unsafe {
        let real = real_provider(vfs);
        status(HeaderVfs::new(&real).delete(CStr::from_ptr(z_name), sync_dir != 0))
    }
}

unsafe extern "C" fn x_access(
    vfs: *mut sqlite3_vfs,
    z_name: *const c_char,
    flags: c_int,
    res_out: *mut c_int,
) -> c_int {
    // SAFETY: engine-provided descriptor, file name and out-pointer.
    unsafe {
        let real = real_provider(vfs);
        match HeaderVfs::new(&real).access(CStr::from_ptr(z_name), AccessCheck(flags)) {
            Ok(found) => {
                put(res_out, c_int::from(found));
                ffi::SQLITE_OK
            }
            Err(err) => err.code().0,
        }
    }
}

unsafe extern "C" fn x_full_pathname(
    vfs: *mut sqlite3_vfs,
    z_name: *const c_char,
    n_out: c_int,
    z_out: *mut c_char,
) -> c_int {
    // SAFETY: engine-provided descriptor, file name and output buffer.
    unsafe {
        let real = real_provider(vfs);
        status(HeaderVfs::new(&real).full_pathname(CStr::from_ptr(z_name), out_buf(z_out, n_out)))
    }
}

unsafe extern "C" fn x_dl_open(vfs: *mut sqlite3_vfs, z_filename: *const c_char) -> *mut c_void {
    // SAFETY: engine-provided descriptor and path.
    unsafe {
        let real = real_provider(vfs);
        HeaderVfs::new(&real).dl_open(opt_cstr(z_filename))
    }
}

unsafe extern "C" fn x_dl_error(vfs: *mut sqlite3_vfs, n_byte: c_int, z_err_msg: *mut c_char) {
    // SAFETY: engine-provided descriptor and output buffer.
    unsafe {
        let real = real_provider(vfs);
        HeaderVfs::new(&real).dl_error(out_buf(z_err_msg, n_byte));
    }
}

unsafe extern "C" fn x_dl_sym(
    vfs: *mut sqlite3_vfs,
    handle: *mut c_void,
    z_symbol: *const c_char,
) -> Option<unsafe extern "C" fn()> {
    // SAFETY: engine-provided descriptor, library handle and symbol name.
    unsafe {
        let real = real_provider(vfs);
        HeaderVfs::new(&real).dl_sym(handle, CStr::from_ptr(z_symbol))
    }
}

unsafe extern "C" fn x_dl_close(vfs: *mut sqlite3_vfs, handle: *mut c_void) {
    // SAFETY: engine-provided descriptor and library handle.
    unsafe {
        let real = real_provider(vfs);
        HeaderVfs::new(&real).dl_close(handle);
    }
}

unsafe extern "C" fn x_randomness(vfs: *mut sqlite3_vfs, n_byte: c_int, z_out: *mut c_char) -> c_int {
    // SAFETY: engine-provided descriptor and output buffer.
    unsafe {
        let real = real_provider(vfs);
        HeaderVfs::new(&real).randomness(out_buf(z_out, n_byte))
    }
}

unsafe extern "C" fn x_sleep(vfs: *mut sqlite3_vfs, micros: c_int) -> c_int {
    // SAFETY: engine-provided descriptor.
    unsafe {
        let real = real_provider(vfs);
        HeaderVfs::new(&real).sleep(micros)
    }
}

unsafe extern "C" fn x_current_time(vfs: *mut sqlite3_vfs, out: *mut f64) -> c_int {
    // SAFETY: engine-provided descriptor and out-pointer.
    unsafe {
        let real = real_provider(vfs);
        match HeaderVfs::new(&real).current_time() {
            Ok(now) => {
                put(out, now);
                ffi::SQLITE_OK
            }
            Err(err) => err.code().0,
        }
    }
}

unsafe extern "C" fn x_get_last_error(vfs: *mut sqlite3_vfs, n_byte: c_int, z_out: *mut c_char) -> c_int {
    // SAFETY: engine-provided descriptor and output buffer.
    unsafe {
        let real = real_provider(vfs);
        HeaderVfs::new(&real).last_error(out_buf(z_out, n_byte))
    }
}

unsafe extern "C" fn x_current_time_i64(vfs: *mut sqlite3_vfs, out: *mut i64) -> c_int {
    // SAFETY: engine-provided descriptor and out-pointer.
    unsafe {
        let real = real_provider(vfs);
        match HeaderVfs::new(&real).current_time_i64() {
            Ok(now) => {
                put(out, now);
                ffi::SQLITE_OK
            }
            Err(err) => err.code().0,
        }
    }
}

// ── File callbacks ──────────────────────────────────────────────────────

/// The Rust handle inside an open shim file.
///
/// # Safety
///
/// `file` must have been installed by `x_open` with the same `T`.
unsafe fn handle<'a, T>(file: *mut sqlite3_file) -> VfsResult<&'a mut T> {
    // SAFETY: per the contract above.
    unsafe { (*file.cast::<ShimFile<T>>()).file.as_mut() }
        .ok_or(VfsError::Provider(ResultCode::MISUSE))
}

unsafe extern "C" fn x_close<T: ProviderFile>(file: *mut sqlite3_file) -> c_int {
    // SAFETY: installed by `x_open` with this `T`.
    let shim = unsafe { &mut *file.cast::<ShimFile<T>>() };
    shim.base.pMethods = std::ptr::null();
    // Dropping the handle releases the underlying allocation.
    shim.file.take().map_or(ffi::SQLITE_OK, |mut f| status(f.close()))
}

unsafe extern "C" fn x_read<T: ProviderFile>(
    file: *mut sqlite3_file,
    buf: *mut c_void,
    amount: c_int,
    offset: i64,
) -> c_int {
    // SAFETY: the engine passes a buffer of `amount` bytes.
    unsafe {
        let buf = out_buf(buf.cast(), amount);
        status(handle::<T>(file).and_then(|f| f.read(buf, offset)))
    }
}

unsafe extern "C" fn x_write<T: ProviderFile>(
    file: *mut sqlite3_file,
    buf: *const c_void,
    amount: c_int,
    offset: i64,
) -> c_int {
    let len = usize::try_from(amount).unwrap_or(0);
    // SAFETY: the engine passes a buffer of `amount` bytes.
    unsafe {
        let buf: &[u8] = if buf.is_null() {
            &[]
        } else {
            std::slice::from_raw_parts(buf.cast::<u8>(), len)
        };
        status(handle::<T>(file).and_then(|f| f.write(buf, offset)))
    }
}

unsafe extern "C" fn x_truncate<T: ProviderFile>(file: *mut sqlite3_file, size: i64) -> c_int {
    // SAFETY: installed by `x_open` with this `T`.
    status(unsafe { handle::<T>(file) }.and_then(|f| f.truncate(size)))
}

unsafe extern "C" fn x_sync<T: ProviderFile>(file: *mut sqlite3_file, flags: c_int) -> c_int {
    // SAFETY: installed by `x_open` with this `T`.
    status(unsafe { handle::<T>(file) }.and_then(|f| f.sync(SyncFlags(flags))))
}

unsafe extern "C" fn x_file_size<T: ProviderFile>(file: *mut sqlite3_file, size: *mut i64) -> c_int {
    // SAFETY: installed by `x_open` with this `T`; `size` is an out-pointer.
    unsafe {
        match handle::<T>(file).and_then(|f| f.file_size()) {
            Ok(n) => {
                put(size, n);
                ffi::SQLITE_OK
            }
            Err(err) => err.code().0,
        }
    }
}

unsafe extern "C" fn x_lock<T: ProviderFile>(file: *mut sqlite3_file, level: c_int) -> c_int {
    // SAFETY: installed by `x_open` with this `T`.
    status(unsafe { handle::<T>(file) }.and_then(|f| f.lock(LockLevel(level))))
}

unsafe extern "C" fn x_unlock<T: ProviderFile>(file: *mut sqlite3_file, level: c_int) -> c_int {
    // SAFETY: installed by `x_open` with this `T`.
    status(unsafe { handle::<T>(file) }.and_then(|f| f.unlock(LockLevel(level))))
}

unsafe extern "C" fn x_check_reserved_lock<T: ProviderFile>(
    file: *mut sqlite3_file,
    res_out: *mut c_int,
) -> c_int {
    // SAFETY: installed by `x_open` with this `T`; `res_out` is an out-pointer.
    unsafe {
        match handle::<T>(file).and_then(|f| f.check_reserved_lock()) {
            Ok(reserved) => {
                put(res_out, c_int::from(reserved));
                ffi::SQLITE_OK
            }
            Err(err) => err.code().0,
        }
    }
}

unsafe extern "C" fn x_file_control<T: ProviderFile>(
    file: *mut sqlite3_file,
    op: c_int,
    arg: *mut c_void,
) -> c_int {
    // SAFETY: installed by `x_open` with this `T`.
    status(unsafe { handle::<T>(file) }.and_then(|f| f.file_control(op, arg)))
}

unsafe extern "C" fn x_sector_size<T: ProviderFile>(file: *mut sqlite3_file) -> c_int {
    // SAFETY: installed by `x_open` with this `T`.
    unsafe { handle::<T>(file) }.map_or(0, |f| f.sector_size())
}

unsafe extern "C" fn x_device_characteristics<T: ProviderFile>(file: *mut sqlite3_file) -> c_int {
    // SAFETY: installed by `x_open` with this `T`.
    unsafe { handle::<T>(file) }.map_or(0, |f| f.device_characteristics())
}

unsafe extern "C" fn x_shm_map<T: ProviderFile>(
    file: *mut sqlite3_file,
    region: c_int,
    size: c_int,
    extend: c_int,
    pp: *mut *mut c_void,
) -> c_int {
    let mut mapped = std::ptr::null_mut();
    // SAFETY: installed by `x_open` with this `T`.
    let result = unsafe { handle::<T>(file) }
        .and_then(|f| f.shm_map(region, size, extend != 0, &mut mapped));
    // The mapping is reported even alongside a non-OK status.
    // SAFETY: `pp` is an engine out-pointer.
    unsafe { put(pp, mapped) };
    status(result)
}

unsafe extern "C" fn x_shm_lock<T: ProviderFile>(
    file: *mut sqlite3_file,
    offset: c_int,
    n: c_int,
    flags: c_int,
) -> c_int {
    // SAFETY: installed by `x_open` with this `T`.
    status(unsafe { handle::<T>(file) }.and_then(|f| f.shm_lock(offset, n, ShmLockFlags(flags))))
}

unsafe extern "C" fn x_shm_barrier<T: ProviderFile>(file: *mut sqlite3_file) {
    // SAFETY: installed by `x_open` with this `T`.
    if let Ok(f) = unsafe { handle::<T>(file) } {
        f.shm_barrier();
    }
}

unsafe extern "C" fn x_shm_unmap<T: ProviderFile>(file: *mut sqlite3_file, delete: c_int) -> c_int {
    // SAFETY: installed by `x_open` with this `T`.
    status(unsafe { handle::<T>(file) }.and_then(|f| f.shm_unmap(delete != 0)))
}

/// Declines every memory-mapping request so the engine falls back to reads.
unsafe extern "C" fn x_fetch(
    _file: *mut sqlite3_file,
    _offset: i64,
    _amount: c_int,
    pp: *mut *mut c_void,
) -> c_int {
    // SAFETY: `pp` is an engine out-pointer.
    unsafe { put(pp, std::ptr::null_mut()) };
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_unfetch(_file: *mut sqlite3_file, _offset: i64, _page: *mut c_void) -> c_int {
    ffi::SQLITE_OK
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::sqlite::test_vfs::{
        allocations, counting_api, db_filename, scripted_provider, Script,
    };

    const MAIN_CREATE: OpenFlags =
        OpenFlags(OpenFlags::MAIN_DB.0 | OpenFlags::READWRITE.0 | OpenFlags::CREATE.0);
    const JOURNAL_CREATE: OpenFlags =
        OpenFlags(OpenFlags::MAIN_JOURNAL.0 | OpenFlags::READWRITE.0 | OpenFlags::CREATE.0);

    /// Opens `name` through the descriptor's `xOpen` into an 8-byte aligned
    /// block of `szOsFile` bytes.
    fn open_through(descriptor: &Descriptor, name: &CStr, flags: OpenFlags) -> (Vec<u64>, c_int) {
        let vfs = descriptor.0.as_ptr();
        // SAFETY: the descriptor is leaked.
        let size = usize::try_from(unsafe { (*vfs).szOsFile }).expect("size");
        let mut block = vec![0u64; size.div_ceil(8)];
        // SAFETY: `block` covers `szOsFile` bytes.
        let rc = unsafe {
            x_open(vfs, name.as_ptr(), block.as_mut_ptr().cast(), flags.0, std::ptr::null_mut())
        };
        (block, rc)
    }

    /// Closes a file opened by `open_through` and returns the method table
    /// version it advertised.
    fn close_through(block: &mut [u64]) -> (c_int, bool, bool) {
        let file: *mut sqlite3_file = block.as_mut_ptr().cast();
        // SAFETY: `x_open` installed a static method table.
        let methods = unsafe { &*(*file).pMethods };
        let shape = (methods.iVersion, methods.xShmMap.is_some(), methods.xFetch.is_some());
        let x_close = methods.xClose.expect("close method");
        // SAFETY: the file is open.
        assert_eq!(unsafe { x_close(file) }, ffi::SQLITE_OK);
        // SAFETY: still the same block.
        assert!(unsafe { (*file).pMethods.is_null() });
        shape
    }

    #[test]
    fn test_version_one_files_get_version_one_tables() {
        let (real, script) = scripted_provider(Script::default(), counting_api());
        let descriptor = build_descriptor(real).expect("descriptor");

        for flags in [MAIN_CREATE, JOURNAL_CREATE] {
            let (mut block, rc) = open_through(&descriptor, c"scripted.db", flags);
            assert_eq!(rc, ffi::SQLITE_OK);
            assert_eq!(close_through(&mut block), (1, false, false));
        }
        assert_eq!(script.closes.load(Ordering::SeqCst), 2);
        assert_eq!(allocations(), (2, 2));
    }

    #[test]
    fn test_default_vfs_files_get_version_three_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let name = db_filename(&dir.path().join("v3.db"));
        let path = CStr::from_bytes_until_nul(&name[4..]).expect("terminated");
        let real = SqliteProvider::default_in(counting_api()).expect("default vfs");
        let descriptor = build_descriptor(real).expect("descriptor");

        let (mut block, rc) = open_through(&descriptor, path, MAIN_CREATE);
        assert_eq!(rc, ffi::SQLITE_OK);
        assert_eq!(close_through(&mut block), (3, true, true));
        assert_eq!(allocations(), (1, 1));
    }

    #[test]
    fn test_failed_open_leaves_no_method_table() {
        let script = Script {
            fail_open: Some(ResultCode::CANTOPEN),
            ..Script::default()
        };
        let (real, _) = scripted_provider(script, counting_api());
        let descriptor = build_descriptor(real).expect("descriptor");

        let (block, rc) = open_through(&descriptor, c"denied.db", MAIN_CREATE);
        assert_eq!(rc, ResultCode::CANTOPEN.0);
        let file: *const sqlite3_file = block.as_ptr().cast();
        // SAFETY: `block` is a live allocation.
        assert!(unsafe { (*file).pMethods.is_null() });
        assert_eq!(allocations(), (1, 1));
    }

    #[test]
    fn test_entry_point_rejects_incomplete_routine_table() {
        let table = vec![0usize; 150];
        // SAFETY: a routine table with every slot empty.
        let rc = unsafe {
            sqlite3_headervfs_init(
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                table.as_ptr().cast(),
            )
        };
        assert_eq!(rc, ffi::SQLITE_ERROR);
    }
}
