//! In-process [`Provider`] backed by byte vectors.
//!
//! Used to exercise the translation layer without touching disk, and as a
//! reference for the provider contract: short reads zero-fill, delete-on-close
//! and anonymous temp files behave like the OS provider. Failure injection
//! (`fail_open`, `fail_truncate`, `fail_file_size`) and
//! [`open_handles`](MemoryProvider::open_handles) make error paths and leaks
//! observable.

use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};
use std::sync::atomic::{fence, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{ResultCode, VfsError, VfsResult};
use crate::flags::{AccessCheck, LockLevel, OpenFlags, ShmLockFlags, SyncFlags};
use crate::provider::{Provider, ProviderFile};

/// Julian day number of the Unix epoch.
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;
/// Milliseconds between the Julian epoch and the Unix epoch.
const UNIX_EPOCH_JULIAN_MS: i64 = 210_866_760_000_000;
const SECTOR_SIZE: i32 = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeKey {
    Named(CString),
    Anonymous(u64),
}

#[derive(Debug, Default)]
struct Node {
    data: Vec<u8>,
    locks: HashMap<u64, LockLevel>,
    shm: Vec<Box<[u8]>>,
}

#[derive(Debug, Default)]
struct Failures {
    open: HashMap<CString, ResultCode>,
    truncate: HashMap<CString, ResultCode>,
    file_size: HashMap<CString, ResultCode>,
}

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<NodeKey, Node>,
    next_handle: u64,
    open_handles: usize,
    failures: Failures,
}

impl State {
    fn node(&mut self, key: &NodeKey) -> VfsResult<&mut Node> {
        self.nodes
            .get_mut(key)
            .ok_or(VfsError::Provider(ResultCode::IOERR))
    }

    fn injected(map: &HashMap<CString, ResultCode>, key: &NodeKey) -> VfsResult<()> {
        match key {
            NodeKey::Named(name) => map.get(name).map_or(Ok(()), |code| Err((*code).into())),
            NodeKey::Anonymous(_) => Ok(()),
        }
    }
}

/// A [`Provider`] whose files live in memory.
///
/// Cloning shares the same file namespace.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    state: Arc<Mutex<State>>,
}

impl MemoryProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> VfsResult<MutexGuard<'_, State>> {
        lock(&self.state)
    }

    /// Raw contents of `name`, bypassing any translation layer.
    #[must_use]
    pub fn contents(&self, name: &CStr) -> Option<Vec<u8>> {
        let state = self.lock_state().ok()?;
        state
            .nodes
            .get(&NodeKey::Named(name.to_owned()))
            .map(|node| node.data.clone())
    }

    /// Replaces the raw contents of `name`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider state is poisoned.
    pub fn set_contents(&self, name: &CStr, data: &[u8]) -> VfsResult<()> {
        let mut state = self.lock_state()?;
        state
            .nodes
            .entry(NodeKey::Named(name.to_owned()))
            .or_default()
            .data = data.to_vec();
        Ok(())
    }

    /// Number of files currently open.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.lock_state().map_or(0, |state| state.open_handles)
    }

    /// Makes every open of `name` fail with `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider state is poisoned.
    pub fn fail_open(&self, name: &CStr, code: ResultCode) -> VfsResult<()> {
        self.lock_state()?.failures.open.insert(name.to_owned(), code);
        Ok(())
    }

    /// Makes every truncate of `name` fail with `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider state is poisoned.
    pub fn fail_truncate(&self, name: &CStr, code: ResultCode) -> VfsResult<()> {
        self.lock_state()?
            .failures
            .truncate
            .insert(name.to_owned(), code);
        Ok(())
    }

    /// Makes every size query on `name` fail with `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider state is poisoned.
    pub fn fail_file_size(&self, name: &CStr, code: ResultCode) -> VfsResult<()> {
        self.lock_state()?
            .failures
            .file_size
            .insert(name.to_owned(), code);
        Ok(())
    }

    /// Removes every injected failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider state is poisoned.
    pub fn clear_failures(&self) -> VfsResult<()> {
        self.lock_state()?.failures = Failures::default();
        Ok(())
    }
}

impl Provider for MemoryProvider {
    type File = MemoryFile;

    fn open(&self, name: Option<&CStr>, flags: OpenFlags) -> VfsResult<(MemoryFile, OpenFlags)> {
        let mut state = self.lock_state()?;
        let handle = state.next_handle;
        state.next_handle += 1;

        let key = match name {
            Some(name) => {
                if let Some(code) = state.failures.open.get(name) {
                    return Err((*code).into());
                }
                let key = NodeKey::Named(name.to_owned());
                let exists = state.nodes.contains_key(&key);
                let create = flags.contains(OpenFlags::CREATE);
                if (exists && create && flags.contains(OpenFlags::EXCLUSIVE))
                    || (!exists && !create)
                {
                    return Err(ResultCode::CANTOPEN.into());
                }
                key
            }
            None => NodeKey::Anonymous(handle),
        };
        state.nodes.entry(key.clone()).or_default();
        state.open_handles += 1;

        let file = MemoryFile {
            state: Arc::clone(&self.state),
            key,
            handle,
            flags,
            open: true,
        };
        Ok((file, flags))
    }

    fn delete(&self, name: &CStr, _sync_dir: bool) -> VfsResult<()> {
        let mut state = self.lock_state()?;
        state
            .nodes
            .remove(&NodeKey::Named(name.to_owned()))
            .map(|_| ())
            .ok_or(VfsError::Provider(ResultCode::IOERR_DELETE_NOENT))
    }

    fn access(&self, name: &CStr, _check: AccessCheck) -> VfsResult<bool> {
        let state = self.lock_state()?;
        Ok(state.nodes.contains_key(&NodeKey::Named(name.to_owned())))
    }

    fn full_pathname(&self, name: &CStr, out: &mut [u8]) -> VfsResult<()> {
        let bytes = name.to_bytes();
        let prefix: &[u8] = if bytes.starts_with(b"/") { b"" } else { b"/" };
        let len = prefix.len() + bytes.len();
        if len + 1 > out.len() {
            return Err(ResultCode::CANTOPEN.into());
        }
        out[..prefix.len()].copy_from_slice(prefix);
        out[prefix.len()..len].copy_from_slice(bytes);
        out[len] = 0;
        Ok(())
    }

    fn dl_open(&self, _path: Option<&CStr>) -> *mut c_void {
        std::ptr::null_mut()
    }

    fn dl_error(&self, out: &mut [u8]) {
        write_message(out, b"dynamic loading is not supported by the memory provider");
    }

    fn dl_sym(&self, _handle: *mut c_void, _symbol: &CStr) -> Option<unsafe extern "C" fn()> {
        None
    }

    fn dl_close(&self, _handle: *mut c_void) {}

    fn randomness(&self, out: &mut [u8]) -> i32 {
        if getrandom::fill(out).is_err() {
            out.fill(0);
        }
        i32::try_from(out.len()).unwrap_or(i32::MAX)
    }

    fn sleep(&self, micros: i32) -> i32 {
        let micros = micros.max(0);
        std::thread::sleep(Duration::from_micros(micros.unsigned_abs().into()));
        micros
    }

    fn current_time(&self) -> VfsResult<f64> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| VfsError::Provider(ResultCode::ERROR))?;
        Ok(UNIX_EPOCH_JULIAN_DAY + since_epoch.as_secs_f64() / 86_400.0)
    }

    fn current_time_i64(&self) -> VfsResult<i64> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| VfsError::Provider(ResultCode::ERROR))?;
        let millis = i64::try_from(since_epoch.as_millis())
            .map_err(|_| VfsError::Provider(ResultCode::ERROR))?;
        Ok(UNIX_EPOCH_JULIAN_MS + millis)
    }

    fn last_error(&self, out: &mut [u8]) -> i32 {
        write_message(out, b"");
        0
    }
}

/// A file opened by [`MemoryProvider`].
#[derive(Debug)]
pub struct MemoryFile {
    state: Arc<Mutex<State>>,
    key: NodeKey,
    handle: u64,
    flags: OpenFlags,
    open: bool,
}

impl MemoryFile {
    fn with_node<T>(&self, f: impl FnOnce(&mut Node) -> VfsResult<T>) -> VfsResult<T> {
        if !self.open {
            return Err(ResultCode::MISUSE.into());
        }
        let mut state = lock(&self.state)?;
        f(state.node(&self.key)?)
    }

    fn injected(&self, pick: impl FnOnce(&Failures) -> &HashMap<CString, ResultCode>) -> VfsResult<()> {
        let state = lock(&self.state)?;
        State::injected(pick(&state.failures), &self.key)
    }
}

impl ProviderFile for MemoryFile {
    fn read(&mut self, buf: &mut [u8], offset: i64) -> VfsResult<()> {
        let offset = usize::try_from(offset).map_err(|_| VfsError::Provider(ResultCode::IOERR))?;
        self.with_node(|node| {
            let available = node.data.len().saturating_sub(offset).min(buf.len());
            if available > 0 {
                buf[..available].copy_from_slice(&node.data[offset..offset + available]);
            }
            if available < buf.len() {
                buf[available..].fill(0);
                return Err(ResultCode::IOERR_SHORT_READ.into());
            }
            Ok(())
        })
    }

    fn write(&mut self, buf: &[u8], offset: i64) -> VfsResult<()> {
        if self.flags.contains(OpenFlags::READONLY) {
            return Err(ResultCode::READONLY.into());
        }
        let offset = usize::try_from(offset).map_err(|_| VfsError::Provider(ResultCode::IOERR))?;
        self.with_node(|node| {
            let end = offset + buf.len();
            if node.data.len() < end {
                node.data.resize(end, 0);
            }
            node.data[offset..end].copy_from_slice(buf);
            Ok(())
        })
    }

    fn truncate(&mut self, size: i64) -> VfsResult<()> {
        self.injected(|f| &f.truncate)?;
        let size = usize::try_from(size).map_err(|_| VfsError::Provider(ResultCode::IOERR_TRUNCATE))?;
        self.with_node(|node| {
            node.data.resize(size, 0);
            Ok(())
        })
    }

    fn sync(&mut self, _flags: SyncFlags) -> VfsResult<()> {
        self.with_node(|_| Ok(()))
    }

    fn file_size(&mut self) -> VfsResult<i64> {
        self.injected(|f| &f.file_size)?;
        self.with_node(|node| {
            i64::try_from(node.data.len()).map_err(|_| VfsError::Provider(ResultCode::IOERR_FSTAT))
        })
    }

    fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
        let handle = self.handle;
        self.with_node(|node| {
            node.locks.insert(handle, level);
            Ok(())
        })
    }

    fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
        self.lock(level)
    }

    fn check_reserved_lock(&mut self) -> VfsResult<bool> {
        self.with_node(|node| Ok(node.locks.values().any(|l| *l >= LockLevel::RESERVED)))
    }

    fn file_control(&mut self, _op: i32, _arg: *mut c_void) -> VfsResult<()> {
        Err(ResultCode::NOTFOUND.into())
    }

    fn sector_size(&mut self) -> i32 {
        SECTOR_SIZE
    }

    fn device_characteristics(&mut self) -> i32 {
        0
    }

    fn shm_map(
        &mut self,
        region: i32,
        size: i32,
        extend: bool,
        out: &mut *mut c_void,
    ) -> VfsResult<()> {
        let region = usize::try_from(region).map_err(|_| VfsError::Provider(ResultCode::IOERR))?;
        let size = usize::try_from(size).map_err(|_| VfsError::Provider(ResultCode::IOERR))?;
        self.with_node(|node| {
            if region >= node.shm.len() {
                if !extend {
                    *out = std::ptr::null_mut();
                    return Ok(());
                }
                node.shm
                    .resize_with(region + 1, || vec![0u8; size].into_boxed_slice());
            }
            *out = node.shm[region].as_mut_ptr().cast();
            Ok(())
        })
    }

    fn shm_lock(&mut self, _offset: i32, _n: i32, _flags: ShmLockFlags) -> VfsResult<()> {
        self.with_node(|_| Ok(()))
    }

    fn shm_barrier(&mut self) {
        fence(Ordering::SeqCst);
    }

    fn shm_unmap(&mut self, delete: bool) -> VfsResult<()> {
        self.with_node(|node| {
            if delete {
                node.shm.clear();
            }
            Ok(())
        })
    }

    fn close(&mut self) -> VfsResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let mut state = lock(&self.state)?;
        state.open_handles -= 1;
        let delete = matches!(self.key, NodeKey::Anonymous(_))
            || self.flags.contains(OpenFlags::DELETEONCLOSE);
        if delete {
            state.nodes.remove(&self.key);
        } else if let Some(node) = state.nodes.get_mut(&self.key) {
            node.locks.remove(&self.handle);
        }
        Ok(())
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn lock(state: &Mutex<State>) -> VfsResult<MutexGuard<'_, State>> {
    state
        .lock()
        .map_err(|_| VfsError::Provider(ResultCode::IOERR))
}

/// Copies `msg` into `out` as a NUL-terminated C string, truncating if needed.
fn write_message(out: &mut [u8], msg: &[u8]) {
    let Some(room) = out.len().checked_sub(1) else {
        return;
    };
    let len = msg.len().min(room);
    out[..len].copy_from_slice(&msg[..len]);
    out[len] = 0;
}
