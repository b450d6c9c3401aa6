//! The offset translation layer as a [`Provider`].
//!
//! [`HeaderVfs`] wraps another provider. Opens are classified once: main
//! database files get an [`OffsettingFile`], everything else a
//! [`PassthroughFile`]. Provider-level operations are forwarded unchanged.

use std::ffi::{c_void, CStr};

use crate::error::VfsResult;
use crate::file::{HeaderFile, OffsettingFile, PassthroughFile};
use crate::flags::{AccessCheck, OpenFlags};
use crate::provider::{Provider, ProviderFile};
use crate::HEADER_SIZE;

/// Provider that reserves [`HEADER_SIZE`] bytes at the start of every main
/// database file.
#[derive(Debug)]
pub struct HeaderVfs<'p, P> {
    provider: &'p P,
}

impl<'p, P: Provider> HeaderVfs<'p, P> {
    /// Wraps `provider`. Every open is delegated to it.
    #[must_use]
    pub const fn new(provider: &'p P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    #[must_use]
    pub const fn provider(&self) -> &'p P {
        self.provider
    }
}

/// Grows a freshly created, empty main database file to [`HEADER_SIZE`].
fn reserve_header<F: ProviderFile>(file: &mut F) -> VfsResult<()> {
    if file.file_size()? == 0 {
        file.truncate(HEADER_SIZE)?;
        tracing::debug!(size = HEADER_SIZE, "reserved header region");
    }
    Ok(())
}

impl<P: Provider> Provider for HeaderVfs<'_, P> {
    type File = HeaderFile<P::File>;

    fn open(&self, name: Option<&CStr>, flags: OpenFlags) -> VfsResult<(Self::File, OpenFlags)> {
        let (mut file, out_flags) = self.provider.open(name, flags)?;

        if !flags.is_main_db() {
            tracing::debug!(?name, flags = flags.0, "opened passthrough file");
            return Ok((HeaderFile::Passthrough(PassthroughFile::new(file)), out_flags));
        }

        if flags.contains(OpenFlags::CREATE) {
            if let Err(err) = reserve_header(&mut file) {
                tracing::warn!(?name, %err, "header reservation failed, closing file");
                // The reservation error is what the caller sees.
                if let Err(close_err) = file.close() {
                    tracing::warn!(?name, err = %close_err, "closing file after failed reservation failed");
                }
                return Err(err);
            }
        }

        tracing::debug!(?name, flags = flags.0, "opened main database file");
        Ok((HeaderFile::Offsetting(OffsettingFile::new(file)), out_flags))
    }

    fn delete(&self, name: &CStr, sync_dir: bool) -> VfsResult<()> {
        self.provider.delete(name, sync_dir)
    }

    fn access(&self, name: &CStr, check: AccessCheck) -> VfsResult<bool> {
        self.provider.access(name, check)
    }

    fn full_pathname(&self, name: &CStr, out: &mut [u8]) -> VfsResult<()> {
        self.provider.full_pathname(name, out)
    }

    fn dl_open(&self, path: Option<&CStr>) -> *mut c_void {
        self.provider.dl_open(path)
    }

    fn dl_error(&self, out: &mut [u8]) {
        self.provider.dl_error(out);
    }

    fn dl_sym(&self, handle: *mut c_void, symbol: &CStr) -> Option<unsafe extern "C" fn()> {
        self.provider.dl_sym(handle, symbol)
    }

    fn dl_close(&self, handle: *mut c_void) {
        self.provider.dl_close(handle);
    }

    fn randomness(&self, out: &mut [u8]) -> i32 {
        self.provider.randomness(out)
    }

    fn sleep(&self, micros: i32) -> i32 {
        self.provider.sleep(micros)
    }

    fn current_time(&self) -> VfsResult<f64> {
        self.provider.current_time()
    }

    fn current_time_i64(&self) -> VfsResult<i64> {
        self.provider.current_time_i64()
    }

    fn last_error(&self, out: &mut [u8]) -> i32 {
        self.provider.last_error(out)
    }
}
