//! File handles of the offset translation layer.
//!
//! A main database file is wrapped in an [`OffsettingFile`], which shifts
//! every byte-addressed operation by [`HEADER_SIZE`]. Every other file is
//! wrapped in a [`PassthroughFile`], which forwards everything unchanged.
//! [`HeaderFile`] is the handle the layer hands out; its variant is chosen at
//! open time and never changes.

use std::ffi::c_void;

use crate::error::{ResultCode, VfsError, VfsResult};
use crate::flags::{LockLevel, ShmLockFlags, SyncFlags};
use crate::provider::ProviderFile;
use crate::HEADER_SIZE;

/// Role of an open file, fixed at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    /// The main database file; byte offsets are shifted.
    PrimaryContent,
    /// Journals, WAL, temp files and anything else; forwarded unchanged.
    Other,
}

/// A file opened through the translation layer.
#[derive(Debug)]
pub enum HeaderFile<F> {
    /// Main database file with a reserved header region.
    Offsetting(OffsettingFile<F>),
    /// Any other file.
    Passthrough(PassthroughFile<F>),
}

impl<F: ProviderFile> HeaderFile<F> {
    /// The role this handle was classified with.
    #[must_use]
    pub const fn role(&self) -> FileRole {
        match self {
            Self::Offsetting(_) => FileRole::PrimaryContent,
            Self::Passthrough(_) => FileRole::Other,
        }
    }

    /// The underlying provider file.
    #[must_use]
    pub const fn get_ref(&self) -> &F {
        match self {
            Self::Offsetting(f) => &f.inner,
            Self::Passthrough(f) => &f.inner,
        }
    }

    fn as_dyn(&mut self) -> &mut dyn ProviderFile {
        match self {
            Self::Offsetting(f) => f,
            Self::Passthrough(f) => f,
        }
    }
}

impl<F: ProviderFile> ProviderFile for HeaderFile<F> {
    fn read(&mut self, buf: &mut [u8], offset: i64) -> VfsResult<()> {
        self.as_dyn().read(buf, offset)
    }

    fn write(&mut self, buf: &[u8], offset: i64) -> VfsResult<()> {
        self.as_dyn().write(buf, offset)
    }

    fn truncate(&mut self, size: i64) -> VfsResult<()> {
        self.as_dyn().truncate(size)
    }

    fn sync(&mut self, flags: SyncFlags) -> VfsResult<()> {
        self.as_dyn().sync(flags)
    }

    fn file_size(&mut self) -> VfsResult<i64> {
        self.as_dyn().file_size()
    }

    fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
        self.as_dyn().lock(level)
    }

    fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
        self.as_dyn().unlock(level)
    }

    fn check_reserved_lock(&mut self) -> VfsResult<bool> {
        self.as_dyn().check_reserved_lock()
    }

    fn file_control(&mut self, op: i32, arg: *mut c_void) -> VfsResult<()> {
        self.as_dyn().file_control(op, arg)
    }

    fn sector_size(&mut self) -> i32 {
        self.as_dyn().sector_size()
    }

    fn device_characteristics(&mut self) -> i32 {
        self.as_dyn().device_characteristics()
    }

    fn shm_map(
        &mut self,
        region: i32,
        size: i32,
        extend: bool,
        out: &mut *mut c_void,
    ) -> VfsResult<()> {
        self.as_dyn().shm_map(region, size, extend, out)
    }

    fn shm_lock(&mut self, offset: i32, n: i32, flags: ShmLockFlags) -> VfsResult<()> {
        self.as_dyn().shm_lock(offset, n, flags)
    }

    fn shm_barrier(&mut self) {
        self.as_dyn().shm_barrier();
    }

    fn shm_unmap(&mut self, delete: bool) -> VfsResult<()> {
        self.as_dyn().shm_unmap(delete)
    }

    fn close(&mut self) -> VfsResult<()> {
        self.as_dyn().close()
    }
}

/// Physical position of logical position `pos`. Positions that do not fit
/// after the shift are reported as `SQLITE_IOERR`.
fn physical(pos: i64) -> VfsResult<i64> {
    pos.checked_add(HEADER_SIZE)
        .ok_or(VfsError::Provider(ResultCode::IOERR))
}

/// Main database file: logical offset 0 is physical offset [`HEADER_SIZE`].
#[derive(Debug)]
pub struct OffsettingFile<F> {
    inner: F,
}

impl<F> OffsettingFile<F> {
    /// Wraps an already-open underlying file.
    pub const fn new(inner: F) -> Self {
        Self { inner }
    }

    /// The underlying provider file.
    pub const fn get_ref(&self) -> &F {
        &self.inner
    }
}

impl<F: ProviderFile> ProviderFile for OffsettingFile<F> {
    fn read(&mut self, buf: &mut [u8], offset: i64) -> VfsResult<()> {
        self.inner.read(buf, physical(offset)?)
    }

    fn write(&mut self, buf: &[u8], offset: i64) -> VfsResult<()> {
        self.inner.write(buf, physical(offset)?)
    }

    fn truncate(&mut self, size: i64) -> VfsResult<()> {
        self.inner.truncate(physical(size)?)
    }

    fn sync(&mut self, flags: SyncFlags) -> VfsResult<()> {
        self.inner.sync(flags)
    }

    /// A physical file no larger than the header region is logically empty.
    fn file_size(&mut self) -> VfsResult<i64> {
        let physical = self.inner.file_size()?;
        Ok(physical.saturating_sub(HEADER_SIZE).max(0))
    }

    fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
        self.inner.lock(level)
    }

    fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
        self.inner.unlock(level)
    }

    fn check_reserved_lock(&mut self) -> VfsResult<bool> {
        self.inner.check_reserved_lock()
    }

    fn file_control(&mut self, op: i32, arg: *mut c_void) -> VfsResult<()> {
        self.inner.file_control(op, arg)
    }

    fn sector_size(&mut self) -> i32 {
        self.inner.sector_size()
    }

    fn device_characteristics(&mut self) -> i32 {
        self.inner.device_characteristics()
    }

    fn shm_map(
        &mut self,
        region: i32,
        size: i32,
        extend: bool,
        out: &mut *mut c_void,
    ) -> VfsResult<()> {
        self.inner.shm_map(region, size, extend, out)
    }

    fn shm_lock(&mut self, offset: i32, n: i32, flags: ShmLockFlags) -> VfsResult<()> {
        self.inner.shm_lock(offset, n, flags)
    }

    fn shm_barrier(&mut self) {
        self.inner.shm_barrier();
    }

    fn shm_unmap(&mut self, delete: bool) -> VfsResult<()> {
        self.inner.shm_unmap(delete)
    }

    fn close(&mut self) -> VfsResult<()> {
        self.inner.close()
    }
}

/// Any non-main file: every call goes straight to the underlying file.
#[derive(Debug)]
pub struct PassthroughFile<F> {
    inner: F,
}

impl<F> PassthroughFile<F> {
    /// Wraps an already-open underlying file.
    pub const fn new(inner: F) -> Self {
        Self { inner }
    }

    /// The underlying provider file.
    pub const fn get_ref(&self) -> &F {
        &self.inner
    }
}

impl<F: ProviderFile> ProviderFile for PassthroughFile<F> {
    fn read(&mut self, buf: &mut [u8], offset: i64) -> VfsResult<()> {
        self.inner.read(buf, offset)
    }

    fn write(&mut self, buf: &[u8], offset: i64) -> VfsResult<()> {
        self.inner.write(buf, offset)
    }

    fn truncate(&mut self, size: i64) -> VfsResult<()> {
        self.inner.truncate(size)
    }

    fn sync(&mut self, flags: SyncFlags) -> VfsResult<()> {
        self.inner.sync(flags)
    }

    fn file_size(&mut self) -> VfsResult<i64> {
        self.inner.file_size()
    }

    fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
        self.inner.lock(level)
    }

    fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
        self.inner.unlock(level)
    }

    fn check_reserved_lock(&mut self) -> VfsResult<bool> {
        self.inner.check_reserved_lock()
    }

    fn file_control(&mut self, op: i32, arg: *mut c_void) -> VfsResult<()> {
        self.inner.file_control(op, arg)
    }

    fn sector_size(&mut self) -> i32 {
        self.inner.sector_size()
    }

    fn device_characteristics(&mut self) -> i32 {
        self.inner.device_characteristics()
    }

    fn shm_map(
        &mut self,
        region: i32,
        size: i32,
        extend: bool,
        out: &mut *mut c_void,
    ) -> VfsResult<()> {
        self.inner.shm_map(region, size, extend, out)
    }

    fn shm_lock(&mut self, offset: i32, n: i32, flags: ShmLockFlags) -> VfsResult<()> {
        self.inner.shm_lock(offset, n, flags)
    }

    fn shm_barrier(&mut self) {
        self.inner.shm_barrier();
    }

    fn shm_unmap(&mut self, delete: bool) -> VfsResult<()> {
        self.inner.shm_unmap(delete)
    }

    fn close(&mut self) -> VfsResult<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One observed call on the underlying file.
    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Read(usize, i64),
        Write(Vec<u8>, i64),
        Truncate(i64),
        Sync(SyncFlags),
        FileSize,
        Lock(LockLevel),
        Unlock(LockLevel),
        CheckReservedLock,
        FileControl(i32, usize),
        SectorSize,
        DeviceCharacteristics,
        ShmMap(i32, i32, bool),
        ShmLock(i32, i32, ShmLockFlags),
        ShmBarrier,
        ShmUnmap(bool),
        Close,
    }

    /// Underlying file that records every call and answers from a script.
    #[derive(Debug, Default)]
    struct RecordingFile {
        calls: Vec<Call>,
        size: i64,
        status: Option<ResultCode>,
    }

    impl RecordingFile {
        fn with_size(size: i64) -> Self {
            Self {
                size,
                ..Self::default()
            }
        }

        fn failing(code: ResultCode) -> Self {
            Self {
                status: Some(code),
                ..Self::default()
            }
        }

        fn result(&self) -> VfsResult<()> {
            self.status.map_or(Ok(()), |code| Err(VfsError::Provider(code)))
        }
    }

    impl ProviderFile for RecordingFile {
        fn read(&mut self, buf: &mut [u8], offset: i64) -> VfsResult<()> {
            self.calls.push(Call::Read(buf.len(), offset));
            self.result()
        }

        fn write(&mut self, buf: &[u8], offset: i64) -> VfsResult<()> {
            self.calls.push(Call::Write(buf.to_vec(), offset));
            self.result()
        }

        fn truncate(&mut self, size: i64) -> VfsResult<()> {
            self.calls.push(Call::Truncate(size));
            self.result()
        }

        fn sync(&mut self, flags: SyncFlags) -> VfsResult<()> {
            self.calls.push(Call::Sync(flags));
            self.result()
        }

        fn file_size(&mut self) -> VfsResult<i64> {
            self.calls.push(Call::FileSize);
            self.result().map(|()| self.size)
        }

        fn lock(&mut self, level: LockLevel) -> VfsResult<()> {
            self.calls.push(Call::Lock(level));
            self.result()
        }

        fn unlock(&mut self, level: LockLevel) -> VfsResult<()> {
            self.calls.push(Call::Unlock(level));
            self.result()
        }

        fn check_reserved_lock(&mut self) -> VfsResult<bool> {
            self.calls.push(Call::CheckReservedLock);
            self.result().map(|()| true)
        }

        fn file_control(&mut self, op: i32, arg: *mut c_void) -> VfsResult<()> {
            self.calls.push(Call::FileControl(op, arg as usize));
            self.result()
        }

        fn sector_size(&mut self) -> i32 {
            self.calls.push(Call::SectorSize);
            4096
        }

        fn device_characteristics(&mut self) -> i32 {
            self.calls.push(Call::DeviceCharacteristics);
            0x1000
        }

        fn shm_map(
            &mut self,
            region: i32,
            size: i32,
            extend: bool,
            out: &mut *mut c_void,
        ) -> VfsResult<()> {
            self.calls.push(Call::ShmMap(region, size, extend));
            *out = 0xdead_0000_usize as *mut c_void;
            self.result()
        }

        fn shm_lock(&mut self, offset: i32, n: i32, flags: ShmLockFlags) -> VfsResult<()> {
            self.calls.push(Call::ShmLock(offset, n, flags));
            self.result()
        }

        fn shm_barrier(&mut self) {
            self.calls.push(Call::ShmBarrier);
        }

        fn shm_unmap(&mut self, delete: bool) -> VfsResult<()> {
            self.calls.push(Call::ShmUnmap(delete));
            self.result()
        }

        fn close(&mut self) -> VfsResult<()> {
            self.calls.push(Call::Close);
            Ok(())
        }
    }

    fn exercise_forwarded_ops(file: &mut impl ProviderFile) -> Vec<VfsResult<()>> {
        let mut region = std::ptr::null_mut();
        vec![
            file.sync(SyncFlags::FULL | SyncFlags::DATAONLY),
            file.lock(LockLevel::RESERVED),
            file.unlock(LockLevel::SHARED),
            file.check_reserved_lock().map(|_| ()),
            file.file_control(18, 0x40 as *mut c_void),
            file.shm_map(3, 32_768, true, &mut region),
            file.shm_lock(2, 1, ShmLockFlags::LOCK | ShmLockFlags::EXCLUSIVE),
            file.shm_unmap(true),
        ]
    }

    fn expected_forwarded_calls() -> Vec<Call> {
        vec![
            Call::Sync(SyncFlags::FULL | SyncFlags::DATAONLY),
            Call::Lock(LockLevel::RESERVED),
            Call::Unlock(LockLevel::SHARED),
            Call::CheckReservedLock,
            Call::FileControl(18, 0x40),
            Call::ShmMap(3, 32_768, true),
            Call::ShmLock(2, 1, ShmLockFlags::LOCK | ShmLockFlags::EXCLUSIVE),
            Call::ShmUnmap(true),
        ]
    }

    #[test]
    fn test_offsetting_shifts_byte_ranges() {
        let mut file = OffsettingFile::new(RecordingFile::with_size(0));
        let mut buf = [0u8; 16];
        file.read(&mut buf, 0).expect("read");
        file.write(b"HELLOABC", 4096).expect("write");
        file.truncate(8192).expect("truncate");

        assert_eq!(
            file.get_ref().calls,
            vec![
                Call::Read(16, HEADER_SIZE),
                Call::Write(b"HELLOABC".to_vec(), 4096 + HEADER_SIZE),
                Call::Truncate(8192 + HEADER_SIZE),
            ]
        );
    }

    #[test]
    fn test_offsetting_file_size_clamps_small_files() {
        for physical in [0, 1, 512, HEADER_SIZE - 1, HEADER_SIZE] {
            let mut file = OffsettingFile::new(RecordingFile::with_size(physical));
            assert_eq!(file.file_size(), Ok(0), "physical size {physical}");
        }
        for physical in [HEADER_SIZE + 1, HEADER_SIZE + 8, 1 << 20] {
            let mut file = OffsettingFile::new(RecordingFile::with_size(physical));
            assert_eq!(file.file_size(), Ok(physical - HEADER_SIZE));
        }
    }

    #[test]
    fn test_offsets_past_the_addressable_range_fail_without_forwarding() {
        let mut file = OffsettingFile::new(RecordingFile::with_size(0));
        let mut buf = [0u8; 4];
        let overflow = Err(VfsError::Provider(ResultCode::IOERR));

        assert_eq!(file.read(&mut buf, i64::MAX - 10), overflow);
        assert_eq!(file.write(b"late", i64::MAX - HEADER_SIZE + 1), overflow);
        assert_eq!(file.truncate(i64::MAX), overflow);
        assert!(file.get_ref().calls.is_empty());

        // The last logical offset that still fits is forwarded.
        file.read(&mut buf, i64::MAX - HEADER_SIZE).expect("read at the limit");
        assert_eq!(file.get_ref().calls, vec![Call::Read(4, i64::MAX)]);
    }

    #[test]
    fn test_offsetting_file_size_error_is_verbatim() {
        let mut file = OffsettingFile::new(RecordingFile::failing(ResultCode::IOERR_FSTAT));
        assert_eq!(
            file.file_size(),
            Err(VfsError::Provider(ResultCode::IOERR_FSTAT))
        );
    }

    #[test]
    fn test_passthrough_does_not_shift() {
        let mut file = PassthroughFile::new(RecordingFile::with_size(1032));
        let mut buf = [0u8; 8];
        file.read(&mut buf, 0).expect("read");
        file.write(b"journal!", 512).expect("write");
        file.truncate(0).expect("truncate");
        assert_eq!(file.file_size(), Ok(1032));

        assert_eq!(
            file.get_ref().calls,
            vec![
                Call::Read(8, 0),
                Call::Write(b"journal!".to_vec(), 512),
                Call::Truncate(0),
                Call::FileSize,
            ]
        );
    }

    #[test]
    fn test_non_byte_range_ops_forward_unchanged_on_both_variants() {
        let mut offsetting = HeaderFile::Offsetting(OffsettingFile::new(RecordingFile::default()));
        let mut passthrough =
            HeaderFile::Passthrough(PassthroughFile::new(RecordingFile::default()));

        for file in [&mut offsetting, &mut passthrough] {
            for result in exercise_forwarded_ops(file) {
                assert_eq!(result, Ok(()));
            }
            assert_eq!(file.sector_size(), 4096);
            assert_eq!(file.device_characteristics(), 0x1000);
            file.shm_barrier();

            let mut expected = expected_forwarded_calls();
            expected.extend([Call::SectorSize, Call::DeviceCharacteristics, Call::ShmBarrier]);
            assert_eq!(file.get_ref().calls, expected);
        }
    }

    #[test]
    fn test_forwarded_errors_are_verbatim() {
        let busy = ResultCode::BUSY;
        let mut file =
            HeaderFile::Offsetting(OffsettingFile::new(RecordingFile::failing(busy)));
        for result in exercise_forwarded_ops(&mut file) {
            assert_eq!(result, Err(VfsError::Provider(busy)));
        }
        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf, 0), Err(VfsError::Provider(busy)));
    }

    #[test]
    fn test_shm_map_pointer_is_returned_with_status() {
        let mut file = HeaderFile::Passthrough(PassthroughFile::new(RecordingFile::failing(
            ResultCode::READONLY,
        )));
        let mut region = std::ptr::null_mut();
        let result = file.shm_map(0, 32_768, false, &mut region);
        assert_eq!(result, Err(VfsError::Provider(ResultCode::READONLY)));
        assert_eq!(region as usize, 0xdead_0000);
    }

    #[test]
    fn test_role_matches_variant() {
        let main = HeaderFile::Offsetting(OffsettingFile::new(RecordingFile::default()));
        let other = HeaderFile::Passthrough(PassthroughFile::new(RecordingFile::default()));
        assert_eq!(main.role(), FileRole::PrimaryContent);
        assert_eq!(other.role(), FileRole::Other);
    }
}
