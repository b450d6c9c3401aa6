//! Flag and level newtypes for the provider contract.
//!
//! Each type wraps the raw `SQLite` integer so values cross the shim
//! bit-for-bit; the associated constants only name the bits this crate
//! inspects or that tests need.

use std::ops::BitOr;

/// `SQLITE_OPEN_*` flags passed to and returned from `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenFlags(pub i32);

impl OpenFlags {
    /// `SQLITE_OPEN_READONLY`.
    pub const READONLY: Self = Self(0x0000_0001);
    /// `SQLITE_OPEN_READWRITE`.
    pub const READWRITE: Self = Self(0x0000_0002);
    /// `SQLITE_OPEN_CREATE`.
    pub const CREATE: Self = Self(0x0000_0004);
    /// `SQLITE_OPEN_DELETEONCLOSE`.
    pub const DELETEONCLOSE: Self = Self(0x0000_0008);
    /// `SQLITE_OPEN_EXCLUSIVE`.
    pub const EXCLUSIVE: Self = Self(0x0000_0010);
    /// `SQLITE_OPEN_URI`.
    pub const URI: Self = Self(0x0000_0040);
    /// `SQLITE_OPEN_MEMORY`.
    pub const MEMORY: Self = Self(0x0000_0080);
    /// `SQLITE_OPEN_MAIN_DB`: the primary-content file.
    pub const MAIN_DB: Self = Self(0x0000_0100);
    /// `SQLITE_OPEN_TEMP_DB`.
    pub const TEMP_DB: Self = Self(0x0000_0200);
    /// `SQLITE_OPEN_TRANSIENT_DB`.
    pub const TRANSIENT_DB: Self = Self(0x0000_0400);
    /// `SQLITE_OPEN_MAIN_JOURNAL`.
    pub const MAIN_JOURNAL: Self = Self(0x0000_0800);
    /// `SQLITE_OPEN_TEMP_JOURNAL`.
    pub const TEMP_JOURNAL: Self = Self(0x0000_1000);
    /// `SQLITE_OPEN_SUBJOURNAL`.
    pub const SUBJOURNAL: Self = Self(0x0000_2000);
    /// `SQLITE_OPEN_SUPER_JOURNAL`.
    pub const SUPER_JOURNAL: Self = Self(0x0000_4000);
    /// `SQLITE_OPEN_NOMUTEX`.
    pub const NOMUTEX: Self = Self(0x0000_8000);
    /// `SQLITE_OPEN_FULLMUTEX`.
    pub const FULLMUTEX: Self = Self(0x0001_0000);
    /// `SQLITE_OPEN_WAL`.
    pub const WAL: Self = Self(0x0008_0000);

    /// Returns `true` if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if this open targets the primary-content file.
    #[must_use]
    pub const fn is_main_db(self) -> bool {
        self.contains(Self::MAIN_DB)
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// File lock level (`SQLITE_LOCK_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LockLevel(pub i32);

impl LockLevel {
    /// `SQLITE_LOCK_NONE`.
    pub const NONE: Self = Self(0);
    /// `SQLITE_LOCK_SHARED`.
    pub const SHARED: Self = Self(1);
    /// `SQLITE_LOCK_RESERVED`.
    pub const RESERVED: Self = Self(2);
    /// `SQLITE_LOCK_PENDING`.
    pub const PENDING: Self = Self(3);
    /// `SQLITE_LOCK_EXCLUSIVE`.
    pub const EXCLUSIVE: Self = Self(4);
}

/// `xSync` flags (`SQLITE_SYNC_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SyncFlags(pub i32);

impl SyncFlags {
    /// `SQLITE_SYNC_NORMAL`.
    pub const NORMAL: Self = Self(0x02);
    /// `SQLITE_SYNC_FULL`.
    pub const FULL: Self = Self(0x03);
    /// `SQLITE_SYNC_DATAONLY`.
    pub const DATAONLY: Self = Self(0x10);
}

impl BitOr for SyncFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// `xAccess` check kind (`SQLITE_ACCESS_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessCheck(pub i32);

impl AccessCheck {
    /// `SQLITE_ACCESS_EXISTS`.
    pub const EXISTS: Self = Self(0);
    /// `SQLITE_ACCESS_READWRITE`.
    pub const READWRITE: Self = Self(1);
    /// `SQLITE_ACCESS_READ`.
    pub const READ: Self = Self(2);
}

/// `xShmLock` flags (`SQLITE_SHM_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShmLockFlags(pub i32);

impl ShmLockFlags {
    /// `SQLITE_SHM_UNLOCK`.
    pub const UNLOCK: Self = Self(1);
    /// `SQLITE_SHM_LOCK`.
    pub const LOCK: Self = Self(2);
    /// `SQLITE_SHM_SHARED`.
    pub const SHARED: Self = Self(4);
    /// `SQLITE_SHM_EXCLUSIVE`.
    pub const EXCLUSIVE: Self = Self(8);
}

impl BitOr for ShmLockFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_db_classification() {
        let main = OpenFlags::MAIN_DB | OpenFlags::READWRITE | OpenFlags::CREATE;
        assert!(main.is_main_db());
        assert!(main.contains(OpenFlags::CREATE));

        for other in [
            OpenFlags::MAIN_JOURNAL,
            OpenFlags::WAL,
            OpenFlags::TEMP_DB,
            OpenFlags::TEMP_JOURNAL,
            OpenFlags::SUBJOURNAL,
            OpenFlags::SUPER_JOURNAL,
            OpenFlags::TRANSIENT_DB,
        ] {
            assert!(!(other | OpenFlags::READWRITE | OpenFlags::CREATE).is_main_db());
        }
    }
}
