//! The `SQLite` library functions the adapter calls.
//!
//! A process linking this crate uses the bundled library. A host loading the
//! shim as an extension passes its own routine table, and VFS lookup,
//! registration and file allocations must then reach the host's library
//! rather than the bundled copy.

use std::ffi::c_void;
use std::os::raw::{c_char, c_int};

use crate::ffi::{self, sqlite3_api_routines, sqlite3_vfs};

/// VFS registry and allocator of one `SQLite` library.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Api {
    pub(crate) vfs_find: unsafe extern "C" fn(*const c_char) -> *mut sqlite3_vfs,
    pub(crate) vfs_register: unsafe extern "C" fn(*mut sqlite3_vfs, c_int) -> c_int,
    pub(crate) malloc: unsafe extern "C" fn(c_int) -> *mut c_void,
    pub(crate) free: unsafe extern "C" fn(*mut c_void),
}

impl Api {
    /// The library compiled by `build.rs`.
    pub(crate) const LINKED: Self = Self {
        vfs_find: ffi::sqlite3_vfs_find,
        vfs_register: ffi::sqlite3_vfs_register,
        malloc: ffi::sqlite3_malloc,
        free: ffi::sqlite3_free,
    };

    /// Reads the host's functions from its extension routine table.
    ///
    /// Returns `None` for a null table or one lacking any of the four slots.
    ///
    /// # Safety
    ///
    /// `routines` must be null or the table an extension entry point was
    /// called with.
    pub(crate) unsafe fn from_routines(routines: *const sqlite3_api_routines) -> Option<Self> {
        // SAFETY: per the contract above.
        let routines = unsafe { routines.as_ref() }?;
        Some(Self {
            vfs_find: routines.vfs_find?,
            vfs_register: routines.vfs_register?,
            malloc: routines.malloc?,
            free: routines.free?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_vfs::{allocations, counting_free, counting_malloc};

    unsafe extern "C" fn no_vfs(_name: *const c_char) -> *mut sqlite3_vfs {
        std::ptr::null_mut()
    }

    /// A routine table laid out like the engine's, with only the four slots
    /// the adapter reads filled in.
    fn routine_table() -> Vec<usize> {
        let mut table = vec![0usize; 150];
        table[58] = counting_free as usize;
        table[68] = counting_malloc as usize;
        table[141] = no_vfs as usize;
        table[142] = ffi::sqlite3_vfs_register as usize;
        table
    }

    #[test]
    fn test_routine_table_slots_are_used() {
        let table = routine_table();
        // SAFETY: the table is laid out like `sqlite3_api_routines`.
        let api = unsafe { Api::from_routines(table.as_ptr().cast()) }.expect("complete table");

        // SAFETY: plain calls into the functions read from the table.
        unsafe {
            assert!((api.vfs_find)(std::ptr::null()).is_null());
            let block = (api.malloc)(64);
            assert!(!block.is_null());
            (api.free)(block);
        }
        assert_eq!(allocations(), (1, 1));
    }

    #[test]
    fn test_incomplete_routine_table_is_rejected() {
        let mut table = routine_table();
        table[142] = 0;
        // SAFETY: the table is laid out like `sqlite3_api_routines`.
        assert!(unsafe { Api::from_routines(table.as_ptr().cast()) }.is_none());
        // SAFETY: null is allowed.
        assert!(unsafe { Api::from_routines(std::ptr::null()) }.is_none());
    }
}
