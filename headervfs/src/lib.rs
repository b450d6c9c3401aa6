//! `SQLite` VFS shim that reserves a fixed header region at the start of every
//! main database file.
//!
//! The `headervfs` VFS sits on top of the default VFS. For main database files
//! every byte-addressed operation (read, write, truncate, file size) is shifted
//! by [`HEADER_SIZE`], so the engine never sees the first 1024 bytes and an
//! application can keep its own metadata there. Journals, WAL files and temp
//! files are passed through unchanged, as is every non-byte-range operation.
//!
//! The layer is written against the [`Provider`] / [`ProviderFile`] traits:
//!
//! * [`HeaderVfs`] is the translation layer itself.
//! * [`SqliteProvider`] adapts a real `sqlite3_vfs`; [`register`] installs the
//!   shim in the linked `sqlite3mc` library under the name [`VFS_NAME`].
//! * [`MemoryProvider`] keeps files in memory, for tests and tooling.
//!
//! [`Connection`] is a small safe wrapper used to open databases through a
//! named VFS. The `ffi` module holds the raw C declarations.

mod ffi;

mod connection;
pub mod error;
pub mod file;
pub mod flags;
pub mod memory;
pub mod provider;
pub mod sqlite;
mod statement;
pub mod value;
mod vfs;

pub use connection::Connection;
pub use error::{DbError, DbResult, ResultCode, VfsError, VfsResult};
pub use file::{FileRole, HeaderFile, OffsettingFile, PassthroughFile};
pub use flags::{AccessCheck, LockLevel, OpenFlags, ShmLockFlags, SyncFlags};
pub use memory::{MemoryFile, MemoryProvider};
pub use provider::{Provider, ProviderFile};
pub use sqlite::{register, RawFile, SqliteProvider};
pub use statement::{Statement, StepResult};
pub use value::Value;
pub use vfs::HeaderVfs;

/// Bytes reserved at the start of every main database file.
pub const HEADER_SIZE: i64 = 1024;

/// [`HEADER_SIZE`] as a buffer length.
pub const HEADER_LEN: usize = 1024;

const _: () = assert!(HEADER_SIZE.unsigned_abs() == HEADER_LEN as u64);

/// Name the shim registers under.
pub const VFS_NAME: &str = "headervfs";

#[cfg(test)]
mod tests;
