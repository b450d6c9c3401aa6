//! Direct access to the reserved header region.
//!
//! These helpers use plain file I/O at physical offsets. They never go
//! through the shim, so offset 0 here is the first byte of the file.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use eyre::{bail, ensure, Result, WrapErr};
use headervfs::HEADER_LEN;

/// Bytes at the start of the engine's own first page.
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Physical layout of a database file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Size on disk, header included.
    pub physical: u64,
    /// Size the engine sees.
    pub logical: u64,
    /// Whether the engine's magic string sits right after the header.
    pub has_magic: bool,
}

/// Reads the header region. Files shorter than the header yield fewer bytes.
pub fn read_header(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).wrap_err_with(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64)
        .read_to_end(&mut buf)
        .wrap_err("reading header region")?;
    Ok(buf)
}

/// Overwrites `bytes` at `offset` inside the header region.
///
/// The file must already carry a full header; the write never touches the
/// logical content after it.
pub fn write_header(path: &Path, offset: usize, bytes: &[u8]) -> Result<()> {
    let Some(end) = offset.checked_add(bytes.len()) else {
        bail!("offset overflow");
    };
    ensure!(
        end <= HEADER_LEN,
        "write of {} bytes at offset {offset} exceeds the {HEADER_LEN}-byte header",
        bytes.len()
    );
    let len = physical_len(path)?;
    ensure!(
        len >= HEADER_LEN as u64,
        "{} is {len} bytes, too short to carry a header",
        path.display()
    );

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .wrap_err_with(|| format!("opening {} for writing", path.display()))?;
    file.seek(SeekFrom::Start(offset as u64))?;
    file.write_all(bytes).wrap_err("writing header region")?;
    file.sync_all().wrap_err("syncing header region")?;
    tracing::debug!(offset, len = bytes.len(), "wrote header bytes");
    Ok(())
}

/// Zeroes the whole header region.
pub fn clear_header(path: &Path) -> Result<()> {
    write_header(path, 0, &[0u8; HEADER_LEN])
}

/// Reports physical and logical sizes of `path`.
pub fn inspect(path: &Path) -> Result<Layout> {
    let physical = physical_len(path)?;
    let logical = physical.saturating_sub(HEADER_LEN as u64);

    let mut magic = [0u8; 16];
    let has_magic = if logical >= magic.len() as u64 {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        file.read_exact(&mut magic)?;
        &magic == SQLITE_MAGIC
    } else {
        false
    };

    Ok(Layout {
        physical,
        logical,
        has_magic,
    })
}

fn physical_len(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path)
        .wrap_err_with(|| format!("reading metadata of {}", path.display()))?
        .len())
}

/// Canonical hex dump, 16 bytes per line. With `skip_zero` set, all-zero
/// lines are folded into a single `*`.
pub fn hexdump(bytes: &[u8], skip_zero: bool) -> String {
    let mut out = String::new();
    let mut folded = false;
    for (i, chunk) in bytes.chunks(16).enumerate() {
        if skip_zero && chunk.iter().all(|b| *b == 0) {
            if !folded {
                out.push_str("*\n");
                folded = true;
            }
            continue;
        }
        folded = false;
        let hex = chunk
            .iter()
            .map(|b| hex::encode([*b]))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii: String = chunk
            .iter()
            .map(|b| if b.is_ascii_graphic() || *b == b' ' { char::from(*b) } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {hex:<47}  |{ascii}|\n", i * 16));
    }
    out
}
