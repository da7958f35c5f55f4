//! File loading for donors and rule documents.
//!
//! Large donors are memory-mapped instead of copied; everything else is read
//! into memory in one go.

use crate::error::Result;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Donors larger than this are memory-mapped.
const MMAP_THRESHOLD: u64 = 16 * 1024 * 1024; // 16 MB

/// Contents of a file, either mapped or owned.
#[derive(Debug)]
pub enum FileData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl FileData {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            FileData::Mapped(mmap) => mmap,
            FileData::Owned(vec) => vec,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AsRef<[u8]> for FileData {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Read a file, memory-mapping it when it is above the mmap threshold.
///
/// The file handle is closed before this returns; a mapping stays valid on
/// its own.
pub fn read_file_smart(path: &Path) -> Result<FileData> {
    let file_size = std::fs::metadata(path)?.len();

    if file_size > MMAP_THRESHOLD {
        let file = File::open(path)?;
        // SAFETY: the donor is treated as immutable for the lifetime of the run
        let mmap = unsafe { Mmap::map(&file)? };
        tracing::debug!(
            "Memory-mapped donor ({:.2} MB): {}",
            file_size as f64 / 1024.0 / 1024.0,
            path.display()
        );
        Ok(FileData::Mapped(mmap))
    } else {
        Ok(FileData::Owned(std::fs::read(path)?))
    }
}

/// Read a UTF-8 text file such as a rule document.
pub fn read_text(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?)
}
