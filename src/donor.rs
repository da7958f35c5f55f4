//! Donor buffer: the reference bytes a synthetic file borrows its header and
//! its decoy code from.

use crate::error::{Result, SynthError};
use crate::file_io::{self, FileData};
use std::path::Path;
use std::sync::Arc;

/// Minimal DOS stub used as the start of the built-in donor header.
const BUILTIN_DOS_STUB: &[u8] = &[
    0x4d, 0x5a, 0x90, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0xff, 0xff, 0x00, 0x00, //
    0xb8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, //
    0x0e, 0x1f, 0xba, 0x0e, 0x00, 0xb4, 0x09, 0xcd, 0x21, 0xb8, 0x01, 0x4c, 0xcd, 0x21, 0x54, 0x68, //
    0x69, 0x73, 0x20, 0x70, 0x72, 0x6f, 0x67, 0x72, 0x61, 0x6d, 0x20, 0x63, 0x61, 0x6e, 0x6e, 0x6f, //
    0x74, 0x20, 0x62, 0x65, 0x20, 0x72, 0x75, 0x6e, 0x20, 0x69, 0x6e, 0x20, 0x44, 0x4f, 0x53, 0x20, //
    0x6d, 0x6f, 0x64, 0x65, 0x2e, 0x0d, 0x0d, 0x0a, 0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x50, 0x45, 0x00, 0x00, 0x4c, 0x01, 0x03, 0x00, //
];

/// 32-bit x86 routines (loops, string walks, calls) tiled to form the
/// built-in donor body.
const BUILTIN_CODE: &[u8] = &[
    // counted loop over a local
    0x55, 0x89, 0xe5, 0x83, 0xec, 0x10, 0xc7, 0x45, 0xfc, 0x00, 0x00, 0x00, 0x00, 0xeb, 0x04, 0x83, //
    0x45, 0xfc, 0x01, 0x8b, 0x45, 0xfc, 0x3b, 0x45, 0x08, 0x7c, 0xf4, 0x8b, 0x45, 0xfc, 0xc9, 0xc3, //
    // byte sum over a buffer
    0x53, 0x56, 0x57, 0x8b, 0x7c, 0x24, 0x10, 0x8b, 0x74, 0x24, 0x14, 0x31, 0xdb, 0x31, 0xc0, 0x85, //
    0xf6, 0x74, 0x09, 0x0f, 0xb6, 0x0c, 0x07, 0x01, 0xcb, 0x40, 0xeb, 0xf3, 0x89, 0xd8, 0x5f, 0x5e, //
    0x5b, 0xc3, 0x90, 0x90, //
    // strlen
    0x8b, 0x4c, 0x24, 0x04, 0x31, 0xc0, 0x80, 0x3c, 0x01, 0x00, 0x74, 0x03, 0x40, 0xeb, 0xf7, 0xc3, //
    // call through an import thunk
    0x55, 0x89, 0xe5, 0x6a, 0x00, 0x68, 0x00, 0x10, 0x40, 0x00, 0xff, 0x15, 0x0c, 0x20, 0x40, 0x00, //
    0x85, 0xc0, 0x75, 0x05, 0x83, 0xc8, 0xff, 0xeb, 0x02, 0x31, 0xc0, 0x89, 0xec, 0x5d, 0xc2, 0x04, //
    0x00, 0xcc, 0xcc, 0xcc, //
    // memset-style fill
    0x57, 0x8b, 0x7c, 0x24, 0x08, 0x8b, 0x44, 0x24, 0x0c, 0x8b, 0x4c, 0x24, 0x10, 0xfc, 0xf3, 0xaa, //
    0x8b, 0x44, 0x24, 0x08, 0x5f, 0xc3, 0x8d, 0x76, 0x00, //
];

/// Number of code bytes appended after the built-in header.
const BUILTIN_BODY_LEN: usize = 4096;

/// Reference bytes used for the header seed and for decoy sampling.
///
/// Large donor files stay memory-mapped. The bytes are shared, so cloning a
/// donor is cheap.
#[derive(Debug, Clone)]
pub struct Donor {
    data: Arc<FileData>,
    header_len: usize,
}

impl Donor {
    /// Wrap donor bytes; the first `header_len` bytes form the header.
    pub fn new(bytes: Vec<u8>, header_len: usize) -> Result<Self> {
        Self::from_data(FileData::Owned(bytes), header_len)
    }

    fn from_data(data: FileData, header_len: usize) -> Result<Self> {
        if data.is_empty() {
            return Err(SynthError::configuration("donor buffer must not be empty"));
        }
        Ok(Self { data: Arc::new(data), header_len })
    }

    /// Load a donor file. The file handle is released before this returns.
    pub fn from_file(path: &Path, header_len: usize) -> Result<Self> {
        let data = file_io::read_file_smart(path)?;
        tracing::debug!("Loaded donor {} ({} bytes)", path.display(), data.len());
        Self::from_data(data, header_len)
    }

    /// Donor built from a DOS/PE stub header followed by tiled x86 routines.
    pub fn builtin(header_len: usize) -> Self {
        let mut bytes = Vec::with_capacity(header_len + BUILTIN_BODY_LEN);
        bytes.extend(BUILTIN_DOS_STUB.iter().take(header_len));
        bytes.resize(header_len, 0);
        bytes.extend(BUILTIN_CODE.iter().cycle().take(BUILTIN_BODY_LEN));
        Self { data: Arc::new(FileData::Owned(bytes)), header_len }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True if the donor is backed by a memory map rather than a copy.
    pub fn is_mapped(&self) -> bool {
        matches!(*self.data, FileData::Mapped(_))
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Leading header region, clipped to the donor's length.
    pub fn header(&self) -> &[u8] {
        let bytes = self.as_slice();
        &bytes[..self.header_len.min(bytes.len())]
    }

    /// Region decoys are sampled from: everything after the header, or the
    /// whole donor when it is not longer than its header.
    pub fn body(&self) -> &[u8] {
        let bytes = self.as_slice();
        if bytes.len() > self.header_len {
            &bytes[self.header_len..]
        } else {
            bytes
        }
    }
}
