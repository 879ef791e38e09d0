//! Data container file
//!
//! Positional reads and writes of the header and fixed-size blocks.
//!
//! ## File Format
//! ```text
//! ┌──────────────┬──────────────────┬─────────┬─────────┬─────┐
//! │ Version (1)  │ TotalBlocks (4)  │ Block 1 │ Block 2 │ ... │
//! └──────────────┴──────────────────┴─────────┴─────────┴─────┘
//! ```
//! Block `id` (1-indexed) starts at `HEADER_SIZE + (id - 1) * BLOCK_SIZE`.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::error::{Result, StoreError};

use super::block::{Block, BLOCK_SIZE, UNUSED_BLOCK};

/// Current data container format version
pub const FORMAT_VERSION: u8 = 0x01;

/// Header size: Version (1) + TotalBlocks (4) = 5 bytes
pub const HEADER_SIZE: u64 = 5;

/// Positional byte storage backing the data container
///
/// Implemented for [`File`]; other implementations let the block layer run
/// over instrumented or in-memory storage.
pub trait BlockDevice: Send {
    /// Current length in bytes
    fn len_bytes(&self) -> std::io::Result<u64>;

    /// Read exactly `buf.len()` bytes from `offset`
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;

    /// Write all of `buf` at `offset`, extending the device if needed
    fn write_all_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()>;

    /// Truncate or zero-extend to `len` bytes
    fn set_len(&self, len: u64) -> std::io::Result<()>;

    /// Flush pending writes to stable storage
    fn sync(&self) -> std::io::Result<()>;
}

impl BlockDevice for File {
    fn len_bytes(&self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        FileExt::read_exact_at(self, buf, offset)
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        FileExt::write_all_at(self, buf, offset)
    }

    fn set_len(&self, len: u64) -> std::io::Result<()> {
        File::set_len(self, len)
    }

    fn sync(&self) -> std::io::Result<()> {
        self.sync_all()
    }
}

/// Handle to the data container
///
/// Uses `pread`/`pwrite` style I/O so no shared seek position is needed.
pub struct DataFile {
    device: Box<dyn BlockDevice>,
}

impl DataFile {
    /// Open the data container, creating it with an empty header when missing
    ///
    /// Returns the handle together with the persisted `total_blocks`.
    pub fn open(path: &Path) -> Result<(Self, u32)> {
        if path.exists() && !path.is_file() {
            return Err(StoreError::Corrupted(format!(
                "{} is not a valid data container",
                path.display()
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Self::from_device(Box::new(file))
    }

    /// Use `device` as the data container, writing an empty header if it is empty
    pub fn from_device(device: Box<dyn BlockDevice>) -> Result<(Self, u32)> {
        if device.len_bytes()? == 0 {
            let mut header = [0u8; HEADER_SIZE as usize];
            header[0] = FORMAT_VERSION;
            device.write_all_at(0, &header)?;
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        device.read_exact_at(0, &mut header).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                StoreError::Corrupted("data container header is truncated".to_string())
            } else {
                StoreError::Io(e)
            }
        })?;

        if header[0] != FORMAT_VERSION {
            return Err(StoreError::Corrupted(format!(
                "Unsupported data container version: {}",
                header[0]
            )));
        }

        let total_blocks = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);

        Ok((Self { device }, total_blocks))
    }

    /// Persist `total_blocks` in the header
    pub fn write_header(&self, total_blocks: u32) -> std::io::Result<()> {
        let mut header = [0u8; HEADER_SIZE as usize];
        header[0] = FORMAT_VERSION;
        header[1..5].copy_from_slice(&total_blocks.to_le_bytes());
        self.device.write_all_at(0, &header)
    }

    /// Read block `id`
    ///
    /// Returns `None` when the block lies beyond `total_blocks` or past the end
    /// of the file: that space is unallocated, not an error.
    pub fn read_block(&self, id: u32, total_blocks: u32) -> std::io::Result<Option<Block>> {
        if id == 0 || id > total_blocks {
            return Ok(None);
        }

        let mut buf = [0u8; BLOCK_SIZE];
        match self.device.read_exact_at(block_offset(id), &mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }

        tracing::trace!(block = id, "read block");
        Ok(Some(Block::decode(&buf)))
    }

    /// Write block `id`
    pub fn write_block(&self, id: u32, block: &Block) -> std::io::Result<()> {
        tracing::trace!(block = id, next = block.next(), "write block");
        self.device.write_all_at(block_offset(id), &block.encode())
    }

    /// Overwrite block `id` with zeroes
    pub fn zero_block(&self, id: u32) -> std::io::Result<()> {
        tracing::trace!(block = id, "zero block");
        self.device.write_all_at(block_offset(id), &UNUSED_BLOCK)
    }

    /// Resize the file so it holds exactly `total_blocks` blocks
    ///
    /// Shrinking drops trailing blocks; growing zero-fills new ones.
    pub fn set_block_count(&self, total_blocks: u32) -> std::io::Result<()> {
        self.device.set_len(file_len_for(total_blocks))
    }

    /// Current file length in bytes
    pub fn file_len(&self) -> std::io::Result<u64> {
        self.device.len_bytes()
    }

    pub fn sync(&self) -> std::io::Result<()> {
        self.device.sync()
    }
}

impl std::fmt::Debug for DataFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFile")
            .field("len", &self.device.len_bytes().ok())
            .finish()
    }
}

/// Byte offset of block `id` (1-indexed)
pub fn block_offset(id: u32) -> u64 {
    HEADER_SIZE + (id as u64 - 1) * BLOCK_SIZE as u64
}

/// File length holding exactly `total_blocks` blocks
pub fn file_len_for(total_blocks: u32) -> u64 {
    HEADER_SIZE + total_blocks as u64 * BLOCK_SIZE as u64
}
