//! Segment descriptor file
//!
//! Persists the free list as a count-prefixed array of block ids.
//!
//! ## File Format
//! ```text
//! ┌────────────┬──────────┬──────────┬─────┐
//! │ Count (4)  │ Id 1 (4) │ Id 2 (4) │ ... │
//! └────────────┴──────────┴──────────┴─────┘
//! ```
//! All integers are little-endian.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::error::{Result, StoreError};

/// Header size: Count (4)
pub const HEADER_SIZE: u64 = 4;

/// Size of one listed id
pub const ITEM_SIZE: u64 = 4;

/// Handle to the segment descriptor
#[derive(Debug)]
pub struct SegmentFile {
    file: File,
}

impl SegmentFile {
    /// Open the descriptor, creating an empty one when missing
    ///
    /// Returns the handle and the listed ids in file order.
    pub fn open(path: &Path) -> Result<(Self, Vec<u32>)> {
        if path.exists() && !path.is_file() {
            return Err(StoreError::Corrupted(format!(
                "{} is not a valid segment descriptor",
                path.display()
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        if file_len == 0 {
            file.write_all_at(&0u32.to_le_bytes(), 0)?;
            return Ok((Self { file }, Vec::new()));
        }

        if file_len < HEADER_SIZE {
            return Err(StoreError::Corrupted(
                "segment descriptor header is truncated".to_string(),
            ));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact_at(&mut header, 0)?;
        let count = u32::from_le_bytes(header) as u64;

        let body_len = count * ITEM_SIZE;
        if file_len < HEADER_SIZE + body_len {
            return Err(StoreError::Corrupted(format!(
                "segment descriptor lists {} ids but holds only {} bytes",
                count, file_len
            )));
        }

        let mut body = vec![0u8; body_len as usize];
        file.read_exact_at(&mut body, HEADER_SIZE)?;

        let ids = body
            .chunks_exact(ITEM_SIZE as usize)
            .map(|item| u32::from_le_bytes([item[0], item[1], item[2], item[3]]))
            .collect();

        Ok((Self { file }, ids))
    }

    /// Replace the persisted list with `ids`
    ///
    /// The whole image is written in one call, then the file is cut to size.
    pub fn store<'a>(&self, ids: impl ExactSizeIterator<Item = &'a u32>) -> std::io::Result<()> {
        let count = ids.len();
        let mut image = Vec::with_capacity(HEADER_SIZE as usize + count * ITEM_SIZE as usize);
        image.extend_from_slice(&(count as u32).to_le_bytes());
        for id in ids {
            image.extend_from_slice(&id.to_le_bytes());
        }

        self.file.write_all_at(&image, 0)?;
        self.file.set_len(image.len() as u64)
    }

    pub fn sync(&self) -> std::io::Result<()> {
        self.file.sync_all()
    }
}
