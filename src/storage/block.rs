//! Block codec
//!
//! Encodes and decodes the fixed-size unit of the data container.
//!
//! ## Block Layout (261 bytes)
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────────────────────┐
//! │ Attr (1) │ Next (4) │ Len (1)  │ Content (255, zero pad)  │
//! └──────────┴──────────┴──────────┴──────────────────────────┘
//! ```
//! - Attr bit 7: block is allocated
//! - Attr bit 6: block leads a record chain
//! - Next: little-endian id of the following block, 0 terminates the chain

/// Attribute bit: block belongs to a live chain
pub const ATTR_ALLOCATED: u8 = 0x80;

/// Attribute bit: block is the head of its chain
pub const ATTR_LEADING: u8 = 0x40;

/// Bytes of header in front of the content slot: attr (1) + next (4) + len (1)
pub const BLOCK_HEADER_SIZE: usize = 6;

/// Size of the content slot
pub const BLOCK_CONTENT_SIZE: usize = 255;

/// Total on-disk size of one block
pub const BLOCK_SIZE: usize = BLOCK_HEADER_SIZE + BLOCK_CONTENT_SIZE;

/// Encoded image of a free block
pub const UNUSED_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// One decoded block
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    attributes: u8,
    next: u32,
    len: u8,
    content: [u8; BLOCK_CONTENT_SIZE],
}

impl Block {
    /// Build an allocated block holding `content` (at most 255 bytes)
    ///
    /// Longer input is cut at the slot size; callers chunk records beforehand.
    pub fn new(content: &[u8], next: u32, leading: bool) -> Self {
        let len = content.len().min(BLOCK_CONTENT_SIZE);
        let mut slot = [0u8; BLOCK_CONTENT_SIZE];
        slot[..len].copy_from_slice(&content[..len]);

        let mut attributes = ATTR_ALLOCATED;
        if leading {
            attributes |= ATTR_LEADING;
        }

        Self {
            attributes,
            next,
            len: len as u8,
            content: slot,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.attributes & ATTR_ALLOCATED != 0
    }

    /// True for the head of an allocated chain
    pub fn is_leading(&self) -> bool {
        self.is_allocated() && self.attributes & ATTR_LEADING != 0
    }

    /// Id of the next block in the chain (0 = end)
    pub fn next(&self) -> u32 {
        self.next
    }

    /// Valid content bytes
    pub fn content(&self) -> &[u8] {
        &self.content[..self.len as usize]
    }

    pub fn content_len(&self) -> usize {
        self.len as usize
    }

    /// Encode to the exact on-disk image
    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0] = self.attributes;
        buf[1..5].copy_from_slice(&self.next.to_le_bytes());
        buf[5] = self.len;
        buf[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + self.len as usize]
            .copy_from_slice(self.content());
        buf
    }

    /// Decode an on-disk image
    ///
    /// Bytes past the content length are ignored, so padding need not be zero.
    pub fn decode(buf: &[u8; BLOCK_SIZE]) -> Self {
        let mut next = [0u8; 4];
        next.copy_from_slice(&buf[1..5]);

        let len = buf[5];
        let mut content = [0u8; BLOCK_CONTENT_SIZE];
        content[..len as usize]
            .copy_from_slice(&buf[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + len as usize]);

        Self {
            attributes: buf[0],
            next: u32::from_le_bytes(next),
            len,
            content,
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("attributes", &format_args!("{:#04x}", self.attributes))
            .field("next", &self.next)
            .field("len", &self.len)
            .finish()
    }
}

/// Number of blocks needed for a record of `len` bytes (at least one)
pub fn blocks_for(len: usize) -> usize {
    if len == 0 {
        1
    } else {
        len.div_ceil(BLOCK_CONTENT_SIZE)
    }
}

/// Split a record into per-block chunks; an empty record yields one empty chunk
pub fn chunks(data: &[u8]) -> Vec<&[u8]> {
    if data.is_empty() {
        vec![data]
    } else {
        data.chunks(BLOCK_CONTENT_SIZE).collect()
    }
}
