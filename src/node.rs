use std::mem;

use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::fs::{INDIRECT_ENTRIES, NUM_DIRECT};
use crate::io::BlockNumber;

/// On-disk inode record, one per inode-zone block. `blocks` holds 13 direct
/// pointers plus the indirect block pointer in the last slot. A pointer of 0
/// means unallocated; block 0 is the bitmap, so no file data can ever live
/// there and 0 is safe as a sentinel.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug)]
pub struct Inode {
    /// File length in bytes.
    pub size: u32,
    blocks: [u16; NUM_DIRECT + 1],
}

impl Inode {
    pub fn empty() -> Self {
        Self {
            size: 0,
            blocks: [0; NUM_DIRECT + 1],
        }
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        Self::read_from(buf.get(..mem::size_of::<Self>())?)
    }

    /// Direct pointer `i`, or `None` while unallocated.
    pub fn direct(&self, i: usize) -> Option<BlockNumber> {
        assert!(i < NUM_DIRECT);
        match self.blocks[i] {
            0 => None,
            n => Some(n as BlockNumber),
        }
    }

    pub fn set_direct(&mut self, i: usize, blocknr: BlockNumber) {
        assert!(i < NUM_DIRECT);
        self.blocks[i] = blocknr as u16;
    }

    /// The indirect block pointer, or `None` while the file still fits in
    /// its direct blocks.
    pub fn indirect(&self) -> Option<BlockNumber> {
        match self.blocks[NUM_DIRECT] {
            0 => None,
            n => Some(n as BlockNumber),
        }
    }

    pub fn set_indirect(&mut self, blocknr: BlockNumber) {
        self.blocks[NUM_DIRECT] = blocknr as u16;
    }
}

/// A data-zone block holding further block pointers, referenced by the
/// inode's 14th slot. Extends a file past its 13 direct blocks; a zero entry
/// ends the populated prefix. Occupies exactly one block.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug)]
pub struct IndirectBlock {
    entries: [u16; INDIRECT_ENTRIES],
}

impl IndirectBlock {
    pub fn empty() -> Self {
        Self {
            entries: [0; INDIRECT_ENTRIES],
        }
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        Self::read_from(buf.get(..mem::size_of::<Self>())?)
    }

    pub fn entry(&self, i: usize) -> Option<BlockNumber> {
        assert!(i < INDIRECT_ENTRIES);
        match self.entries[i] {
            0 => None,
            n => Some(n as BlockNumber),
        }
    }

    pub fn set_entry(&mut self, i: usize, blocknr: BlockNumber) {
        assert!(i < INDIRECT_ENTRIES);
        self.entries[i] = blocknr as u16;
    }

    /// The populated prefix of the pointer table, in traversal order.
    pub fn populated(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.entries
            .iter()
            .take_while(|&&e| e != 0)
            .map(|&e| e as BlockNumber)
    }
}
