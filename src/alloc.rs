use std::ops::Range;

use crate::fs::BLOCK_SIZE;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Occupancy state of a single device block.
#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// One block worth of occupancy bits, one bit per device block. Bit 1 means
/// the block is in use. A 1KiB bitmap block tracks up to 8192 blocks, which
/// bounds the largest device the filesystem can be formatted across.
///
/// Bit 0 covers the bitmap's own block and is set at format time, never
/// cleared; the metadata slot bits and data-zone bits come and go with file
/// lifetimes.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy)]
pub struct Bitmap {
    bits: [u8; BLOCK_SIZE],
}

impl Bitmap {
    pub fn new() -> Self {
        Self {
            bits: [0; BLOCK_SIZE],
        }
    }

    /// Decodes a bitmap from a block-sized buffer. Returns `None` if the
    /// buffer is shorter than one block.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        Self::read_from(buf.get(..BLOCK_SIZE)?)
    }

    pub fn get(&self, blocknr: usize) -> State {
        assert!(blocknr < BLOCK_SIZE * 8);
        let mask = 1u8 << (blocknr % 8);
        if self.bits[blocknr / 8] & mask == 0 {
            State::Free
        } else {
            State::Used
        }
    }

    pub fn is_used(&self, blocknr: usize) -> bool {
        matches!(self.get(blocknr), State::Used)
    }

    pub fn set_used(&mut self, blocknr: usize) {
        assert!(blocknr < BLOCK_SIZE * 8);
        self.bits[blocknr / 8] |= 1u8 << (blocknr % 8);
    }

    pub fn set_free(&mut self, blocknr: usize) {
        assert!(blocknr < BLOCK_SIZE * 8);
        self.bits[blocknr / 8] &= !(1u8 << (blocknr % 8));
    }

    /// First-fit scan: the lowest clear bit within `range`, if any. Callers
    /// pass the index range of the zone they allocate from, so metadata and
    /// data allocations can never hand out each other's blocks.
    pub fn first_free_in(&self, range: Range<usize>) -> Option<usize> {
        range.into_iter().find(|&n| !self.is_used(n))
    }

    pub fn count_free_in(&self, range: Range<usize>) -> usize {
        range.into_iter().filter(|&n| !self.is_used(n)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_read_and_write_values_to_bitmap() {
        let mut bmp = Bitmap::new();

        bmp.set_used(2);

        assert_eq!(bmp.get(0), State::Free);
        assert_eq!(bmp.get(2), State::Used);
    }

    #[test]
    fn can_set_values_at_ends_of_bitmap() {
        let mut bmp = Bitmap::new();

        bmp.set_used(0);
        bmp.set_used(BLOCK_SIZE * 8 - 1);

        assert_eq!(bmp.get(0), State::Used);
        assert_eq!(bmp.get(BLOCK_SIZE * 8 - 1), State::Used);
    }

    #[test]
    fn can_toggle_block_between_free_and_used() {
        let mut bmp = Bitmap::new();

        bmp.set_used(10);
        assert_eq!(bmp.get(10), State::Used);

        bmp.set_free(10);
        assert_eq!(bmp.get(10), State::Free);
    }

    #[test]
    fn freeing_one_block_leaves_neighbors_used() {
        let mut bmp = Bitmap::new();

        bmp.set_used(8);
        bmp.set_used(9);
        bmp.set_used(10);
        bmp.set_free(9);

        assert_eq!(bmp.get(8), State::Used);
        assert_eq!(bmp.get(9), State::Free);
        assert_eq!(bmp.get(10), State::Used);
    }

    #[test]
    fn first_fit_scan_skips_used_blocks() {
        let mut bmp = Bitmap::new();

        bmp.set_used(128);
        bmp.set_used(129);
        bmp.set_used(131);

        assert_eq!(bmp.first_free_in(128..256), Some(130));
        assert_eq!(bmp.first_free_in(128..130), None);
        assert_eq!(bmp.count_free_in(128..132), 1);
    }

    #[test]
    fn can_serialize_and_deserialize_state() {
        let mut bmp = Bitmap::new();
        bmp.set_used(10);
        bmp.set_used(11);
        bmp.set_used(12);

        let read_bmp = Bitmap::parse(bmp.as_bytes()).unwrap();
        assert_eq!(read_bmp.get(10), State::Used);
        assert_eq!(read_bmp.get(11), State::Used);
        assert_eq!(read_bmp.get(12), State::Used);
        assert_eq!(read_bmp.get(13), State::Free);
    }
}
