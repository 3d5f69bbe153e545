use std::mem;

use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::fs::MAX_FILENAME_LEN;

/// Size of the on-disk name field; names shorter than the field are
/// NUL-padded, so the longest legal name still leaves a terminating zero.
const NAME_FIELD: usize = MAX_FILENAME_LEN + 1;

const OPEN_FLAG: u8 = 0x01;

/// On-disk directory entry, one per directory-zone block and slot-aligned
/// with the inode zone: entry `i` names the file whose inode lives in inode
/// block `i`. The open flag is advisory metadata guarding against a second
/// concurrent handle, not a mutual-exclusion primitive.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug)]
pub struct DirEntry {
    name: [u8; NAME_FIELD],
    flags: u8,
    _reserved: u8,
    slot: u16,
}

impl DirEntry {
    /// Builds a closed entry for `name`. The name must already be validated;
    /// over-length names are rejected at the API boundary.
    pub fn new(name: &str, slot: usize) -> Self {
        debug_assert!(!name.is_empty() && name.len() <= MAX_FILENAME_LEN);
        let mut field = [0u8; NAME_FIELD];
        field[..name.len()].copy_from_slice(name.as_bytes());
        Self {
            name: field,
            flags: 0,
            _reserved: 0,
            slot: slot as u16,
        }
    }

    pub fn parse(buf: &[u8]) -> Option<Self> {
        Self::read_from(buf.get(..mem::size_of::<Self>())?)
    }

    /// Exact byte match against the NUL-terminated name field.
    pub fn name_matches(&self, name: &str) -> bool {
        let bytes = name.as_bytes();
        bytes.len() <= MAX_FILENAME_LEN
            && &self.name[..bytes.len()] == bytes
            && self.name[bytes.len()] == 0
    }

    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    pub fn is_open(&self) -> bool {
        self.flags & OPEN_FLAG != 0
    }

    pub fn set_open(&mut self, open: bool) {
        if open {
            self.flags |= OPEN_FLAG;
        } else {
            self.flags &= !OPEN_FLAG;
        }
    }
}
