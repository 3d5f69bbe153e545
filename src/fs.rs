use std::io;
use std::mem;

use log::{debug, info};
use zerocopy::AsBytes;

use crate::alloc::Bitmap;
use crate::dir::DirEntry;
use crate::error::{ErrorKind, FsError};
use crate::io::{BlockNumber, BlockStorage};
use crate::node::{Inode, IndirectBlock};

/// Bytes per device block, the only I/O granularity.
pub const BLOCK_SIZE: usize = 1024;
/// Total device blocks the filesystem is formatted across.
pub const BLOCK_COUNT: usize = 1024;
/// File slots; the inode and directory zones each hold one block per slot.
pub const MAX_FILES: usize = 64;
/// Direct block pointers per inode.
pub const NUM_DIRECT: usize = 13;
/// Block pointers held by one indirect block (u16 entries).
pub const INDIRECT_ENTRIES: usize = BLOCK_SIZE / 2;
/// Largest byte length a single file can reach.
pub const MAX_FILE_SIZE: usize = (NUM_DIRECT + INDIRECT_ENTRIES) * BLOCK_SIZE;
/// Longest accepted file name, in bytes.
pub const MAX_FILENAME_LEN: usize = 255;

/// Known locations.
const BITMAP_BLOCK: usize = 0;
const INODE_START: usize = 1;
const DIR_START: usize = INODE_START + MAX_FILES;
const DATA_START: usize = DIR_START + MAX_FILES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// In-memory state of one open file: byte position, mode, and cached copies
/// of the slot's inode and directory entry. Created by `create`/`open`,
/// invalidated by `close`. The cached records are the working set the
/// read/write engine mutates; every durable change is flushed to the device
/// before the call returns.
#[derive(Debug)]
pub struct FileHandle {
    slot: usize,
    mode: OpenMode,
    pos: usize,
    open: bool,
    inode: Inode,
    entry: DirEntry,
}

impl FileHandle {
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// A single-level filesystem session over owned block storage.
///
/// # Layout
/// =============================================================================
/// | Bitmap | Inode zone (1 block/slot) | Directory zone (1/slot) | Data region |
/// =============================================================================
///
/// Block 0 holds the occupancy bitmap, one bit per device block. A file's
/// inode and directory entry share a slot index; the directory zone is the
/// inode zone's index space offset by the zone size. The data region serves
/// file data blocks and indirect pointer blocks, allocated first-fit on
/// demand.
///
/// The session is single-threaded and synchronous. There is no journal: a
/// device failure mid-operation can leave bitmap, inode, and directory state
/// mutually inconsistent, and nothing is rolled back.
pub struct FlatFs<T: BlockStorage> {
    dev: T,
    bitmap: Bitmap,
    last_error: ErrorKind,
}

impl<T: BlockStorage> FlatFs<T> {
    /// Initializes the filesystem onto owned block storage, wiping whatever
    /// metadata the device held. One-time entry point, not part of
    /// steady-state operation.
    pub fn format(mut dev: T) -> Result<Self, FsError> {
        let mut bitmap = Bitmap::new();
        bitmap.set_used(BITMAP_BLOCK);

        // Scrub both metadata zones so no stale records survive a reformat.
        for blocknr in INODE_START..DATA_START {
            dev.write_block(blocknr, &[0u8; BLOCK_SIZE])?;
        }
        dev.write_block(BITMAP_BLOCK, bitmap.as_bytes())?;
        dev.sync_disk()?;

        info!(
            "formatted device: {} file slots, {} data blocks",
            MAX_FILES,
            BLOCK_COUNT - DATA_START
        );
        Ok(FlatFs {
            dev,
            bitmap,
            last_error: ErrorKind::None,
        })
    }

    /// Attaches to an already-formatted device, reading the bitmap back into
    /// memory. Fails if the device was never formatted.
    pub fn mount(mut dev: T) -> Result<Self, FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(BITMAP_BLOCK, &mut buf)?;
        let bitmap = Bitmap::parse(&buf).ok_or_else(|| corrupt("bitmap block"))?;

        // The bitmap's own bit is set at format time and never cleared.
        if !bitmap.is_used(BITMAP_BLOCK) {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "device is not formatted",
            )));
        }

        Ok(FlatFs {
            dev,
            bitmap,
            last_error: ErrorKind::None,
        })
    }

    /// Error kind reported by the most recent API call on this session;
    /// `ErrorKind::None` after a success.
    pub fn last_error(&self) -> ErrorKind {
        self.last_error
    }

    /// Creates a zero-length file with one data block already allocated and
    /// returns a handle opened in read-write mode.
    pub fn create(&mut self, name: &str) -> Result<FileHandle, FsError> {
        let result = self.create_inner(name);
        self.track(result)
    }

    /// Opens an existing closed file. At most one handle per file may be
    /// live at a time, enforced through the on-disk open flag.
    pub fn open(&mut self, name: &str, mode: OpenMode) -> Result<FileHandle, FsError> {
        let result = self.open_inner(name, mode);
        self.track(result)
    }

    /// Clears the file's on-disk open flag and invalidates the handle.
    /// Closing an already-closed handle reports `FileNotOpen` and touches no
    /// metadata.
    pub fn close(&mut self, handle: &mut FileHandle) -> Result<(), FsError> {
        let result = self.close_inner(handle);
        self.track(result)
    }

    /// Reads up to `buf.len()` bytes at the current position, returning the
    /// count actually copied. Stops early at end of file or at an
    /// unallocated block pointer.
    pub fn read(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        let result = self.read_inner(handle, buf);
        self.track(result)
    }

    /// Writes `data` at the current position, allocating blocks on demand,
    /// and returns the count written. On `OutOfSpace` or
    /// `ExceedsMaxFileSize` the bytes already written stay persisted and the
    /// file size reflects them; nothing is rolled back.
    pub fn write(&mut self, handle: &mut FileHandle, data: &[u8]) -> Result<usize, FsError> {
        let result = self.write_inner(handle, data);
        self.track(result)
    }

    /// Moves the file position. Positions past the current end of file (or
    /// past the largest addressable offset) are rejected.
    pub fn seek(&mut self, handle: &mut FileHandle, pos: usize) -> Result<(), FsError> {
        let result = self.seek_inner(handle, pos);
        self.track(result)
    }

    /// Removes a closed file, returning every block it referenced to the
    /// free pool. The bitmap is persisted once, at the end.
    pub fn delete(&mut self, name: &str) -> Result<(), FsError> {
        let result = self.delete_inner(name);
        self.track(result)
    }

    /// Pure lookup; mutates nothing.
    pub fn exists(&mut self, name: &str) -> Result<bool, FsError> {
        let result = self.lookup(name).map(|found| found.is_some());
        self.track(result)
    }

    /// Current file length in bytes, from the handle's cached inode.
    pub fn length(&mut self, handle: &FileHandle) -> usize {
        self.last_error = ErrorKind::None;
        handle.inode.size as usize
    }

    /// Free blocks remaining in the data region.
    pub fn free_data_blocks(&self) -> usize {
        self.bitmap.count_free_in(DATA_START..BLOCK_COUNT)
    }

    /// Unused file slots remaining.
    pub fn free_slots(&self) -> usize {
        self.bitmap.count_free_in(INODE_START..DIR_START)
    }

    fn track<V>(&mut self, result: Result<V, FsError>) -> Result<V, FsError> {
        self.last_error = match &result {
            Ok(_) => ErrorKind::None,
            Err(e) => e.kind(),
        };
        result
    }

    fn create_inner(&mut self, name: &str) -> Result<FileHandle, FsError> {
        check_name(name)?;
        self.reload_bitmap()?;
        if self.lookup(name)?.is_some() {
            return Err(FsError::FileAlreadyExists);
        }

        let slot = self
            .bitmap
            .first_free_in(INODE_START..DIR_START)
            .map(|blocknr| blocknr - INODE_START)
            .ok_or(FsError::OutOfSpace)?;
        let first = self
            .bitmap
            .first_free_in(DATA_START..BLOCK_COUNT)
            .ok_or(FsError::OutOfSpace)?;

        self.bitmap.set_used(INODE_START + slot);
        self.bitmap.set_used(DIR_START + slot);
        self.bitmap.set_used(first);
        self.persist_bitmap()?;
        self.zero_block(first)?;

        let mut inode = Inode::empty();
        inode.set_direct(0, first);
        self.write_inode(slot, &inode)?;

        let entry = DirEntry::new(name, slot);
        self.write_entry(slot, &entry)?;

        debug!(
            "created {:?} in slot {} (first data block {})",
            name, slot, first
        );
        self.open_slot(slot, entry, inode, OpenMode::ReadWrite)
    }

    fn open_inner(&mut self, name: &str, mode: OpenMode) -> Result<FileHandle, FsError> {
        let (slot, entry) = self.lookup(name)?.ok_or(FsError::FileNotFound)?;
        if entry.is_open() {
            return Err(FsError::FileOpen);
        }
        let inode = self.read_inode(slot)?;
        self.open_slot(slot, entry, inode, mode)
    }

    /// Marks the on-disk open flag and hands out the handle; shared tail of
    /// `open` and the implicit open performed by `create`.
    fn open_slot(
        &mut self,
        slot: usize,
        mut entry: DirEntry,
        inode: Inode,
        mode: OpenMode,
    ) -> Result<FileHandle, FsError> {
        entry.set_open(true);
        self.write_entry(slot, &entry)?;
        Ok(FileHandle {
            slot,
            mode,
            pos: 0,
            open: true,
            inode,
            entry,
        })
    }

    fn close_inner(&mut self, handle: &mut FileHandle) -> Result<(), FsError> {
        if !handle.open {
            return Err(FsError::FileNotOpen);
        }
        handle.entry.set_open(false);
        self.write_entry(handle.slot, &handle.entry)?;
        handle.open = false;
        Ok(())
    }

    fn read_inner(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        if !handle.open {
            return Err(FsError::FileNotOpen);
        }

        let end = (handle.inode.size as usize).min(handle.pos.saturating_add(buf.len()));
        let mut pos = handle.pos;
        let mut copied = 0;
        let mut block = [0u8; BLOCK_SIZE];
        while pos < end {
            let index = pos / BLOCK_SIZE;
            let offset = pos % BLOCK_SIZE;
            let blocknr = match self.block_at(&handle.inode, index)? {
                Some(n) => n,
                // A hole left by an aborted write ends the readable prefix.
                None => break,
            };
            let n = (BLOCK_SIZE - offset).min(end - pos);
            self.dev.read_block(blocknr, &mut block)?;
            buf[copied..copied + n].copy_from_slice(&block[offset..offset + n]);
            pos += n;
            copied += n;
        }
        handle.pos = pos;
        Ok(copied)
    }

    fn write_inner(&mut self, handle: &mut FileHandle, data: &[u8]) -> Result<usize, FsError> {
        if !handle.open {
            return Err(FsError::FileNotOpen);
        }
        if handle.mode == OpenMode::ReadOnly {
            return Err(FsError::FileReadOnly);
        }

        let mut pos = handle.pos;
        let mut written = 0;
        let mut block = [0u8; BLOCK_SIZE];
        let outcome = loop {
            if written == data.len() {
                break Ok(());
            }
            if pos >= MAX_FILE_SIZE {
                break Err(FsError::ExceedsMaxFileSize);
            }
            let index = pos / BLOCK_SIZE;
            let offset = pos % BLOCK_SIZE;
            let blocknr = match self.ensure_block(handle, index) {
                Ok(n) => n,
                Err(e) => break Err(e),
            };
            let n = (BLOCK_SIZE - offset).min(data.len() - written);
            // Partial blocks are read back first so bytes outside the write
            // window survive; a full-block overwrite skips the read.
            if n < BLOCK_SIZE {
                self.dev.read_block(blocknr, &mut block)?;
            }
            block[offset..offset + n].copy_from_slice(&data[written..written + n]);
            self.dev.write_block(blocknr, &block)?;
            pos += n;
            written += n;
        };

        handle.pos = pos;
        if pos > handle.inode.size as usize {
            handle.inode.size = pos as u32;
            self.write_inode(handle.slot, &handle.inode)?;
        }
        outcome.map(|_| written)
    }

    fn seek_inner(&mut self, handle: &mut FileHandle, pos: usize) -> Result<(), FsError> {
        if !handle.open {
            return Err(FsError::FileNotOpen);
        }
        if pos > handle.inode.size as usize || pos > MAX_FILE_SIZE {
            return Err(FsError::ExceedsMaxFileSize);
        }
        handle.pos = pos;
        Ok(())
    }

    fn delete_inner(&mut self, name: &str) -> Result<(), FsError> {
        self.reload_bitmap()?;
        let (slot, entry) = self.lookup(name)?.ok_or(FsError::FileNotFound)?;
        if entry.is_open() {
            return Err(FsError::FileOpen);
        }
        let inode = self.read_inode(slot)?;

        for i in 0..NUM_DIRECT {
            if let Some(blocknr) = inode.direct(i) {
                self.bitmap.set_free(blocknr);
            }
        }
        if let Some(indirect) = inode.indirect() {
            let table = self.read_indirect(indirect)?;
            for blocknr in table.populated() {
                self.bitmap.set_free(blocknr);
            }
            self.bitmap.set_free(indirect);
        }
        self.bitmap.set_free(INODE_START + slot);
        self.bitmap.set_free(DIR_START + slot);

        // Scrub the slot pair so a stale name can never match a later lookup.
        self.zero_block(INODE_START + slot)?;
        self.zero_block(DIR_START + slot)?;
        self.persist_bitmap()?;

        info!("deleted {:?} from slot {}", name, slot);
        Ok(())
    }

    /// Scans the used slots for a directory entry matching `name`. Entries
    /// are always re-read from the device, never cached across calls.
    fn lookup(&mut self, name: &str) -> Result<Option<(usize, DirEntry)>, FsError> {
        for slot in 0..MAX_FILES {
            if !self.bitmap.is_used(INODE_START + slot) {
                continue;
            }
            let entry = self.read_entry(slot)?;
            if entry.name_matches(name) {
                return Ok(Some((slot, entry)));
            }
        }
        Ok(None)
    }

    /// Resolves a file's logical block index to a device block without
    /// allocating; `None` means the pointer is unallocated.
    fn block_at(&mut self, inode: &Inode, index: usize) -> Result<Option<BlockNumber>, FsError> {
        if index < NUM_DIRECT {
            return Ok(inode.direct(index));
        }
        let entry = index - NUM_DIRECT;
        if entry >= INDIRECT_ENTRIES {
            return Err(FsError::ExceedsMaxFileSize);
        }
        match inode.indirect() {
            Some(indirect) => Ok(self.read_indirect(indirect)?.entry(entry)),
            None => Ok(None),
        }
    }

    /// Resolves a logical block index for writing, allocating the data block
    /// (and the indirect block itself, when first crossing block index 13)
    /// on demand. Pointer updates are persisted before returning.
    fn ensure_block(
        &mut self,
        handle: &mut FileHandle,
        index: usize,
    ) -> Result<BlockNumber, FsError> {
        if index < NUM_DIRECT {
            if let Some(blocknr) = handle.inode.direct(index) {
                return Ok(blocknr);
            }
            let blocknr = self.alloc_data_block()?;
            handle.inode.set_direct(index, blocknr);
            self.write_inode(handle.slot, &handle.inode)?;
            return Ok(blocknr);
        }

        let entry = index - NUM_DIRECT;
        if entry >= INDIRECT_ENTRIES {
            return Err(FsError::ExceedsMaxFileSize);
        }
        let indirect = match handle.inode.indirect() {
            Some(blocknr) => blocknr,
            None => {
                // The fresh block comes back zeroed, which is exactly an
                // empty pointer table.
                let blocknr = self.alloc_data_block()?;
                handle.inode.set_indirect(blocknr);
                self.write_inode(handle.slot, &handle.inode)?;
                blocknr
            }
        };
        let mut table = self.read_indirect(indirect)?;
        if let Some(blocknr) = table.entry(entry) {
            return Ok(blocknr);
        }
        let blocknr = self.alloc_data_block()?;
        table.set_entry(entry, blocknr);
        self.dev.write_block(indirect, table.as_bytes())?;
        Ok(blocknr)
    }

    /// First-fit allocation in the data region. The fresh block is zeroed
    /// and the bitmap is persisted before the block number is handed out.
    fn alloc_data_block(&mut self) -> Result<BlockNumber, FsError> {
        let blocknr = self
            .bitmap
            .first_free_in(DATA_START..BLOCK_COUNT)
            .ok_or(FsError::OutOfSpace)?;
        self.bitmap.set_used(blocknr);
        self.persist_bitmap()?;
        self.zero_block(blocknr)?;
        debug!("allocated data block {}", blocknr);
        Ok(blocknr)
    }

    fn reload_bitmap(&mut self) -> Result<(), FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev.read_block(BITMAP_BLOCK, &mut buf)?;
        self.bitmap = Bitmap::parse(&buf).ok_or_else(|| corrupt("bitmap block"))?;
        Ok(())
    }

    fn persist_bitmap(&mut self) -> Result<(), FsError> {
        self.dev.write_block(BITMAP_BLOCK, self.bitmap.as_bytes())?;
        Ok(())
    }

    fn zero_block(&mut self, blocknr: BlockNumber) -> Result<(), FsError> {
        self.dev.write_block(blocknr, &[0u8; BLOCK_SIZE])?;
        Ok(())
    }

    fn read_inode(&mut self, slot: usize) -> Result<Inode, FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev.read_block(INODE_START + slot, &mut buf)?;
        Inode::parse(&buf).ok_or_else(|| corrupt("inode block"))
    }

    fn write_inode(&mut self, slot: usize, inode: &Inode) -> Result<(), FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[..mem::size_of::<Inode>()].copy_from_slice(inode.as_bytes());
        self.dev.write_block(INODE_START + slot, &buf)?;
        Ok(())
    }

    fn read_indirect(&mut self, blocknr: BlockNumber) -> Result<IndirectBlock, FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev.read_block(blocknr, &mut buf)?;
        IndirectBlock::parse(&buf).ok_or_else(|| corrupt("indirect block"))
    }

    fn read_entry(&mut self, slot: usize) -> Result<DirEntry, FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.dev.read_block(DIR_START + slot, &mut buf)?;
        let entry = DirEntry::parse(&buf).ok_or_else(|| corrupt("directory block"))?;
        if entry.slot() != slot {
            return Err(corrupt("directory entry slot index"));
        }
        Ok(entry)
    }

    fn write_entry(&mut self, slot: usize, entry: &DirEntry) -> Result<(), FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[..mem::size_of::<DirEntry>()].copy_from_slice(entry.as_bytes());
        self.dev.write_block(DIR_START + slot, &buf)?;
        Ok(())
    }
}

fn check_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name.len() > MAX_FILENAME_LEN || name.as_bytes().contains(&0) {
        return Err(FsError::IllegalFilename);
    }
    Ok(())
}

fn corrupt(what: &str) -> FsError {
    FsError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("corrupt {}", what),
    ))
}
