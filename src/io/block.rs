use std::path::Path;

/// The block number to access, ranging from 0 (the first block) to n - 1
/// (the last block) where n is the number of blocks available.
pub type BlockNumber = usize;

/// Contract for the underlying block device: a fixed number of fixed-size
/// blocks, readable and writable only at block granularity. Whole-block
/// writes either land completely or fail; no partial-block state is ever
/// visible through this interface.
pub trait BlockStorage {
    /// Opens an existing disk image at the specified path. This method does
    /// not validate the storage blocks; it is up to clients to ensure disks
    /// are appropriately initialized.
    fn open_disk<P: AsRef<Path>>(path: P, nblocks: usize) -> std::io::Result<Self>
    where
        Self: std::marker::Sized;

    /// Reads disk block `blocknr` into the front of the provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range, or into a buffer smaller
    /// than one block, returns an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;

    /// Writes the provided buffer into the specified block number. Buffers
    /// longer than one block are truncated to the block size.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range returns an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;

    /// Flushes any buffered disk IO from memory. This is useful if it must
    /// be guaranteed the disk writes actually occurred, for instance before
    /// the medium is re-read by another session.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}
