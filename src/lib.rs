//! A single-level filesystem layered directly on a fixed-size block device.
//!
//! `flatfs` turns an array of equally sized, individually addressable blocks
//! into named files with create/open/read/write/seek/delete/close semantics,
//! bounded file size, and persistent metadata (inode, directory entry,
//! free-space bitmap) that survive a restart. Block storage is abstracted
//! behind the [`io::BlockStorage`] trait; [`io::FileBlockEmulator`] provides
//! a file-backed device for development and testing.

mod alloc;
mod dir;
mod error;
mod node;

pub mod io;

mod fs;

pub use error::{ErrorKind, FsError};
pub use fs::{FileHandle, FlatFs, OpenMode};
pub use fs::{
    BLOCK_COUNT, BLOCK_SIZE, INDIRECT_ENTRIES, MAX_FILENAME_LEN, MAX_FILES, MAX_FILE_SIZE,
    NUM_DIRECT,
};
