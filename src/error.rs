use thiserror::Error;

/// Bare discriminant of the last error, reported by
/// [`FlatFs::last_error`](crate::FlatFs::last_error). Unlike [`FsError`] this
/// is `Copy` and has a `None` variant meaning "the last call succeeded".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    None,
    OutOfSpace,
    FileNotOpen,
    FileOpen,
    FileNotFound,
    FileReadOnly,
    FileAlreadyExists,
    ExceedsMaxFileSize,
    IllegalFilename,
    Io,
}

#[derive(Error, Debug)]
pub enum FsError {
    #[error("no free file slot or data block left")]
    OutOfSpace,
    #[error("file is not open")]
    FileNotOpen,
    #[error("file is already open")]
    FileOpen,
    #[error("no file with that name")]
    FileNotFound,
    #[error("file handle is read-only")]
    FileReadOnly,
    #[error("a file with that name already exists")]
    FileAlreadyExists,
    #[error("position past end of file or maximum file size")]
    ExceedsMaxFileSize,
    #[error("illegal file name")]
    IllegalFilename,
    #[error("block device failure")]
    Io(#[from] std::io::Error),
}

impl FsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::OutOfSpace => ErrorKind::OutOfSpace,
            FsError::FileNotOpen => ErrorKind::FileNotOpen,
            FsError::FileOpen => ErrorKind::FileOpen,
            FsError::FileNotFound => ErrorKind::FileNotFound,
            FsError::FileReadOnly => ErrorKind::FileReadOnly,
            FsError::FileAlreadyExists => ErrorKind::FileAlreadyExists,
            FsError::ExceedsMaxFileSize => ErrorKind::ExceedsMaxFileSize,
            FsError::IllegalFilename => ErrorKind::IllegalFilename,
            FsError::Io(_) => ErrorKind::Io,
        }
    }
}
