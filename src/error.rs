//! Error taxonomy for the storage disk-I/O engine.
//!
//! Mirrors the error table as described for the storage core: each
//! variant names a trigger condition and carries enough context for the
//! network layer to choose a response status byte.

use std::fmt;

/// Result alias used throughout the storage core.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by the disk-I/O engine and trunk-file subsystem.
#[derive(Debug)]
pub enum StorageError {
    // NB: `Clone` is implemented by hand below since `std::io::Error`
    // isn't `Clone`.
    /// A request field was malformed (bad file ID, bad command body, ...).
    InvalidArgument(String),
    /// The reserved-storage threshold would be breached by this request.
    NoSpace,
    /// A file ID resolved to a path that does not exist on disk.
    NotFound,
    /// The trunk allocator found a non-zero header at the offset it
    /// believed free; the upload is refused to protect existing data.
    SlotOccupied,
    /// A read/write/lseek/ftruncate/unlink syscall failed.
    Io(std::io::Error),
    /// The CRC32 computed while streaming differs from the one recorded
    /// in a trunk slot header. The read is still served; this is a
    /// logged, non-fatal condition.
    CrcMismatch { expected: u32, computed: u32 },
    /// An append/modify/truncate was attempted on a non-appender file.
    NotAppender,
    /// The client disconnected mid-transfer; cleanup ran, no response
    /// is sent.
    Aborted,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            StorageError::NoSpace => write!(f, "no space left on configured store paths"),
            StorageError::NotFound => write!(f, "file not found"),
            StorageError::SlotOccupied => write!(f, "trunk slot already occupied"),
            StorageError::Io(err) => write!(f, "I/O error: {err}"),
            StorageError::CrcMismatch { expected, computed } => {
                write!(f, "crc32 mismatch: expected {expected:#010x}, computed {computed:#010x}")
            }
            StorageError::NotAppender => write!(f, "operation requires an appender file"),
            StorageError::Aborted => write!(f, "transfer aborted by client disconnect"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl Clone for StorageError {
    fn clone(&self) -> Self {
        match self {
            StorageError::InvalidArgument(msg) => StorageError::InvalidArgument(msg.clone()),
            StorageError::NoSpace => StorageError::NoSpace,
            StorageError::NotFound => StorageError::NotFound,
            StorageError::SlotOccupied => StorageError::SlotOccupied,
            StorageError::Io(err) => StorageError::Io(std::io::Error::new(err.kind(), err.to_string())),
            StorageError::CrcMismatch { expected, computed } => {
                StorageError::CrcMismatch { expected: *expected, computed: *computed }
            }
            StorageError::NotAppender => StorageError::NotAppender,
            StorageError::Aborted => StorageError::Aborted,
        }
    }
}

impl StorageError {
    /// Status byte sent back on the wire for this error, matching the
    /// storage server's response-header `status` field conventions
    /// (0 = success, otherwise an errno-like small integer).
    pub fn status_byte(&self) -> u8 {
        match self {
            StorageError::InvalidArgument(_) => libc::EINVAL as u8,
            StorageError::NoSpace => libc::ENOSPC as u8,
            StorageError::NotFound => libc::ENOENT as u8,
            StorageError::SlotOccupied => libc::EEXIST as u8,
            StorageError::Io(err) => err.raw_os_error().unwrap_or(libc::EIO) as u8,
            StorageError::CrcMismatch { .. } => 0,
            StorageError::NotAppender => libc::EOPNOTSUPP as u8,
            StorageError::Aborted => libc::ECONNRESET as u8,
        }
    }

    /// Whether the connection should be closed after reporting this error.
    pub fn closes_connection(&self) -> bool {
        matches!(self, StorageError::InvalidArgument(_) | StorageError::Aborted)
    }
}
