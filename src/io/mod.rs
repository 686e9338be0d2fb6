pub mod buffer;

// Re-exports
pub use buffer::{AlignedBuffer, PAGE_SIZE, SECTOR_SIZE};

use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::Path;

/// Result type for I/O operations
pub type IOResult<T> = Result<T, IOError>;

/// I/O specific errors
#[derive(Debug, thiserror::Error)]
pub enum IOError {
    #[error("I/O operation failed: {0}")]
    OperationFailed(String),

    #[error("Alignment error: {0}")]
    AlignmentError(String),

    #[error("Buffer allocation failed: {0}")]
    AllocationFailed(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Open a target for destructive writing.
///
/// `direct` requests O_DIRECT so writes bypass the page cache; callers must
/// then use aligned buffers, offsets and lengths. Existing content is never
/// truncated - the whole point is overwriting it in place.
pub fn open_for_write(path: &Path, direct: bool) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if direct {
        options.custom_flags(libc::O_DIRECT);
    }
    options.open(path)
}

/// Positional write of the whole buffer, riding out partial writes and
/// EINTR. No seeking, so concurrent chunk writers can share nothing.
pub fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    while !buf.is_empty() {
        match file.write_at(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "device accepted zero bytes",
                ))
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Flush written data to stable storage (fdatasync). Progress must only be
/// reported for bytes that survive a crash.
pub fn flush_data(file: &File) -> std::io::Result<()> {
    file.sync_data()
}
