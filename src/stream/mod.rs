//! Byte stream abstraction (§4.A) and the local file/blob `Store`
//! implementation that ships with this crate (§1's scaffolding note).

mod file_store;
pub mod inflate;
pub mod utf8;

pub use file_store::{BlobStore, FileStore};

use crate::error::Result;

/// A named, openable source of bytes — a file, an in-memory blob, a
/// named pipe, an S3 object. Only the local file/blob variants ship in
/// this crate; S3/pipe sources are external collaborators (§1, §6).
pub trait Store: Send + Sync {
    /// Stable identifier used in error messages and for equality.
    fn id(&self) -> &str;

    /// Open a fresh byte stream positioned at the start of the store.
    fn open_read(&self) -> Result<Box<dyn Stream>>;
}

impl std::fmt::Debug for dyn Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Store({})", self.id())
    }
}

/// The byte-stream contract (§4.A): partial reads allowed, `0` from
/// `read` means EOF, optional zero-copy reads when backed by a memory
/// block.
pub trait Stream: Send {
    /// Read into `buf`, returning the number of bytes read (`0` at EOF).
    /// Partial reads are allowed.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Zero-copy read of `n` bytes when `supports_zero_copy()` is true.
    /// Default implementation copies into a fresh `Vec` and is always
    /// correct, just not zero-copy.
    fn read_slice(&mut self, n: usize) -> Result<bytes::Bytes> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let read = self.read(&mut buf[filled..])?;
            if read == 0 {
                buf.truncate(filled);
                break;
            }
            filled += read;
        }
        Ok(bytes::Bytes::from(buf))
    }

    fn seek(&mut self, pos: u64) -> Result<()>;

    fn size(&self) -> Result<u64>;

    fn position(&self) -> Result<u64>;

    fn seekable(&self) -> bool;

    fn supports_zero_copy(&self) -> bool {
        false
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Read until `buf` is full or the stream hits EOF, handling partial
/// reads transparently. Returns the number of bytes actually read.
pub fn read_full(stream: &mut dyn Stream, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
