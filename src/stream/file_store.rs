use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{DataReaderError, Result};
use crate::stream::{Store, Stream};

/// A `Store` backed by a file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> FileStore {
        FileStore { path: path.into() }
    }
}

impl Store for FileStore {
    fn id(&self) -> &str {
        self.path.to_str().unwrap_or("<non-utf8 path>")
    }

    fn open_read(&self) -> Result<Box<dyn Stream>> {
        let file = File::open(&self.path)
            .map_err(|e| DataReaderError::from_io(self.id(), e))?;
        Ok(Box::new(FileStream { file }))
    }
}

struct FileStream {
    file: File,
}

impl Stream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    fn seekable(&self) -> bool {
        true
    }
}

/// A `Store` backed by an in-memory, reference-counted blob. Supports
/// zero-copy reads since the whole block is already resident.
#[derive(Debug, Clone)]
pub struct BlobStore {
    id: String,
    data: Arc<Bytes>,
}

impl BlobStore {
    pub fn new(id: impl Into<String>, data: impl Into<Bytes>) -> BlobStore {
        BlobStore {
            id: id.into(),
            data: Arc::new(data.into()),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<BlobStore> {
        let path = path.as_ref();
        let id = path.to_string_lossy().into_owned();
        let data = std::fs::read(path).map_err(|e| DataReaderError::from_io(&id, e))?;
        Ok(BlobStore::new(id, data))
    }
}

impl Store for BlobStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn open_read(&self) -> Result<Box<dyn Stream>> {
        Ok(Box::new(BlobStream {
            data: self.data.clone(),
            pos: 0,
        }))
    }
}

struct BlobStream {
    data: Arc<Bytes>,
    pos: usize,
}

impl Stream for BlobStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }

    fn read_slice(&mut self, n: usize) -> Result<Bytes> {
        let n = n.min(self.data.len() - self.pos);
        let slice = self.data.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(slice)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = (pos as usize).min(self.data.len());
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn position(&self) -> Result<u64> {
        Ok(self.pos as u64)
    }

    fn seekable(&self) -> bool {
        true
    }

    fn supports_zero_copy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_store_round_trip() {
        let store = BlobStore::new("mem://x", Bytes::from_static(b"hello world"));
        let mut stream = store.open_read().unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(stream.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(stream.position().unwrap(), 5);
    }

    #[test]
    fn blob_store_zero_copy_slice() {
        let store = BlobStore::new("mem://x", Bytes::from_static(b"hello world"));
        let mut stream = store.open_read().unwrap();
        assert!(stream.supports_zero_copy());
        let slice = stream.read_slice(5).unwrap();
        assert_eq!(&slice[..], b"hello");
    }

    #[test]
    fn file_store_missing_file_maps_not_found() {
        let store = FileStore::new("/nonexistent/path/for/sure.csv");
        let err = store.open_read().unwrap_err();
        assert!(matches!(err, DataReaderError::NoSuchFile { .. }));
    }
}
