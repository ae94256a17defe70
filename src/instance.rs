//! Instance reader (§4.C): reassembles split RecordIO sequences into
//! whole instances and walks a list of stores in order.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{DataReaderError, Result};
use crate::record::{RecordKind, RecordReader};
use crate::stream::{Store, Stream};

/// One logical unit of input: a whole text line, a whole RecordIO
/// message (possibly reassembled from Begin/Middle/End parts), or the
/// lazily-loaded bits of a whole store treated as a single instance.
#[derive(Debug, Clone)]
pub struct Instance {
    pub bits: Bytes,
}

/// Builds a `RecordReader` for a given store. Supplied by the concrete
/// decoder (CSV vs. RecordIO-Protobuf), matching §4.C's "factory chosen
/// by the concrete data-reader subclass."
pub trait RecordReaderFactory: Send + Sync {
    fn make_record_reader(&self, store: &dyn Store) -> Result<Box<dyn RecordReader>>;
}

/// Iterates instances across an ordered list of stores (§4.C).
pub struct InstanceReader {
    stores: Arc<[Box<dyn Store>]>,
    factory: Box<dyn RecordReaderFactory>,
    treat_empty_store_as_single_instance: bool,

    store_index: usize,
    current: Option<Box<dyn RecordReader>>,
    /// `Some` once a store has been opened but emitted no records yet,
    /// tracking whether the single-instance fallback should fire.
    current_store_record_count: usize,
    current_store: Option<String>,

    /// Latched once a split-record sequence goes wrong; every
    /// subsequent read re-raises until `reset`.
    corrupt: Option<DataReaderError>,
    instance_index: usize,
}

impl InstanceReader {
    pub fn new(
        stores: Vec<Box<dyn Store>>,
        factory: Box<dyn RecordReaderFactory>,
        treat_empty_store_as_single_instance: bool,
    ) -> InstanceReader {
        Self::new_shared(Arc::from(stores), factory, treat_empty_store_as_single_instance)
    }

    /// Like `new`, but shares an already-`Arc`'d store list with another
    /// reader — used by the parallel engine to probe the first instance
    /// for schema inference without consuming the real iteration (§4.F).
    pub fn new_shared(
        stores: Arc<[Box<dyn Store>]>,
        factory: Box<dyn RecordReaderFactory>,
        treat_empty_store_as_single_instance: bool,
    ) -> InstanceReader {
        InstanceReader {
            stores,
            factory,
            treat_empty_store_as_single_instance,
            store_index: 0,
            current: None,
            current_store_record_count: 0,
            current_store: None,
            corrupt: None,
            instance_index: 0,
        }
    }

    pub fn reset(&mut self) {
        self.store_index = 0;
        self.current = None;
        self.current_store_record_count = 0;
        self.current_store = None;
        self.corrupt = None;
        self.instance_index = 0;
    }

    fn open_next_store(&mut self) -> Result<bool> {
        if self.store_index >= self.stores.len() {
            return Ok(false);
        }
        let store = self.stores[self.store_index].as_ref();
        let reader = self
            .factory
            .make_record_reader(store)
            .map_err(|e| wrap_store_error(store.id(), e))?;
        self.current = Some(reader);
        self.current_store_record_count = 0;
        self.current_store = Some(store.id().to_string());
        Ok(true)
    }

    /// Reads the next raw record from the current store, advancing to
    /// the next store (and treating an exhausted-but-empty store as a
    /// single lazy instance) as needed. Returns `None` at the true end
    /// of the whole dataset.
    fn next_record(&mut self) -> Result<Option<(crate::record::RecordKind, Bytes)>> {
        loop {
            if self.current.is_none() && !self.open_next_store()? {
                return Ok(None);
            }

            let store_id = self.current_store.clone().unwrap();
            let reader = self.current.as_mut().unwrap();
            match reader.next() {
                Ok(Some(rec)) => {
                    self.current_store_record_count += 1;
                    return Ok(Some((rec.kind, rec.payload)));
                }
                Ok(None) => {
                    let emitted_none = self.current_store_record_count == 0;
                    self.current = None;
                    self.store_index += 1;
                    if emitted_none && self.treat_empty_store_as_single_instance {
                        let store = &self.stores[self.store_index - 1];
                        let bits = load_whole_store(store.as_ref())?;
                        return Ok(Some((RecordKind::Complete, bits)));
                    }
                    continue;
                }
                Err(e) => return Err(wrap_store_error(&store_id, e)),
            }
        }
    }

    /// Reads the next reassembled instance, or `Ok(None)` at EOF.
    pub fn read(&mut self) -> Result<Option<Instance>> {
        if let Some(err) = &self.corrupt {
            return Err(err.clone());
        }

        let result = self.read_inner();
        if let Err(ref e) = result {
            if is_split_record_error(e) {
                self.corrupt = Some(e.clone());
            }
        }
        result
    }

    fn read_inner(&mut self) -> Result<Option<Instance>> {
        let Some((kind, payload)) = self.next_record()? else {
            return Ok(None);
        };

        let bits = match kind {
            RecordKind::Complete => payload,
            RecordKind::Begin => {
                let mut buf = payload.to_vec();
                loop {
                    match self.next_record()? {
                        Some((RecordKind::Middle, part)) => buf.extend_from_slice(&part),
                        Some((RecordKind::End, part)) => {
                            buf.extend_from_slice(&part);
                            break;
                        }
                        Some((RecordKind::Begin, _)) => {
                            return Err(self.split_error("Begin record mid-sequence"));
                        }
                        Some((RecordKind::Complete, _)) => {
                            return Err(self.split_error("Complete record mid-sequence"));
                        }
                        None => return Err(self.split_error("EOF mid-sequence")),
                    }
                }
                Bytes::from(buf)
            }
            RecordKind::Middle => return Err(self.split_error("Middle record without Begin")),
            RecordKind::End => return Err(self.split_error("End record without Begin")),
        };

        self.instance_index += 1;
        Ok(Some(Instance { bits }))
    }

    fn split_error(&self, message: &str) -> DataReaderError {
        DataReaderError::CorruptSplitRecord {
            store: self.current_store.clone().unwrap_or_default(),
            index: self.instance_index,
            message: message.to_string(),
        }
    }
}

fn is_split_record_error(e: &DataReaderError) -> bool {
    matches!(e, DataReaderError::CorruptSplitRecord { .. })
}

fn wrap_store_error(store: &str, err: DataReaderError) -> DataReaderError {
    match err {
        DataReaderError::NoSuchFile { .. }
        | DataReaderError::PermissionDenied { .. }
        | DataReaderError::CorruptRecord { .. }
        | DataReaderError::CorruptSplitRecord { .. }
        | DataReaderError::RecordTooLarge { .. } => err,
        other => DataReaderError::Stream {
            store: store.to_string(),
            message: other.to_string(),
        },
    }
}

fn load_whole_store(store: &dyn Store) -> Result<Bytes> {
    let mut stream = store.open_read()?;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, RecordioReader, TextLineReader};
    use crate::stream::BlobStore;

    struct LineFactory;
    impl RecordReaderFactory for LineFactory {
        fn make_record_reader(&self, store: &dyn Store) -> Result<Box<dyn RecordReader>> {
            Ok(Box::new(TextLineReader::new(store.open_read()?)))
        }
    }

    struct RecordioFactory;
    impl RecordReaderFactory for RecordioFactory {
        fn make_record_reader(&self, store: &dyn Store) -> Result<Box<dyn RecordReader>> {
            Ok(Box::new(RecordioReader::new(store.open_read()?, store.id())))
        }
    }

    fn frame(kind: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCED7230Au32.to_le_bytes());
        let header = (kind << 30) | (payload.len() as u32 & 0x3FFF_FFFF);
        out.extend_from_slice(&header.to_le_bytes());
        out.extend_from_slice(payload);
        let padded = payload.len().div_ceil(4) * 4;
        out.resize(out.len() + (padded - payload.len()), 0);
        out
    }

    #[test]
    fn walks_multiple_stores_in_order() {
        let a: Box<dyn Store> = Box::new(BlobStore::new("a", b"line1\n".to_vec()));
        let b: Box<dyn Store> = Box::new(BlobStore::new("b", b"line2\n".to_vec()));
        let mut reader = InstanceReader::new(vec![a, b], Box::new(LineFactory), true);
        let i1 = reader.read().unwrap().unwrap();
        assert_eq!(&i1.bits[..], b"line1");
        let i2 = reader.read().unwrap().unwrap();
        assert_eq!(&i2.bits[..], b"line2");
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn reassembles_split_recordio_sequence() {
        let mut data = frame(1, b"AB");
        data.extend(frame(2, b"CD"));
        data.extend(frame(3, b"EF"));
        let store: Box<dyn Store> = Box::new(BlobStore::new("s", data));
        let mut reader = InstanceReader::new(vec![store], Box::new(RecordioFactory), true);
        let instance = reader.read().unwrap().unwrap();
        assert_eq!(&instance.bits[..], b"ABCDEF");
    }

    #[test]
    fn missing_end_latches_corrupt_state() {
        let data = frame(1, b"AB"); // Begin with no End
        let store: Box<dyn Store> = Box::new(BlobStore::new("s", data));
        let mut reader = InstanceReader::new(vec![store], Box::new(RecordioFactory), true);
        let err1 = reader.read().unwrap_err();
        assert!(matches!(err1, DataReaderError::CorruptSplitRecord { .. }));
        let err2 = reader.read().unwrap_err();
        assert!(matches!(err2, DataReaderError::CorruptSplitRecord { .. }));
        reader.reset();
        // After reset the same malformed data still fails the same way,
        // but it is no longer served from the latched state.
        let err3 = reader.read().unwrap_err();
        assert!(matches!(err3, DataReaderError::CorruptSplitRecord { .. }));
    }

    #[test]
    fn empty_store_becomes_single_lazy_instance() {
        let store: Box<dyn Store> = Box::new(BlobStore::new("img", b"raw-bytes".to_vec()));
        // A store with no RecordIO framing at all decodes as zero
        // records under the RecordIO reader, so it falls back to being
        // treated as one whole-file instance.
        let mut reader = InstanceReader::new(vec![store], Box::new(EmptyFactory), true);
        let instance = reader.read().unwrap().unwrap();
        assert_eq!(&instance.bits[..], b"raw-bytes");
        assert!(reader.read().unwrap().is_none());
    }

    struct EmptyFactory;
    impl RecordReaderFactory for EmptyFactory {
        fn make_record_reader(&self, _store: &dyn Store) -> Result<Box<dyn RecordReader>> {
            Ok(Box::new(AlwaysEmpty))
        }
    }
    struct AlwaysEmpty;
    impl RecordReader for AlwaysEmpty {
        fn next(&mut self) -> Result<Option<Record>> {
            Ok(None)
        }
    }
}
