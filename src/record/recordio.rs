//! RecordIO binary framing (§4.B): 4-byte LE magic `0xCED7230A`, 4-byte
//! LE header `((kind & 0x3) << 30) | (length & 0x3FFFFFFF)`, `length`
//! payload bytes, zero-padded to a 4-byte boundary.

use bytes::Bytes;

use crate::error::{DataReaderError, Result};
use crate::record::{Record, RecordKind, RecordReader};
use crate::stream::Stream;

const MAGIC: u32 = 0xCED7230A;

pub struct RecordioReader {
    inner: Box<dyn Stream>,
    store_id: String,
    record_index: usize,
}

impl RecordioReader {
    pub fn new(inner: Box<dyn Stream>, store_id: impl Into<String>) -> RecordioReader {
        RecordioReader {
            inner,
            store_id: store_id.into(),
            record_index: 0,
        }
    }

    fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let n = crate::stream::read_full(self.inner.as_mut(), buf)?;
        if n == 0 {
            return Ok(false);
        }
        if n < buf.len() {
            return Err(self.corrupt("truncated frame header"));
        }
        Ok(true)
    }

    fn corrupt(&self, message: impl Into<String>) -> DataReaderError {
        DataReaderError::CorruptRecord {
            store: self.store_id.clone(),
            index: self.record_index,
            message: message.into(),
        }
    }
}

impl RecordReader for RecordioReader {
    fn next(&mut self) -> Result<Option<Record>> {
        let mut magic_buf = [0u8; 4];
        if !self.read_exact_or_eof(&mut magic_buf)? {
            return Ok(None);
        }
        let magic = u32::from_le_bytes(magic_buf);
        if magic != MAGIC {
            return Err(self.corrupt(format!("bad magic 0x{:08X}", magic)));
        }

        let mut header_buf = [0u8; 4];
        if !self.read_exact_or_eof(&mut header_buf)? {
            return Err(self.corrupt("eof after magic, before header"));
        }
        let header = u32::from_le_bytes(header_buf);
        let kind_bits = (header >> 30) & 0x3;
        let length = (header & 0x3FFF_FFFF) as usize;

        let kind = match kind_bits {
            0 => RecordKind::Complete,
            1 => RecordKind::Begin,
            2 => RecordKind::Middle,
            3 => RecordKind::End,
            _ => unreachable!("kind_bits masked to 2 bits"),
        };

        let mut payload = vec![0u8; length];
        if crate::stream::read_full(self.inner.as_mut(), &mut payload)? < length {
            return Err(self.corrupt("truncated payload"));
        }

        let padded_len = length.div_ceil(4) * 4;
        let pad_len = padded_len - length;
        if pad_len > 0 {
            let mut pad = vec![0u8; pad_len];
            if crate::stream::read_full(self.inner.as_mut(), &mut pad)? < pad_len {
                return Err(self.corrupt("truncated alignment padding"));
            }
        }

        self.record_index += 1;
        Ok(Some(Record {
            kind,
            payload: Bytes::from(payload),
        }))
    }
}
