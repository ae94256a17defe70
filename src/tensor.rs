//! Tensor variants and builders (§3, §4.G, §9's "tagged-union match").
//!
//! Buffers are backed by `arrow::buffer::{Buffer, MutableBuffer}`: a
//! growable, aligned, reference-counted block that is frozen into an
//! immutable `Buffer` once a builder finishes — the "pluggable allocator
//! returns growable, cheaply shared blocks" language of §5 and §9,
//! without inventing a bespoke allocator.

use arrow::buffer::{Buffer, MutableBuffer};

use crate::dtype::DataType;

/// A typed, immutable, reference-counted column of fixed-width values.
/// `String` columns are kept out of band (`Vec<String>`) since they are
/// variable-length, matching §3's "owned variable-length byte sequences."
#[derive(Debug, Clone)]
pub enum TypedBuffer {
    Size(Buffer),
    Float16(Buffer), // raw u16 bit patterns; no parser currently produces this
    Float32(Buffer),
    Float64(Buffer),
    Int8(Buffer),
    Int16(Buffer),
    Int32(Buffer),
    Int64(Buffer),
    UInt8(Buffer),
    UInt16(Buffer),
    UInt32(Buffer),
    UInt64(Buffer),
    String(Vec<String>),
}

impl TypedBuffer {
    pub fn dtype(&self) -> DataType {
        match self {
            TypedBuffer::Size(_) => DataType::Size,
            TypedBuffer::Float16(_) => DataType::Float16,
            TypedBuffer::Float32(_) => DataType::Float32,
            TypedBuffer::Float64(_) => DataType::Float64,
            TypedBuffer::Int8(_) => DataType::Int8,
            TypedBuffer::Int16(_) => DataType::Int16,
            TypedBuffer::Int32(_) => DataType::Int32,
            TypedBuffer::Int64(_) => DataType::Int64,
            TypedBuffer::UInt8(_) => DataType::UInt8,
            TypedBuffer::UInt16(_) => DataType::UInt16,
            TypedBuffer::UInt32(_) => DataType::UInt32,
            TypedBuffer::UInt64(_) => DataType::UInt64,
            TypedBuffer::String(_) => DataType::String,
        }
    }

    /// Number of logical elements in the buffer.
    pub fn len(&self) -> usize {
        match self {
            TypedBuffer::Size(b) => b.len() / std::mem::size_of::<u64>(),
            TypedBuffer::Float16(b) => b.len() / 2,
            TypedBuffer::Float32(b) => b.len() / 4,
            TypedBuffer::Float64(b) => b.len() / 8,
            TypedBuffer::Int8(b) | TypedBuffer::UInt8(b) => b.len(),
            TypedBuffer::Int16(b) | TypedBuffer::UInt16(b) => b.len() / 2,
            TypedBuffer::Int32(b) | TypedBuffer::UInt32(b) => b.len() / 4,
            TypedBuffer::Int64(b) | TypedBuffer::UInt64(b) => b.len() / 8,
            TypedBuffer::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            TypedBuffer::Float32(b) => Some(b.typed_data::<f32>()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            TypedBuffer::Float64(b) => Some(b.typed_data::<f64>()),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            TypedBuffer::Int32(b) => Some(b.typed_data::<i32>()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            TypedBuffer::Int64(b) => Some(b.typed_data::<i64>()),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<&[u64]> {
        match self {
            TypedBuffer::UInt64(b) => Some(b.typed_data::<u64>()),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            TypedBuffer::String(v) => Some(v),
            _ => None,
        }
    }
}

/// A dense, contiguous, typed tensor. Logical element at multi-index `I`
/// is at linear offset `Σ I[i]·strides[i]` within `data`.
#[derive(Debug, Clone)]
pub struct DenseTensor {
    pub shape: Vec<usize>,
    pub strides: Vec<isize>,
    pub data: TypedBuffer,
}

impl DenseTensor {
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Coordinate-format sparse tensor: one value array plus one index array
/// per dimension, all of length `nnz`.
#[derive(Debug, Clone)]
pub struct CooTensor {
    pub shape: Vec<usize>,
    pub values: TypedBuffer,
    pub indices: Vec<Buffer>, // one Buffer<u64> per dimension
}

impl CooTensor {
    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

/// Compressed-sparse-row matrix: `shape` rank ≤ 2.
#[derive(Debug, Clone)]
pub struct CsrTensor {
    pub shape: Vec<usize>,
    pub data: TypedBuffer,
    pub indices: Buffer, // u64 column indices, length nnz
    pub indptr: Buffer,  // u64 row pointers, length rows + 1
}

/// Tagged union over the three tensor layouts (§9: "visitor over tensor
/// variants becomes a tagged-union match").
#[derive(Debug, Clone)]
pub enum Tensor {
    Dense(DenseTensor),
    Coo(CooTensor),
    Csr(CsrTensor),
}

impl Tensor {
    pub fn dtype(&self) -> DataType {
        match self {
            Tensor::Dense(t) => t.data.dtype(),
            Tensor::Coo(t) => t.values.dtype(),
            Tensor::Csr(t) => t.data.dtype(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::Dense(t) => &t.shape,
            Tensor::Coo(t) => &t.shape,
            Tensor::Csr(t) => &t.shape,
        }
    }

    pub fn is_sparse(&self) -> bool {
        !matches!(self, Tensor::Dense(_))
    }
}

/// Growable buffer used while decoding a batch; frozen into a
/// `TypedBuffer` once the batch is complete.
pub enum ColumnBuilder {
    Size(MutableBuffer),
    Float16(MutableBuffer),
    Float32(MutableBuffer),
    Float64(MutableBuffer),
    Int8(MutableBuffer),
    Int16(MutableBuffer),
    Int32(MutableBuffer),
    Int64(MutableBuffer),
    UInt8(MutableBuffer),
    UInt16(MutableBuffer),
    UInt32(MutableBuffer),
    UInt64(MutableBuffer),
    String(Vec<String>),
}

impl ColumnBuilder {
    /// Allocate a zero-filled column for `len` rows of `dtype`. Dense
    /// tensors under `Pad`/`PadWarn` rely on this starting at zero so
    /// trailing padding rows read as zero without a separate fill pass.
    pub fn zeroed(dtype: DataType, len: usize) -> ColumnBuilder {
        macro_rules! zeroed_numeric {
            ($elem_bytes:expr) => {{
                let mut buf = MutableBuffer::new(len * $elem_bytes);
                buf.resize(len * $elem_bytes, 0);
                buf
            }};
        }
        match dtype {
            DataType::Size => ColumnBuilder::Size(zeroed_numeric!(8)),
            DataType::Float16 => ColumnBuilder::Float16(zeroed_numeric!(2)),
            DataType::Float32 => ColumnBuilder::Float32(zeroed_numeric!(4)),
            DataType::Float64 => ColumnBuilder::Float64(zeroed_numeric!(8)),
            DataType::Int8 => ColumnBuilder::Int8(zeroed_numeric!(1)),
            DataType::Int16 => ColumnBuilder::Int16(zeroed_numeric!(2)),
            DataType::Int32 => ColumnBuilder::Int32(zeroed_numeric!(4)),
            DataType::Int64 => ColumnBuilder::Int64(zeroed_numeric!(8)),
            DataType::UInt8 => ColumnBuilder::UInt8(zeroed_numeric!(1)),
            DataType::UInt16 => ColumnBuilder::UInt16(zeroed_numeric!(2)),
            DataType::UInt32 => ColumnBuilder::UInt32(zeroed_numeric!(4)),
            DataType::UInt64 => ColumnBuilder::UInt64(zeroed_numeric!(8)),
            DataType::String => ColumnBuilder::String(vec![String::new(); len]),
        }
    }

    /// Write an `f32` at row `row` (dtype must be `Float32`).
    pub fn set_f32(&mut self, row: usize, value: f32) {
        if let ColumnBuilder::Float32(buf) = self {
            buf.as_slice_mut()[row * 4..row * 4 + 4].copy_from_slice(&value.to_ne_bytes());
        }
    }

    pub fn set_f64(&mut self, row: usize, value: f64) {
        if let ColumnBuilder::Float64(buf) = self {
            buf.as_slice_mut()[row * 8..row * 8 + 8].copy_from_slice(&value.to_ne_bytes());
        }
    }

    pub fn set_i8(&mut self, row: usize, value: i8) {
        if let ColumnBuilder::Int8(buf) = self {
            buf.as_slice_mut()[row] = value as u8;
        }
    }

    pub fn set_i16(&mut self, row: usize, value: i16) {
        if let ColumnBuilder::Int16(buf) = self {
            buf.as_slice_mut()[row * 2..row * 2 + 2].copy_from_slice(&value.to_ne_bytes());
        }
    }

    pub fn set_i32(&mut self, row: usize, value: i32) {
        if let ColumnBuilder::Int32(buf) = self {
            buf.as_slice_mut()[row * 4..row * 4 + 4].copy_from_slice(&value.to_ne_bytes());
        }
    }

    pub fn set_i64(&mut self, row: usize, value: i64) {
        if let ColumnBuilder::Int64(buf) = self {
            buf.as_slice_mut()[row * 8..row * 8 + 8].copy_from_slice(&value.to_ne_bytes());
        }
    }

    pub fn set_u8(&mut self, row: usize, value: u8) {
        if let ColumnBuilder::UInt8(buf) = self {
            buf.as_slice_mut()[row] = value;
        }
    }

    pub fn set_u16(&mut self, row: usize, value: u16) {
        if let ColumnBuilder::UInt16(buf) = self {
            buf.as_slice_mut()[row * 2..row * 2 + 2].copy_from_slice(&value.to_ne_bytes());
        }
    }

    pub fn set_u32(&mut self, row: usize, value: u32) {
        if let ColumnBuilder::UInt32(buf) = self {
            buf.as_slice_mut()[row * 4..row * 4 + 4].copy_from_slice(&value.to_ne_bytes());
        }
    }

    /// Writes a `u64`; also accepts the platform `Size` variant, which
    /// shares `u64`'s width.
    pub fn set_u64(&mut self, row: usize, value: u64) {
        match self {
            ColumnBuilder::UInt64(buf) | ColumnBuilder::Size(buf) => {
                buf.as_slice_mut()[row * 8..row * 8 + 8].copy_from_slice(&value.to_ne_bytes());
            }
            _ => {}
        }
    }

    pub fn set_string(&mut self, row: usize, value: String) {
        if let ColumnBuilder::String(v) = self {
            v[row] = value;
        }
    }

    /// Writes `values` (one dense row of `row_len` elements) starting at
    /// row `row`, for protobuf dense tensors where a logical row holds
    /// more than one scalar.
    pub fn set_row_f32(&mut self, row: usize, row_len: usize, values: &[f32]) {
        if let ColumnBuilder::Float32(buf) = self {
            let off = row * row_len * 4;
            for (i, v) in values.iter().enumerate() {
                buf.as_slice_mut()[off + i * 4..off + i * 4 + 4].copy_from_slice(&v.to_ne_bytes());
            }
        }
    }

    pub fn set_row_f64(&mut self, row: usize, row_len: usize, values: &[f64]) {
        if let ColumnBuilder::Float64(buf) = self {
            let off = row * row_len * 8;
            for (i, v) in values.iter().enumerate() {
                buf.as_slice_mut()[off + i * 8..off + i * 8 + 8].copy_from_slice(&v.to_ne_bytes());
            }
        }
    }

    pub fn set_row_i32(&mut self, row: usize, row_len: usize, values: &[i32]) {
        if let ColumnBuilder::Int32(buf) = self {
            let off = row * row_len * 4;
            for (i, v) in values.iter().enumerate() {
                buf.as_slice_mut()[off + i * 4..off + i * 4 + 4].copy_from_slice(&v.to_ne_bytes());
            }
        }
    }

    /// Copies `len` rows from `src` starting at `src_start` into `self`
    /// starting at `dest_start`. Both builders must carry the same
    /// dtype — the merge step of the parallel CSV/protobuf chunk decode,
    /// where each chunk fills its own local builder before this copies
    /// it into the batch's shared one.
    pub fn copy_range_from(&mut self, dest_start: usize, src: &ColumnBuilder, src_start: usize, len: usize) {
        macro_rules! copy_bytes {
            ($dst:expr, $src:expr, $elem:expr) => {{
                let dst_off = dest_start * $elem;
                let src_off = src_start * $elem;
                $dst.as_slice_mut()[dst_off..dst_off + len * $elem]
                    .copy_from_slice(&$src.as_slice()[src_off..src_off + len * $elem]);
            }};
        }
        match (self, src) {
            (ColumnBuilder::Size(d), ColumnBuilder::Size(s)) => copy_bytes!(d, s, 8),
            (ColumnBuilder::Float16(d), ColumnBuilder::Float16(s)) => copy_bytes!(d, s, 2),
            (ColumnBuilder::Float32(d), ColumnBuilder::Float32(s)) => copy_bytes!(d, s, 4),
            (ColumnBuilder::Float64(d), ColumnBuilder::Float64(s)) => copy_bytes!(d, s, 8),
            (ColumnBuilder::Int8(d), ColumnBuilder::Int8(s)) => copy_bytes!(d, s, 1),
            (ColumnBuilder::Int16(d), ColumnBuilder::Int16(s)) => copy_bytes!(d, s, 2),
            (ColumnBuilder::Int32(d), ColumnBuilder::Int32(s)) => copy_bytes!(d, s, 4),
            (ColumnBuilder::Int64(d), ColumnBuilder::Int64(s)) => copy_bytes!(d, s, 8),
            (ColumnBuilder::UInt8(d), ColumnBuilder::UInt8(s)) => copy_bytes!(d, s, 1),
            (ColumnBuilder::UInt16(d), ColumnBuilder::UInt16(s)) => copy_bytes!(d, s, 2),
            (ColumnBuilder::UInt32(d), ColumnBuilder::UInt32(s)) => copy_bytes!(d, s, 4),
            (ColumnBuilder::UInt64(d), ColumnBuilder::UInt64(s)) => copy_bytes!(d, s, 8),
            (ColumnBuilder::String(d), ColumnBuilder::String(s)) => {
                d[dest_start..dest_start + len].clone_from_slice(&s[src_start..src_start + len]);
            }
            _ => unreachable!("copy_range_from called across mismatched ColumnBuilder variants"),
        }
    }

    pub fn freeze(self) -> TypedBuffer {
        match self {
            ColumnBuilder::Size(b) => TypedBuffer::Size(b.into()),
            ColumnBuilder::Float16(b) => TypedBuffer::Float16(b.into()),
            ColumnBuilder::Float32(b) => TypedBuffer::Float32(b.into()),
            ColumnBuilder::Float64(b) => TypedBuffer::Float64(b.into()),
            ColumnBuilder::Int8(b) => TypedBuffer::Int8(b.into()),
            ColumnBuilder::Int16(b) => TypedBuffer::Int16(b.into()),
            ColumnBuilder::Int32(b) => TypedBuffer::Int32(b.into()),
            ColumnBuilder::Int64(b) => TypedBuffer::Int64(b.into()),
            ColumnBuilder::UInt8(b) => TypedBuffer::UInt8(b.into()),
            ColumnBuilder::UInt16(b) => TypedBuffer::UInt16(b.into()),
            ColumnBuilder::UInt32(b) => TypedBuffer::UInt32(b.into()),
            ColumnBuilder::UInt64(b) => TypedBuffer::UInt64(b.into()),
            ColumnBuilder::String(v) => TypedBuffer::String(v),
        }
    }
}

/// Builds a COO tensor by accumulating `(row, dim_indices, value)`
/// triples, grounded on the original's `Coo_tensor_builder::append_indices`
/// linear-key arithmetic (§4.J).
pub struct CooBuilder {
    shape: Vec<usize>,
    value_dtype: DataType,
    values_f32: Vec<f32>,
    values_f64: Vec<f64>,
    values_i32: Vec<i32>,
    indices: Vec<Vec<u64>>, // one growable Vec per dimension, including the batch dim
}

impl CooBuilder {
    pub fn new(shape: Vec<usize>, value_dtype: DataType) -> CooBuilder {
        let ndim = shape.len();
        CooBuilder {
            shape,
            value_dtype,
            values_f32: Vec::new(),
            values_f64: Vec::new(),
            values_i32: Vec::new(),
            indices: vec![Vec::new(); ndim],
        }
    }

    /// Decompose a linear `key` into per-dimension indices (skipping the
    /// batch dim, which is supplied by `row`) and push the resulting
    /// coordinate plus `value`. Returns `false` if any resulting index is
    /// out of range, in which case nothing is pushed.
    pub fn append_f32(&mut self, row: usize, key: u64, value: f32) -> bool {
        match self.decompose(key) {
            Some(dims) => {
                self.push_f32(row, &dims, value);
                true
            }
            None => false,
        }
    }

    pub fn append_f64(&mut self, row: usize, key: u64, value: f64) -> bool {
        match self.decompose(key) {
            Some(dims) => {
                self.push_f64(row, &dims, value);
                true
            }
            None => false,
        }
    }

    pub fn append_i32(&mut self, row: usize, key: u64, value: i32) -> bool {
        match self.decompose(key) {
            Some(dims) => {
                self.push_i32(row, &dims, value);
                true
            }
            None => false,
        }
    }

    /// Push an already-validated coordinate (one obtained from
    /// `decompose`) plus its value. Callers that must validate every
    /// pair of one instance before committing any of them (so a bad
    /// pair doesn't leave a partial row behind) decompose up front and
    /// push only once the whole instance checks out.
    pub fn push_f32(&mut self, row: usize, dims: &[u64], value: f32) {
        self.indices[0].push(row as u64);
        for (d, &idx) in dims.iter().enumerate() {
            self.indices[d + 1].push(idx);
        }
        self.values_f32.push(value);
    }

    pub fn push_f64(&mut self, row: usize, dims: &[u64], value: f64) {
        self.indices[0].push(row as u64);
        for (d, &idx) in dims.iter().enumerate() {
            self.indices[d + 1].push(idx);
        }
        self.values_f64.push(value);
    }

    pub fn push_i32(&mut self, row: usize, dims: &[u64], value: i32) {
        self.indices[0].push(row as u64);
        for (d, &idx) in dims.iter().enumerate() {
            self.indices[d + 1].push(idx);
        }
        self.values_i32.push(value);
    }

    /// `idx = key`; for each inner dim `d` with stride `s`: `dim_index =
    /// idx / s`, `idx = idx % s`. Rejects (returns `None`) if any
    /// resulting index is `>= shape[d]`.
    pub(crate) fn decompose(&self, key: u64) -> Option<Vec<u64>> {
        let inner_shape = &self.shape[1..];
        let mut strides = vec![1u64; inner_shape.len()];
        for i in (0..inner_shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * inner_shape[i + 1] as u64;
        }

        let mut idx = key;
        let mut out = Vec::with_capacity(inner_shape.len());
        for (d, &stride) in strides.iter().enumerate() {
            let dim_index = idx / stride;
            idx %= stride;
            if dim_index >= inner_shape[d] as u64 {
                return None;
            }
            out.push(dim_index);
        }
        Some(out)
    }

    pub fn build(self) -> CooTensor {
        let values = match self.value_dtype {
            DataType::Float32 => {
                let mut buf = MutableBuffer::new(self.values_f32.len() * 4);
                for v in &self.values_f32 {
                    buf.push(*v);
                }
                TypedBuffer::Float32(buf.into())
            }
            DataType::Float64 => {
                let mut buf = MutableBuffer::new(self.values_f64.len() * 8);
                for v in &self.values_f64 {
                    buf.push(*v);
                }
                TypedBuffer::Float64(buf.into())
            }
            DataType::Int32 => {
                let mut buf = MutableBuffer::new(self.values_i32.len() * 4);
                for v in &self.values_i32 {
                    buf.push(*v);
                }
                TypedBuffer::Int32(buf.into())
            }
            other => unreachable!("COO builder only supports f32/f64/i32 values, got {other}"),
        };

        let indices = self
            .indices
            .into_iter()
            .map(|dim| {
                let mut buf = MutableBuffer::new(dim.len() * 8);
                for v in &dim {
                    buf.push(*v);
                }
                Buffer::from(buf)
            })
            .collect();

        CooTensor {
            shape: self.shape,
            values,
            indices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coo_decomposes_linear_key() {
        // shape = [3, 4] (batch, dim1); keys 0, 5, 11 over a 1x4 inner shape... wait shape[1..] is [4].
        let mut builder = CooBuilder::new(vec![1, 4], DataType::Float32);
        assert!(builder.append_f32(0, 0, 1.0));
        assert!(builder.append_f32(0, 1, 2.0));
        assert!(builder.append_f32(0, 3, 3.0));
        let coo = builder.build();
        assert_eq!(coo.nnz(), 3);
        assert_eq!(coo.indices[0].typed_data::<u64>(), &[0, 0, 0]); // row
        assert_eq!(coo.indices[1].typed_data::<u64>(), &[0, 1, 3]); // dim
        assert_eq!(coo.values.as_f32().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn coo_two_dim_decomposition_matches_scenario_6() {
        // shape=[1,3,4] (batch,3,4); keys=[0,5,11] -> dim1/dim2 indices.
        // Per spec scenario 6: dim-1 indices [0,1,2], dim-2 indices [0,1,3].
        // stride for dim of size 4 is 1, dim of size 3 is 4.
        // key=0 -> d0=0/4=0, idx=0; d1=0/1=0 -> [0,0]
        // key=5 -> d0=5/4=1, idx=1; d1=1/1=1 -> [1,1]
        // key=11 -> d0=11/4=2, idx=3; d1=3/1=3 -> [2,3]
        let mut builder = CooBuilder::new(vec![1, 3, 4], DataType::Float32);
        assert!(builder.append_f32(0, 0, 1.0));
        assert!(builder.append_f32(0, 5, 2.0));
        assert!(builder.append_f32(0, 11, 3.0));
        let coo = builder.build();
        assert_eq!(coo.indices[0].typed_data::<u64>(), &[0, 0, 0]);
        assert_eq!(coo.indices[1].typed_data::<u64>(), &[0, 1, 2]);
        assert_eq!(coo.indices[2].typed_data::<u64>(), &[0, 1, 3]);
    }

    #[test]
    fn coo_rejects_out_of_range_index() {
        let mut builder = CooBuilder::new(vec![1, 4], DataType::Float32);
        assert!(!builder.append_f32(0, 4, 1.0)); // dim_index 4 >= shape[1]=4
    }

    #[test]
    fn column_builder_zeroed_reads_back_zero() {
        let mut col = ColumnBuilder::zeroed(DataType::Float64, 3);
        col.set_f64(1, 7.5);
        let buf = col.freeze();
        assert_eq!(buf.as_f64().unwrap(), &[0.0, 7.5, 0.0]);
    }

    #[test]
    fn copy_range_from_merges_chunk_into_parent() {
        let mut parent = ColumnBuilder::zeroed(DataType::Int32, 4);
        let mut chunk = ColumnBuilder::zeroed(DataType::Int32, 2);
        chunk.set_i32(0, 10);
        chunk.set_i32(1, 20);
        parent.copy_range_from(2, &chunk, 0, 2);
        let buf = parent.freeze();
        assert_eq!(buf.as_i32().unwrap(), &[0, 0, 10, 20]);
    }

    #[test]
    fn set_row_f32_writes_contiguous_elements() {
        let mut col = ColumnBuilder::zeroed(DataType::Float32, 2);
        col.set_row_f32(1, 2, &[1.5, 2.5]);
        let buf = col.freeze();
        assert_eq!(buf.as_f32().unwrap(), &[0.0, 0.0, 1.5, 2.5]);
    }

    #[test]
    fn coo_push_after_decompose_matches_append() {
        // A two-phase caller decomposes every pair first, then pushes
        // only once all of them validate — append_f32 must agree.
        let mut builder = CooBuilder::new(vec![1, 4], DataType::Float32);
        let dims = builder.decompose(2).unwrap();
        builder.push_f32(0, &dims, 9.0);
        let coo = builder.build();
        assert_eq!(coo.indices[1].typed_data::<u64>(), &[2]);
        assert_eq!(coo.values.as_f32().unwrap(), &[9.0]);
    }

    #[test]
    fn coo_decompose_rejects_before_any_push() {
        let builder = CooBuilder::new(vec![1, 4], DataType::Float32);
        assert!(builder.decompose(4).is_none());
    }
}
