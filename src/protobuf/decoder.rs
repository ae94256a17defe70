//! RecordIO-Protobuf decoder strategy (§4.J): schema inference over a
//! `Record`'s `features`/`label` maps, dense row copy or two-phase COO
//! commit per feature, and parallel row decode when every feature is
//! dense.
//!
//! Grounded on `original_source/src/mlio/recordio_protobuf_reader.cc`'s
//! `Recordio_protobuf_reader::infer_schema`/`decode` pair, reshaped into
//! the same `DecoderStrategy`-shaped interface as the CSV decoder
//! (construction-time setup, lazily-run `infer_schema`, per-batch
//! `decode`).

use std::cell::RefCell;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use prost::Message;

use crate::batch_reader::InstanceBatch;
use crate::dtype::DataType;
use crate::error::{DataReaderError, Result};
use crate::example::Example;
use crate::instance::{Instance, RecordReaderFactory};
use crate::logger::warn_bad_instance;
use crate::policy::BadExampleHandling;
use crate::record::{RecordReader, RecordioReader};
use crate::schema::{row_major_strides, Attribute, Schema};
use crate::stream::Store;
use crate::tensor::{ColumnBuilder, CooBuilder, DenseTensor, Tensor};

use super::wire;

/// Above this many `values-per-instance × instances` cells, row decode
/// is partitioned across the `rayon` global pool (§4.J "Parallelism").
const PARALLEL_ROW_THRESHOLD: usize = 10_000_000;

thread_local! {
    /// Reused across `decode_record` calls on the same thread, avoiding a
    /// fresh heap allocation (map entries, `Vec`s) per instance — the
    /// direct analogue of the original's thread-local reused protobuf
    /// message (§4.J "[ADDED]").
    static RECORD_BUF: RefCell<wire::Record> = RefCell::new(wire::Record::default());
}

/// Decodes `bits` into the thread-local `Record` buffer and runs `f`
/// against it. `clear()` resets every field (including both maps) to
/// default before `merge` so stale entries from a previous instance
/// never leak into `f`.
fn with_record<R>(bits: &Bytes, f: impl FnOnce(&wire::Record) -> Result<R>) -> Result<R> {
    RECORD_BUF.with(|cell| {
        let mut record = cell.borrow_mut();
        record.clear();
        record.merge(bits.clone())?;
        f(&record)
    })
}

/// RecordIO-Protobuf specific configuration (§6).
#[derive(Debug, Clone)]
pub struct RecordioProtobufParams {
    pub bad_example_handling: BadExampleHandling,
    pub warn_bad_instances: bool,
    pub batch_size: usize,
}

impl Default for RecordioProtobufParams {
    fn default() -> RecordioProtobufParams {
        RecordioProtobufParams {
            bad_example_handling: BadExampleHandling::Error,
            warn_bad_instances: false,
            batch_size: 1,
        }
    }
}

/// One schema-resolved feature: where it came from (`features` vs.
/// `label`, prefixed to avoid name clashes), its element type, its inner
/// shape (batch dim excluded), and whether it is COO-sparse.
struct FeatureSpec {
    source_key: String,
    is_label: bool,
    dtype: DataType,
    inner_shape: Vec<usize>,
    sparse: bool,
}

/// Per-batch accumulator for one feature: a flat dense row buffer (row
/// length = `product(inner_shape)`) or a growable COO builder.
enum FeatureAccumulator {
    Dense(ColumnBuilder, usize),
    Sparse(CooBuilder),
}

impl FeatureAccumulator {
    fn new(spec: &FeatureSpec, total_rows: usize) -> FeatureAccumulator {
        if spec.sparse {
            let mut shape = Vec::with_capacity(1 + spec.inner_shape.len());
            shape.push(total_rows);
            shape.extend_from_slice(&spec.inner_shape);
            FeatureAccumulator::Sparse(CooBuilder::new(shape, spec.dtype))
        } else {
            let row_len: usize = spec.inner_shape.iter().product();
            FeatureAccumulator::Dense(ColumnBuilder::zeroed(spec.dtype, total_rows * row_len.max(1)), row_len)
        }
    }

    fn build(self, total_rows: usize, spec: &FeatureSpec) -> Tensor {
        match self {
            FeatureAccumulator::Dense(builder, _) => {
                let mut shape = Vec::with_capacity(1 + spec.inner_shape.len());
                shape.push(total_rows);
                shape.extend_from_slice(&spec.inner_shape);
                let strides = row_major_strides(&shape);
                Tensor::Dense(DenseTensor {
                    shape,
                    strides,
                    data: builder.freeze(),
                })
            }
            FeatureAccumulator::Sparse(coo) => Tensor::Coo(coo.build()),
        }
    }
}

/// The RecordIO-Protobuf decoder strategy: infers a schema from the
/// first instance's `features`/`label` maps (sorted by key for a
/// deterministic attribute order, since protobuf maps carry none), then
/// decodes batches of instances into dense or COO-sparse tensors.
pub struct ProtobufDecoder {
    params: RecordioProtobufParams,
    first_store_id: String,
    schema: OnceLock<Arc<Schema>>,
    specs: OnceLock<Vec<FeatureSpec>>,
}

impl ProtobufDecoder {
    pub fn new(stores: &[Box<dyn Store>], params: RecordioProtobufParams) -> ProtobufDecoder {
        let first_store_id = stores.first().map(|s| s.id().to_string()).unwrap_or_default();
        ProtobufDecoder {
            params,
            first_store_id,
            schema: OnceLock::new(),
            specs: OnceLock::new(),
        }
    }

    pub fn record_reader_factory(&self) -> Box<dyn RecordReaderFactory> {
        Box::new(RecordioReaderFactory)
    }

    /// Resolves the schema once, from the first decoded instance (if
    /// any). Subsequent calls return the cached schema.
    pub fn infer_schema(&self, first_instance: Option<&Instance>) -> Result<Arc<Schema>> {
        if let Some(schema) = self.schema.get() {
            return Ok(schema.clone());
        }

        let (specs, attrs) = match first_instance {
            Some(instance) => with_record(&instance.bits, |record| self.build_schema_from_record(record))?,
            None => (Vec::new(), Vec::new()),
        };

        let schema = Arc::new(Schema::new(attrs)?);
        let _ = self.schema.set(schema.clone());
        let _ = self.specs.set(specs);
        Ok(schema)
    }

    fn build_schema_from_record(&self, record: &wire::Record) -> Result<(Vec<FeatureSpec>, Vec<Attribute>)> {
        let mut keys: Vec<String> = record.features.keys().cloned().collect();
        keys.sort();
        let mut label_keys: Vec<String> = record.label.keys().cloned().collect();
        label_keys.sort();

        let mut entries: Vec<(String, bool)> = keys.into_iter().map(|k| (k, false)).collect();
        entries.extend(label_keys.into_iter().map(|k| (k, true)));

        let mut specs = Vec::with_capacity(entries.len());
        let mut attrs = Vec::with_capacity(entries.len());

        for (key, is_label) in entries {
            let map = if is_label { &record.label } else { &record.features };
            let value = &map[&key];
            let kind = value.kind.as_ref().ok_or_else(|| {
                DataReaderError::Schema(format!("feature '{key}' has no value set in the first instance"))
            })?;

            let (dtype, sparse, inner_shape) = match kind {
                wire::value::Kind::Float32Tensor(t) => {
                    let (sparse, shape) = classify_tensor(&self.first_store_id, t.values.len(), &t.keys, &t.shape)?;
                    (DataType::Float32, sparse, shape)
                }
                wire::value::Kind::Float64Tensor(t) => {
                    let (sparse, shape) = classify_tensor(&self.first_store_id, t.values.len(), &t.keys, &t.shape)?;
                    (DataType::Float64, sparse, shape)
                }
                wire::value::Kind::Int32Tensor(t) => {
                    let (sparse, shape) = classify_tensor(&self.first_store_id, t.values.len(), &t.keys, &t.shape)?;
                    (DataType::Int32, sparse, shape)
                }
                wire::value::Kind::BytesValue(_) => {
                    return Err(DataReaderError::NotSupported(format!(
                        "feature '{key}' carries a bytes payload, which is unsupported"
                    )));
                }
            };

            let attr_name = if is_label { format!("label_{key}") } else { key.clone() };
            let mut shape = Vec::with_capacity(1 + inner_shape.len());
            shape.push(self.params.batch_size);
            shape.extend_from_slice(&inner_shape);

            attrs.push(if sparse {
                Attribute::new_sparse(attr_name.clone(), dtype, shape)
            } else {
                Attribute::new(attr_name.clone(), dtype, shape)
            });
            specs.push(FeatureSpec {
                source_key: key,
                is_label,
                dtype,
                inner_shape,
                sparse,
            });
        }

        Ok((specs, attrs))
    }

    /// Decodes one batch into an `Example`, or `Ok(None)` if the whole
    /// batch is dropped under `Skip`/`SkipWarn`.
    pub fn decode(&self, batch: &InstanceBatch) -> Result<Option<Example>> {
        let schema = self.schema.get().cloned().expect("infer_schema must run before decode");
        let specs = self.specs.get().expect("infer_schema must run before decode");

        let total_rows = batch.size;
        let effective = batch.instances.len();

        let mut accs: Vec<FeatureAccumulator> = specs.iter().map(|s| FeatureAccumulator::new(s, total_rows)).collect();

        let any_sparse = specs.iter().any(|s| s.sparse);
        let values_per_instance: usize = specs
            .iter()
            .map(|s| if s.sparse { 0 } else { s.inner_shape.iter().product::<usize>().max(1) })
            .sum();
        let parallel_eligible = !any_sparse
            && !self.params.bad_example_handling.pads()
            && values_per_instance.saturating_mul(effective) >= PARALLEL_ROW_THRESHOLD;

        let bad_rows = if parallel_eligible && effective > 1 {
            self.decode_parallel(batch, specs, &mut accs)
        } else {
            self.decode_serial(batch, specs, &mut accs)
        };

        if !bad_rows.is_empty() {
            match self.params.bad_example_handling {
                BadExampleHandling::Error => {
                    let (_, err) = bad_rows.into_iter().next().unwrap();
                    return Err(err);
                }
                BadExampleHandling::Skip | BadExampleHandling::SkipWarn => {
                    if self.params.bad_example_handling.warns() {
                        for (row, err) in &bad_rows {
                            warn_bad_instance(self.params.warn_bad_instances, &self.first_store_id, *row, &err.to_string());
                        }
                    }
                    return Ok(None);
                }
                BadExampleHandling::Pad | BadExampleHandling::PadWarn => {
                    if self.params.bad_example_handling.warns() {
                        for (row, err) in &bad_rows {
                            warn_bad_instance(self.params.warn_bad_instances, &self.first_store_id, *row, &err.to_string());
                        }
                    }
                }
            }
        }

        let padding = (total_rows - effective) + bad_rows.len();

        let features = accs
            .into_iter()
            .zip(specs.iter())
            .map(|(acc, spec)| acc.build(total_rows, spec))
            .collect();

        Ok(Some(Example::new(schema, features, padding)))
    }

    fn decode_serial(
        &self,
        batch: &InstanceBatch,
        specs: &[FeatureSpec],
        accs: &mut [FeatureAccumulator],
    ) -> Vec<(usize, DataReaderError)> {
        let mut bad = Vec::new();
        for (row, instance) in batch.instances.iter().enumerate() {
            if let Err(e) = self.decode_row(specs, &instance.bits, row, accs) {
                bad.push((row, e));
            }
        }
        bad
    }

    /// Only reachable when every feature is dense (`any_sparse` is
    /// false), so every accumulator is `FeatureAccumulator::Dense`.
    fn decode_parallel(
        &self,
        batch: &InstanceBatch,
        specs: &[FeatureSpec],
        accs: &mut [FeatureAccumulator],
    ) -> Vec<(usize, DataReaderError)> {
        use rayon::prelude::*;

        let n = batch.instances.len();
        let num_chunks = rayon::current_num_threads().max(1).min(n.max(1));
        let chunk_size = n.div_ceil(num_chunks).max(1);

        let chunks: Vec<(usize, usize, Vec<FeatureAccumulator>, Vec<(usize, DataReaderError)>)> = batch
            .instances
            .par_chunks(chunk_size)
            .enumerate()
            .map(|(chunk_idx, chunk)| {
                let start = chunk_idx * chunk_size;
                let mut local_accs: Vec<FeatureAccumulator> = specs.iter().map(|s| FeatureAccumulator::new(s, chunk.len())).collect();
                let mut local_bad = Vec::new();
                for (local_row, instance) in chunk.iter().enumerate() {
                    if let Err(e) = self.decode_row(specs, &instance.bits, local_row, &mut local_accs) {
                        local_bad.push((start + local_row, e));
                    }
                }
                (start, chunk.len(), local_accs, local_bad)
            })
            .collect();

        let mut bad_rows = Vec::new();
        for (start, len, local_accs, local_bad) in chunks {
            for (dest, local) in accs.iter_mut().zip(local_accs.into_iter()) {
                match (dest, local) {
                    (FeatureAccumulator::Dense(dest_buf, _), FeatureAccumulator::Dense(local_buf, row_len)) => {
                        dest_buf.copy_range_from(start * row_len, &local_buf, 0, len * row_len);
                    }
                    _ => unreachable!("decode_parallel only runs when every feature is dense"),
                }
            }
            bad_rows.extend(local_bad);
        }
        bad_rows
    }

    /// Validates and stages every feature for this row before committing
    /// any of them, so a later feature failing validation never leaves an
    /// earlier sparse feature's `CooBuilder` holding entries for this row.
    fn decode_row(&self, specs: &[FeatureSpec], bits: &Bytes, row: usize, accs: &mut [FeatureAccumulator]) -> Result<()> {
        let store = self.first_store_id.clone();
        with_record(bits, |record| {
            let mut staged = Vec::with_capacity(specs.len());
            for (spec, acc) in specs.iter().zip(accs.iter()) {
                let map = if spec.is_label { &record.label } else { &record.features };
                let value = map.get(&spec.source_key).ok_or_else(|| {
                    invalid_instance(&store, row, format!("missing feature '{}'", spec.source_key))
                })?;
                let kind = value
                    .kind
                    .as_ref()
                    .ok_or_else(|| invalid_instance(&store, row, format!("feature '{}' has no value set", spec.source_key)))?;
                staged.push(stage_value(&store, row, spec, kind, acc)?);
            }
            for (acc, staged) in accs.iter_mut().zip(staged.into_iter()) {
                commit_value(row, staged, acc);
            }
            Ok(())
        })
        .map_err(|e| {
            if matches!(e, DataReaderError::Protobuf(_)) {
                invalid_instance(&store, row, format!("corrupt protobuf payload: {e}"))
            } else {
                e
            }
        })
    }
}

fn invalid_instance(store: &str, index: usize, message: String) -> DataReaderError {
    DataReaderError::InvalidInstance {
        store: store.to_string(),
        index,
        message,
    }
}

/// Classify a tensor's (values, keys, shape) triple per §4.J's schema
/// inference rules.
fn classify_tensor(store: &str, values_len: usize, keys: &[u64], shape: &[u64]) -> Result<(bool, Vec<usize>)> {
    if keys.is_empty() && shape.is_empty() {
        Ok((false, vec![values_len]))
    } else if keys.is_empty() && !shape.is_empty() && values_len == 0 {
        Ok((true, narrow_shape(store, shape)?))
    } else if keys.is_empty() && !shape.is_empty() {
        Ok((false, narrow_shape(store, shape)?))
    } else if shape.is_empty() {
        Err(DataReaderError::Schema(
            "sparse feature has key indices but no declared shape".to_string(),
        ))
    } else {
        Ok((true, narrow_shape(store, shape)?))
    }
}

fn narrow_shape(store: &str, shape: &[u64]) -> Result<Vec<usize>> {
    shape
        .iter()
        .map(|&d| {
            usize::try_from(d).map_err(|_| {
                DataReaderError::Schema(format!("shape dimension {d} overflows platform size in '{store}'"))
            })
        })
        .collect()
}

/// A feature's write, fully validated against its accumulator but not yet
/// applied. Staging every feature of a row before any commit is what lets
/// `decode_row` roll a whole row forward atomically: if feature *k* fails
/// validation, feature *k-1*'s sparse pairs are still sitting in this enum,
/// not already pushed into its `CooBuilder`.
enum StagedWrite<'a> {
    DenseF32(&'a [f32]),
    DenseF64(&'a [f64]),
    DenseI32(&'a [i32]),
    SparseF32(Vec<(Vec<u64>, f32)>),
    SparseF64(Vec<(Vec<u64>, f64)>),
    SparseI32(Vec<(Vec<u64>, i32)>),
}

fn stage_value<'a>(
    store: &str,
    row: usize,
    spec: &FeatureSpec,
    kind: &'a wire::value::Kind,
    acc: &FeatureAccumulator,
) -> Result<StagedWrite<'a>> {
    match kind {
        wire::value::Kind::Float32Tensor(t) if spec.dtype == DataType::Float32 => stage_tensor_f32(store, row, spec, t, acc),
        wire::value::Kind::Float64Tensor(t) if spec.dtype == DataType::Float64 => stage_tensor_f64(store, row, spec, t, acc),
        wire::value::Kind::Int32Tensor(t) if spec.dtype == DataType::Int32 => stage_tensor_i32(store, row, spec, t, acc),
        wire::value::Kind::BytesValue(_) => Err(invalid_instance(
            store,
            row,
            format!("feature '{}' carries an unsupported bytes payload", spec.source_key),
        )),
        _ => Err(invalid_instance(
            store,
            row,
            format!("feature '{}' value type does not match the inferred schema dtype", spec.source_key),
        )),
    }
}

macro_rules! stage_tensor_fn {
    ($name:ident, $tensor:ty, $scalar:ty, $dense_variant:ident, $sparse_variant:ident) => {
        fn $name<'a>(store: &str, row: usize, spec: &FeatureSpec, t: &'a $tensor, acc: &FeatureAccumulator) -> Result<StagedWrite<'a>> {
            match acc {
                FeatureAccumulator::Dense(_, row_len) => {
                    if !t.keys.is_empty() {
                        return Err(invalid_instance(
                            store,
                            row,
                            format!("feature '{}' sparsity mismatch: dense feature carries key indices", spec.source_key),
                        ));
                    }
                    if t.values.len() != *row_len {
                        return Err(invalid_instance(
                            store,
                            row,
                            format!(
                                "feature '{}' expected {} dense values, found {}",
                                spec.source_key,
                                row_len,
                                t.values.len()
                            ),
                        ));
                    }
                    Ok(StagedWrite::$dense_variant(&t.values))
                }
                FeatureAccumulator::Sparse(coo) => {
                    if t.keys.len() != t.values.len() {
                        return Err(invalid_instance(
                            store,
                            row,
                            format!(
                                "feature '{}' sparse keys/values length mismatch: {} keys, {} values",
                                spec.source_key,
                                t.keys.len(),
                                t.values.len()
                            ),
                        ));
                    }
                    let mut pairs = Vec::with_capacity(t.keys.len());
                    for (&key, &value) in t.keys.iter().zip(t.values.iter()) {
                        match coo.decompose(key) {
                            Some(dims) => pairs.push((dims, value as $scalar)),
                            None => {
                                return Err(invalid_instance(
                                    store,
                                    row,
                                    format!("feature '{}' key {key} out of range for its declared shape", spec.source_key),
                                ))
                            }
                        }
                    }
                    Ok(StagedWrite::$sparse_variant(pairs))
                }
            }
        }
    };
}

stage_tensor_fn!(stage_tensor_f32, wire::Float32Tensor, f32, DenseF32, SparseF32);
stage_tensor_fn!(stage_tensor_f64, wire::Float64Tensor, f64, DenseF64, SparseF64);
stage_tensor_fn!(stage_tensor_i32, wire::Int32Tensor, i32, DenseI32, SparseI32);

/// Applies an already-validated `StagedWrite` to its accumulator. Infallible:
/// every failure mode was already caught during staging.
fn commit_value(row: usize, staged: StagedWrite, acc: &mut FeatureAccumulator) {
    match (staged, acc) {
        (StagedWrite::DenseF32(values), FeatureAccumulator::Dense(builder, row_len)) => {
            builder.set_row_f32(row, *row_len, values);
        }
        (StagedWrite::DenseF64(values), FeatureAccumulator::Dense(builder, row_len)) => {
            builder.set_row_f64(row, *row_len, values);
        }
        (StagedWrite::DenseI32(values), FeatureAccumulator::Dense(builder, row_len)) => {
            builder.set_row_i32(row, *row_len, values);
        }
        (StagedWrite::SparseF32(pairs), FeatureAccumulator::Sparse(coo)) => {
            for (dims, value) in &pairs {
                coo.push_f32(row, dims, *value);
            }
        }
        (StagedWrite::SparseF64(pairs), FeatureAccumulator::Sparse(coo)) => {
            for (dims, value) in &pairs {
                coo.push_f64(row, dims, *value);
            }
        }
        (StagedWrite::SparseI32(pairs), FeatureAccumulator::Sparse(coo)) => {
            for (dims, value) in &pairs {
                coo.push_i32(row, dims, *value);
            }
        }
        _ => unreachable!("a StagedWrite variant always matches the accumulator it was staged against"),
    }
}

struct RecordioReaderFactory;

impl RecordReaderFactory for RecordioReaderFactory {
    fn make_record_reader(&self, store: &dyn Store) -> Result<Box<dyn RecordReader>> {
        Ok(Box::new(RecordioReader::new(store.open_read()?, store.id())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::BlobStore;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCED7230Au32.to_le_bytes());
        let header = payload.len() as u32 & 0x3FFF_FFFF;
        out.extend_from_slice(&header.to_le_bytes());
        out.extend_from_slice(payload);
        let padded = payload.len().div_ceil(4) * 4;
        out.resize(out.len() + (padded - payload.len()), 0);
        out
    }

    fn dense_f32_record(key: &str, values: Vec<f32>) -> wire::Record {
        let mut record = wire::Record::default();
        record.features.insert(
            key.to_string(),
            wire::Value {
                kind: Some(wire::value::Kind::Float32Tensor(wire::Float32Tensor {
                    values,
                    keys: Vec::new(),
                    shape: Vec::new(),
                })),
            },
        );
        record
    }

    fn store_with_records(records: &[wire::Record]) -> Vec<Box<dyn Store>> {
        let mut data = Vec::new();
        for record in records {
            data.extend(frame(&record.encode_to_vec()));
        }
        vec![Box::new(BlobStore::new("mem://pb", data))]
    }

    fn read_instances(factory: &dyn RecordReaderFactory, store: &dyn Store, n: usize) -> Vec<Instance> {
        let mut reader = factory.make_record_reader(store).unwrap();
        (0..n)
            .map(|_| Instance {
                bits: reader.next().unwrap().unwrap().payload,
            })
            .collect()
    }

    #[test]
    fn infers_dense_schema_from_first_instance() {
        let records = vec![dense_f32_record("x", vec![1.0, 2.0, 3.0])];
        let stores = store_with_records(&records);
        let decoder = ProtobufDecoder::new(&stores, RecordioProtobufParams::default());
        let factory = decoder.record_reader_factory();
        let instances = read_instances(factory.as_ref(), stores[0].as_ref(), 1);

        let schema = decoder.infer_schema(Some(&instances[0])).unwrap();
        assert_eq!(schema.len(), 1);
        let attr = schema.attribute("x").unwrap();
        assert_eq!(attr.dtype(), DataType::Float32);
        assert!(!attr.sparse());
        assert_eq!(attr.shape(), &[1, 3]);
    }

    #[test]
    fn decodes_dense_happy_path() {
        let records = vec![
            dense_f32_record("x", vec![1.0, 2.0]),
            dense_f32_record("x", vec![3.0, 4.0]),
        ];
        let stores = store_with_records(&records);
        let mut params = RecordioProtobufParams::default();
        params.batch_size = 2;
        let decoder = ProtobufDecoder::new(&stores, params);
        let factory = decoder.record_reader_factory();
        let instances = read_instances(factory.as_ref(), stores[0].as_ref(), 2);
        decoder.infer_schema(Some(&instances[0])).unwrap();

        let batch = InstanceBatch {
            batch_index: 0,
            size: 2,
            instances,
        };
        let example = decoder.decode(&batch).unwrap().unwrap();
        assert_eq!(example.padding, 0);
        let tensor = example.feature("x").unwrap();
        match tensor {
            Tensor::Dense(d) => assert_eq!(d.data.as_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0]),
            _ => panic!("expected dense tensor"),
        }
    }

    #[test]
    fn sparse_feature_round_trips_through_coo() {
        let mut record = wire::Record::default();
        record.features.insert(
            "s".to_string(),
            wire::Value {
                kind: Some(wire::value::Kind::Float32Tensor(wire::Float32Tensor {
                    values: vec![9.0, 7.0],
                    keys: vec![0, 3],
                    shape: vec![4],
                })),
            },
        );
        let stores = store_with_records(&[record]);
        let decoder = ProtobufDecoder::new(&stores, RecordioProtobufParams::default());
        let factory = decoder.record_reader_factory();
        let instances = read_instances(factory.as_ref(), stores[0].as_ref(), 1);
        let schema = decoder.infer_schema(Some(&instances[0])).unwrap();
        assert!(schema.attribute("s").unwrap().sparse());

        let batch = InstanceBatch {
            batch_index: 0,
            size: 1,
            instances,
        };
        let example = decoder.decode(&batch).unwrap().unwrap();
        match example.feature("s").unwrap() {
            Tensor::Coo(coo) => {
                assert_eq!(coo.nnz(), 2);
                assert_eq!(coo.values.as_f32().unwrap(), &[9.0, 7.0]);
            }
            _ => panic!("expected coo tensor"),
        }
    }

    #[test]
    fn label_keys_get_prefixed() {
        let mut record = wire::Record::default();
        record.label.insert(
            "target".to_string(),
            wire::Value {
                kind: Some(wire::value::Kind::Int32Tensor(wire::Int32Tensor {
                    values: vec![1],
                    keys: Vec::new(),
                    shape: Vec::new(),
                })),
            },
        );
        let stores = store_with_records(&[record]);
        let decoder = ProtobufDecoder::new(&stores, RecordioProtobufParams::default());
        let factory = decoder.record_reader_factory();
        let instances = read_instances(factory.as_ref(), stores[0].as_ref(), 1);
        let schema = decoder.infer_schema(Some(&instances[0])).unwrap();
        assert!(schema.attribute("label_target").is_some());
    }

    #[test]
    fn bytes_payload_is_not_supported() {
        let mut record = wire::Record::default();
        record.features.insert(
            "blob".to_string(),
            wire::Value {
                kind: Some(wire::value::Kind::BytesValue(vec![1, 2, 3])),
            },
        );
        let stores = store_with_records(&[record]);
        let decoder = ProtobufDecoder::new(&stores, RecordioProtobufParams::default());
        let factory = decoder.record_reader_factory();
        let instances = read_instances(factory.as_ref(), stores[0].as_ref(), 1);
        let err = decoder.infer_schema(Some(&instances[0])).unwrap_err();
        assert!(matches!(err, DataReaderError::NotSupported(_)));
    }

    fn sparse_f32_record(pairs: &[(&str, Vec<u64>, Vec<f32>, Vec<u64>)]) -> wire::Record {
        let mut record = wire::Record::default();
        for (key, keys, values, shape) in pairs {
            record.features.insert(
                key.to_string(),
                wire::Value {
                    kind: Some(wire::value::Kind::Float32Tensor(wire::Float32Tensor {
                        values: values.clone(),
                        keys: keys.clone(),
                        shape: shape.clone(),
                    })),
                },
            );
        }
        record
    }

    #[test]
    fn one_sparse_feature_failing_validation_does_not_leave_stray_entries_in_another() {
        // Row 0: "good" has an in-range key, "bad" has an out-of-range key.
        // Row 1: both features are valid.
        // Under `Pad`, row 0 is dropped as bad; "good"'s builder must not
        // retain a committed entry for the dropped row.
        let schema_record = sparse_f32_record(&[
            ("good", vec![0], vec![1.0], vec![4]),
            ("bad", vec![0], vec![1.0], vec![4]),
        ]);
        let row0 = sparse_f32_record(&[
            ("good", vec![0], vec![9.0], vec![4]),
            ("bad", vec![99], vec![8.0], vec![4]),
        ]);
        let row1 = sparse_f32_record(&[
            ("good", vec![1], vec![2.0], vec![4]),
            ("bad", vec![2], vec![3.0], vec![4]),
        ]);
        let records = vec![schema_record, row0, row1];
        let stores = store_with_records(&records);
        let mut params = RecordioProtobufParams::default();
        params.batch_size = 3;
        params.bad_example_handling = BadExampleHandling::Pad;
        let decoder = ProtobufDecoder::new(&stores, params);
        let factory = decoder.record_reader_factory();
        let instances = read_instances(factory.as_ref(), stores[0].as_ref(), 3);
        decoder.infer_schema(Some(&instances[0])).unwrap();

        let batch = InstanceBatch {
            batch_index: 0,
            size: 3,
            instances,
        };
        let example = decoder.decode(&batch).unwrap().unwrap();
        assert_eq!(example.padding, 1);

        match example.feature("good").unwrap() {
            Tensor::Coo(coo) => {
                // Only the schema instance (row 0 of the batch, key 0) and
                // the valid row (row 2 of the batch, key 1) should land;
                // the dropped middle row must not have contributed an
                // entry even though it validated successfully on its own.
                assert_eq!(coo.nnz(), 2);
                assert_eq!(coo.values.as_f32().unwrap(), &[1.0, 2.0]);
            }
            _ => panic!("expected coo tensor"),
        }
    }

    #[test]
    fn dtype_mismatch_is_bad_instance_not_panic() {
        let records = vec![
            dense_f32_record("x", vec![1.0]),
            {
                let mut r = wire::Record::default();
                r.features.insert(
                    "x".to_string(),
                    wire::Value {
                        kind: Some(wire::value::Kind::Int32Tensor(wire::Int32Tensor {
                            values: vec![1],
                            keys: Vec::new(),
                            shape: Vec::new(),
                        })),
                    },
                );
                r
            },
        ];
        let stores = store_with_records(&records);
        let mut params = RecordioProtobufParams::default();
        params.batch_size = 2;
        params.bad_example_handling = BadExampleHandling::Pad;
        let decoder = ProtobufDecoder::new(&stores, params);
        let factory = decoder.record_reader_factory();
        let instances = read_instances(factory.as_ref(), stores[0].as_ref(), 2);
        decoder.infer_schema(Some(&instances[0])).unwrap();

        let batch = InstanceBatch {
            batch_index: 0,
            size: 2,
            instances,
        };
        let example = decoder.decode(&batch).unwrap().unwrap();
        assert_eq!(example.padding, 1);
    }
}
