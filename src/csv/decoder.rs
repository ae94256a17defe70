//! CSV decoder strategy (§4.I): header handling, schema inference,
//! per-column parsers wired to the tokenizer, and parallel row decode.
//!
//! Grounded on `original_source/src/mlio/csv_reader.cc`'s
//! `Csv_reader::infer_schema`/`decode` pair, reshaped into the
//! `DecoderStrategy`-shaped interface described in §9 (construction-time
//! header/name resolution, then a lazily-run `infer_schema`, then
//! per-batch `decode`).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::batch_reader::InstanceBatch;
use crate::dtype::{infer_data_type, DataType};
use crate::error::{DataReaderError, Result};
use crate::instance::{Instance, RecordReaderFactory};
use crate::logger::warn_bad_instance;
use crate::policy::{BadExampleHandling, MaxFieldLengthHandling};
use crate::record::{Record, RecordReader, TextLineReader};
use crate::schema::{Attribute, Schema};
use crate::stream::Store;
use crate::tensor::{ColumnBuilder, DenseTensor, Tensor};
use crate::example::Example;

use super::parser::{parse_into, ParseResult, ParserOptions};
use super::record_reader::CsvRecordReader;
use super::tokenizer::CsvTokenizer;

/// Above this many `column × instance` cells, row decode is partitioned
/// across the `rayon` global pool (§4.I "Parallelism").
const PARALLEL_ROW_THRESHOLD: usize = 10_000_000;

/// CSV-specific configuration (§6 "CSV parameters").
#[derive(Debug, Clone)]
pub struct CsvParams {
    pub header_row_index: Option<usize>,
    pub has_single_header: bool,
    pub dedupe_column_names: bool,
    pub column_names: Option<Vec<String>>,
    pub name_prefix: String,
    pub use_columns: Option<Vec<String>>,
    pub use_columns_by_index: Option<Vec<usize>>,
    pub default_data_type: Option<DataType>,
    pub column_types: HashMap<String, DataType>,
    pub column_types_by_index: HashMap<usize, DataType>,
    pub delimiter: u8,
    pub quote_char: u8,
    pub comment_char: Option<u8>,
    pub allow_quoted_new_lines: bool,
    pub skip_blank_lines: bool,
    pub max_field_length: Option<usize>,
    pub max_field_length_handling: MaxFieldLengthHandling,
    pub max_line_length: Option<usize>,
    pub parser_options: ParserOptions,
    pub bad_example_handling: BadExampleHandling,
    pub warn_bad_instances: bool,
    pub batch_size: usize,
}

impl Default for CsvParams {
    fn default() -> CsvParams {
        CsvParams {
            header_row_index: None,
            has_single_header: false,
            dedupe_column_names: false,
            column_names: None,
            name_prefix: String::new(),
            use_columns: None,
            use_columns_by_index: None,
            default_data_type: None,
            column_types: HashMap::new(),
            column_types_by_index: HashMap::new(),
            delimiter: b',',
            quote_char: b'"',
            comment_char: None,
            allow_quoted_new_lines: false,
            skip_blank_lines: false,
            max_field_length: None,
            max_field_length_handling: MaxFieldLengthHandling::TreatAsBad,
            max_line_length: None,
            parser_options: ParserOptions::default(),
            bad_example_handling: BadExampleHandling::Error,
            warn_bad_instances: false,
            batch_size: 1,
        }
    }
}

struct RetainedColumn {
    name: String,
    dtype: DataType,
    source_index: usize,
}

/// The CSV decoder strategy: resolves column names once at construction
/// (peeking the first store's header line if configured), infers types
/// and the final schema from the first data instance, then decodes
/// batches of instances into dense tensors.
pub struct CsvDecoder {
    params: CsvParams,
    column_names: Vec<String>,
    first_store_id: String,
    schema: OnceLock<Arc<Schema>>,
    retained: OnceLock<Vec<RetainedColumn>>,
    field_count: OnceLock<usize>,
}

impl CsvDecoder {
    pub fn new(stores: &[Box<dyn Store>], params: CsvParams) -> Result<CsvDecoder> {
        let first_store_id = stores.first().map(|s| s.id().to_string()).unwrap_or_default();

        let column_names = if let Some(names) = &params.column_names {
            names.clone()
        } else if let Some(h) = params.header_row_index {
            match stores.first() {
                Some(store) => Self::peek_header(store.as_ref(), h, &params)?,
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        Ok(CsvDecoder {
            params,
            column_names,
            first_store_id,
            schema: OnceLock::new(),
            retained: OnceLock::new(),
            field_count: OnceLock::new(),
        })
    }

    /// Skips `header_row_index` lines then tokenizes the next one as
    /// the header row, independent of the `InstanceReader`/engine
    /// pipeline (which never sees this line as naming data — only the
    /// `HeaderSkippingReader` built by `record_reader_factory` discards
    /// it from the actual instance stream).
    fn peek_header(store: &dyn Store, header_row_index: usize, params: &CsvParams) -> Result<Vec<String>> {
        let lines = TextLineReader::new(store.open_read()?)
            .with_skip_blank_lines(params.skip_blank_lines)
            .with_comment_char(params.comment_char)
            .with_max_line_length(params.max_line_length);
        let mut records = CsvRecordReader::new(lines, params.quote_char, params.allow_quoted_new_lines);

        for _ in 0..header_row_index {
            if records.next()?.is_none() {
                return Ok(Vec::new());
            }
        }
        let Some(header) = records.next()? else {
            return Ok(Vec::new());
        };
        let text = std::str::from_utf8(&header.payload).map_err(|e| DataReaderError::Encoding {
            store: store.id().to_string(),
            message: e.to_string(),
        })?;
        let mut tokenizer = CsvTokenizer::new(params.delimiter, params.quote_char, params.max_field_length);
        let tokens = tokenizer.tokenize_all(text)?;
        Ok(tokens.into_iter().map(|t| t.value).collect())
    }

    /// A `RecordReaderFactory` that skips the header line(s) described
    /// by `header_row_index`/`column_names`+`has_single_header` from
    /// the actual instance stream every store produces.
    pub fn record_reader_factory(&self) -> Box<dyn RecordReaderFactory> {
        Box::new(CsvRecordReaderFactory {
            params: self.params.clone(),
            first_store_id: self.first_store_id.clone(),
        })
    }

    /// Resolves the schema once, from the first decoded instance (if
    /// any). Subsequent calls return the cached schema.
    pub fn infer_schema(&self, first_instance: Option<&Instance>) -> Result<Arc<Schema>> {
        if let Some(schema) = self.schema.get() {
            return Ok(schema.clone());
        }

        let texts: Vec<String> = match first_instance {
            Some(instance) => self.tokenize_row(&instance.bits)?,
            None => Vec::new(),
        };

        let field_count = if !texts.is_empty() {
            texts.len()
        } else {
            self.column_names.len()
        };

        let mut names = if !self.column_names.is_empty() {
            if !texts.is_empty() && self.column_names.len() != texts.len() {
                return Err(DataReaderError::Schema(format!(
                    "column_names has {} entries but the data row has {} fields",
                    self.column_names.len(),
                    texts.len()
                )));
            }
            self.column_names.clone()
        } else {
            (1..=field_count)
                .map(|i| format!("{}{}", self.params.name_prefix, i))
                .collect()
        };
        names = dedupe_or_reject(names, self.params.dedupe_column_names)?;

        for key in self.params.column_types.keys() {
            if !names.contains(key) {
                return Err(DataReaderError::InvalidArgument(format!(
                    "column_types references unknown column '{key}'"
                )));
            }
        }
        for &idx in self.params.column_types_by_index.keys() {
            if idx >= field_count {
                return Err(DataReaderError::InvalidArgument(format!(
                    "column_types_by_index index {idx} is out of range for {field_count} columns"
                )));
            }
        }

        let mut dtypes = Vec::with_capacity(field_count);
        for i in 0..field_count {
            let text = texts.get(i).map(|s| s.as_str()).unwrap_or("");
            let mut dtype = match self.params.default_data_type {
                Some(t) => t,
                None => infer_data_type(text),
            };
            if let Some(&t) = self.params.column_types_by_index.get(&i) {
                dtype = t;
            }
            if let Some(&t) = self.params.column_types.get(&names[i]) {
                dtype = t;
            }
            dtypes.push(dtype);
        }

        let selected = self.selected_indices(&names, field_count)?;

        let mut attrs = Vec::with_capacity(selected.len());
        let mut retained = Vec::with_capacity(selected.len());
        for &idx in &selected {
            attrs.push(Attribute::new(names[idx].clone(), dtypes[idx], vec![self.params.batch_size, 1]));
            retained.push(RetainedColumn {
                name: names[idx].clone(),
                dtype: dtypes[idx],
                source_index: idx,
            });
        }

        let schema = Arc::new(Schema::new(attrs)?);
        let _ = self.schema.set(schema.clone());
        let _ = self.retained.set(retained);
        let _ = self.field_count.set(field_count);
        Ok(schema)
    }

    /// `retained` is in output (schema) order, which for `use_columns`/
    /// `use_columns_by_index` need not be ascending `source_index` order
    /// (e.g. `use_columns_by_index = [2, 0]`). Returns the indices into
    /// `retained` sorted by ascending `source_index`, so `decode_row` can
    /// walk tokens left-to-right with a single pointer and still land on
    /// the right output slot.
    fn source_order(retained: &[RetainedColumn]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..retained.len()).collect();
        order.sort_by_key(|&idx| retained[idx].source_index);
        order
    }

    fn selected_indices(&self, names: &[String], field_count: usize) -> Result<Vec<usize>> {
        if let Some(cols) = &self.params.use_columns {
            cols.iter()
                .map(|c| {
                    names.iter().position(|n| n == c).ok_or_else(|| {
                        DataReaderError::InvalidArgument(format!("use_columns references unknown column '{c}'"))
                    })
                })
                .collect()
        } else if let Some(idxs) = &self.params.use_columns_by_index {
            for &i in idxs {
                if i >= field_count {
                    return Err(DataReaderError::InvalidArgument(format!(
                        "use_columns_by_index index {i} is out of range for {field_count} columns"
                    )));
                }
            }
            Ok(idxs.clone())
        } else {
            Ok((0..field_count).collect())
        }
    }

    fn tokenize_row(&self, bits: &[u8]) -> Result<Vec<String>> {
        let text = std::str::from_utf8(bits).map_err(|e| DataReaderError::Encoding {
            store: self.first_store_id.clone(),
            message: e.to_string(),
        })?;
        let mut tokenizer = CsvTokenizer::new(self.params.delimiter, self.params.quote_char, self.params.max_field_length);
        Ok(tokenizer.tokenize_all(text)?.into_iter().map(|t| t.value).collect())
    }

    /// Decodes one batch into an `Example`, or `Ok(None)` if the whole
    /// batch is dropped under `Skip`/`SkipWarn` (§4.F's bad-example
    /// table: a single bad row fails the whole batch except under
    /// `Pad`/`PadWarn`, which zero-fill just that row).
    pub fn decode(&self, batch: &InstanceBatch) -> Result<Option<Example>> {
        let schema = self
            .schema
            .get()
            .cloned()
            .expect("infer_schema must run before decode");
        let retained = self.retained.get().expect("infer_schema must run before decode");
        let field_count = *self.field_count.get().unwrap_or(&0);

        let total_rows = batch.size;
        let effective = batch.instances.len();

        let mut builders: Vec<ColumnBuilder> = retained.iter().map(|c| ColumnBuilder::zeroed(c.dtype, total_rows)).collect();
        let order = Self::source_order(retained);

        let parallel_eligible = !self.params.bad_example_handling.pads()
            && retained.len().saturating_mul(effective) >= PARALLEL_ROW_THRESHOLD;

        let bad_rows = if parallel_eligible && effective > 1 {
            self.decode_parallel(batch, retained, &order, field_count, &mut builders)
        } else {
            self.decode_serial(batch, retained, &order, field_count, &mut builders)
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

        let features = builders
            .into_iter()
            .map(|b| {
                Tensor::Dense(DenseTensor {
                    shape: vec![total_rows, 1],
                    strides: vec![1, 1],
                    data: b.freeze(),
                })
            })
            .collect();

        Ok(Some(Example::new(schema, features, padding)))
    }

    fn decode_serial(
        &self,
        batch: &InstanceBatch,
        retained: &[RetainedColumn],
        order: &[usize],
        field_count: usize,
        builders: &mut [ColumnBuilder],
    ) -> Vec<(usize, DataReaderError)> {
        let mut tokenizer = CsvTokenizer::new(self.params.delimiter, self.params.quote_char, self.params.max_field_length);
        let mut bad = Vec::new();
        for (row, instance) in batch.instances.iter().enumerate() {
            if let Err(e) = self.decode_row(&mut tokenizer, retained, order, field_count, &instance.bits, row, builders) {
                bad.push((row, e));
            }
        }
        bad
    }

    fn decode_parallel(
        &self,
        batch: &InstanceBatch,
        retained: &[RetainedColumn],
        order: &[usize],
        field_count: usize,
        builders: &mut [ColumnBuilder],
    ) -> Vec<(usize, DataReaderError)> {
        use rayon::prelude::*;

        let n = batch.instances.len();
        let num_chunks = rayon::current_num_threads().max(1).min(n.max(1));
        let chunk_size = n.div_ceil(num_chunks).max(1);

        let chunks: Vec<(usize, usize, Vec<ColumnBuilder>, Vec<(usize, DataReaderError)>)> = batch
            .instances
            .par_chunks(chunk_size)
            .enumerate()
            .map(|(chunk_idx, chunk)| {
                let start = chunk_idx * chunk_size;
                let mut local_builders: Vec<ColumnBuilder> =
                    retained.iter().map(|c| ColumnBuilder::zeroed(c.dtype, chunk.len())).collect();
                let mut local_bad = Vec::new();
                let mut tokenizer = CsvTokenizer::new(self.params.delimiter, self.params.quote_char, self.params.max_field_length);
                for (local_row, instance) in chunk.iter().enumerate() {
                    if let Err(e) =
                        self.decode_row(&mut tokenizer, retained, order, field_count, &instance.bits, local_row, &mut local_builders)
                    {
                        local_bad.push((start + local_row, e));
                    }
                }
                (start, chunk.len(), local_builders, local_bad)
            })
            .collect();

        let mut bad_rows = Vec::new();
        for (start, len, local_builders, local_bad) in chunks {
            for (dest, local) in builders.iter_mut().zip(local_builders.iter()) {
                dest.copy_range_from(start, local, 0, len);
            }
            bad_rows.extend(local_bad);
        }
        bad_rows
    }

    fn decode_row(
        &self,
        tokenizer: &mut CsvTokenizer,
        retained: &[RetainedColumn],
        order: &[usize],
        field_count: usize,
        bits: &[u8],
        row: usize,
        builders: &mut [ColumnBuilder],
    ) -> Result<()> {
        let text = std::str::from_utf8(bits).map_err(|e| DataReaderError::InvalidInstance {
            store: self.first_store_id.clone(),
            index: row,
            message: format!("not valid UTF-8: {e}"),
        })?;
        let tokens = tokenizer.tokenize_all(text)?;

        if tokens.len() != field_count {
            return Err(DataReaderError::InvalidInstance {
                store: self.first_store_id.clone(),
                index: row,
                message: format!("expected {field_count} columns, found {}", tokens.len()),
            });
        }

        // `order` lists indices into `retained`/`builders` sorted by
        // ascending `source_index`, so walking tokens left-to-right with
        // a single pointer into `order` still lands on the right output
        // slot even when `retained` itself is in a user-requested
        // (non-ascending) column order, e.g. `use_columns_by_index =
        // [2, 0]`.
        let mut order_pos = 0;
        for (i, token) in tokens.iter().enumerate() {
            if order_pos >= order.len() || retained[order[order_pos]].source_index != i {
                continue;
            }
            let retained_idx = order[order_pos];
            let column = &retained[retained_idx];

            if token.truncated {
                match self.params.max_field_length_handling {
                    MaxFieldLengthHandling::TreatAsBad => {
                        return Err(DataReaderError::InvalidInstance {
                            store: self.first_store_id.clone(),
                            index: row,
                            message: format!("field '{}' exceeded max_field_length", column.name),
                        });
                    }
                    MaxFieldLengthHandling::Truncate => {}
                    MaxFieldLengthHandling::TruncateWarn => {
                        warn_bad_instance(
                            self.params.warn_bad_instances,
                            &self.first_store_id,
                            row,
                            &format!("field '{}' truncated to max_field_length", column.name),
                        );
                    }
                }
            }

            let result = parse_into(column.dtype, &token.value, &self.params.parser_options, &mut builders[retained_idx], row);
            if result != ParseResult::Ok {
                return Err(DataReaderError::InvalidInstance {
                    store: self.first_store_id.clone(),
                    index: row,
                    message: format!("column '{}' could not parse value '{}'", column.name, token.value),
                });
            }
            order_pos += 1;
        }
        Ok(())
    }
}

fn dedupe_or_reject(names: Vec<String>, dedupe: bool) -> Result<Vec<String>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        match seen.entry(name.clone()) {
            Entry::Occupied(mut e) => {
                if !dedupe {
                    return Err(DataReaderError::Schema(format!("the dataset contains more than one column with the name '{name}'")));
                }
                let count = e.get_mut();
                *count += 1;
                out.push(format!("{name}_{count}"));
            }
            Entry::Vacant(e) => {
                e.insert(0);
                out.push(name);
            }
        }
    }
    Ok(out)
}

/// Wraps a `CsvRecordReader` and discards the configured number of
/// header lines from each store's record stream, so the header never
/// surfaces as a data instance.
struct HeaderSkippingReader {
    inner: CsvRecordReader,
    remaining_skip: usize,
}

impl HeaderSkippingReader {
    fn new(inner: CsvRecordReader, skip: usize) -> HeaderSkippingReader {
        HeaderSkippingReader {
            inner,
            remaining_skip: skip,
        }
    }
}

impl RecordReader for HeaderSkippingReader {
    fn next(&mut self) -> Result<Option<Record>> {
        while self.remaining_skip > 0 {
            self.remaining_skip -= 1;
            if self.inner.next()?.is_none() {
                return Ok(None);
            }
        }
        self.inner.next()
    }
}

pub struct CsvRecordReaderFactory {
    params: CsvParams,
    first_store_id: String,
}

impl CsvRecordReaderFactory {
    /// How many leading lines of `store_id`'s record stream are header
    /// lines to discard (§4.I "Per-store first pass").
    fn header_lines_to_skip(&self, store_id: &str) -> usize {
        if let Some(h) = self.params.header_row_index {
            if self.params.column_names.is_none() {
                return h + 1;
            }
        }
        if self.params.column_names.is_some() {
            let is_first = store_id == self.first_store_id;
            return if self.params.has_single_header {
                if is_first {
                    1
                } else {
                    0
                }
            } else {
                1
            };
        }
        0
    }
}

impl RecordReaderFactory for CsvRecordReaderFactory {
    fn make_record_reader(&self, store: &dyn Store) -> Result<Box<dyn RecordReader>> {
        let lines = TextLineReader::new(store.open_read()?)
            .with_skip_blank_lines(self.params.skip_blank_lines)
            .with_comment_char(self.params.comment_char)
            .with_max_line_length(self.params.max_line_length);
        let csv_reader = CsvRecordReader::new(lines, self.params.quote_char, self.params.allow_quoted_new_lines);
        let skip = self.header_lines_to_skip(store.id());
        Ok(Box::new(HeaderSkippingReader::new(csv_reader, skip)))
    }
}
