//! tensorstream: a high-throughput dataset reader library.
//!
//! Transforms heterogeneous on-disk record streams — CSV text,
//! RecordIO-framed Protocol Buffers, RecordIO-framed images, plain text
//! lines — into uniformly shaped, batched, typed tensor collections
//! suitable for machine-learning training loops.
//!
//! A client opens one or more [`stream::Store`]s (files or in-memory
//! blobs ship with this crate; S3 objects and named pipes are external
//! collaborators), configures batching, sharding, shuffling, and
//! per-format options, then pulls [`example::Example`]s from a
//! [`engine::ParallelReaderEngine`] until end of dataset.
//!
//! # Quick start
//!
//! ```no_run
//! use tensorstream::csv::CsvParams;
//! use tensorstream::engine::EngineParams;
//! use tensorstream::stream::FileStore;
//!
//! let stores: Vec<Box<dyn tensorstream::stream::Store>> =
//!     vec![Box::new(FileStore::new("data.csv"))];
//! let mut reader = tensorstream::csv_reader(
//!     stores,
//!     CsvParams {
//!         header_row_index: Some(0),
//!         ..Default::default()
//!     },
//!     EngineParams {
//!         batch_size: 32,
//!         ..Default::default()
//!     },
//! )
//! .unwrap();
//!
//! while let Some(example) = reader.read_example().unwrap() {
//!     println!("batch of {} rows, {} padding", example.schema.len(), example.padding);
//! }
//! ```

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod batch_reader;
pub mod csv;
pub mod dtype;
pub mod engine;
pub mod error;
pub mod example;
pub mod instance;
pub mod logger;
pub mod pipeline;
pub mod policy;
pub mod protobuf;
pub mod record;
pub mod schema;
pub mod stream;
pub mod tensor;

use std::sync::Arc;

use crate::csv::{CsvDecoder, CsvParams};
use crate::engine::{DecoderStrategy, EngineParams, ParallelReaderEngine};
use crate::error::Result;
use crate::protobuf::{ProtobufDecoder, RecordioProtobufParams};
use crate::stream::Store;

/// Build a [`ParallelReaderEngine`] that decodes `stores` as CSV (§4.I).
pub fn csv_reader(
    stores: Vec<Box<dyn Store>>,
    csv_params: CsvParams,
    engine_params: EngineParams,
) -> Result<ParallelReaderEngine> {
    let decoder: Arc<dyn DecoderStrategy> = Arc::new(CsvDecoder::new(&stores, csv_params)?);
    ParallelReaderEngine::new(decoder, stores, engine_params)
}

/// Build a [`ParallelReaderEngine`] that decodes `stores` as
/// RecordIO-framed Protocol Buffers (§4.J).
pub fn recordio_protobuf_reader(
    stores: Vec<Box<dyn Store>>,
    protobuf_params: RecordioProtobufParams,
    engine_params: EngineParams,
) -> Result<ParallelReaderEngine> {
    let decoder: Arc<dyn DecoderStrategy> = Arc::new(ProtobufDecoder::new(&stores, protobuf_params));
    ParallelReaderEngine::new(decoder, stores, engine_params)
}
