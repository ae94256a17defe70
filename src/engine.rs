//! Parallel reader engine (§4.F): background prefetch pool, ordered
//! delivery, reset semantics.
//!
//! Grounded on §9's "one `ParallelEngine` owns lifecycle, holding a
//! decoder-strategy object with three hooks" design note, and on
//! §10's `[ADDED]` choice of `crossbeam_channel::bounded` work/result
//! queues plus `std::thread` producer/worker threads with an
//! `Arc<AtomicBool>` cancellation flag.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use rand::Rng;

use crate::batch_reader::{BatchReader, InstanceBatch, LastBatchPolicy};
use crate::error::{DataReaderError, Result};
use crate::example::Example;
use crate::instance::{Instance, InstanceReader, RecordReaderFactory};
use crate::pipeline::{InstanceSource, Limit, Sample, Shard, Shuffle, Skip};
use crate::schema::Schema;
use crate::stream::Store;

/// The three hooks a concrete decoder (CSV, RecordIO-Protobuf) exposes
/// to the engine, matching §9's "state machine + strategy" recasting of
/// the teacher's `Data_reader` subclass hierarchy.
pub trait DecoderStrategy: Send + Sync {
    fn record_reader_factory(&self) -> Box<dyn RecordReaderFactory>;
    fn infer_schema(&self, first_instance: Option<&Instance>) -> Result<Arc<Schema>>;
    fn decode(&self, batch: &InstanceBatch) -> Result<Option<Example>>;
}

impl DecoderStrategy for crate::csv::CsvDecoder {
    fn record_reader_factory(&self) -> Box<dyn RecordReaderFactory> {
        crate::csv::CsvDecoder::record_reader_factory(self)
    }
    fn infer_schema(&self, first_instance: Option<&Instance>) -> Result<Arc<Schema>> {
        crate::csv::CsvDecoder::infer_schema(self, first_instance)
    }
    fn decode(&self, batch: &InstanceBatch) -> Result<Option<Example>> {
        crate::csv::CsvDecoder::decode(self, batch)
    }
}

impl DecoderStrategy for crate::protobuf::ProtobufDecoder {
    fn record_reader_factory(&self) -> Box<dyn RecordReaderFactory> {
        crate::protobuf::ProtobufDecoder::record_reader_factory(self)
    }
    fn infer_schema(&self, first_instance: Option<&Instance>) -> Result<Arc<Schema>> {
        crate::protobuf::ProtobufDecoder::infer_schema(self, first_instance)
    }
    fn decode(&self, batch: &InstanceBatch) -> Result<Option<Example>> {
        crate::protobuf::ProtobufDecoder::decode(self, batch)
    }
}

/// Parallel reader engine parameters (§6 "Parallel reader parameters").
#[derive(Debug, Clone)]
pub struct EngineParams {
    pub batch_size: usize,
    /// `0` resolves to the number of available cores.
    pub num_prefetched_examples: usize,
    /// `0` resolves to `num_prefetched_examples`.
    pub num_parallel_reads: usize,
    pub last_example_handling: LastBatchPolicy,
    pub num_instances_to_skip: usize,
    pub num_instances_to_read: Option<usize>,
    pub shard_index: usize,
    pub num_shards: usize,
    pub sample_ratio: Option<f64>,
    pub shuffle_instances: bool,
    pub shuffle_window: usize,
    pub shuffle_seed: Option<u64>,
    pub reshuffle_each_epoch: bool,
    pub treat_empty_store_as_single_instance: bool,
}

impl Default for EngineParams {
    fn default() -> EngineParams {
        EngineParams {
            batch_size: 1,
            num_prefetched_examples: 0,
            num_parallel_reads: 0,
            last_example_handling: LastBatchPolicy::None,
            num_instances_to_skip: 0,
            num_instances_to_read: None,
            shard_index: 0,
            num_shards: 1,
            sample_ratio: None,
            shuffle_instances: false,
            shuffle_window: 0,
            shuffle_seed: None,
            reshuffle_each_epoch: false,
            treat_empty_store_as_single_instance: true,
        }
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// One decoded batch's outcome, keyed by batch index for the
/// collector's reorder buffer.
type WorkerOutcome = (usize, Result<Option<Example>>);

/// The running thread group for one "epoch" of iteration: a producer
/// thread, `W` worker threads, and a collector thread, torn down and
/// rebuilt on every `reset`.
struct RunningEngine {
    producer: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    collector: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
    output_rx: crossbeam_channel::Receiver<Result<Example>>,
}

/// Keeps the CPU fed while clients consume examples (§4.F).
///
/// Owns the decoder strategy and the dataset's stores; on construction
/// (and on every `reset`) it spins up a producer thread that walks the
/// shard/skip/sample/shuffle-wrapped instance stream and batches it, a
/// fixed pool of worker threads that decode batches independently, and
/// a collector thread that reorders decoded examples back into batch
/// order before handing them to the client.
pub struct ParallelReaderEngine {
    decoder: Arc<dyn DecoderStrategy>,
    stores: Arc<[Box<dyn Store>]>,
    params: EngineParams,
    num_prefetched: usize,
    num_workers: usize,

    sample_seed: u64,
    shuffle_seed: Option<u64>,
    running: Option<RunningEngine>,
    peeked: Option<Result<Option<Example>>>,
    /// The first error ever observed; once set, every subsequent
    /// `read_example` re-raises it (§4.F "first error wins").
    latched_error: Option<DataReaderError>,
}

impl ParallelReaderEngine {
    pub fn new(
        decoder: Arc<dyn DecoderStrategy>,
        stores: Vec<Box<dyn Store>>,
        params: EngineParams,
    ) -> Result<ParallelReaderEngine> {
        let stores: Arc<[Box<dyn Store>]> = Arc::from(stores);

        let cores = available_cores();
        let num_prefetched = if params.num_prefetched_examples == 0 {
            cores
        } else {
            params.num_prefetched_examples
        };
        let num_workers = if params.num_parallel_reads == 0 {
            num_prefetched
        } else {
            params.num_parallel_reads
        };

        // Probe the dataset's true first instance (independent of
        // shard/sample/shuffle, which would otherwise make schema
        // inference non-deterministic) to resolve the schema once,
        // up front, before any worker thread calls `decode`.
        let mut probe = InstanceReader::new_shared(stores.clone(), decoder.record_reader_factory(), params.treat_empty_store_as_single_instance);
        let first_instance = probe.read()?;
        decoder.infer_schema(first_instance.as_ref())?;

        let shuffle_seed = if params.shuffle_instances {
            Some(params.shuffle_seed.unwrap_or_else(|| rand::thread_rng().gen()))
        } else {
            None
        };
        let sample_seed: u64 = rand::thread_rng().gen();

        let mut engine = ParallelReaderEngine {
            decoder,
            stores,
            params,
            num_prefetched,
            num_workers,
            sample_seed,
            shuffle_seed,
            running: None,
            peeked: None,
            latched_error: None,
        };
        engine.start();
        Ok(engine)
    }

    /// Schema resolved during construction; stable for the engine's
    /// lifetime (schema inference is cached after the first call).
    pub fn schema(&self) -> Result<Arc<Schema>> {
        self.decoder.infer_schema(None)
    }

    fn build_pipeline(&self) -> Box<dyn InstanceSource> {
        let factory = self.decoder.record_reader_factory();
        let reader = InstanceReader::new_shared(self.stores.clone(), factory, self.params.treat_empty_store_as_single_instance);

        let skipped: Box<dyn InstanceSource> = if self.params.num_instances_to_skip > 0 {
            Box::new(Skip::new(reader, self.params.num_instances_to_skip))
        } else {
            Box::new(reader)
        };

        let limited: Box<dyn InstanceSource> = match self.params.num_instances_to_read {
            Some(m) => Box::new(Limit::new(skipped, m)),
            None => skipped,
        };

        let sharded: Box<dyn InstanceSource> = if self.params.num_shards > 1 {
            Box::new(Shard::new(limited, self.params.shard_index, self.params.num_shards))
        } else {
            limited
        };

        let sampled: Box<dyn InstanceSource> = match self.params.sample_ratio {
            Some(r) => Box::new(Sample::new(sharded, r, self.sample_seed)),
            None => sharded,
        };

        if self.params.shuffle_instances {
            let seed = self.shuffle_seed.expect("shuffle_seed resolved when shuffle_instances is set");
            Box::new(Shuffle::new(sampled, self.params.shuffle_window, seed, self.params.reshuffle_each_epoch))
        } else {
            sampled
        }
    }

    /// Spins up a fresh producer/worker/collector thread group reading
    /// from the beginning of the (possibly reshuffled) dataset.
    fn start(&mut self) {
        let pipeline = self.build_pipeline();
        let mut batch_reader = BatchReader::new(pipeline, self.params.batch_size, self.params.last_example_handling);

        let cancel = Arc::new(AtomicBool::new(false));

        let (work_tx, work_rx) = crossbeam_channel::bounded::<InstanceBatch>(self.num_prefetched);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<WorkerOutcome>(self.num_prefetched);
        let (output_tx, output_rx) = crossbeam_channel::bounded::<Result<Example>>(self.num_prefetched);

        let producer_cancel = cancel.clone();
        let producer_result_tx = result_tx.clone();
        let producer = std::thread::spawn(move || {
            let mut next_index = 0usize;
            loop {
                if producer_cancel.load(Ordering::Acquire) {
                    break;
                }
                match batch_reader.read() {
                    Ok(Some(batch)) => {
                        next_index += 1;
                        if work_tx.send(batch).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = producer_result_tx.send((next_index, Err(e)));
                        break;
                    }
                }
            }
            // Dropping `work_tx` (and this extra `result_tx` clone) here
            // is what lets workers' and the collector's receive loops
            // terminate once all in-flight work drains.
        });

        let mut workers = Vec::with_capacity(self.num_workers);
        for _ in 0..self.num_workers {
            let decoder = self.decoder.clone();
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let worker_cancel = cancel.clone();
            workers.push(std::thread::spawn(move || {
                while let Ok(batch) = work_rx.recv() {
                    if worker_cancel.load(Ordering::Acquire) {
                        // Keep draining so the producer never blocks on
                        // a full bounded channel after cancellation;
                        // discard the would-be result.
                        continue;
                    }
                    let index = batch.batch_index;
                    let outcome = decoder.decode(&batch);
                    if result_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            }));
        }
        // Drop the engine's own handles so the channels close once every
        // producer/worker clone has exited.
        drop(work_rx);
        drop(result_tx);

        let collector_cancel = cancel.clone();
        let collector = std::thread::spawn(move || {
            let mut pending: BTreeMap<usize, Result<Option<Example>>> = BTreeMap::new();
            let mut next = 0usize;
            let mut halted = false;

            while let Ok((index, outcome)) = result_rx.recv() {
                pending.insert(index, outcome);
                while let Some(outcome) = pending.remove(&next) {
                    next += 1;
                    match outcome {
                        Ok(Some(example)) => {
                            if output_tx.send(Ok(example)).is_err() {
                                halted = true;
                            }
                        }
                        Ok(None) => {
                            // Whole batch dropped under Skip/SkipWarn
                            // (§4.F bad-example table): advance silently.
                        }
                        Err(e) => {
                            collector_cancel.store(true, Ordering::Release);
                            let _ = output_tx.send(Err(e));
                            halted = true;
                        }
                    }
                    if halted {
                        break;
                    }
                }
                if halted {
                    break;
                }
            }
            if halted {
                // Drain and discard remaining in-flight results.
                while result_rx.recv().is_ok() {}
            }
        });

        self.running = Some(RunningEngine {
            producer,
            workers,
            collector,
            cancel,
            output_rx,
        });
    }

    fn receive_one(&mut self) -> Result<Option<Example>> {
        let running = self.running.as_ref().expect("engine is always running between start() and stop()");
        match running.output_rx.recv() {
            Ok(Ok(example)) => Ok(Some(example)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    /// Blocks until an example is available or the dataset is
    /// exhausted. Propagates the first worker/producer error and keeps
    /// re-raising it on every subsequent call until `reset`.
    pub fn read_example(&mut self) -> Result<Option<Example>> {
        if let Some(err) = &self.latched_error {
            return Err(err.clone());
        }
        let outcome = match self.peeked.take() {
            Some(cached) => cached,
            None => self.receive_one(),
        };
        if let Err(ref e) = outcome {
            self.latched_error = Some(e.clone());
        }
        outcome
    }

    /// Reads one example and caches it; the next `read_example` call
    /// returns the cached value instead of pulling a new one.
    pub fn peek_example(&mut self) -> Result<Option<Example>> {
        if self.peeked.is_none() && self.latched_error.is_none() {
            self.peeked = Some(self.receive_one());
        }
        match &self.peeked {
            Some(Ok(opt)) => Ok(opt.clone()),
            Some(Err(e)) => {
                let e = e.clone();
                self.latched_error = Some(e.clone());
                Err(e)
            }
            None => Err(self.latched_error.as_ref().unwrap().clone()),
        }
    }

    /// Stops the producer/worker/collector thread group, discarding any
    /// in-flight decode results.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.store(true, Ordering::Release);
            // Keep draining (blocking, not polling) until the collector
            // drops its end of the channel — otherwise a collector
            // blocked on a full `output_tx` would never observe the
            // cancellation and `join` below would hang.
            while running.output_rx.recv().is_ok() {}
            let _ = running.producer.join();
            for worker in running.workers {
                let _ = worker.join();
            }
            let _ = running.collector.join();
        }
    }

    /// Stops the current iteration, clears queues/caches, re-seeds the
    /// shuffle if `reshuffle_each_epoch` is set, and restarts from the
    /// beginning of the dataset.
    pub fn reset(&mut self) {
        self.stop();
        self.peeked = None;
        self.latched_error = None;
        if self.params.shuffle_instances && self.params.reshuffle_each_epoch {
            self.shuffle_seed = Some(rand::thread_rng().gen());
        }
        self.start();
    }
}

impl Drop for ParallelReaderEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
