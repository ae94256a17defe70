//! Batching and last-example policy (§4.D).

use crate::error::Result;
use crate::instance::Instance;
use crate::logger::warn_last_batch;
use crate::pipeline::InstanceSource;

/// What to do with a trailing batch that has fewer than `batch_size`
/// instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastBatchPolicy {
    None,
    Drop,
    DropWarn,
    Pad,
    PadWarn,
}

/// A batch of instances pulled off an `InstanceReader`, plus how many
/// of the `size` slots are real (the rest are padding, under `Pad`).
pub struct InstanceBatch {
    pub batch_index: usize,
    pub size: usize,
    pub instances: Vec<Instance>,
}

/// Groups instances pulled off any `InstanceSource` — a bare
/// `InstanceReader` or one wrapped in shard/skip/sample/shuffle stages
/// (§4.E) — into batches.
pub struct BatchReader<S: InstanceSource> {
    inner: S,
    batch_size: usize,
    policy: LastBatchPolicy,
    batch_index: usize,
}

impl<S: InstanceSource> BatchReader<S> {
    pub fn new(inner: S, batch_size: usize, policy: LastBatchPolicy) -> BatchReader<S> {
        BatchReader {
            inner,
            batch_size,
            policy,
            batch_index: 0,
        }
    }

    pub fn reset(&mut self) {
        self.inner.reset();
        self.batch_index = 0;
    }

    /// Reads the next batch, or `Ok(None)` at EOF (including a dropped
    /// trailing partial batch under `Drop`/`DropWarn`).
    pub fn read(&mut self) -> Result<Option<InstanceBatch>> {
        let mut instances = Vec::with_capacity(self.batch_size);
        while instances.len() < self.batch_size {
            match self.inner.read()? {
                Some(instance) => instances.push(instance),
                None => break,
            }
        }

        if instances.is_empty() {
            return Ok(None);
        }

        let batch_index = self.batch_index;
        self.batch_index += 1;

        if instances.len() == self.batch_size {
            return Ok(Some(InstanceBatch {
                batch_index,
                size: self.batch_size,
                instances,
            }));
        }

        match self.policy {
            LastBatchPolicy::None => Ok(Some(InstanceBatch {
                batch_index,
                size: instances.len(),
                instances,
            })),
            LastBatchPolicy::Drop => Ok(None),
            LastBatchPolicy::DropWarn => {
                warn_last_batch(
                    batch_index,
                    &format!(
                        "dropping trailing batch of {} instances (short of {})",
                        instances.len(),
                        self.batch_size
                    ),
                );
                Ok(None)
            }
            LastBatchPolicy::Pad => Ok(Some(InstanceBatch {
                batch_index,
                size: self.batch_size,
                instances,
            })),
            LastBatchPolicy::PadWarn => {
                warn_last_batch(
                    batch_index,
                    &format!(
                        "padding trailing batch of {} instances up to {}",
                        instances.len(),
                        self.batch_size
                    ),
                );
                Ok(Some(InstanceBatch {
                    batch_index,
                    size: self.batch_size,
                    instances,
                }))
            }
        }
    }
}
