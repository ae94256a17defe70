//! The decoded, batched output unit of the pipeline (§3).

use std::sync::Arc;

use crate::schema::Schema;
use crate::tensor::Tensor;

/// A batched, decoded set of named tensors sharing one schema.
///
/// Invariant: `features.len() == schema.len()`, each `features[i].dtype()
/// == schema.attributes()[i].dtype()`, and `features[i].shape()[0] <=
/// batch_size`.
#[derive(Debug, Clone)]
pub struct Example {
    pub schema: Arc<Schema>,
    pub features: Vec<Tensor>,
    /// Trailing rows in the batch that are zero-filled because the batch
    /// was short (last-example `Pad`) or an instance was bad
    /// (bad-example `Pad`).
    pub padding: usize,
}

impl Example {
    pub fn new(schema: Arc<Schema>, features: Vec<Tensor>, padding: usize) -> Example {
        Example {
            schema,
            features,
            padding,
        }
    }

    /// Look up a feature tensor by its schema name.
    pub fn feature(&self, name: &str) -> Option<&Tensor> {
        self.schema.get_index(name).map(|idx| &self.features[idx])
    }
}
