//! Schema & attribute model (§3, §4.G).

use indexmap::IndexMap;

use crate::dtype::DataType;
use crate::error::{DataReaderError, Result};

/// Describes one named feature: its element type, shape, strides, and
/// whether it is materialized densely or as a sparse (COO) tensor.
///
/// Invariant: `strides.len() == shape.len()`. Default strides are
/// row-major: `strides[i] = product(shape[i+1..])`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    dtype: DataType,
    shape: Vec<usize>,
    strides: Vec<isize>,
    sparse: bool,
}

impl Attribute {
    /// Construct an attribute with row-major default strides.
    pub fn new(name: impl Into<String>, dtype: DataType, shape: Vec<usize>) -> Self {
        let strides = row_major_strides(&shape);
        Attribute {
            name: name.into(),
            dtype,
            shape,
            strides,
            sparse: false,
        }
    }

    /// Construct a sparse attribute (COO-backed) with row-major strides
    /// over its logical shape.
    pub fn new_sparse(name: impl Into<String>, dtype: DataType, shape: Vec<usize>) -> Self {
        let mut attr = Attribute::new(name, dtype, shape);
        attr.sparse = true;
        attr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn sparse(&self) -> bool {
        self.sparse
    }

    /// Shape ignoring the leading batch dimension (dim 0).
    pub fn inner_shape(&self) -> &[usize] {
        &self.shape[1.min(self.shape.len())..]
    }
}

pub(crate) fn row_major_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![1isize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1] as isize;
    }
    strides
}

/// Ordered list of attributes plus a name→index lookup. Names must be
/// unique within a schema.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    attrs: Vec<Attribute>,
    name_index: IndexMap<String, usize>,
}

impl Schema {
    /// Build a schema from an ordered list of attributes. Fails with
    /// `SchemaError` if two attributes share a name.
    pub fn new(attrs: Vec<Attribute>) -> Result<Schema> {
        let mut name_index = IndexMap::with_capacity(attrs.len());
        for (idx, attr) in attrs.iter().enumerate() {
            if name_index.insert(attr.name.clone(), idx).is_some() {
                return Err(DataReaderError::Schema(format!(
                    "the dataset contains more than one column with the name '{}'",
                    attr.name
                )));
            }
        }
        Ok(Schema { attrs, name_index })
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attrs
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn get_index(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.get_index(name).map(|idx| &self.attrs[idx])
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.attrs == other.attrs
    }
}
