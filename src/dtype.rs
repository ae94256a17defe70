//! The closed set of element types a tensor can carry (§3 Data model).

/// Element type of a tensor. Closed enum: fixed-width numeric types plus
/// a variable-length owned `String` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Platform unsigned index type (`usize`).
    Size,
    Float16,
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    /// Owned, variable-length UTF-8 byte sequence.
    String,
}

impl DataType {
    /// Size in bytes of one element, or `None` for the variable-length
    /// `String` type.
    pub fn element_size(&self) -> Option<usize> {
        match self {
            DataType::Size => Some(std::mem::size_of::<usize>()),
            DataType::Float16 => Some(2),
            DataType::Float32 => Some(4),
            DataType::Float64 => Some(8),
            DataType::Int8 | DataType::UInt8 => Some(1),
            DataType::Int16 | DataType::UInt16 => Some(2),
            DataType::Int32 | DataType::UInt32 => Some(4),
            DataType::Int64 | DataType::UInt64 => Some(8),
            DataType::String => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, DataType::String)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Size => "size",
            DataType::Float16 => "float16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::String => "string",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Infer a `DataType` from a field's textual representation, per the CSV
/// decoder's schema-inference rule (§4.I.1): empty ⇒ string; try signed
/// 64-bit integer; on overflow try unsigned 64-bit; else try double; else
/// string.
pub fn infer_data_type(text: &str) -> DataType {
    if text.is_empty() {
        return DataType::String;
    }
    if text.parse::<i64>().is_ok() {
        return DataType::Int64;
    }
    if text.parse::<u64>().is_ok() {
        return DataType::UInt64;
    }
    if text.parse::<f64>().is_ok() {
        return DataType::Float64;
    }
    DataType::String
}
