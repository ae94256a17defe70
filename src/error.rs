use thiserror::Error;

/// The unified error taxonomy for the dataset reader pipeline.
///
/// Every fallible operation in this crate returns a [`Result`] built on
/// this enum; worker-side failures (bad instances under the `Error`
/// policy) are surfaced through the same type as I/O and schema failures.
#[derive(Error, Debug)]
pub enum DataReaderError {
    #[error("data store '{store}' does not exist")]
    NoSuchFile { store: String },

    #[error("permission denied opening data store '{store}'")]
    PermissionDenied { store: String },

    #[error("timed out reading data store '{store}'")]
    TimedOut { store: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream error reading '{store}': {message}")]
    Stream { store: String, message: String },

    #[error("inflate error reading '{store}': {message}")]
    Inflate { store: String, message: String },

    #[error("text-encoding error reading '{store}': {message}")]
    Encoding { store: String, message: String },

    #[error("corrupt record in '{store}' at record #{index}: {message}")]
    CorruptRecord {
        store: String,
        index: usize,
        message: String,
    },

    #[error("corrupt split-record sequence in '{store}' at instance #{index}: {message}")]
    CorruptSplitRecord {
        store: String,
        index: usize,
        message: String,
    },

    #[error("record too large in '{store}': {length} bytes exceeds the configured limit of {limit} bytes")]
    RecordTooLarge {
        store: String,
        length: usize,
        limit: usize,
    },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("invalid instance #{index} in '{store}': {message}")]
    InvalidInstance {
        store: String,
        index: usize,
        message: String,
    },

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl Clone for DataReaderError {
    /// Hand-written because a few variants wrap foreign error types
    /// (`io::Error`, `prost::DecodeError`, `ArrowError`) that aren't
    /// `Clone`. Those collapse to their rendered message inside a
    /// `Stream` variant; every other variant clones exactly. Needed so
    /// the parallel engine (§4.F) can re-raise the first worker error on
    /// every subsequent `read_example` call after the error channel has
    /// already been drained once.
    fn clone(&self) -> Self {
        match self {
            DataReaderError::NoSuchFile { store } => DataReaderError::NoSuchFile { store: store.clone() },
            DataReaderError::PermissionDenied { store } => DataReaderError::PermissionDenied { store: store.clone() },
            DataReaderError::TimedOut { store } => DataReaderError::TimedOut { store: store.clone() },
            DataReaderError::Io(e) => DataReaderError::Stream {
                store: String::new(),
                message: e.to_string(),
            },
            DataReaderError::Stream { store, message } => DataReaderError::Stream {
                store: store.clone(),
                message: message.clone(),
            },
            DataReaderError::Inflate { store, message } => DataReaderError::Inflate {
                store: store.clone(),
                message: message.clone(),
            },
            DataReaderError::Encoding { store, message } => DataReaderError::Encoding {
                store: store.clone(),
                message: message.clone(),
            },
            DataReaderError::CorruptRecord { store, index, message } => DataReaderError::CorruptRecord {
                store: store.clone(),
                index: *index,
                message: message.clone(),
            },
            DataReaderError::CorruptSplitRecord { store, index, message } => DataReaderError::CorruptSplitRecord {
                store: store.clone(),
                index: *index,
                message: message.clone(),
            },
            DataReaderError::RecordTooLarge { store, length, limit } => DataReaderError::RecordTooLarge {
                store: store.clone(),
                length: *length,
                limit: *limit,
            },
            DataReaderError::Schema(s) => DataReaderError::Schema(s.clone()),
            DataReaderError::InvalidInstance { store, index, message } => DataReaderError::InvalidInstance {
                store: store.clone(),
                index: *index,
                message: message.clone(),
            },
            DataReaderError::NotSupported(s) => DataReaderError::NotSupported(s.clone()),
            DataReaderError::InvalidArgument(s) => DataReaderError::InvalidArgument(s.clone()),
            DataReaderError::Protobuf(e) => DataReaderError::Stream {
                store: String::new(),
                message: e.to_string(),
            },
            DataReaderError::Arrow(e) => DataReaderError::Stream {
                store: String::new(),
                message: e.to_string(),
            },
        }
    }
}

impl DataReaderError {
    /// Wrap a raw `io::Error` that occurred while opening or reading
    /// `store`, mapping well-known OS error kinds to the specific
    /// variants named in the error taxonomy (§7: "System I/O... mapped
    /// to specific messages naming the store").
    pub fn from_io(store: impl Into<String>, err: std::io::Error) -> Self {
        let store = store.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => DataReaderError::NoSuchFile { store },
            std::io::ErrorKind::PermissionDenied => DataReaderError::PermissionDenied { store },
            std::io::ErrorKind::TimedOut => DataReaderError::TimedOut { store },
            _ => DataReaderError::Stream {
                store,
                message: err.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, DataReaderError>;
