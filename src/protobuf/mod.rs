//! RecordIO-Protobuf decoder subsystem (§4.J): the generated wire types,
//! schema inference over the `features`/`label` maps, and the decoder
//! strategy tying them to the instance/batch pipeline.

mod decoder;

pub use decoder::{ProtobufDecoder, RecordioProtobufParams};

/// Generated from `proto/record.proto` by `prost-build` (see `build.rs`),
/// mirroring the externally-defined wire schema (§6 "Protobuf message
/// schema") exactly.
pub mod wire {
    include!(concat!(env!("OUT_DIR"), "/tensorstream.wire.rs"));
}
