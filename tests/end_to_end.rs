//! End-to-end scenarios driven entirely through the public API
//! (`csv_reader`/`recordio_protobuf_reader`/`ParallelReaderEngine`),
//! exercising the same store/decode/batch/engine stack a real caller
//! would use rather than any one module in isolation.

use std::io::Write;

use tensorstream::csv::CsvParams;
use tensorstream::engine::EngineParams;
use tensorstream::error::DataReaderError;
use tensorstream::instance::InstanceReader;
use tensorstream::policy::BadExampleHandling;
use tensorstream::protobuf::RecordioProtobufParams;
use tensorstream::record::RecordReader;
use tensorstream::stream::{BlobStore, FileStore, Store};
use tensorstream::tensor::Tensor;

fn blob(id: &str, data: &[u8]) -> Box<dyn Store> {
    Box::new(BlobStore::new(id, data.to_vec()))
}

#[test]
fn csv_happy_path_reads_every_row_in_order() {
    let stores = vec![blob("mem://happy", b"a,b,c\n1,2,3\n4,5,6\n7,8,9\n")];
    let csv_params = CsvParams {
        header_row_index: Some(0),
        ..Default::default()
    };
    let engine_params = EngineParams {
        batch_size: 2,
        ..Default::default()
    };
    let mut reader = tensorstream::csv_reader(stores, csv_params, engine_params).unwrap();

    let first = reader.read_example().unwrap().unwrap();
    assert_eq!(first.schema.len(), 3);
    assert_eq!(first.padding, 0);
    match first.feature("a").unwrap() {
        Tensor::Dense(t) => assert_eq!(t.data.as_i64().unwrap(), &[1, 4]),
        _ => panic!("expected dense tensor"),
    }

    // The trailing short batch isn't padded under the default `None`
    // policy — it is just emitted at its true size.
    let second = reader.read_example().unwrap().unwrap();
    assert_eq!(second.padding, 0);
    match second.feature("a").unwrap() {
        Tensor::Dense(t) => assert_eq!(t.data.as_i64().unwrap(), &[7]),
        _ => panic!("expected dense tensor"),
    }

    assert!(reader.read_example().unwrap().is_none());
}

#[test]
fn csv_quoted_newline_survives_the_whole_pipeline() {
    let stores = vec![blob(
        "mem://quoted",
        b"text,n\n\"line one\nline two\",1\nplain,2\n",
    )];
    let csv_params = CsvParams {
        header_row_index: Some(0),
        allow_quoted_new_lines: true,
        ..Default::default()
    };
    let engine_params = EngineParams {
        batch_size: 1,
        ..Default::default()
    };
    let mut reader = tensorstream::csv_reader(stores, csv_params, engine_params).unwrap();

    let first = reader.read_example().unwrap().unwrap();
    match first.feature("text").unwrap() {
        Tensor::Dense(t) => assert_eq!(t.data.as_strings().unwrap(), &["line one\nline two"]),
        _ => panic!("expected dense tensor"),
    }

    let second = reader.read_example().unwrap().unwrap();
    match second.feature("text").unwrap() {
        Tensor::Dense(t) => assert_eq!(t.data.as_strings().unwrap(), &["plain"]),
        _ => panic!("expected dense tensor"),
    }

    assert!(reader.read_example().unwrap().is_none());
}

#[test]
fn bad_instance_skip_warn_drops_only_the_bad_batch() {
    // Row 2 has the wrong column count; under SkipWarn the whole batch
    // it lands in is dropped but surrounding batches still come through.
    let stores = vec![blob(
        "mem://skip",
        b"a,b\n1,2\n3\n4,5\n",
    )];
    let csv_params = CsvParams {
        header_row_index: Some(0),
        bad_example_handling: BadExampleHandling::SkipWarn,
        warn_bad_instances: true,
        ..Default::default()
    };
    let engine_params = EngineParams {
        batch_size: 1,
        ..Default::default()
    };
    let mut reader = tensorstream::csv_reader(stores, csv_params, engine_params).unwrap();

    let first = reader.read_example().unwrap().unwrap();
    match first.feature("a").unwrap() {
        Tensor::Dense(t) => assert_eq!(t.data.as_i64().unwrap(), &[1]),
        _ => panic!("expected dense tensor"),
    }

    // The malformed "3" row is silently dropped as its own one-row batch.
    let second = reader.read_example().unwrap().unwrap();
    match second.feature("a").unwrap() {
        Tensor::Dense(t) => assert_eq!(t.data.as_i64().unwrap(), &[4]),
        _ => panic!("expected dense tensor"),
    }

    assert!(reader.read_example().unwrap().is_none());
}

#[test]
fn pad_last_batch_zero_fills_trailing_rows() {
    let stores = vec![blob("mem://pad", b"a\n1\n2\n3\n")];
    let csv_params = CsvParams {
        header_row_index: Some(0),
        ..Default::default()
    };
    let engine_params = EngineParams {
        batch_size: 2,
        last_example_handling: tensorstream::batch_reader::LastBatchPolicy::Pad,
        ..Default::default()
    };
    let mut reader = tensorstream::csv_reader(stores, csv_params, engine_params).unwrap();

    let _ = reader.read_example().unwrap().unwrap();
    let second = reader.read_example().unwrap().unwrap();
    assert_eq!(second.padding, 1);
    match second.feature("a").unwrap() {
        Tensor::Dense(t) => assert_eq!(t.data.as_i64().unwrap(), &[3, 0]),
        _ => panic!("expected dense tensor"),
    }
    assert!(reader.read_example().unwrap().is_none());
}

/// Hand-rolled RecordIO frame builder shared by the protobuf scenarios.
/// `kind`: 0=Complete, 1=Begin, 2=Middle, 3=End.
fn recordio_frame(kind: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xCED7230Au32.to_le_bytes());
    let header = (kind << 30) | (payload.len() as u32 & 0x3FFF_FFFF);
    out.extend_from_slice(&header.to_le_bytes());
    out.extend_from_slice(payload);
    let padded = payload.len().div_ceil(4) * 4;
    out.resize(out.len() + (padded - payload.len()), 0);
    out
}

#[test]
fn recordio_split_sequence_reassembles_across_three_frames() {
    // A direct instance-reader test (no protobuf payload involved): a
    // Begin/Middle/End sequence must come back out as one instance with
    // its parts concatenated in order.
    let mut data = recordio_frame(1, b"AB");
    data.extend(recordio_frame(2, b"CD"));
    data.extend(recordio_frame(3, b"EF"));
    let store: Box<dyn Store> = Box::new(BlobStore::new("mem://split", data));

    struct RecordioFactory;
    impl tensorstream::instance::RecordReaderFactory for RecordioFactory {
        fn make_record_reader(
            &self,
            store: &dyn Store,
        ) -> tensorstream::error::Result<Box<dyn RecordReader>> {
            Ok(Box::new(tensorstream::record::RecordioReader::new(
                store.open_read()?,
                store.id(),
            )))
        }
    }

    let mut reader = InstanceReader::new(vec![store], Box::new(RecordioFactory), true);
    let instance = reader.read().unwrap().unwrap();
    assert_eq!(&instance.bits[..], b"ABCDEF");
    assert!(reader.read().unwrap().is_none());
}

#[test]
fn recordio_missing_end_latches_a_corrupt_split_record_error() {
    let data = recordio_frame(1, b"AB"); // Begin with no Middle/End.
    let store: Box<dyn Store> = Box::new(BlobStore::new("mem://truncated", data));

    struct RecordioFactory;
    impl tensorstream::instance::RecordReaderFactory for RecordioFactory {
        fn make_record_reader(
            &self,
            store: &dyn Store,
        ) -> tensorstream::error::Result<Box<dyn RecordReader>> {
            Ok(Box::new(tensorstream::record::RecordioReader::new(
                store.open_read()?,
                store.id(),
            )))
        }
    }

    let mut reader = InstanceReader::new(vec![store], Box::new(RecordioFactory), true);
    let err1 = reader.read().unwrap_err();
    assert!(matches!(err1, DataReaderError::CorruptSplitRecord { .. }));
    // Latched: every subsequent read re-raises without re-parsing.
    let err2 = reader.read().unwrap_err();
    assert!(matches!(err2, DataReaderError::CorruptSplitRecord { .. }));
}

#[test]
fn sparse_coo_feature_round_trips_through_the_full_engine() {
    use prost::Message;

    // Build a RecordIO-Protobuf store with two instances, each carrying
    // a sparse feature (key indices + declared shape, no dense values).
    let mut data = Vec::new();
    for keys_values in [vec![(0u64, 9.0f32), (3, 7.0)], vec![(1, 2.0)]] {
        let mut record = tensorstream::protobuf::wire::Record::default();
        record.features.insert(
            "s".to_string(),
            tensorstream::protobuf::wire::Value {
                kind: Some(tensorstream::protobuf::wire::value::Kind::Float32Tensor(
                    tensorstream::protobuf::wire::Float32Tensor {
                        values: keys_values.iter().map(|(_, v)| *v).collect(),
                        keys: keys_values.iter().map(|(k, _)| *k).collect(),
                        shape: vec![4],
                    },
                )),
            },
        );
        data.extend(recordio_frame(0, &record.encode_to_vec()));
    }
    let stores = vec![blob("mem://sparse", &data)];

    let protobuf_params = RecordioProtobufParams {
        batch_size: 2,
        ..Default::default()
    };
    let engine_params = EngineParams {
        batch_size: 2,
        ..Default::default()
    };
    let mut reader =
        tensorstream::recordio_protobuf_reader(stores, protobuf_params, engine_params).unwrap();

    let schema = reader.schema().unwrap();
    assert!(schema.attribute("s").unwrap().sparse());

    let example = reader.read_example().unwrap().unwrap();
    assert_eq!(example.padding, 0);
    match example.feature("s").unwrap() {
        Tensor::Coo(coo) => {
            assert_eq!(coo.nnz(), 3);
            assert_eq!(coo.values.as_f32().unwrap(), &[9.0, 7.0, 2.0]);
            assert_eq!(coo.indices[0].typed_data::<u64>(), &[0, 0, 1]); // row
        }
        _ => panic!("expected coo tensor"),
    }
    assert!(reader.read_example().unwrap().is_none());
}

#[test]
fn sharding_and_skip_compose_underneath_batching() {
    let stores = vec![blob("mem://shard", b"a\n1\n2\n3\n4\n5\n6\n")];
    let csv_params = CsvParams {
        header_row_index: Some(0),
        ..Default::default()
    };
    let engine_params = EngineParams {
        batch_size: 1,
        num_shards: 2,
        shard_index: 0,
        num_instances_to_skip: 1,
        ..Default::default()
    };
    let mut reader = tensorstream::csv_reader(stores, csv_params, engine_params).unwrap();

    // Skip runs closest to the raw stream, so skip=1 first turns
    // [1,2,3,4,5,6] into [2,3,4,5,6]; shard 0 of 2 then keeps that
    // stream's even positions (0-indexed): [2,4,6].
    let mut seen = Vec::new();
    while let Some(example) = reader.read_example().unwrap() {
        match example.feature("a").unwrap() {
            Tensor::Dense(t) => seen.extend_from_slice(t.data.as_i64().unwrap()),
            _ => panic!("expected dense tensor"),
        }
    }
    assert_eq!(seen, vec![2, 4, 6]);
}

#[test]
fn reads_a_real_file_on_disk_via_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"a,b\n10,20\n30,40\n").unwrap();
    drop(file);

    let stores: Vec<Box<dyn Store>> = vec![Box::new(FileStore::new(&path))];
    let csv_params = CsvParams {
        header_row_index: Some(0),
        ..Default::default()
    };
    let engine_params = EngineParams {
        batch_size: 2,
        ..Default::default()
    };
    let mut reader = tensorstream::csv_reader(stores, csv_params, engine_params).unwrap();

    let example = reader.read_example().unwrap().unwrap();
    match example.feature("b").unwrap() {
        Tensor::Dense(t) => assert_eq!(t.data.as_i64().unwrap(), &[20, 40]),
        _ => panic!("expected dense tensor"),
    }
    assert!(reader.read_example().unwrap().is_none());
}

#[test]
fn missing_file_store_surfaces_no_such_file() {
    let stores: Vec<Box<dyn Store>> = vec![Box::new(FileStore::new("/nonexistent/does-not-exist.csv"))];
    let csv_params = CsvParams {
        header_row_index: Some(0),
        ..Default::default()
    };
    let err = tensorstream::csv_reader(stores, csv_params, EngineParams::default()).unwrap_err();
    assert!(matches!(err, DataReaderError::NoSuchFile { .. }));
}
