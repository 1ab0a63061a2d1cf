use arrow_array::builder::StringDictionaryBuilder;
use arrow_array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, ListArray,
    RecordBatch, StringArray, UInt64Array,
};
use arrow_ipc::writer::{FileWriter, StreamWriter};
use arrow_schema::{DataType, Field, Schema};
use canvas_columnar::{decode_ipc, ColumnType, DecodeError, Value};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn stream_bytes(batches: &[RecordBatch]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let schema = batches[0].schema();
    let mut buf = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buf, &schema)?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.finish()?;
    }
    Ok(buf)
}

fn sample_batch() -> Result<RecordBatch, Box<dyn std::error::Error>> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("cat", DataType::Utf8, true),
        Field::new("score", DataType::Float64, true),
        Field::new("ok", DataType::Boolean, true),
    ]));
    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
            Arc::new(StringArray::from(vec![Some("A"), None, Some("B")])) as ArrayRef,
            Arc::new(Float64Array::from(vec![Some(0.5), Some(1.5), None])) as ArrayRef,
            Arc::new(BooleanArray::from(vec![Some(true), Some(false), None])) as ArrayRef,
        ],
    )?)
}

#[test]
fn stream_format_decodes_schema_and_cells() -> Result<(), Box<dyn std::error::Error>> {
    let bytes = stream_bytes(&[sample_batch()?])?;
    let table = decode_ipc(&bytes)?;

    assert_eq!(table.row_count(), 3);
    assert_eq!(
        table.column_names().collect::<Vec<_>>(),
        vec!["id", "cat", "score", "ok"]
    );
    assert_eq!(table.column_type("id"), Some(ColumnType::Number));
    assert_eq!(table.column_type("cat"), Some(ColumnType::String));
    assert_eq!(table.column_type("ok"), Some(ColumnType::Boolean));
    assert_eq!(table.column_type("nope"), None);

    assert_eq!(table.get(0, "id"), Some(&Value::from(1)));
    assert_eq!(table.get(1, "cat"), Some(&Value::Null));
    assert_eq!(table.get(2, "cat"), Some(&Value::from("B")));
    assert_eq!(table.get(1, "score"), Some(&Value::from(1.5)));
    assert_eq!(table.get(2, "ok"), Some(&Value::Null));
    Ok(())
}

#[test]
fn multiple_batches_are_concatenated() -> Result<(), Box<dyn std::error::Error>> {
    let batch = sample_batch()?;
    let bytes = stream_bytes(&[batch.clone(), batch])?;
    let table = decode_ipc(&bytes)?;
    assert_eq!(table.row_count(), 6);
    assert_eq!(table.get(3, "id"), Some(&Value::from(1)));
    Ok(())
}

#[test]
fn file_format_is_accepted() -> Result<(), Box<dyn std::error::Error>> {
    let batch = sample_batch()?;
    let mut buf = Vec::new();
    {
        let mut writer = FileWriter::try_new(&mut buf, &batch.schema())?;
        writer.write(&batch)?;
        writer.finish()?;
    }
    let table = decode_ipc(&buf)?;
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.get(2, "cat"), Some(&Value::from("B")));
    Ok(())
}

#[test]
fn nested_dictionary_and_temporal_columns() -> Result<(), Box<dyn std::error::Error>> {
    let mut dict = StringDictionaryBuilder::<arrow_array::types::Int32Type>::new();
    dict.append("x")?;
    dict.append_null();
    dict.append("x")?;
    let dict = Arc::new(dict.finish()) as ArrayRef;

    let list = Arc::new(ListArray::from_iter_primitive::<
        arrow_array::types::Int32Type,
        _,
        _,
    >(vec![
        Some(vec![Some(1), Some(2)]),
        None,
        Some(vec![]),
    ])) as ArrayRef;

    let date = Arc::new(Date32Array::from(vec![Some(1), None, Some(0)])) as ArrayRef;
    let n = Arc::new(Int32Array::from(vec![7, 8, 9])) as ArrayRef;

    let batch = RecordBatch::try_from_iter(vec![
        ("tag", dict),
        ("items", list),
        ("day", date),
        ("n", n),
    ])?;
    let table = decode_ipc(&stream_bytes(&[batch])?)?;

    assert_eq!(table.column_type("tag"), Some(ColumnType::String));
    assert_eq!(table.column_type("items"), Some(ColumnType::Array));
    assert_eq!(table.column_type("day"), Some(ColumnType::Object));

    assert_eq!(table.get(0, "tag"), Some(&Value::from("x")));
    assert_eq!(table.get(1, "tag"), Some(&Value::Null));
    assert_eq!(
        table.get(0, "items"),
        Some(&Value::Array(Arc::from(vec![Value::from(1), Value::from(2)])))
    );
    assert_eq!(table.get(1, "items"), Some(&Value::Null));
    assert_eq!(table.get(2, "items"), Some(&Value::Array(Arc::from(Vec::new()))));
    assert_eq!(table.get(0, "day"), Some(&Value::DateTime(86_400_000)));
    Ok(())
}

#[test]
fn truncated_buffer_is_a_decode_error() -> Result<(), Box<dyn std::error::Error>> {
    let bytes = stream_bytes(&[sample_batch()?])?;
    let err = decode_ipc(&bytes[..bytes.len() - 20]).unwrap_err();
    assert!(matches!(err, DecodeError::Arrow(_)), "{err:?}");
    assert!(err.to_string().starts_with("malformed Arrow IPC buffer"));
    Ok(())
}

#[test]
fn wide_integers_keep_their_identity() -> Result<(), Box<dyn std::error::Error>> {
    let edge = 1_i64 << 53;
    let batch = RecordBatch::try_from_iter(vec![
        (
            "id",
            Arc::new(Int64Array::from(vec![edge, edge + 1, edge, edge + 1])) as ArrayRef,
        ),
        (
            "hash",
            Arc::new(UInt64Array::from(vec![u64::MAX, u64::MAX - 1, 7, u64::MAX])) as ArrayRef,
        ),
    ])?;
    let table = decode_ipc(&stream_bytes(&[batch])?)?;

    assert_eq!(table.column_type("id"), Some(ColumnType::Number));
    assert_eq!(table.get(0, "id"), Some(&Value::from(edge)));
    assert_eq!(table.get(1, "id"), Some(&Value::BigInt(i128::from(edge) + 1)));
    assert_eq!(
        table.distinct_values("id"),
        vec![Value::from(edge), Value::from(edge + 1)]
    );

    let groups = table.group_by(&["id"]);
    let rows: Vec<Vec<usize>> = groups.into_iter().map(|g| g.rows).collect();
    assert_eq!(rows, vec![vec![0, 2], vec![1, 3]]);

    assert_eq!(table.distinct_values("hash").len(), 3);
    assert_eq!(table.get(2, "hash"), Some(&Value::from(7)));
    Ok(())
}
