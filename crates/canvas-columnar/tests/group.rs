use canvas_columnar::{Column, Table, TableOptions, Value};
use pretty_assertions::assert_eq;

fn two_key_table(chunk: usize) -> Table {
    Table::from_columns_with_options(
        vec![
            Column::new("a", vec!["x".into(), "y".into(), "x".into(), "y".into(), "x".into()]),
            Column::new("b", vec![1.into(), 1.into(), 2.into(), 1.into(), 1.into()]),
        ],
        TableOptions {
            scan_chunk_rows: chunk,
        },
    )
    .unwrap()
}

#[test]
fn joint_group_by_is_a_partition() {
    let table = two_key_table(2);
    let groups = table.group_by(&["a", "b"]);

    let keys: Vec<_> = groups.iter().map(|g| g.key.clone()).collect();
    assert_eq!(
        keys,
        vec![
            vec![Value::from("x"), Value::from(1)],
            vec![Value::from("y"), Value::from(1)],
            vec![Value::from("x"), Value::from(2)],
        ]
    );

    let mut rows: Vec<usize> = groups.iter().flat_map(|g| g.rows.iter().copied()).collect();
    rows.sort_unstable();
    assert_eq!(rows, vec![0, 1, 2, 3, 4]);
}

#[test]
fn chunk_size_does_not_change_results() {
    let reference = two_key_table(65_536).group_by(&["a", "b"]);
    for chunk in [1, 2, 3, 4] {
        assert_eq!(two_key_table(chunk).group_by(&["a", "b"]), reference);
        assert_eq!(
            two_key_table(chunk).distinct_values("b"),
            vec![Value::from(1), Value::from(2)]
        );
    }
}

#[test]
fn missing_group_column_reads_as_null() {
    let groups = two_key_table(2).group_by(&["a", "missing"]);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key, vec![Value::from("x"), Value::Null]);
}
