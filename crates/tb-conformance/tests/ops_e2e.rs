#![forbid(unsafe_code)]

//! End-to-end operator conformance: each test walks a full
//! construct-mutate-derive pipeline across the frame and join crates.

use tb_columnar::Series;
use tb_conformance::{cities_frame, int_frame, people_frame, rows_of};
use tb_frame::{DataFrame, FrameError};
use tb_join::{JoinKind, join};
use tb_types::{Kind, Value};

#[test]
fn create_reports_input_shape() {
    let frame = people_frame();
    assert_eq!(frame.num_rows(), 3);
    assert_eq!(frame.num_cols(), 2);
    frame.validate().expect("no schema or length skew");
}

#[test]
fn create_rejects_duplicate_names() {
    let err = DataFrame::new(vec![
        Series::new("x", Kind::Int, vec![Value::Int(1)]).expect("x"),
        Series::new("x", Kind::Bool, vec![Value::Bool(true)]).expect("x again"),
    ])
    .expect_err("duplicate name");
    assert!(matches!(err, FrameError::DuplicateColumn { .. }));
}

#[test]
fn add_then_drop_column_leaves_no_residue() {
    let mut frame = people_frame();
    frame
        .add_column(
            Series::new(
                "active",
                Kind::Bool,
                vec![Value::Bool(true), Value::Bool(true), Value::Bool(false)],
            )
            .expect("active"),
        )
        .expect("add");
    frame.drop_column("active").expect("drop");

    assert_eq!(frame.num_cols(), 2);
    assert!(!frame.names().contains(&"active".to_owned()));
    assert!(frame.column("active").is_none());
    frame.validate().expect("no residual skew");
}

#[test]
fn filter_is_idempotent_end_to_end() {
    let mut frame = people_frame();
    frame.filter("name", &"John".into()).expect("first pass");
    let once = rows_of(&frame);
    frame.filter("name", &"John".into()).expect("second pass");
    assert_eq!(rows_of(&frame), once);
    assert_eq!(frame.num_rows(), 2);
}

#[test]
fn union_is_associative_in_row_content() {
    let a = int_frame("v", &[1, 2]);
    let b = int_frame("v", &[3]);
    let c = int_frame("v", &[4, 5]);

    let left_assoc = a.union(&b).expect("a+b").union(&c).expect("(a+b)+c");
    let right_assoc = a.union(&b.union(&c).expect("b+c")).expect("a+(b+c)");
    assert_eq!(rows_of(&left_assoc), rows_of(&right_assoc));
    assert_eq!(left_assoc.num_rows(), 5);
}

#[test]
fn union_rejects_column_count_mismatch() {
    let frame = people_frame();
    let narrow = frame.select(&["name"]).expect("narrow");
    assert!(matches!(
        frame.union(&narrow),
        Err(FrameError::ColumnCountMismatch { .. })
    ));
}

#[test]
fn cross_join_row_count_is_the_product() {
    let out = join(
        &people_frame(),
        &cities_frame(),
        &[],
        &[],
        JoinKind::Cross,
    )
    .expect("cross join");
    assert_eq!(out.num_rows(), 9);
}

#[test]
fn inner_join_matches_expected_cardinality() {
    // John (2 left) x John (1 right) = 2 rows; Nilly (1 left) x
    // Nilly (2 right) = 2 rows; nothing else.
    let out = join(
        &people_frame(),
        &cities_frame(),
        &["name"],
        &["name"],
        JoinKind::Inner,
    )
    .expect("inner join");
    assert_eq!(out.num_rows(), 4);

    let names: Vec<Value> = out
        .column("name")
        .expect("name column")
        .values()
        .cloned()
        .collect();
    assert_eq!(
        names.iter().filter(|v| **v == Value::from("John")).count(),
        2
    );
    assert_eq!(
        names.iter().filter(|v| **v == Value::from("Nilly")).count(),
        2
    );
}

#[test]
fn left_join_pads_exactly_the_left_only_key() {
    let mut left = people_frame();
    left.add_row(vec!["Zoe".into(), Value::Int(19)])
        .expect("Zoe exists only on the left");

    let out = join(&left, &cities_frame(), &["name"], &["name"], JoinKind::Left)
        .expect("left join");
    assert_eq!(out.num_rows(), 5);

    let padded: Vec<usize> = out
        .column("city_right")
        .expect("city_right")
        .values()
        .enumerate()
        .filter_map(|(row, value)| value.is_null().then_some(row))
        .collect();
    assert_eq!(padded.len(), 1);
    let row = out.get_row(padded[0]).expect("padded row");
    assert_eq!(row[0], Value::from("Zoe"));
}

#[test]
fn add_row_with_wrong_arity_changes_nothing() {
    let mut frame = people_frame();
    let before = rows_of(&frame);
    let err = frame
        .add_row(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        .expect_err("wrong arity");
    assert!(matches!(err, FrameError::RowLengthMismatch { .. }));
    assert_eq!(frame.num_rows(), 3);
    assert_eq!(rows_of(&frame), before);
}

#[test]
fn select_then_mutate_never_touches_the_source() {
    let frame = people_frame();
    let mut view = frame.select(&["name"]).expect("select");
    view.add_row(vec!["Ada".into()]).expect("grow the selection");
    assert_eq!(view.num_rows(), 4);
    assert_eq!(frame.num_rows(), 3);
}

#[test]
fn join_on_filtered_frame_uses_current_rows() {
    // Filtering keeps origins stale by design; joining afterwards matches
    // on current values, so the filtered-out Nilly row cannot resurface.
    let mut left = people_frame();
    left.filter("name", &"John".into()).expect("filter");

    let out = join(&left, &cities_frame(), &["name"], &["name"], JoinKind::Inner)
        .expect("join after filter");
    assert_eq!(out.num_rows(), 2);
    for row in rows_of(&out) {
        assert_eq!(row[0], Value::from("John"));
    }
}
