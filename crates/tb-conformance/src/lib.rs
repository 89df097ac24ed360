#![forbid(unsafe_code)]

//! Shared fixtures for the tabula conformance suite.
//!
//! The builders here construct small, fully typed frames used across the
//! end-to-end and property-based tests; they panic on construction failure
//! because a broken fixture is a test bug, not an engine condition.

use tb_columnar::Series;
use tb_frame::DataFrame;
use tb_types::{Kind, Value};

/// `{name: [John, Nilly, John], age: [31, 25, 47]}` — the canonical
/// left-hand join fixture.
#[must_use]
pub fn people_frame() -> DataFrame {
    DataFrame::new(vec![
        Series::new(
            "name",
            Kind::Str,
            vec!["John".into(), "Nilly".into(), "John".into()],
        )
        .expect("name series"),
        Series::new(
            "age",
            Kind::Int,
            vec![Value::Int(31), Value::Int(25), Value::Int(47)],
        )
        .expect("age series"),
    ])
    .expect("people frame")
}

/// `{name: [John, Nilly, Nilly], city: [...]}` — the canonical right-hand
/// join fixture.
#[must_use]
pub fn cities_frame() -> DataFrame {
    DataFrame::new(vec![
        Series::new(
            "name",
            Kind::Str,
            vec!["John".into(), "Nilly".into(), "Nilly".into()],
        )
        .expect("name series"),
        Series::new(
            "city",
            Kind::Str,
            vec!["Oslo".into(), "Lima".into(), "Kyiv".into()],
        )
        .expect("city series"),
    ])
    .expect("cities frame")
}

/// A single-int-column frame, one row per value.
#[must_use]
pub fn int_frame(name: &str, values: &[i64]) -> DataFrame {
    let values = values.iter().copied().map(Value::Int).collect();
    DataFrame::new(vec![Series::new(name, Kind::Int, values).expect("int series")])
        .expect("int frame")
}

/// All rows of a frame as value vectors, in positional order.
#[must_use]
pub fn rows_of(frame: &DataFrame) -> Vec<Vec<Value>> {
    (0..frame.num_rows())
        .map(|index| frame.get_row(index).expect("index in range"))
        .collect()
}
