#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::size_of;
use std::str::FromStr;

use bumpalo::{Bump, collections::Vec as BumpVec};
use tb_columnar::{ColumnError, Series};
use tb_frame::{DataFrame, FrameError};
use tb_types::{Kind, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Outer,
    Cross,
}

impl JoinKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Outer => "outer",
            Self::Cross => "cross",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinKind {
    type Err = JoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "outer" => Ok(Self::Outer),
            "cross" => Ok(Self::Cross),
            other => Err(JoinError::InvalidJoinType {
                found: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("invalid join type: {found}")]
    InvalidJoinType { found: String },
    #[error("join key count mismatch: {left} left keys, {right} right keys")]
    KeyCountMismatch { left: usize, right: usize },
    #[error("join column '{name}' does not exist in {side} frame")]
    ColumnNotFound { side: Side, name: String },
    #[error("join key dtype mismatch: left is {left}, right is {right}")]
    KeyTypeMismatch { left: Kind, right: Kind },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

pub const DEFAULT_ARENA_BUDGET_BYTES: usize = 256 * 1024 * 1024;

/// Allocator choice for the intermediate position vectors. Joins within
/// the byte budget build them in a bump arena freed wholesale at the end;
/// larger joins fall back to the global allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinExecutionOptions {
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for JoinExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_ARENA_BUDGET_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JoinExecutionTrace {
    used_arena: bool,
    estimated_rows: usize,
    estimated_bytes: usize,
}

/// Join key wrapper giving [`Value`] the `Hash`/`Eq` surface a probe map
/// needs. Floats hash by bit pattern with negative zero folded onto zero;
/// `NaN` hashes but never compares equal, so NaN keys never match. `Null`
/// keys match `Null` keys.
#[derive(Debug, Clone, PartialEq)]
struct KeyValue<'a>(&'a Value);

impl Eq for KeyValue<'_> {}

impl Hash for KeyValue<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.0 {
            Value::Int(v) => {
                0_u8.hash(state);
                v.hash(state);
            }
            Value::Float(v) => {
                1_u8.hash(state);
                let bits = if *v == 0.0 { 0.0_f64.to_bits() } else { v.to_bits() };
                bits.hash(state);
            }
            Value::Str(v) => {
                2_u8.hash(state);
                v.hash(state);
            }
            Value::Bool(v) => {
                3_u8.hash(state);
                v.hash(state);
            }
            Value::Null => 4_u8.hash(state),
        }
    }
}

/// Join two frames on a single equality key (or none, for cross joins).
///
/// Only `left_on[0]`/`right_on[0]` participate in matching; additional
/// keys are validated for existence but not evaluated. This is a
/// documented single-key limitation, not an implicit multi-key join.
///
/// Right-side non-key result columns are suffixed `_right` (left-side
/// `_left` in a right join). A pre-existing column already carrying the
/// suffixed name surfaces as a duplicate-column error from result
/// construction.
pub fn join(
    left: &DataFrame,
    right: &DataFrame,
    left_on: &[&str],
    right_on: &[&str],
    kind: JoinKind,
) -> Result<DataFrame, JoinError> {
    join_with_options(left, right, left_on, right_on, kind, JoinExecutionOptions::default())
}

pub fn join_with_options(
    left: &DataFrame,
    right: &DataFrame,
    left_on: &[&str],
    right_on: &[&str],
    kind: JoinKind,
    options: JoinExecutionOptions,
) -> Result<DataFrame, JoinError> {
    let (joined, _) = join_with_trace(left, right, left_on, right_on, kind, options)?;
    Ok(joined)
}

fn join_with_trace(
    left: &DataFrame,
    right: &DataFrame,
    left_on: &[&str],
    right_on: &[&str],
    kind: JoinKind,
    options: JoinExecutionOptions,
) -> Result<(DataFrame, JoinExecutionTrace), JoinError> {
    if kind == JoinKind::Cross {
        return cross_join_with_trace(left, right, options);
    }

    if left_on.len() != right_on.len() {
        return Err(JoinError::KeyCountMismatch {
            left: left_on.len(),
            right: right_on.len(),
        });
    }
    for name in left_on {
        if left.column(name).is_none() {
            return Err(JoinError::ColumnNotFound {
                side: Side::Left,
                name: (*name).to_owned(),
            });
        }
    }
    for name in right_on {
        if right.column(name).is_none() {
            return Err(JoinError::ColumnNotFound {
                side: Side::Right,
                name: (*name).to_owned(),
            });
        }
    }

    let left_key = left.column(left_on[0]).expect("validated above");
    let right_key = right.column(right_on[0]).expect("validated above");
    if left_key.kind() != right_key.kind() {
        return Err(JoinError::KeyTypeMismatch {
            left: left_key.kind(),
            right: right_key.kind(),
        });
    }

    // Equi-join core: a multimap from key value to row positions on the
    // probed side, O(n + m) on average.
    let (probe_map, estimated_rows) = match kind {
        JoinKind::Right => {
            let map = position_multimap(left_key);
            let rows = estimate_probe_rows(right_key, &map, true);
            (map, rows)
        }
        JoinKind::Inner | JoinKind::Left | JoinKind::Outer => {
            let map = position_multimap(right_key);
            let mut rows = estimate_probe_rows(left_key, &map, kind != JoinKind::Inner);
            if kind == JoinKind::Outer {
                // Upper bound: every right row could be unmatched.
                rows += right_key.len();
            }
            (map, rows)
        }
        JoinKind::Cross => unreachable!("cross joins take the dedicated path"),
    };

    let estimated_bytes = estimate_intermediate_bytes(estimated_rows);
    let use_arena = options.use_arena && estimated_bytes <= options.arena_budget_bytes;

    let joined = if use_arena {
        let arena = Bump::new();
        let mut left_positions = BumpVec::with_capacity_in(estimated_rows, &arena);
        let mut right_positions = BumpVec::with_capacity_in(estimated_rows, &arena);
        fill_pairs(
            kind,
            left_key,
            right_key,
            &probe_map,
            &mut left_positions,
            &mut right_positions,
        );
        materialize(
            left,
            right,
            Some((left_on[0], right_on[0])),
            kind,
            left_positions.as_slice(),
            right_positions.as_slice(),
        )?
    } else {
        let mut left_positions = Vec::with_capacity(estimated_rows);
        let mut right_positions = Vec::with_capacity(estimated_rows);
        fill_pairs(
            kind,
            left_key,
            right_key,
            &probe_map,
            &mut left_positions,
            &mut right_positions,
        );
        materialize(
            left,
            right,
            Some((left_on[0], right_on[0])),
            kind,
            &left_positions,
            &right_positions,
        )?
    };

    Ok((
        joined,
        JoinExecutionTrace {
            used_arena: use_arena,
            estimated_rows,
            estimated_bytes,
        },
    ))
}

fn cross_join_with_trace(
    left: &DataFrame,
    right: &DataFrame,
    options: JoinExecutionOptions,
) -> Result<(DataFrame, JoinExecutionTrace), JoinError> {
    let rows = left.num_rows() * right.num_rows();
    let estimated_bytes = estimate_intermediate_bytes(rows);
    let use_arena = options.use_arena && estimated_bytes <= options.arena_budget_bytes;

    let joined = if use_arena {
        let arena = Bump::new();
        let mut left_positions = BumpVec::with_capacity_in(rows, &arena);
        let mut right_positions = BumpVec::with_capacity_in(rows, &arena);
        fill_cross_pairs(left.num_rows(), right.num_rows(), &mut left_positions, &mut right_positions);
        materialize(
            left,
            right,
            None,
            JoinKind::Cross,
            left_positions.as_slice(),
            right_positions.as_slice(),
        )?
    } else {
        let mut left_positions = Vec::with_capacity(rows);
        let mut right_positions = Vec::with_capacity(rows);
        fill_cross_pairs(left.num_rows(), right.num_rows(), &mut left_positions, &mut right_positions);
        materialize(left, right, None, JoinKind::Cross, &left_positions, &right_positions)?
    };

    Ok((
        joined,
        JoinExecutionTrace {
            used_arena: use_arena,
            estimated_rows: rows,
            estimated_bytes,
        },
    ))
}

fn position_multimap(key: &Series) -> HashMap<KeyValue<'_>, Vec<usize>> {
    let mut map: HashMap<KeyValue<'_>, Vec<usize>> = HashMap::new();
    for (position, value) in key.values().enumerate() {
        map.entry(KeyValue(value)).or_default().push(position);
    }
    map
}

fn estimate_probe_rows(
    probe_key: &Series,
    map: &HashMap<KeyValue<'_>, Vec<usize>>,
    keep_unmatched: bool,
) -> usize {
    probe_key
        .values()
        .map(|value| match map.get(&KeyValue(value)) {
            Some(hits) => hits.len(),
            None if keep_unmatched => 1,
            None => 0,
        })
        .sum()
}

fn estimate_intermediate_bytes(rows: usize) -> usize {
    rows.saturating_mul(size_of::<Option<usize>>().saturating_mul(2))
}

/// Push-only surface shared by the arena-backed and global-allocator
/// position vectors.
trait PositionSink {
    fn push_position(&mut self, position: Option<usize>);
}

impl PositionSink for Vec<Option<usize>> {
    fn push_position(&mut self, position: Option<usize>) {
        self.push(position);
    }
}

impl PositionSink for BumpVec<'_, Option<usize>> {
    fn push_position(&mut self, position: Option<usize>) {
        self.push(position);
    }
}

fn fill_pairs(
    kind: JoinKind,
    left_key: &Series,
    right_key: &Series,
    probe_map: &HashMap<KeyValue<'_>, Vec<usize>>,
    left_positions: &mut impl PositionSink,
    right_positions: &mut impl PositionSink,
) {
    match kind {
        JoinKind::Inner | JoinKind::Left | JoinKind::Outer => {
            let mut matched_right = vec![false; right_key.len()];
            for (left_pos, value) in left_key.values().enumerate() {
                if let Some(hits) = probe_map.get(&KeyValue(value)) {
                    for &right_pos in hits {
                        left_positions.push_position(Some(left_pos));
                        right_positions.push_position(Some(right_pos));
                        matched_right[right_pos] = true;
                    }
                    continue;
                }
                if kind != JoinKind::Inner {
                    left_positions.push_position(Some(left_pos));
                    right_positions.push_position(None);
                }
            }
            if kind == JoinKind::Outer {
                for (right_pos, matched) in matched_right.iter().enumerate() {
                    if !matched {
                        left_positions.push_position(None);
                        right_positions.push_position(Some(right_pos));
                    }
                }
            }
        }
        JoinKind::Right => {
            // Mirror of the left join: probe the left-side multimap in
            // right-row order.
            for (right_pos, value) in right_key.values().enumerate() {
                if let Some(hits) = probe_map.get(&KeyValue(value)) {
                    for &left_pos in hits {
                        left_positions.push_position(Some(left_pos));
                        right_positions.push_position(Some(right_pos));
                    }
                    continue;
                }
                left_positions.push_position(None);
                right_positions.push_position(Some(right_pos));
            }
        }
        JoinKind::Cross => unreachable!("cross joins take the dedicated path"),
    }
}

fn fill_cross_pairs(
    left_rows: usize,
    right_rows: usize,
    left_positions: &mut impl PositionSink,
    right_positions: &mut impl PositionSink,
) {
    for left_pos in 0..left_rows {
        for right_pos in 0..right_rows {
            left_positions.push_position(Some(left_pos));
            right_positions.push_position(Some(right_pos));
        }
    }
}

fn materialize(
    left: &DataFrame,
    right: &DataFrame,
    keys: Option<(&str, &str)>,
    kind: JoinKind,
    left_positions: &[Option<usize>],
    right_positions: &[Option<usize>],
) -> Result<DataFrame, JoinError> {
    let mut columns = Vec::with_capacity(left.num_cols() + right.num_cols());

    match kind {
        JoinKind::Inner | JoinKind::Left | JoinKind::Outer => {
            let (left_key, right_key) = keys.expect("equi-joins carry keys");
            for series in left.series() {
                if kind == JoinKind::Outer && series.name() == left_key {
                    let right_key_series =
                        right.column(right_key).expect("key validated by caller");
                    columns.push(gather_outer_key(
                        series,
                        right_key_series,
                        left_positions,
                        right_positions,
                    )?);
                } else {
                    columns.push(gather(series, series.name().to_owned(), left_positions)?);
                }
            }
            // The right join column is dropped; its values survive through
            // the left key column.
            for series in right.series() {
                if series.name() != right_key {
                    columns.push(gather(
                        series,
                        format!("{}_right", series.name()),
                        right_positions,
                    )?);
                }
            }
        }
        JoinKind::Right => {
            let (left_key, _) = keys.expect("equi-joins carry keys");
            for series in left.series() {
                if series.name() != left_key {
                    columns.push(gather(
                        series,
                        format!("{}_left", series.name()),
                        left_positions,
                    )?);
                }
            }
            for series in right.series() {
                columns.push(gather(series, series.name().to_owned(), right_positions)?);
            }
        }
        JoinKind::Cross => {
            for series in left.series() {
                columns.push(gather(series, series.name().to_owned(), left_positions)?);
            }
            for series in right.series() {
                columns.push(gather(
                    series,
                    format!("{}_right", series.name()),
                    right_positions,
                )?);
            }
        }
    }

    DataFrame::new(columns).map_err(JoinError::from)
}

/// Gather one output column: a value copy per matched position, a null
/// marker per unmatched one. Padding goes through the null-tolerant push
/// so the declared kind survives unmatched rows.
fn gather(
    series: &Series,
    name: String,
    positions: &[Option<usize>],
) -> Result<Series, JoinError> {
    let mut out = Series::empty(name, series.kind());
    for position in positions {
        match position {
            Some(p) => {
                let value = series.get(*p)?.clone();
                if value.is_null() {
                    out.push_null();
                } else {
                    out.append(value)?;
                }
            }
            None => out.push_null(),
        }
    }
    Ok(out)
}

/// The outer-join key column: left key values where the left side
/// matched, right key values for unmatched right rows.
fn gather_outer_key(
    left_key: &Series,
    right_key: &Series,
    left_positions: &[Option<usize>],
    right_positions: &[Option<usize>],
) -> Result<Series, JoinError> {
    let mut out = Series::empty(left_key.name().to_owned(), left_key.kind());
    for (left_pos, right_pos) in left_positions.iter().zip(right_positions) {
        let value = match (left_pos, right_pos) {
            (Some(p), _) => left_key.get(*p)?.clone(),
            (None, Some(p)) => right_key.get(*p)?.clone(),
            (None, None) => Value::Null,
        };
        if value.is_null() {
            out.push_null();
        } else {
            out.append(value)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use tb_columnar::Series;
    use tb_frame::DataFrame;
    use tb_types::{Kind, Value};

    use super::{
        DEFAULT_ARENA_BUDGET_BYTES, JoinError, JoinExecutionOptions, JoinKind, join,
        join_with_options, join_with_trace,
    };

    fn left_frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new(
                "name",
                Kind::Str,
                vec!["John".into(), "Nilly".into(), "John".into()],
            )
            .expect("name"),
            Series::new(
                "age",
                Kind::Int,
                vec![Value::Int(31), Value::Int(25), Value::Int(47)],
            )
            .expect("age"),
        ])
        .expect("left")
    }

    fn right_frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new(
                "name",
                Kind::Str,
                vec!["John".into(), "Nilly".into(), "Nilly".into()],
            )
            .expect("name"),
            Series::new(
                "city",
                Kind::Str,
                vec!["Oslo".into(), "Lima".into(), "Kyiv".into()],
            )
            .expect("city"),
        ])
        .expect("right")
    }

    #[test]
    fn inner_join_multiplies_cardinality_for_duplicates() {
        let out = join(&left_frame(), &right_frame(), &["name"], &["name"], JoinKind::Inner)
            .expect("join");
        // John (2 left) x John (1 right) + Nilly (1 left) x Nilly (2 right).
        assert_eq!(out.num_rows(), 4);
        assert_eq!(out.names(), ["name", "age", "city_right"]);
    }

    #[test]
    fn left_join_pads_unmatched_left_rows() {
        let mut left = left_frame();
        left.add_row(vec!["Zoe".into(), Value::Int(19)]).expect("add");

        let out = join(&left, &right_frame(), &["name"], &["name"], JoinKind::Left)
            .expect("join");
        assert_eq!(out.num_rows(), 5);

        let padded: Vec<_> = out
            .column("city_right")
            .expect("city_right")
            .values()
            .filter(|value| value.is_null())
            .collect();
        assert_eq!(padded.len(), 1);
        // The padded row is the unmatched left row, emitted in left order.
        assert_eq!(
            out.get_row(4).expect("row"),
            vec![Value::from("Zoe"), Value::Int(19), Value::Null]
        );
    }

    #[test]
    fn right_join_mirrors_left_and_keeps_right_key() {
        let left = left_frame();
        let mut right = right_frame();
        right
            .add_row(vec!["Ada".into(), "Rome".into()])
            .expect("add");

        let out = join(&left, &right, &["name"], &["name"], JoinKind::Right).expect("join");
        assert_eq!(out.names(), ["age_left", "name", "city"]);
        // John x 2 + Nilly x 1 + Nilly x 1 + unmatched Ada.
        assert_eq!(out.num_rows(), 5);
        assert_eq!(
            out.get_row(4).expect("row"),
            vec![Value::Null, Value::from("Ada"), Value::from("Rome")]
        );
    }

    #[test]
    fn outer_join_keeps_both_unmatched_sides() {
        let mut left = left_frame();
        left.add_row(vec!["Zoe".into(), Value::Int(19)]).expect("add");
        let mut right = right_frame();
        right
            .add_row(vec!["Ada".into(), "Rome".into()])
            .expect("add");

        let out = join(&left, &right, &["name"], &["name"], JoinKind::Outer).expect("join");
        // 4 matched + Zoe + Ada.
        assert_eq!(out.num_rows(), 6);

        // The unmatched right row materializes its key in the left key
        // column and pads the remaining left columns.
        assert_eq!(
            out.get_row(5).expect("row"),
            vec![Value::from("Ada"), Value::Null, Value::from("Rome")]
        );
        // The unmatched left row pads the right columns.
        assert_eq!(
            out.get_row(4).expect("row"),
            vec![Value::from("Zoe"), Value::Int(19), Value::Null]
        );
    }

    #[test]
    fn cross_join_emits_cartesian_product() {
        let out = join(&left_frame(), &right_frame(), &[], &[], JoinKind::Cross).expect("join");
        assert_eq!(out.num_rows(), 9);
        assert_eq!(
            out.names(),
            ["name", "age", "name_right", "city_right"]
        );
        // First block pairs left row 0 with every right row.
        assert_eq!(
            out.get_row(1).expect("row"),
            vec![
                Value::from("John"),
                Value::Int(31),
                Value::from("Nilly"),
                Value::from("Lima"),
            ]
        );
    }

    #[test]
    fn key_count_and_existence_are_validated() {
        let left = left_frame();
        let right = right_frame();

        assert!(matches!(
            join(&left, &right, &["name"], &[], JoinKind::Inner),
            Err(JoinError::KeyCountMismatch { left: 1, right: 0 })
        ));
        assert!(matches!(
            join(&left, &right, &["ghost"], &["name"], JoinKind::Inner),
            Err(JoinError::ColumnNotFound { .. })
        ));
        assert!(matches!(
            join(&left, &right, &["name"], &["ghost"], JoinKind::Inner),
            Err(JoinError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn key_kinds_must_agree() {
        let left = left_frame();
        let right = right_frame();
        assert!(matches!(
            join(&left, &right, &["age"], &["name"], JoinKind::Inner),
            Err(JoinError::KeyTypeMismatch {
                left: Kind::Int,
                right: Kind::Str,
            })
        ));
    }

    #[test]
    fn join_kind_parses_from_text() {
        assert_eq!("outer".parse::<JoinKind>().expect("parse"), JoinKind::Outer);
        let err = "full".parse::<JoinKind>().expect_err("must fail");
        assert_eq!(err.to_string(), "invalid join type: full");
    }

    #[test]
    fn arena_join_matches_global_allocator_behavior() {
        let left = left_frame();
        let right = right_frame();

        let global = join_with_options(
            &left,
            &right,
            &["name"],
            &["name"],
            JoinKind::Inner,
            JoinExecutionOptions {
                use_arena: false,
                arena_budget_bytes: 0,
            },
        )
        .expect("global join");
        let arena = join_with_options(
            &left,
            &right,
            &["name"],
            &["name"],
            JoinKind::Inner,
            JoinExecutionOptions::default(),
        )
        .expect("arena join");

        assert_eq!(arena, global);
    }

    #[test]
    fn arena_falls_back_when_budget_is_too_small() {
        let options = JoinExecutionOptions {
            use_arena: true,
            arena_budget_bytes: 1,
        };
        let (out, trace) = join_with_trace(
            &left_frame(),
            &right_frame(),
            &["name"],
            &["name"],
            JoinKind::Inner,
            options,
        )
        .expect("fallback join");

        assert!(!trace.used_arena);
        assert!(trace.estimated_bytes > options.arena_budget_bytes);
        assert_eq!(out.num_rows(), 4);
    }

    #[test]
    fn default_budget_uses_arena_for_small_joins() {
        let (_, trace) = join_with_trace(
            &left_frame(),
            &right_frame(),
            &["name"],
            &["name"],
            JoinKind::Left,
            JoinExecutionOptions::default(),
        )
        .expect("join");
        assert!(trace.used_arena);
        assert!(trace.estimated_bytes <= DEFAULT_ARENA_BUDGET_BYTES);
        // 1 + 2 + 1 matched left rows, no padding needed.
        assert_eq!(trace.estimated_rows, 4);
    }

    #[test]
    fn nan_keys_never_match() {
        let left = DataFrame::new(vec![
            Series::new("k", Kind::Float, vec![Value::Float(f64::NAN), Value::Float(1.0)])
                .expect("k"),
        ])
        .expect("left");
        let right = DataFrame::new(vec![
            Series::new("k", Kind::Float, vec![Value::Float(f64::NAN), Value::Float(1.0)])
                .expect("k"),
            Series::new("v", Kind::Int, vec![Value::Int(10), Value::Int(20)]).expect("v"),
        ])
        .expect("right");

        let out = join(&left, &right, &["k"], &["k"], JoinKind::Inner).expect("join");
        assert_eq!(out.num_rows(), 1);
        assert_eq!(
            out.get_row(0).expect("row"),
            vec![Value::Float(1.0), Value::Int(20)]
        );
    }
}
