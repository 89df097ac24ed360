#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tb_columnar::{ColumnError, Series};
use tb_types::{Kind, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("duplicate series name: {name}")]
    DuplicateColumn { name: String },
    #[error("column '{name}' already exists")]
    ColumnExists { name: String },
    #[error("column '{name}' does not exist")]
    ColumnNotFound { name: String },
    #[error("series length mismatch: expected {expected} rows, got {found}")]
    RowCountMismatch { expected: usize, found: usize },
    #[error("row length mismatch: expected {expected} columns, got {found}")]
    RowLengthMismatch { expected: usize, found: usize },
    #[error("row index {index} out of range for {rows} rows")]
    RowOutOfRange { index: usize, rows: usize },
    #[error("no columns specified for selection")]
    EmptySelection,
    #[error("column count mismatch: expected {expected} columns, got {found}")]
    ColumnCountMismatch { expected: usize, found: usize },
    #[error("column '{name}' missing from right-hand frame")]
    ColumnNameMismatch { name: String },
    #[error("dtype mismatch for column '{name}': {left} != {right}")]
    ColumnTypeMismatch {
        name: String,
        left: Kind,
        right: Kind,
    },
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// An insertion-ordered, duplicate-free mapping from column name to
/// [`Series`].
///
/// Iteration order is the insertion order, independent of hash-based
/// lookup, and changes only through explicit reordering or removal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSet {
    order: Vec<String>,
    series: HashMap<String, Series>,
}

impl ColumnSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A new name is appended to the iteration order; an
    /// existing name keeps its position.
    pub fn insert(&mut self, series: Series) {
        let name = series.name().to_owned();
        if !self.series.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.series.insert(name, series);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Series> {
        self.series.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Series> {
        self.series.get_mut(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Series> {
        let removed = self.series.remove(name)?;
        self.order.retain(|entry| entry != name);
        Some(removed)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &Series> + '_ {
        self.order.iter().map(|name| {
            self.series
                .get(name)
                .expect("ordered name must be present in storage")
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A table of named, equal-length series with a derived schema.
///
/// `num_cols` and the name→kind schema are derived from the column set, so
/// they can never skew; the uniform-length invariant is enforced on every
/// mutation and independently checkable via [`DataFrame::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    columns: ColumnSet,
    num_rows: usize,
}

impl DataFrame {
    /// Build a table from a list of series; input order becomes column
    /// order. Fails on a duplicate name or a length skew.
    pub fn new(series_list: Vec<Series>) -> Result<Self, FrameError> {
        let mut seen = HashSet::new();
        for series in &series_list {
            if !seen.insert(series.name().to_owned()) {
                return Err(FrameError::DuplicateColumn {
                    name: series.name().to_owned(),
                });
            }
        }

        let mut frame = Self::empty();
        for series in series_list {
            frame.add_column(series)?;
        }
        Ok(frame)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            columns: ColumnSet::new(),
            num_rows: 0,
        }
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[must_use]
    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        self.columns.names()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Series> {
        self.columns.get(name)
    }

    pub fn series(&self) -> impl Iterator<Item = &Series> + '_ {
        self.columns.iter()
    }

    /// The derived name→kind schema, in column order.
    #[must_use]
    pub fn schema(&self) -> Vec<(&str, Kind)> {
        self.columns
            .iter()
            .map(|series| (series.name(), series.kind()))
            .collect()
    }

    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<Kind> {
        self.columns.get(name).map(Series::kind)
    }

    /// Check the uniform-length invariant across all columns.
    pub fn validate(&self) -> Result<(), FrameError> {
        for series in self.columns.iter() {
            if series.len() != self.num_rows {
                return Err(FrameError::RowCountMismatch {
                    expected: self.num_rows,
                    found: series.len(),
                });
            }
        }
        Ok(())
    }

    fn require(&self, name: &str) -> Result<&Series, FrameError> {
        self.columns.get(name).ok_or_else(|| FrameError::ColumnNotFound {
            name: name.to_owned(),
        })
    }

    /// Insert a new column. The first column establishes the row count;
    /// every later column must match it.
    pub fn add_column(&mut self, series: Series) -> Result<(), FrameError> {
        if self.columns.contains(series.name()) {
            return Err(FrameError::ColumnExists {
                name: series.name().to_owned(),
            });
        }
        if self.columns.is_empty() {
            self.num_rows = series.len();
        } else if series.len() != self.num_rows {
            return Err(FrameError::RowCountMismatch {
                expected: self.num_rows,
                found: series.len(),
            });
        }
        self.columns.insert(series);
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Result<(), FrameError> {
        if self.columns.remove(name).is_none() {
            return Err(FrameError::ColumnNotFound {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    /// Drop a batch of columns, all-or-nothing: every name is validated
    /// against the pre-batch column set before any removal happens.
    pub fn drop_columns(&mut self, names: &[&str]) -> Result<(), FrameError> {
        for name in names {
            if !self.columns.contains(name) {
                return Err(FrameError::ColumnNotFound {
                    name: (*name).to_owned(),
                });
            }
        }
        for name in names {
            self.columns.remove(name);
        }
        Ok(())
    }

    /// Rename a batch of columns atomically.
    ///
    /// All pairs are validated against the pre-batch snapshot of names:
    /// every old name must exist, no old name may repeat, and no new name
    /// may collide with another new name or with a column that is not
    /// itself being renamed away. Column positions are preserved.
    pub fn rename_columns(&mut self, mapping: &[(&str, &str)]) -> Result<(), FrameError> {
        let snapshot: HashSet<&str> = self.columns.names().iter().map(String::as_str).collect();
        let mut olds = HashSet::new();
        let mut news = HashSet::new();

        for (old, new) in mapping {
            if !snapshot.contains(old) {
                return Err(FrameError::ColumnNotFound {
                    name: (*old).to_owned(),
                });
            }
            if !olds.insert(*old) {
                return Err(FrameError::DuplicateColumn {
                    name: (*old).to_owned(),
                });
            }
            if !news.insert(*new) {
                return Err(FrameError::ColumnExists {
                    name: (*new).to_owned(),
                });
            }
        }
        for new in &news {
            if snapshot.contains(new) && !olds.contains(new) {
                return Err(FrameError::ColumnExists {
                    name: (*new).to_owned(),
                });
            }
        }

        // Apply against the pre-batch order: resolve every position first,
        // then detach all renamed series before reinserting any, so a
        // target name that is also a source name cannot collide or shift
        // slots mid-batch whatever the pair order.
        let ColumnSet { order, series } = &mut self.columns;
        let positions: Vec<usize> = mapping
            .iter()
            .map(|(old, _)| {
                order
                    .iter()
                    .position(|entry| entry == old)
                    .expect("old name validated against snapshot")
            })
            .collect();

        let mut detached = Vec::with_capacity(mapping.len());
        for ((old, new), &position) in mapping.iter().zip(&positions) {
            let mut renamed = series
                .remove(*old)
                .expect("old name validated against snapshot");
            renamed.rename(*new);
            order[position] = (*new).to_owned();
            detached.push(renamed);
        }
        for renamed in detached {
            series.insert(renamed.name().to_owned(), renamed);
        }
        Ok(())
    }

    /// Replace the column order with exactly `order`.
    ///
    /// Columns not listed are dropped: this is narrowing reordering, not a
    /// permutation check. The row count is untouched even when every
    /// column is dropped.
    pub fn order_columns(&mut self, order: &[&str]) -> Result<(), FrameError> {
        for name in order {
            if !self.columns.contains(name) {
                return Err(FrameError::ColumnNotFound {
                    name: (*name).to_owned(),
                });
            }
        }

        let mut reordered = ColumnSet::new();
        for name in order {
            if let Some(series) = self.columns.remove(name) {
                reordered.insert(series);
            }
        }
        self.columns = reordered;
        Ok(())
    }

    /// Append one row, given one value per column in current column order.
    /// Arity and per-column kinds are validated before any append, so a
    /// failed add leaves the frame untouched.
    pub fn add_row(&mut self, values: Vec<Value>) -> Result<(), FrameError> {
        self.check_row(&values)?;
        self.apply_row(values)?;
        self.num_rows += 1;
        Ok(())
    }

    /// Append a batch of rows, validate-all-then-apply-all: if any row
    /// fails validation, no row is appended.
    pub fn add_rows(&mut self, rows: Vec<Vec<Value>>) -> Result<(), FrameError> {
        for row in &rows {
            self.check_row(row)?;
        }
        for row in rows {
            self.apply_row(row)?;
            self.num_rows += 1;
        }
        Ok(())
    }

    fn apply_row(&mut self, values: Vec<Value>) -> Result<(), FrameError> {
        let ColumnSet { order, series } = &mut self.columns;
        for (name, value) in order.iter().zip(values) {
            series
                .get_mut(name)
                .expect("ordered name must be present in storage")
                .append(value)?;
        }
        Ok(())
    }

    fn check_row(&self, values: &[Value]) -> Result<(), FrameError> {
        if values.len() != self.num_cols() {
            return Err(FrameError::RowLengthMismatch {
                expected: self.num_cols(),
                found: values.len(),
            });
        }
        for (series, value) in self.columns.iter().zip(values) {
            if !value.conforms_to(series.kind()) {
                return Err(FrameError::Column(ColumnError::TypeMismatch {
                    column: series.name().to_owned(),
                    expected: series.kind(),
                    found: value.type_name(),
                }));
            }
        }
        Ok(())
    }

    /// Positional snapshot of one value per column in current column order.
    pub fn get_row(&self, index: usize) -> Result<Vec<Value>, FrameError> {
        if index >= self.num_rows {
            return Err(FrameError::RowOutOfRange {
                index,
                rows: self.num_rows,
            });
        }
        let mut row = Vec::with_capacity(self.num_cols());
        for series in self.columns.iter() {
            row.push(series.get(index)?.clone());
        }
        Ok(row)
    }

    /// A fresh frame owning clones of the named columns, in the given
    /// order. The result never aliases the source: mutating either frame
    /// leaves the other untouched.
    pub fn select(&self, names: &[&str]) -> Result<Self, FrameError> {
        if names.is_empty() {
            return Err(FrameError::EmptySelection);
        }
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            selected.push(self.require(name)?.clone());
        }
        Self::new(selected)
    }

    /// Keep only the rows where `column` equals `value`, rewriting every
    /// column in place. This mutates the receiver; it is not a derivation.
    pub fn filter(&mut self, column: &str, value: &Value) -> Result<(), FrameError> {
        let target = self.require(column)?;
        let keep: Vec<usize> = target
            .values()
            .enumerate()
            .filter_map(|(position, cell)| (cell == value).then_some(position))
            .collect();

        for series in self.columns.series.values_mut() {
            series.retain_positions(&keep);
        }
        self.num_rows = keep.len();
        Ok(())
    }

    /// Alias for [`DataFrame::filter`].
    pub fn where_eq(&mut self, column: &str, value: &Value) -> Result<(), FrameError> {
        self.filter(column, value)
    }

    /// Positional concatenation of two schema-compatible frames.
    ///
    /// Compatibility is checked by matching names, never by position:
    /// column counts must agree, and every left column must exist in
    /// `other` with the same kind. The result carries the left frame's
    /// column order; per column, left entries precede right entries with
    /// origins carried through unchanged.
    pub fn union(&self, other: &Self) -> Result<Self, FrameError> {
        if self.num_cols() != other.num_cols() {
            return Err(FrameError::ColumnCountMismatch {
                expected: self.num_cols(),
                found: other.num_cols(),
            });
        }

        for series in self.columns.iter() {
            let Some(counterpart) = other.columns.get(series.name()) else {
                return Err(FrameError::ColumnNameMismatch {
                    name: series.name().to_owned(),
                });
            };
            if counterpart.kind() != series.kind() {
                return Err(FrameError::ColumnTypeMismatch {
                    name: series.name().to_owned(),
                    left: series.kind(),
                    right: counterpart.kind(),
                });
            }
        }

        let mut combined = Vec::with_capacity(self.num_cols());
        for series in self.columns.iter() {
            let counterpart = other
                .columns
                .get(series.name())
                .expect("name checked above");
            let mut entries = Vec::with_capacity(series.len() + counterpart.len());
            entries.extend_from_slice(series.entries());
            entries.extend_from_slice(counterpart.entries());
            combined.push(Series::from_entries(series.name(), series.kind(), entries)?);
        }
        Self::new(combined)
    }
}
