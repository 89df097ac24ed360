#![forbid(unsafe_code)]

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tb_types::{Kind, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("type mismatch in column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: Kind,
        found: &'static str,
    },
    #[error("index {index} out of range for column '{column}' of length {len}")]
    IndexOutOfRange {
        column: String,
        index: usize,
        len: usize,
    },
}

/// One cell plus the position it held at creation or append time.
///
/// `origin` is a stable back-reference, not a live position: filtering or
/// reordering the owning [`Series`] leaves it untouched. Callers that need
/// origins to reflect current positions after a destructive operation must
/// call [`Series::reset_origins`] explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub value: Value,
    pub origin: usize,
}

/// A single named, typed column.
///
/// Invariant: every entry's value conforms to the declared kind, with one
/// documented exception: [`Series::push_null`] and [`Series::from_entries`]
/// admit `Value::Null` so that outer/left/right join padding can produce
/// null cells inside a typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    name: String,
    kind: Kind,
    entries: Vec<Entry>,
}

impl Series {
    /// Build a column from plain values. Every value must conform to `kind`
    /// (nulls are rejected here). Empty input yields a length-0 column.
    pub fn new(
        name: impl Into<String>,
        kind: Kind,
        values: Vec<Value>,
    ) -> Result<Self, ColumnError> {
        let name = name.into();
        for value in &values {
            check_kind(&name, kind, value)?;
        }
        let entries = values
            .into_iter()
            .enumerate()
            .map(|(origin, value)| Entry { value, origin })
            .collect();
        Ok(Self { name, kind, entries })
    }

    #[must_use]
    pub fn empty(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            entries: Vec::new(),
        }
    }

    /// Build a column from pre-formed entries, carrying their origins
    /// through unchanged. Non-null values must conform to `kind`; nulls are
    /// admitted (this is the padding-tolerant construction path used by
    /// union and join result assembly).
    pub fn from_entries(
        name: impl Into<String>,
        kind: Kind,
        entries: Vec<Entry>,
    ) -> Result<Self, ColumnError> {
        let name = name.into();
        for entry in &entries {
            if !entry.value.is_null() {
                check_kind(&name, kind, &entry.value)?;
            }
        }
        Ok(Self { name, kind, entries })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.entries.iter().map(|entry| &entry.value)
    }

    /// Append a conforming value; its origin is the pre-append length, so
    /// freshly appended entries carry monotonically increasing origins.
    pub fn append(&mut self, value: Value) -> Result<(), ColumnError> {
        check_kind(&self.name, self.kind, &value)?;
        let origin = self.entries.len();
        self.entries.push(Entry { value, origin });
        Ok(())
    }

    /// Append a null marker, bypassing the kind check.
    ///
    /// This is the join-padding exception to the column invariant; every
    /// other insertion path rejects non-conforming values.
    pub fn push_null(&mut self) {
        let origin = self.entries.len();
        self.entries.push(Entry {
            value: Value::Null,
            origin,
        });
    }

    pub fn get(&self, index: usize) -> Result<&Value, ColumnError> {
        self.entries
            .get(index)
            .map(|entry| &entry.value)
            .ok_or_else(|| self.out_of_range(index))
    }

    pub fn set(&mut self, index: usize, value: Value) -> Result<(), ColumnError> {
        if index >= self.entries.len() {
            return Err(self.out_of_range(index));
        }
        check_kind(&self.name, self.kind, &value)?;
        self.entries[index].value = value;
        Ok(())
    }

    /// The origin recorded for the entry currently at `index`.
    pub fn origin_at(&self, index: usize) -> Result<usize, ColumnError> {
        self.entries
            .get(index)
            .map(|entry| entry.origin)
            .ok_or_else(|| self.out_of_range(index))
    }

    #[must_use]
    pub fn origins(&self) -> Vec<usize> {
        self.entries.iter().map(|entry| entry.origin).collect()
    }

    /// Keep only the entries whose *current position* appears in `keep`,
    /// in ascending position order. Surviving origins are untouched and
    /// therefore stale as positions; see [`Series::reset_origins`].
    pub fn retain_positions(&mut self, keep: &[usize]) {
        let wanted: HashSet<usize> = keep.iter().copied().collect();
        let mut position = 0;
        self.entries.retain(|_| {
            let hit = wanted.contains(&position);
            position += 1;
            hit
        });
    }

    /// Reorder entries by ascending origin.
    pub fn sort_by_origin(&mut self) {
        self.entries.sort_by_key(|entry| entry.origin);
    }

    /// Re-number origins to current positions, discarding history. The
    /// explicit remedy for origin staleness after a destructive operation.
    pub fn reset_origins(&mut self) {
        for (position, entry) in self.entries.iter_mut().enumerate() {
            entry.origin = position;
        }
    }

    fn out_of_range(&self, index: usize) -> ColumnError {
        ColumnError::IndexOutOfRange {
            column: self.name.clone(),
            index,
            len: self.entries.len(),
        }
    }
}

fn check_kind(column: &str, expected: Kind, value: &Value) -> Result<(), ColumnError> {
    if value.conforms_to(expected) {
        Ok(())
    } else {
        Err(ColumnError::TypeMismatch {
            column: column.to_owned(),
            expected,
            found: value.type_name(),
        })
    }
}
