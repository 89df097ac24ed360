#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared column dtypes.
///
/// There is deliberately no null kind: a column cannot be declared
/// null-typed, yet any cell may hold [`Value::Null`] once outer-join padding
/// has produced one. Strict construction paths reject nulls; the padding
/// path in `tb-columnar` admits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Int,
    Float,
    Str,
    Bool,
}

impl Kind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically-typed cell value.
///
/// Equality is exact per kind: numeric equality without tolerance (so
/// `NaN != NaN`), byte-wise for strings, identity for bools. `Null` equals
/// only `Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl Value {
    /// The kind this value conforms to, or `None` for the null marker.
    #[must_use]
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Self::Int(_) => Some(Kind::Int),
            Self::Float(_) => Some(Kind::Float),
            Self::Str(_) => Some(Kind::Str),
            Self::Bool(_) => Some(Kind::Bool),
            Self::Null => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value may be stored in a column declared with `kind`.
    ///
    /// `Null` conforms to no kind; only the padding path stores it.
    #[must_use]
    pub fn conforms_to(&self, kind: Kind) -> bool {
        self.kind() == Some(kind)
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            Some(kind) => kind.name(),
            None => "null",
        }
    }

    pub fn expect_kind(&self, expected: Kind) -> Result<(), TypeError> {
        if self.conforms_to(expected) {
            Ok(())
        } else {
            Err(TypeError::KindMismatch {
                expected,
                found: self.type_name(),
            })
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for Value {
    /// Renderer-facing representation. Nulls print as the literal `null`
    /// rather than failing stringification.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Null => f.write_str("null"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: Kind, found: &'static str },
}
