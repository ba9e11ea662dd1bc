//! Dynamically typed ragged columns.

use crate::error::{Error, Result};
use crate::ragged::Ragged;
use std::fmt;
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Element type of a [`Column`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DType {
    Float64,
    Int64,
    Bool,
}

impl DType {
    /// Name used in packed files.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Int64 => "int64",
            Self::Bool => "bool",
        }
    }

    /// Parses a packed-file dtype name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float64" | "f8" | "double" => Some(Self::Float64),
            "int64" | "i8" | "int32" | "uint64" | "int" => Some(Self::Int64),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named value in the processing context.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Column {
    Float(Ragged<f64>),
    Int(Ragged<i64>),
    Bool(Ragged<bool>),
}

/// Runs the same expression on whichever ragged payload a [`Column`] holds,
/// wrapping the result back into the matching variant.
///
/// The body must evaluate to `Result<Ragged<_>>` of the same element type.
#[macro_export]
macro_rules! map_column {
    ($column:expr, |$values:ident| $body:expr) => {
        match $column {
            $crate::Column::Float($values) => $body.map($crate::Column::Float),
            $crate::Column::Int($values) => $body.map($crate::Column::Int),
            $crate::Column::Bool($values) => $body.map($crate::Column::Bool),
        }
    };
}

impl Column {
    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Float(_) => DType::Float64,
            Self::Int(_) => DType::Int64,
            Self::Bool(_) => DType::Bool,
        }
    }

    /// Number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nesting depth of the payload.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Float(v) => v.depth(),
            Self::Int(v) => v.depth(),
            Self::Bool(v) => v.depth(),
        }
    }

    /// Payload as floats; integers are widened.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] for boolean columns.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_float(&self) -> Result<Ragged<f64>> {
        match self {
            Self::Float(v) => Ok(v.clone()),
            Self::Int(v) => Ok(v.map(|&x| x as f64)),
            Self::Bool(_) => Err(self.mismatch("numeric")),
        }
    }

    /// Payload as integers; floats are accepted when every value is integral.
    ///
    /// # Errors
    /// Returns [`Error::NonIntegral`] for fractional values and
    /// [`Error::TypeMismatch`] for boolean columns.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_int(&self) -> Result<Ragged<i64>> {
        match self {
            Self::Int(v) => Ok(v.clone()),
            Self::Float(v) => {
                if let Some(bad) = v.flatten().into_iter().find(|x| x.fract() != 0.0 || !x.is_finite()) {
                    return Err(Error::NonIntegral(bad));
                }
                Ok(v.map(|&x| x as i64))
            }
            Self::Bool(_) => Err(self.mismatch("integer")),
        }
    }

    /// Borrowed boolean payload.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] for numeric columns.
    pub fn as_bool(&self) -> Result<&Ragged<bool>> {
        match self {
            Self::Bool(v) => Ok(v),
            _ => Err(self.mismatch("bool")),
        }
    }

    /// Filters the payload with a boolean mask, see [`Ragged::filter`].
    ///
    /// # Errors
    /// Returns an error when the mask does not line up with the payload.
    pub fn filter(&self, mask: &Ragged<bool>) -> Result<Self> {
        map_column!(self, |values| values.filter(mask))
    }

    /// Copies the top-level rows in `range`.
    ///
    /// # Errors
    /// Returns an error for an out-of-bounds range.
    pub fn slice_rows(&self, range: Range<usize>) -> Result<Self> {
        map_column!(self, |values| values.slice_rows(range.clone()))
    }

    /// Concatenates columns of the same element type row-wise.
    ///
    /// # Errors
    /// Returns an error when element types or depths differ, or when no part is given.
    pub fn concat(parts: Vec<Self>) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(Error::misaligned("nothing to concatenate"));
        };
        match first.dtype() {
            DType::Float64 => collect_parts(parts, |c| match c {
                Self::Float(v) => Some(v),
                _ => None,
            })
            .map(Self::Float),
            DType::Int64 => collect_parts(parts, |c| match c {
                Self::Int(v) => Some(v),
                _ => None,
            })
            .map(Self::Int),
            DType::Bool => collect_parts(parts, |c| match c {
                Self::Bool(v) => Some(v),
                _ => None,
            })
            .map(Self::Bool),
        }
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch {
            expected,
            found: self.dtype().name(),
        }
    }
}

fn collect_parts<T: Clone>(
    parts: Vec<Column>,
    unwrap: impl Fn(Column) -> Option<Ragged<T>>,
) -> Result<Ragged<T>> {
    let mut payloads = Vec::with_capacity(parts.len());
    for part in parts {
        let found = part.dtype().name();
        payloads.push(unwrap(part).ok_or(Error::TypeMismatch {
            expected: "matching dtype",
            found,
        })?);
    }
    Ragged::concat(payloads)
}

impl From<Ragged<f64>> for Column {
    fn from(values: Ragged<f64>) -> Self {
        Self::Float(values)
    }
}

impl From<Ragged<i64>> for Column {
    fn from(values: Ragged<i64>) -> Self {
        Self::Int(values)
    }
}

impl From<Ragged<bool>> for Column {
    fn from(values: Ragged<bool>) -> Self {
        Self::Bool(values)
    }
}
