//! Packed ragged layout: offset buffers plus one flat data buffer per column.
//!
//! A column of depth `d` is stored as `d - 1` offset buffers and a data
//! buffer. `offsets[0]` has one entry more than the table length and
//! delimits, for every top-level row, its items one level down; each
//! further buffer delimits the items of the level above it. The last level
//! indexes into `data`. Depth-1 columns store only `data`.
//!
//! ```text
//! [[[1], [2, 3]], []]   depth 3
//! offsets[0] = [0, 2, 2]
//! offsets[1] = [0, 1, 3]
//! data       = [1, 2, 3]
//! ```

use crate::{Error, Result};
use g4post_core::{Column, DType, ProcessingContext, Ragged};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

/// Offset and data buffers of one ragged array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Buffers<T> {
    pub depth: usize,
    pub offsets: Vec<Vec<usize>>,
    pub data: Vec<T>,
}

impl<T: Clone> Buffers<T> {
    /// Packs a ragged list.
    ///
    /// # Errors
    /// Returns an error for scalars and for lists whose branches mix depths.
    pub fn pack(values: &Ragged<T>) -> Result<Self> {
        if values.is_scalar() {
            return Err(Error::InvalidFormat("cannot pack a scalar".to_string()));
        }
        let depth = values.depth();
        let mut offsets = vec![vec![0]; depth - 1];
        let mut data = Vec::with_capacity(values.count());
        fill(values, 0, &mut offsets, &mut data)?;
        Ok(Self {
            depth,
            offsets,
            data,
        })
    }

    /// Rebuilds the ragged list of `length` top-level rows.
    ///
    /// # Errors
    /// Returns an error when the buffers are inconsistent.
    pub fn unpack(&self, length: usize) -> Result<Ragged<T>> {
        self.validate(length)?;
        Ok(self.build(0, 0..length))
    }

    fn validate(&self, length: usize) -> Result<()> {
        if self.depth == 0 || self.offsets.len() + 1 != self.depth {
            return Err(Error::InvalidFormat(format!(
                "depth {} does not match {} offset buffers",
                self.depth,
                self.offsets.len()
            )));
        }
        let mut items = length;
        for (level, offsets) in self.offsets.iter().enumerate() {
            if offsets.len() != items + 1 || offsets.first() != Some(&0) {
                return Err(Error::InvalidFormat(format!(
                    "offset buffer {level} has {} entries, expected {}",
                    offsets.len(),
                    items + 1
                )));
            }
            if offsets.windows(2).any(|pair| pair[0] > pair[1]) {
                return Err(Error::InvalidFormat(format!(
                    "offset buffer {level} is not monotonic"
                )));
            }
            items = offsets[items];
        }
        if self.data.len() != items {
            return Err(Error::InvalidFormat(format!(
                "data buffer has {} entries, offsets need {items}",
                self.data.len()
            )));
        }
        Ok(())
    }

    fn build(&self, level: usize, range: Range<usize>) -> Ragged<T> {
        match self.offsets.get(level) {
            None => Ragged::Leaf(self.data[range].to_vec()),
            Some(offsets) => Ragged::Branch(
                range
                    .map(|i| self.build(level + 1, offsets[i]..offsets[i + 1]))
                    .collect(),
            ),
        }
    }
}

/// Appends the items of list `node`, which sits at `level`.
fn fill<T: Clone>(
    node: &Ragged<T>,
    level: usize,
    offsets: &mut [Vec<usize>],
    data: &mut Vec<T>,
) -> Result<()> {
    let mixed = || Error::InvalidFormat("list mixes nesting depths".to_string());
    if level == offsets.len() {
        return match node {
            Ragged::Leaf(values) => {
                data.extend_from_slice(values);
                Ok(())
            }
            Ragged::Branch(rows) if rows.is_empty() => Ok(()),
            _ => Err(mixed()),
        };
    }
    let rows: &[Ragged<T>] = match node {
        Ragged::Branch(rows) => rows,
        Ragged::Leaf(values) if values.is_empty() => &[],
        _ => return Err(mixed()),
    };
    for row in rows {
        fill(row, level + 1, offsets, data)?;
        let end = match offsets.get(level + 1) {
            Some(below) => below.len() - 1,
            None => data.len(),
        };
        offsets[level].push(end);
    }
    Ok(())
}

/// One packed column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", rename_all = "lowercase")]
pub enum PackedColumn {
    Float64(Buffers<f64>),
    Int64(Buffers<i64>),
    Bool(Buffers<bool>),
}

impl PackedColumn {
    /// Packs a column.
    ///
    /// # Errors
    /// See [`Buffers::pack`].
    pub fn pack(column: &Column) -> Result<Self> {
        Ok(match column {
            Column::Float(v) => Self::Float64(Buffers::pack(v)?),
            Column::Int(v) => Self::Int64(Buffers::pack(v)?),
            Column::Bool(v) => Self::Bool(Buffers::pack(v)?),
        })
    }

    /// Rebuilds the column.
    ///
    /// # Errors
    /// See [`Buffers::unpack`].
    pub fn unpack(&self, length: usize) -> Result<Column> {
        Ok(match self {
            Self::Float64(b) => Column::Float(b.unpack(length)?),
            Self::Int64(b) => Column::Int(b.unpack(length)?),
            Self::Bool(b) => Column::Bool(b.unpack(length)?),
        })
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Float64(_) => DType::Float64,
            Self::Int64(_) => DType::Int64,
            Self::Bool(_) => DType::Bool,
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Float64(b) => b.depth,
            Self::Int64(b) => b.depth,
            Self::Bool(b) => b.depth,
        }
    }
}

/// The on-disk form of a [`Table`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackedTable {
    pub length: usize,
    pub columns: BTreeMap<String, PackedColumn>,
}

/// Named columns of equal top-level length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: BTreeMap<String, Column>,
    length: Option<usize>,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column.
    ///
    /// # Errors
    /// Returns an error when its length differs from the existing columns.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        match self.length {
            Some(length) if length != column.len() => {
                return Err(Error::InvalidFormat(format!(
                    "column `{name}` has {} rows, table has {length}",
                    column.len()
                )))
            }
            _ => self.length = Some(column.len()),
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.length.unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Columns in name order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(name, column)| (name.as_str(), column))
    }

    /// Copies rows `range` of every column.
    ///
    /// # Errors
    /// Returns an error when the range exceeds the table.
    pub fn slice_rows(&self, range: Range<usize>) -> Result<Self> {
        let mut out = Self::new();
        for (name, column) in &self.columns {
            out.insert(name.clone(), column.slice_rows(range.clone())?)?;
        }
        Ok(out)
    }

    /// Concatenates tables row-wise; every table must hold the same columns.
    ///
    /// # Errors
    /// Returns an error when column sets or element types differ.
    pub fn concat(tables: Vec<Self>) -> Result<Self> {
        let Some(first) = tables.first() else {
            return Ok(Self::new());
        };
        let names: Vec<String> = first.columns.keys().cloned().collect();
        let mut parts: BTreeMap<String, Vec<Column>> =
            names.iter().map(|name| (name.clone(), Vec::new())).collect();
        for table in tables {
            if table.columns.len() != names.len() {
                return Err(Error::InvalidFormat(
                    "cannot concatenate tables with different columns".to_string(),
                ));
            }
            for (name, column) in table.columns {
                parts
                    .get_mut(&name)
                    .ok_or_else(|| {
                        Error::InvalidFormat(format!("column `{name}` missing from some tables"))
                    })?
                    .push(column);
            }
        }
        let mut out = Self::new();
        for (name, columns) in parts {
            out.insert(name, Column::concat(columns)?)?;
        }
        Ok(out)
    }

    /// Moves the columns into a fresh processing context.
    #[must_use]
    pub fn into_context(self, first_row: usize, total_rows: usize) -> ProcessingContext {
        let mut ctx = ProcessingContext::new().with_rows(first_row, total_rows);
        for (name, column) in self.columns {
            ctx.insert(name, column);
        }
        ctx
    }

    /// Packs every column.
    ///
    /// # Errors
    /// Returns an error when a column cannot be packed.
    pub fn to_packed(&self) -> Result<PackedTable> {
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| Ok((name.clone(), PackedColumn::pack(column)?)))
            .collect::<Result<_>>()?;
        Ok(PackedTable {
            length: self.len(),
            columns,
        })
    }

    /// Rebuilds a table from its packed form.
    ///
    /// # Errors
    /// Returns an error when some column's buffers are inconsistent.
    pub fn from_packed(packed: &PackedTable) -> Result<Self> {
        let mut table = Self::new();
        for (name, column) in &packed.columns {
            let column = column.unpack(packed.length).map_err(|e| match e {
                Error::InvalidFormat(message) => {
                    Error::InvalidFormat(format!("column `{name}`: {message}"))
                }
                other => other,
            })?;
            table.insert(name.clone(), column)?;
        }
        if packed.columns.is_empty() {
            table.length = Some(packed.length);
        }
        Ok(table)
    }
}

impl FromIterator<(String, Column)> for Table {
    /// Builds a table without length checks; use [`Table::insert`] for
    /// validated construction.
    fn from_iter<I: IntoIterator<Item = (String, Column)>>(iter: I) -> Self {
        let columns: BTreeMap<String, Column> = iter.into_iter().collect();
        let length = columns.values().next().map(Column::len);
        Self { columns, length }
    }
}
