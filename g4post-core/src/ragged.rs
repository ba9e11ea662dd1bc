//! Ragged (jagged) nested sequences.
//!
//! A [`Ragged`] value is either a scalar, a leaf list of scalars, or a list
//! of ragged values whose lengths vary independently per branch. Depth is a
//! runtime property: the same transform runs on `[hit]`, `[event][hit]` or
//! `[event][window][hit]` data.
//!
//! An empty list carries no element kind, so `Leaf(vec![])` and
//! `Branch(vec![])` are treated as the same value everywhere, including
//! equality.

use crate::error::{ensure_same_len, Error, Result};
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A nested sequence with per-branch lengths.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Ragged<T> {
    /// A single value (depth 0).
    Scalar(T),
    /// A list of scalars (depth 1).
    Leaf(Vec<T>),
    /// A list of nested values (depth >= 2 unless empty).
    Branch(Vec<Ragged<T>>),
}

impl<T> Default for Ragged<T> {
    fn default() -> Self {
        Self::Leaf(Vec::new())
    }
}

impl<T: PartialEq> PartialEq for Ragged<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => a == b,
            (Self::Leaf(a), Self::Leaf(b)) => a == b,
            (Self::Branch(a), Self::Branch(b)) => a == b,
            (Self::Leaf(a), Self::Branch(b)) | (Self::Branch(b), Self::Leaf(a)) => {
                a.is_empty() && b.is_empty()
            }
            _ => false,
        }
    }
}

impl<T> Ragged<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Assembles a list from already built rows.
    ///
    /// Rows that are all scalars collapse into a leaf, so reducing
    /// `[[1, 2], [3]]` gives `[3, 3]` rather than a list of scalar nodes.
    #[must_use]
    pub fn from_rows(rows: Vec<Ragged<T>>) -> Self {
        if rows.is_empty() || !rows.iter().all(Ragged::is_scalar) {
            return Self::Branch(rows);
        }
        Self::Leaf(
            rows.into_iter()
                .filter_map(|row| match row {
                    Self::Scalar(value) => Some(value),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Returns true for depth-0 values.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// Number of top-level entries. A scalar counts as one.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Leaf(values) => values.len(),
            Self::Branch(rows) => rows.len(),
        }
    }

    /// Returns true for an empty list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Leaf(values) => values.is_empty(),
            Self::Branch(rows) => rows.is_empty(),
        }
    }

    /// Nesting depth; the deepest branch wins and an empty list counts as one level.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Scalar(_) => 0,
            Self::Leaf(_) => 1,
            Self::Branch(rows) => 1 + rows.iter().map(Ragged::depth).max().unwrap_or(0),
        }
    }

    /// Total number of scalars at the bottom of the structure.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Leaf(values) => values.len(),
            Self::Branch(rows) => rows.iter().map(Ragged::count).sum(),
        }
    }

    /// Applies `f` to every scalar, keeping the structure.
    pub fn map<U, F>(&self, mut f: F) -> Ragged<U>
    where
        F: FnMut(&T) -> U,
    {
        self.map_with(&mut f)
    }

    fn map_with<U, F>(&self, f: &mut F) -> Ragged<U>
    where
        F: FnMut(&T) -> U,
    {
        match self {
            Self::Scalar(value) => Ragged::Scalar(f(value)),
            Self::Leaf(values) => Ragged::Leaf(values.iter().map(&mut *f).collect()),
            Self::Branch(rows) => Ragged::Branch(rows.iter().map(|row| row.map_with(f)).collect()),
        }
    }

    /// Reduces every innermost list to one value, removing one level.
    ///
    /// # Errors
    /// Returns [`Error::Misaligned`] when called on a scalar.
    pub fn reduce<U, F>(&self, mut f: F) -> Result<Ragged<U>>
    where
        F: FnMut(&[T]) -> U,
    {
        self.reduce_with(&mut f)
    }

    fn reduce_with<U, F>(&self, f: &mut F) -> Result<Ragged<U>>
    where
        F: FnMut(&[T]) -> U,
    {
        match self {
            Self::Scalar(_) => Err(Error::misaligned("cannot reduce a scalar value")),
            Self::Leaf(values) => Ok(Ragged::Scalar(f(values))),
            Self::Branch(rows) if rows.is_empty() => Ok(Ragged::Leaf(Vec::new())),
            Self::Branch(rows) => rows
                .iter()
                .map(|row| row.reduce_with(f))
                .collect::<Result<Vec<_>>>()
                .map(Ragged::from_rows),
        }
    }
}

impl<T: Clone> Ragged<T> {
    /// All scalars in depth-first order.
    #[must_use]
    pub fn flatten(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.count());
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<T>) {
        match self {
            Self::Scalar(value) => out.push(value.clone()),
            Self::Leaf(values) => out.extend_from_slice(values),
            Self::Branch(rows) => rows.iter().for_each(|row| row.flatten_into(out)),
        }
    }

    /// Keeps the entries whose mask value is true.
    ///
    /// The mask either has exactly the shape of `self` (scalars are filtered)
    /// or stops one or more levels earlier, in which case whole sub-lists are
    /// kept or dropped.
    ///
    /// # Errors
    /// Returns an error when the mask does not line up with the data.
    pub fn filter(&self, mask: &Ragged<bool>) -> Result<Self> {
        match (self, mask) {
            (Self::Leaf(values), Ragged::Leaf(keep)) => {
                ensure_same_len("mask", values.len(), keep.len())?;
                Ok(Self::Leaf(select(values, keep)))
            }
            (Self::Branch(rows), Ragged::Leaf(keep)) => {
                ensure_same_len("mask", rows.len(), keep.len())?;
                Ok(Self::Branch(select(rows, keep)))
            }
            (Self::Branch(rows), Ragged::Branch(keep)) => {
                ensure_same_len("mask", rows.len(), keep.len())?;
                rows.iter()
                    .zip(keep)
                    .map(|(row, keep)| row.filter(keep))
                    .collect::<Result<Vec<_>>>()
                    .map(Self::Branch)
            }
            (data, keep) if data.is_empty() && keep.is_empty() => Ok(data.clone()),
            (Self::Scalar(_), _) => Err(Error::misaligned("cannot mask a scalar value")),
            _ => Err(Error::misaligned("mask is deeper than the masked array")),
        }
    }

    /// Copies the top-level rows in `range`.
    ///
    /// # Errors
    /// Returns an error for scalars or an out-of-bounds range.
    pub fn slice_rows(&self, range: Range<usize>) -> Result<Self> {
        if range.end > self.len() || range.start > range.end {
            return Err(Error::LengthMismatch {
                context: "row slice",
                left: range.end,
                right: self.len(),
            });
        }
        match self {
            Self::Scalar(_) => Err(Error::misaligned("cannot slice a scalar value")),
            Self::Leaf(values) => Ok(Self::Leaf(values[range].to_vec())),
            Self::Branch(rows) => Ok(Self::Branch(rows[range].to_vec())),
        }
    }

    /// Concatenates top-level rows of several lists.
    ///
    /// # Errors
    /// Returns an error when parts mix leaves and branches or contain scalars.
    pub fn concat<I>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut out = Self::empty();
        for part in parts {
            out = match (out, part) {
                (acc, part) if part.is_empty() => acc,
                (acc, part) if acc.is_empty() => part,
                (Self::Leaf(mut acc), Self::Leaf(values)) => {
                    acc.extend(values);
                    Self::Leaf(acc)
                }
                (Self::Branch(mut acc), Self::Branch(rows)) => {
                    acc.extend(rows);
                    Self::Branch(acc)
                }
                _ => return Err(Error::misaligned("cannot concatenate lists of different depth")),
            };
        }
        if out.is_scalar() {
            return Err(Error::misaligned("cannot concatenate scalar values"));
        }
        Ok(out)
    }
}

fn select<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter(|(_, keep)| **keep)
        .map(|(value, _)| value.clone())
        .collect()
}

impl<T> From<Vec<T>> for Ragged<T> {
    fn from(values: Vec<T>) -> Self {
        Self::Leaf(values)
    }
}

impl<T> From<Vec<Vec<T>>> for Ragged<T> {
    fn from(rows: Vec<Vec<T>>) -> Self {
        Self::Branch(rows.into_iter().map(Self::Leaf).collect())
    }
}

impl<T> From<Vec<Vec<Vec<T>>>> for Ragged<T> {
    fn from(rows: Vec<Vec<Vec<T>>>) -> Self {
        Self::Branch(rows.into_iter().map(Self::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat(values: Vec<i64>) -> Ragged<i64> {
        values.into()
    }

    fn nested(rows: Vec<Vec<i64>>) -> Ragged<i64> {
        rows.into()
    }

    #[test]
    fn test_depth_and_len() {
        let hits = flat(vec![1, 2, 3]);
        assert_eq!(hits.depth(), 1);
        assert_eq!(hits.len(), 3);

        let windows: Ragged<i64> = vec![vec![vec![1], vec![2, 3]], vec![]].into();
        assert_eq!(windows.depth(), 3);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows.count(), 3);
        assert_eq!(Ragged::Scalar(1.0).depth(), 0);
    }

    #[test]
    fn test_empty_lists_compare_equal() {
        assert_eq!(Ragged::<i64>::Leaf(vec![]), Ragged::Branch(vec![]));
        assert_ne!(flat(vec![1]), Ragged::Branch(vec![]));
    }

    #[test]
    fn test_filter_same_shape() {
        let values = nested(vec![vec![1, 2, 3], vec![4]]);
        let mask: Ragged<bool> = vec![vec![true, false, true], vec![false]].into();
        assert_eq!(values.filter(&mask).unwrap(), nested(vec![vec![1, 3], vec![]]));
    }

    #[test]
    fn test_filter_drops_sub_lists() {
        let values = nested(vec![vec![1, 2], vec![3], vec![4, 5]]);
        let keep: Ragged<bool> = vec![true, false, true].into();
        assert_eq!(
            values.filter(&keep).unwrap(),
            nested(vec![vec![1, 2], vec![4, 5]])
        );
    }

    #[test]
    fn test_filter_rejects_misaligned_mask() {
        let values = flat(vec![1, 2, 3]);
        let mask: Ragged<bool> = vec![true, false].into();
        assert!(matches!(
            values.filter(&mask),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_reduce_innermost() {
        let values = nested(vec![vec![1, 2, 3], vec![4, 5, 6], vec![]]);
        let sums = values.reduce(|leaf| leaf.iter().sum::<i64>()).unwrap();
        assert_eq!(sums, flat(vec![6, 15, 0]));

        let deeper: Ragged<i64> = vec![vec![vec![1, 2], vec![3]], vec![]].into();
        let sums = deeper.reduce(|leaf| leaf.iter().sum::<i64>()).unwrap();
        assert_eq!(sums, nested(vec![vec![3, 3], vec![]]));

        assert!(Ragged::Scalar(1_i64).reduce(<[i64]>::len).is_err());
    }

    #[test]
    fn test_flatten_and_map() {
        let values = nested(vec![vec![1, 2], vec![], vec![3]]);
        assert_eq!(values.flatten(), vec![1, 2, 3]);
        assert_eq!(
            values.map(|v| v * 10),
            nested(vec![vec![10, 20], vec![], vec![30]])
        );
    }

    #[test]
    fn test_slice_and_concat_rows() {
        let values = nested(vec![vec![1], vec![2, 3], vec![4]]);
        let head = values.slice_rows(0..1).unwrap();
        let tail = values.slice_rows(1..3).unwrap();
        assert_eq!(head, nested(vec![vec![1]]));
        assert_eq!(Ragged::concat([head, Ragged::empty(), tail]).unwrap(), values);
        assert!(values.slice_rows(2..4).is_err());
        assert!(Ragged::concat([flat(vec![1]), values]).is_err());
    }

    #[test]
    fn test_reduce_float_sums() {
        let edep = Ragged::<f64>::from(vec![vec![0.1, 0.2], vec![1.5e-3, 2.5e-3, 1e-3]]);
        let sums = edep.reduce(|v| v.iter().sum::<f64>()).unwrap().flatten();
        assert_eq!(sums.len(), 2);
        assert_relative_eq!(sums[0], 0.3, max_relative = 1e-12);
        assert_relative_eq!(sums[1], 5e-3, max_relative = 1e-12);
    }
}
