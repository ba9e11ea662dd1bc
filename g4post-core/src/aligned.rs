//! Lock-step recursion over co-indexed ragged arrays.
//!
//! Every transform in g4post follows the same rule: while the arguments are
//! lists of lists, walk them row by row in lock step; once they are lists of
//! scalars, hand the leaf slices to the transform's base case. [`map_aligned`]
//! implements that walk once for tuples of one to six arguments of any
//! element types.
//!
//! Branch lengths must agree at every level. Leaf lengths are not checked
//! here because some transforms pair leaves of different sizes (reference
//! times against a pool, reference series against a companion series); each
//! base case checks what it needs.

use crate::error::{Error, Result};
use crate::ragged::Ragged;

/// One recursion step over a tuple of aligned arguments.
pub enum Level<S, L> {
    /// The arguments are lists of lists: one tuple per row.
    Rows(Vec<S>),
    /// The arguments are lists of scalars.
    Leaves(L),
}

/// A tuple of ragged references that can be walked in lock step.
pub trait Aligned: Sized {
    /// Tuple of leaf slices handed to the base case.
    type Leaves;

    /// Splits the arguments one level down.
    ///
    /// # Errors
    /// Returns an error when the arguments disagree in structure.
    fn level(self) -> Result<Level<Self, Self::Leaves>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Rows(usize),
    Leaf,
    EmptyRows,
    EmptyLeaf,
}

fn kind<T>(value: &Ragged<T>) -> Result<Kind> {
    match value {
        Ragged::Scalar(_) => Err(Error::misaligned(
            "scalar value where a list was expected",
        )),
        Ragged::Leaf(values) if values.is_empty() => Ok(Kind::EmptyLeaf),
        Ragged::Leaf(_) => Ok(Kind::Leaf),
        Ragged::Branch(rows) if rows.is_empty() => Ok(Kind::EmptyRows),
        Ragged::Branch(rows) => Ok(Kind::Rows(rows.len())),
    }
}

/// Decides whether this level is made of rows (`Some(n)`) or leaves (`None`).
fn decide(kinds: &[Kind]) -> Result<Option<usize>> {
    let has_leaf = kinds.iter().any(|k| *k == Kind::Leaf);
    let rows: Vec<usize> = kinds
        .iter()
        .filter_map(|k| match k {
            Kind::Rows(n) => Some(*n),
            _ => None,
        })
        .collect();

    match (has_leaf, rows.first()) {
        (true, Some(_)) => Err(Error::misaligned(
            "a list of scalars is paired with a list of lists",
        )),
        (true, None) => Ok(None),
        (false, Some(&n)) => {
            if rows.len() != kinds.len() {
                return Err(Error::LengthMismatch {
                    context: "aligned rows",
                    left: n,
                    right: 0,
                });
            }
            if let Some(&other) = rows.iter().find(|&&m| m != n) {
                return Err(Error::LengthMismatch {
                    context: "aligned rows",
                    left: n,
                    right: other,
                });
            }
            Ok(Some(n))
        }
        (false, None) => {
            if kinds.contains(&Kind::EmptyRows) {
                Ok(Some(0))
            } else {
                Ok(None)
            }
        }
    }
}

fn rows_of<T>(value: &Ragged<T>) -> &[Ragged<T>] {
    match value {
        Ragged::Branch(rows) => rows,
        _ => &[],
    }
}

fn leaf_of<T>(value: &Ragged<T>) -> &[T] {
    match value {
        Ragged::Leaf(values) => values,
        _ => &[],
    }
}

macro_rules! impl_aligned {
    ($($arg:ident: $ty:ident),+) => {
        impl<'a, $($ty),+> Aligned for ($(&'a Ragged<$ty>,)+) {
            type Leaves = ($(&'a [$ty],)+);

            fn level(self) -> Result<Level<Self, Self::Leaves>> {
                let ($($arg,)+) = self;
                let kinds = [$(kind($arg)?),+];
                match decide(&kinds)? {
                    Some(n) => {
                        $(let $arg = rows_of($arg);)+
                        Ok(Level::Rows((0..n).map(|i| ($(&$arg[i],)+)).collect()))
                    }
                    None => Ok(Level::Leaves(($(leaf_of($arg),)+))),
                }
            }
        }
    };
}

impl_aligned!(a: A);
impl_aligned!(a: A, b: B);
impl_aligned!(a: A, b: B, c: C);
impl_aligned!(a: A, b: B, c: C, d: D);
impl_aligned!(a: A, b: B, c: C, d: D, e: E);
impl_aligned!(a: A, b: B, c: C, d: D, e: E, f: F);

/// Walks `args` down to their leaves and rebuilds the structure from `f`'s results.
///
/// A level whose results are all scalars becomes a leaf, so a base case that
/// reduces (returns [`Ragged::Scalar`]) removes one level and a base case
/// that groups (returns a list) adds one.
///
/// # Errors
/// Returns the first structural mismatch or the first error of `f`.
pub fn map_aligned<S, R, F>(args: S, f: &mut F) -> Result<Ragged<R>>
where
    S: Aligned,
    F: FnMut(S::Leaves) -> Result<Ragged<R>>,
{
    match args.level()? {
        Level::Leaves(leaves) => f(leaves),
        Level::Rows(rows) => {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                out.push(map_aligned(row, f)?);
            }
            Ok(Ragged::from_rows(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_rows_and_leaves() {
        let a: Ragged<i64> = vec![vec![1, 2], vec![3]].into();
        let b: Ragged<f64> = vec![vec![0.5], vec![1.5, 2.5]].into();

        let lens = map_aligned((&a, &b), &mut |(a, b): (&[i64], &[f64])| {
            Ok(Ragged::Scalar(a.len() * 10 + b.len()))
        })
        .unwrap();
        assert_eq!(lens, Ragged::from(vec![21_usize, 12]));
    }

    #[test]
    fn test_depth_is_polymorphic() {
        let shallow: Ragged<i64> = vec![1, 2, 3].into();
        let deep: Ragged<i64> = vec![vec![vec![1, 2, 3]], vec![vec![4], vec![]]].into();
        let mut sum =
            |(values,): (&[i64],)| -> Result<Ragged<i64>> { Ok(Ragged::Scalar(values.iter().sum())) };

        assert_eq!(map_aligned((&shallow,), &mut sum).unwrap(), Ragged::Scalar(6));
        assert_eq!(
            map_aligned((&deep,), &mut sum).unwrap(),
            Ragged::<i64>::from(vec![vec![6], vec![4, 0]])
        );
    }

    #[test]
    fn test_row_count_mismatch_is_an_error() {
        let a: Ragged<i64> = vec![vec![1], vec![2]].into();
        let b: Ragged<i64> = vec![vec![1]].into();
        let result = map_aligned((&a, &b), &mut |_| Ok(Ragged::Scalar(0_i64)));
        assert!(matches!(result, Err(Error::LengthMismatch { .. })));
    }

    #[test]
    fn test_leaf_against_rows_is_an_error() {
        let a: Ragged<i64> = vec![1, 2].into();
        let b: Ragged<i64> = vec![vec![1], vec![2]].into();
        let result = map_aligned((&a, &b), &mut |_| Ok(Ragged::Scalar(0_i64)));
        assert!(matches!(result, Err(Error::Misaligned(_))));
    }

    #[test]
    fn test_empty_branch_pairs_with_leaf() {
        let a: Ragged<i64> = vec![1, 2].into();
        let b: Ragged<i64> = Ragged::Branch(vec![]);
        let lens = map_aligned((&a, &b), &mut |(a, b): (&[i64], &[i64])| {
            Ok(Ragged::Scalar((a.len(), b.len())))
        })
        .unwrap();
        assert_eq!(lens, Ragged::Scalar((2, 0)));
    }

    #[test]
    fn test_empty_rows_stay_rows() {
        let a: Ragged<i64> = Ragged::Branch(vec![]);
        let out = map_aligned((&a,), &mut |_| Ok(Ragged::Scalar(1_i64))).unwrap();
        assert!(out.is_empty());
    }
}
