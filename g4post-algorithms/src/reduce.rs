//! Innermost-axis reductions and range tests.

use g4post_core::{Column, Error, Ragged, Result};

/// Sum over the innermost axis. Integer columns stay integers.
///
/// # Errors
/// Returns an error for scalars and boolean columns.
pub fn sum(values: &Column) -> Result<Column> {
    match values {
        Column::Float(v) => v.reduce(|leaf| leaf.iter().sum::<f64>()).map(Column::Float),
        Column::Int(v) => v.reduce(|leaf| leaf.iter().sum::<i64>()).map(Column::Int),
        Column::Bool(_) => Err(Error::TypeMismatch {
            expected: "numeric",
            found: "bool",
        }),
    }
}

/// Maximum over the innermost axis; an empty list gives 0.
///
/// # Errors
/// Returns an error for scalars and boolean columns.
pub fn max(values: &Column) -> Result<Column> {
    match values {
        Column::Float(v) => v
            .reduce(|leaf| leaf.iter().copied().max_by(f64::total_cmp).unwrap_or(0.0))
            .map(Column::Float),
        Column::Int(v) => v
            .reduce(|leaf| leaf.iter().copied().max().unwrap_or(0))
            .map(Column::Int),
        Column::Bool(_) => Err(Error::TypeMismatch {
            expected: "numeric",
            found: "bool",
        }),
    }
}

/// Elementwise `low < v < high`.
#[must_use]
pub fn acceptance_range(values: &Ragged<f64>, low: f64, high: f64) -> Ragged<bool> {
    values.map(|&v| low < v && v < high)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_keeps_dtype() {
        let ints = Column::Int(Ragged::<i64>::from(vec![vec![1, 2, 3], vec![4, 5, 6]]));
        assert_eq!(sum(&ints).unwrap(), Column::Int(Ragged::from(vec![6_i64, 15])));

        let floats = Column::Float(Ragged::<f64>::from(vec![vec![vec![0.5, 0.5]], vec![]]));
        assert_eq!(
            sum(&floats).unwrap(),
            Column::Float(Ragged::<f64>::from(vec![vec![1.0], vec![]]))
        );
    }

    #[test]
    fn test_max_of_empty_is_zero() {
        let values = Column::Float(Ragged::<f64>::from(vec![vec![1.0, 7.0, 3.0], vec![]]));
        assert_eq!(
            max(&values).unwrap(),
            Column::Float(Ragged::from(vec![7.0_f64, 0.0]))
        );
    }

    #[test]
    fn test_reducing_scalar_fails() {
        let scalar = Column::Int(Ragged::Scalar(3));
        assert!(sum(&scalar).is_err());
        assert!(max(&Column::Bool(Ragged::from(vec![true]))).is_err());
    }

    #[test]
    fn test_acceptance_range_is_exclusive() {
        let values = Ragged::<f64>::from(vec![5.0, 15.0, 25.0, 10.0, 20.0, 12.0, 18.0]);
        assert_eq!(
            acceptance_range(&values, 10.0, 20.0),
            Ragged::<bool>::from(vec![false, true, false, false, false, true, true])
        );
    }
}
