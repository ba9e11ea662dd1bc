//! Batch sizing from available system memory.
//!
//! When a run configuration leaves `step_size` unset, every file is split
//! into batches whose estimated working set fits a share of the memory that
//! is available when the file is opened.

use crate::packed::Table;
use crate::{Error, Result};
use g4post_core::Column;
use std::mem::size_of;
use sysinfo::System;

const MEMORY_OVERHEAD_FACTOR: f64 = 1.2;

/// Memory budget used to size batches.
#[derive(Clone, Debug)]
pub struct BatchSizing {
    /// Fraction of available system memory to target (0.0 < fraction <= 1.0).
    pub memory_fraction: f64,
    /// Explicit memory budget override (bytes). If set, `memory_fraction` is ignored.
    pub memory_budget_bytes: Option<usize>,
    /// Number of batches expected to be in memory at once (one per worker).
    pub concurrent_batches: usize,
    /// Intermediate arrays a pipeline derives per input array.
    pub expansion: usize,
}

impl Default for BatchSizing {
    fn default() -> Self {
        Self {
            memory_fraction: g4post_pipeline::DEFAULT_MEMORY_FRACTION,
            memory_budget_bytes: None,
            concurrent_batches: 1,
            expansion: 1,
        }
    }
}

impl BatchSizing {
    #[must_use]
    pub fn with_memory_fraction(mut self, fraction: f64) -> Self {
        self.memory_fraction = fraction;
        self
    }

    #[must_use]
    pub fn with_memory_budget_bytes(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }

    /// Values less than 1 are clamped to 1.
    #[must_use]
    pub fn with_concurrent_batches(mut self, batches: usize) -> Self {
        self.concurrent_batches = batches.max(1);
        self
    }

    /// Values less than 1 are clamped to 1.
    #[must_use]
    pub fn with_expansion(mut self, expansion: usize) -> Self {
        self.expansion = expansion.max(1);
        self
    }

    /// Resolve the target memory budget in bytes.
    ///
    /// # Errors
    /// Returns an error if the memory fraction is invalid or system memory cannot be queried.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn resolve_budget_bytes(&self) -> Result<usize> {
        if let Some(bytes) = self.memory_budget_bytes {
            return Ok(bytes);
        }
        if !(0.0 < self.memory_fraction && self.memory_fraction <= 1.0) {
            return Err(Error::Memory(
                "memory_fraction must be in (0.0, 1.0]".to_string(),
            ));
        }
        let mut system = System::new();
        system.refresh_memory();
        let available = system.available_memory();
        if available == 0 {
            return Err(Error::Memory(
                "available system memory reported as 0".to_string(),
            ));
        }
        let budget = (available as f64 * self.memory_fraction).floor() as u64;
        Ok(usize::try_from(budget).unwrap_or(usize::MAX))
    }

    /// Rows per batch for `table` under the resolved budget.
    ///
    /// # Errors
    /// See [`BatchSizing::resolve_budget_bytes`].
    pub fn rows_for(&self, table: &Table) -> Result<usize> {
        let budget = self.resolve_budget_bytes()? / self.concurrent_batches.max(1);
        let per_row = estimate_row_bytes(table).saturating_mul(self.expansion.max(1));
        Ok(max_rows_for_budget(budget, per_row))
    }
}

/// Average bytes one row of `table` occupies, offsets included.
#[must_use]
pub fn estimate_row_bytes(table: &Table) -> usize {
    let rows = table.len().max(1);
    let total: usize = table
        .columns()
        .map(|(_, column)| column_bytes(column))
        .sum();
    total.div_ceil(rows).max(1)
}

fn column_bytes(column: &Column) -> usize {
    let (count, scalar) = match column {
        Column::Float(v) => (v.count(), size_of::<f64>()),
        Column::Int(v) => (v.count(), size_of::<i64>()),
        Column::Bool(v) => (v.count(), size_of::<bool>()),
    };
    // one offset per list at each level below the top
    let lists = column.len() * column.depth().saturating_sub(1);
    count * scalar + lists * size_of::<usize>()
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn max_rows_for_budget(budget_bytes: usize, bytes_per_row: usize) -> usize {
    let per_row = (bytes_per_row as f64 * MEMORY_OVERHEAD_FACTOR).ceil() as usize;
    let per_row = per_row.max(1);
    (budget_bytes / per_row).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use g4post_core::Ragged;

    fn table() -> Table {
        let mut table = Table::new();
        table
            .insert("e", Column::Float(Ragged::<f64>::from(vec![vec![1.0, 2.0], vec![3.0, 4.0]])))
            .unwrap();
        table
    }

    #[test]
    fn test_explicit_budget() {
        // 2 rows, 4 floats + 2 offsets = 48 bytes, 24 per row, 29 with overhead
        let sizing = BatchSizing::default().with_memory_budget_bytes(290);
        assert_eq!(estimate_row_bytes(&table()), 24);
        assert_eq!(sizing.rows_for(&table()).unwrap(), 10);

        let shared = sizing.with_concurrent_batches(2).with_expansion(5);
        assert_eq!(shared.rows_for(&table()).unwrap(), 1);
    }

    #[test]
    fn test_invalid_fraction() {
        let sizing = BatchSizing::default().with_memory_fraction(1.5);
        assert!(matches!(sizing.resolve_budget_bytes(), Err(Error::Memory(_))));
    }

    #[test]
    fn test_budget_never_yields_zero_rows() {
        assert_eq!(max_rows_for_budget(0, 100), 1);
        assert_eq!(max_rows_for_budget(1000, 0), 1000);
    }
}
