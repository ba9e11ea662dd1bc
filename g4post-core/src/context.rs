//! Named-value store threaded through a pipeline.

use crate::column::Column;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Variables produced while processing one batch of events.
///
/// Values are only ever added or overwritten. The optional row window
/// locates the batch inside its input file.
#[derive(Clone, Debug, Default)]
pub struct ProcessingContext {
    variables: HashMap<String, Column>,
    first_row: usize,
    total_rows: Option<usize>,
}

impl ProcessingContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records where this batch sits in its file.
    #[must_use]
    pub fn with_rows(mut self, first_row: usize, total_rows: usize) -> Self {
        self.first_row = first_row;
        self.total_rows = Some(total_rows);
        self
    }

    /// Index of the batch's first event within its file.
    #[must_use]
    pub fn first_row(&self) -> usize {
        self.first_row
    }

    /// Number of events in the whole file, when known.
    #[must_use]
    pub fn total_rows(&self) -> Option<usize> {
        self.total_rows
    }

    /// Stores a value, replacing any previous value of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Column>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Looks up a variable.
    ///
    /// # Errors
    /// Returns [`Error::MissingVariable`] when nothing was stored under `name`.
    pub fn get(&self, name: &str) -> Result<&Column> {
        self.variables
            .get(name)
            .ok_or_else(|| Error::MissingVariable(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Variable names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.variables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Consumes the context, returning all variables.
    #[must_use]
    pub fn into_columns(self) -> HashMap<String, Column> {
        self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ragged;

    #[test]
    fn test_insert_overwrites() {
        let mut ctx = ProcessingContext::new();
        ctx.insert("edep", Ragged::<f64>::from(vec![1.0]));
        ctx.insert("edep", Ragged::<f64>::from(vec![2.0, 3.0]));
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get("edep").unwrap().len(), 2);
    }

    #[test]
    fn test_missing_variable() {
        let ctx = ProcessingContext::new();
        assert_eq!(
            ctx.get("t").unwrap_err(),
            Error::MissingVariable("t".to_string())
        );
    }

    #[test]
    fn test_row_window() {
        let ctx = ProcessingContext::new().with_rows(100, 400);
        assert_eq!(ctx.first_row(), 100);
        assert_eq!(ctx.total_rows(), Some(400));
        assert_eq!(ProcessingContext::new().total_rows(), None);
    }
}
