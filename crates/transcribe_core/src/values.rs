//! Named node-value buffers.
//!
//! Each entry is a dense matrix with one row per node and one column per
//! element of the (row-major flattened) variable shape.

use std::collections::BTreeMap;

use nalgebra::DMatrix;

use crate::error::{ConfigurationError, TranscriptionResult};

/// Number of elements in a variable of the given shape (scalar for `[]`).
pub fn shape_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeValues {
    entries: BTreeMap<String, DMatrix<f64>>,
}

impl NodeValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: DMatrix<f64>) {
        self.entries.insert(name.into(), values);
    }

    /// Inserts a single node worth of values.
    pub fn insert_row(&mut self, name: impl Into<String>, row: &[f64]) {
        self.entries
            .insert(name.into(), DMatrix::from_row_slice(1, row.len(), row));
    }

    pub fn insert_scalar(&mut self, name: impl Into<String>, value: f64) {
        self.entries
            .insert(name.into(), DMatrix::from_element(1, 1, value));
    }

    pub fn get(&self, name: &str) -> Option<&DMatrix<f64>> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DMatrix<f64>> {
        self.entries.get_mut(name)
    }

    /// Looks up `name`, failing if absent.
    pub fn require(&self, name: &str) -> TranscriptionResult<&DMatrix<f64>> {
        self.entries
            .get(name)
            .ok_or_else(|| ConfigurationError::MissingInput(name.to_string()))
    }

    /// Looks up `name` and checks it is `(rows, cols)`.
    pub fn require_shaped(
        &self,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> TranscriptionResult<&DMatrix<f64>> {
        let values = self.require(name)?;
        if values.nrows() != rows || values.ncols() != cols {
            return Err(ConfigurationError::ShapeMismatch {
                name: name.to_string(),
                expected: rows * cols,
                found: values.nrows() * values.ncols(),
            });
        }
        Ok(values)
    }

    /// Returns the output buffer for `name`, (re)allocating it as zeros when
    /// its shape differs from `(rows, cols)`.
    pub fn output_mut(&mut self, name: &str, rows: usize, cols: usize) -> &mut DMatrix<f64> {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| DMatrix::zeros(rows, cols));
        if entry.nrows() != rows || entry.ncols() != cols {
            *entry = DMatrix::zeros(rows, cols);
        }
        entry
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Flattens a node matrix in row-major order (node-major, element-minor),
/// the ordering used by every Jacobian row/column index in this crate.
pub fn flatten_rows(values: &DMatrix<f64>) -> Vec<f64> {
    let mut flat = Vec::with_capacity(values.len());
    for r in 0..values.nrows() {
        for c in 0..values.ncols() {
            flat.push(values[(r, c)]);
        }
    }
    flat
}
