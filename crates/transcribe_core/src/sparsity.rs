//! Sparse partial-derivative storage.
//!
//! Structure (row/column indices) is declared once when an engine is built;
//! each `compute_partials` call only rewrites the value arrays in place.

use nalgebra_sparse::CooMatrix;

use crate::error::{ConfigurationError, TranscriptionResult};

/// One declared block `d(of)/d(wrt)` in coordinate form.
#[derive(Debug, Clone, PartialEq)]
pub struct SubJacobian {
    pub of: String,
    pub wrt: String,
    /// `(rows, cols)` of the dense block, i.e. `(size(of), size(wrt))`.
    pub shape: (usize, usize),
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub values: Vec<f64>,
}

impl SubJacobian {
    pub fn nnz(&self) -> usize {
        self.rows.len()
    }

    /// Exports the block to a coordinate matrix, summing duplicate entries.
    pub fn to_coo(&self) -> CooMatrix<f64> {
        let mut coo = CooMatrix::new(self.shape.0, self.shape.1);
        for ((&r, &c), &v) in self.rows.iter().zip(&self.cols).zip(&self.values) {
            coo.push(r, c, v);
        }
        coo
    }
}

/// Collection of declared sub-Jacobians keyed by `(of, wrt)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Jacobian {
    blocks: Vec<SubJacobian>,
}

impl Jacobian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a block with a fixed pattern and initial values.
    pub fn declare(
        &mut self,
        of: impl Into<String>,
        wrt: impl Into<String>,
        shape: (usize, usize),
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<f64>,
    ) {
        debug_assert_eq!(rows.len(), cols.len());
        debug_assert_eq!(rows.len(), values.len());
        self.blocks.push(SubJacobian {
            of: of.into(),
            wrt: wrt.into(),
            shape,
            rows,
            cols,
            values,
        });
    }

    pub fn get(&self, of: &str, wrt: &str) -> Option<&SubJacobian> {
        self.blocks.iter().find(|b| b.of == of && b.wrt == wrt)
    }

    /// Mutable access to a declared block's values. The length is fixed by
    /// the declared pattern.
    pub fn values_mut(&mut self, of: &str, wrt: &str) -> TranscriptionResult<&mut [f64]> {
        self.blocks
            .iter_mut()
            .find(|b| b.of == of && b.wrt == wrt)
            .map(|b| b.values.as_mut_slice())
            .ok_or_else(|| ConfigurationError::MissingInput(format!("d({of})/d({wrt})")))
    }

    pub fn blocks(&self) -> &[SubJacobian] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Rows of a node-major flattened variable for the given node indices:
/// node `i` with `size` elements occupies `i*size .. i*size + size`.
pub(crate) fn expand_node_rows(node_indices: &[usize], size: usize) -> Vec<usize> {
    let mut rows = Vec::with_capacity(node_indices.len() * size);
    for &i in node_indices {
        rows.extend(i * size..i * size + size);
    }
    rows
}
