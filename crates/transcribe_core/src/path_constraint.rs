//! Full-history path values assembled from per-subset node values.

use std::sync::Arc;

use crate::error::TranscriptionResult;
use crate::grid::{GridData, NodeSubset, TranscriptionScheme};
use crate::options::{ensure_unique, ConstraintSpec, PathConstraintOptions};
use crate::sparsity::{expand_node_rows, Jacobian};
use crate::values::NodeValues;

#[derive(Debug, Clone)]
struct PathEntry {
    size: usize,
    disc: String,
    col: Option<String>,
    path: String,
}

/// Builds `path:{name}` on every node from `disc_values:{name}` and, under
/// Gauss-Lobatto, `col_values:{name}`.
#[derive(Debug, Clone)]
pub struct PathValueCompositor {
    grid: Arc<GridData>,
    entries: Vec<PathEntry>,
    constraints: Vec<ConstraintSpec>,
}

impl PathValueCompositor {
    pub fn new(grid: Arc<GridData>, options: Vec<PathConstraintOptions>) -> TranscriptionResult<Self> {
        ensure_unique(options.iter().map(|o| o.name.as_str()))?;
        let gauss_lobatto = grid.scheme() == TranscriptionScheme::GaussLobatto;
        let num_nodes = grid.num_nodes();

        let mut entries = Vec::with_capacity(options.len());
        let mut constraints = Vec::with_capacity(options.len());
        for o in options {
            let size = o.size();
            let entry = PathEntry {
                size,
                disc: format!("disc_values:{}", o.name),
                col: gauss_lobatto.then(|| format!("col_values:{}", o.name)),
                path: format!("path:{}", o.name),
            };
            constraints.push(ConstraintSpec {
                name: entry.path.clone(),
                size: num_nodes * size,
                lower: o.lower,
                upper: o.upper,
                equals: o.equals,
                reference: o.reference,
                ref0: o.ref0,
                adder: o.adder,
                scaler: o.scaler,
                linear: o.linear,
            });
            entries.push(entry);
        }

        Ok(Self {
            grid,
            entries,
            constraints,
        })
    }

    pub fn constraints(&self) -> &[ConstraintSpec] {
        &self.constraints
    }

    /// Input names consumed for each path variable.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|e| std::iter::once(e.disc.as_str()).chain(e.col.as_deref()))
    }

    pub fn compute(&self, inputs: &NodeValues, outputs: &mut NodeValues) -> TranscriptionResult<()> {
        let disc_idx = self.grid.subset_node_indices(NodeSubset::Disc);
        let col_idx = self.grid.subset_node_indices(NodeSubset::Col);
        let num_nodes = self.grid.num_nodes();

        for e in &self.entries {
            let disc = inputs.require_shaped(&e.disc, disc_idx.len(), e.size)?;
            let col = match &e.col {
                Some(name) => Some(inputs.require_shaped(name, col_idx.len(), e.size)?),
                None => None,
            };
            let path = outputs.output_mut(&e.path, num_nodes, e.size);
            for (r, &node) in disc_idx.iter().enumerate() {
                path.row_mut(node).copy_from(&disc.row(r));
            }
            if let Some(col) = col {
                for (r, &node) in col_idx.iter().enumerate() {
                    path.row_mut(node).copy_from(&col.row(r));
                }
            }
        }
        Ok(())
    }

    /// Constant selection partials, fully valued at declaration.
    pub fn declare_partials(&self) -> Jacobian {
        let num_nodes = self.grid.num_nodes();
        let mut jac = Jacobian::new();
        for e in &self.entries {
            let out_len = num_nodes * e.size;
            let disc_idx = self.grid.subset_node_indices(NodeSubset::Disc);
            let rows = expand_node_rows(disc_idx, e.size);
            let len = rows.len();
            jac.declare(&e.path, &e.disc, (out_len, len), rows, (0..len).collect(), vec![1.0; len]);

            if let Some(col) = &e.col {
                let col_idx = self.grid.subset_node_indices(NodeSubset::Col);
                let rows = expand_node_rows(col_idx, e.size);
                let len = rows.len();
                jac.declare(&e.path, col, (out_len, len), rows, (0..len).collect(), vec![1.0; len]);
            }
        }
        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;
    use crate::grid::GridConfig;
    use crate::options::ScalingValue;
    use nalgebra::DMatrix;

    fn option(name: &str, shape: Vec<usize>) -> PathConstraintOptions {
        let mut o = PathConstraintOptions::new(name);
        o.shape = shape;
        o
    }

    fn full_history(nodes: usize, size: usize, salt: f64) -> DMatrix<f64> {
        DMatrix::from_fn(nodes, size, |i, k| salt + 10.0 * i as f64 + k as f64)
    }

    #[test]
    fn round_trip_through_subsets() {
        for scheme in [TranscriptionScheme::GaussLobatto, TranscriptionScheme::Radau] {
            let grid = Arc::new(GridData::new(GridConfig::new(3, 5, scheme)).unwrap());
            let shapes = [vec![1], vec![3], vec![3, 3]];
            let options: Vec<_> = shapes
                .iter()
                .enumerate()
                .map(|(i, s)| option(&format!("p{i}"), s.clone()))
                .collect();
            let compositor = PathValueCompositor::new(Arc::clone(&grid), options).unwrap();

            let mut inputs = NodeValues::new();
            let mut expected = Vec::new();
            for (i, shape) in shapes.iter().enumerate() {
                let size: usize = shape.iter().product();
                let truth = full_history(grid.num_nodes(), size, i as f64 * 0.5);
                inputs.insert(
                    format!("disc_values:p{i}"),
                    grid.subset_values(NodeSubset::Disc, &truth).unwrap(),
                );
                if scheme == TranscriptionScheme::GaussLobatto {
                    inputs.insert(
                        format!("col_values:p{i}"),
                        grid.subset_values(NodeSubset::Col, &truth).unwrap(),
                    );
                }
                expected.push(truth);
            }

            let mut outputs = NodeValues::new();
            compositor.compute(&inputs, &mut outputs).unwrap();
            for (i, truth) in expected.iter().enumerate() {
                assert_eq!(outputs.get(&format!("path:p{i}")).unwrap(), truth, "{scheme}");
            }
        }
    }

    #[test]
    fn radau_needs_no_col_values() {
        let grid = Arc::new(GridData::new(GridConfig::new(2, 3, TranscriptionScheme::Radau)).unwrap());
        let compositor = PathValueCompositor::new(grid, vec![option("h", vec![1])]).unwrap();
        assert_eq!(compositor.input_names().collect::<Vec<_>>(), vec!["disc_values:h"]);
        let jac = compositor.declare_partials();
        assert_eq!(jac.len(), 1);
        let block = jac.get("path:h", "disc_values:h").unwrap();
        assert_eq!(block.rows, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn gauss_lobatto_partials_select_interleaved_rows() {
        let grid = Arc::new(GridData::new(GridConfig::new(1, 5, TranscriptionScheme::GaussLobatto)).unwrap());
        let compositor = PathValueCompositor::new(grid, vec![option("q", vec![2])]).unwrap();
        let jac = compositor.declare_partials();

        let disc = jac.get("path:q", "disc_values:q").unwrap();
        assert_eq!(disc.shape, (10, 6));
        assert_eq!(disc.rows, vec![0, 1, 4, 5, 8, 9]);
        assert_eq!(disc.cols, vec![0, 1, 2, 3, 4, 5]);
        assert!(disc.values.iter().all(|v| *v == 1.0));

        let col = jac.get("path:q", "col_values:q").unwrap();
        assert_eq!(col.shape, (10, 4));
        assert_eq!(col.rows, vec![2, 3, 6, 7]);
        assert_eq!(col.cols, vec![0, 1, 2, 3]);
    }

    #[test]
    fn constraints_carry_bounds_and_scaling() {
        let grid = Arc::new(GridData::new(GridConfig::new(2, 3, TranscriptionScheme::GaussLobatto)).unwrap());
        let mut o = option("load", vec![1]);
        o.lower = Some(ScalingValue::Scalar(-2.5));
        o.upper = Some(ScalingValue::Scalar(2.5));
        o.reference = Some(ScalingValue::Scalar(2.5));
        o.linear = true;
        let compositor = PathValueCompositor::new(grid, vec![o]).unwrap();
        let c = &compositor.constraints()[0];
        assert_eq!(c.name, "path:load");
        assert_eq!(c.size, 6);
        assert_eq!(c.lower, Some(ScalingValue::Scalar(-2.5)));
        assert_eq!(c.upper, Some(ScalingValue::Scalar(2.5)));
        assert_eq!(c.reference, Some(ScalingValue::Scalar(2.5)));
        assert!(c.linear);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let grid = Arc::new(GridData::new(GridConfig::new(1, 3, TranscriptionScheme::Radau)).unwrap());
        assert!(matches!(
            PathValueCompositor::new(grid, vec![option("a", vec![1]), option("a", vec![2])]),
            Err(ConfigurationError::DuplicateName(name)) if name == "a"
        ));
    }

    #[test]
    fn missing_col_values_is_reported() {
        let grid = Arc::new(GridData::new(GridConfig::new(1, 3, TranscriptionScheme::GaussLobatto)).unwrap());
        let compositor = PathValueCompositor::new(Arc::clone(&grid), vec![option("a", vec![1])]).unwrap();
        let mut inputs = NodeValues::new();
        inputs.insert("disc_values:a", DMatrix::zeros(2, 1));
        let mut outputs = NodeValues::new();
        assert!(matches!(
            compositor.compute(&inputs, &mut outputs),
            Err(ConfigurationError::MissingInput(name)) if name == "col_values:a"
        ));
    }
}
