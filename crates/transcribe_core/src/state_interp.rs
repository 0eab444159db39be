//! State values and rate estimates at collocation nodes.
//!
//! Gauss-Lobatto grids Hermite-interpolate the discretization-node states and
//! rates; Radau grids differentiate the Lagrange polynomial through the state
//! values. Either way the result `staterate_col:{state}` is the `f_approx`
//! input of the defect engine.

use std::sync::Arc;

use nalgebra::DMatrix;

use crate::error::TranscriptionResult;
use crate::grid::{GridData, NodeSubset, StateInterpMatrices};
use crate::options::StateOptions;
use crate::sparsity::Jacobian;
use crate::values::NodeValues;

struct InterpState {
    size: usize,
    state: String,
    staterate_disc: String,
    state_col: String,
    staterate_col: String,
}

pub struct StateInterpolation {
    grid: Arc<GridData>,
    num_disc: usize,
    num_col: usize,
    /// `(col_node, disc_node)` pairs inside the block-diagonal structure, in
    /// the order Jacobian values are written.
    block_pairs: Vec<(usize, usize)>,
    states: Vec<InterpState>,
}

impl StateInterpolation {
    pub fn new(grid: Arc<GridData>, states: &[StateOptions]) -> TranscriptionResult<Self> {
        crate::options::ensure_unique(states.iter().map(|s| s.name.as_str()))?;
        let num_disc = grid.subset_num_nodes(NodeSubset::StateDisc);
        let num_col = grid.subset_num_nodes(NodeSubset::Col);

        let disc = grid.subset(NodeSubset::StateDisc);
        let col = grid.subset(NodeSubset::Col);
        let mut block_pairs = Vec::new();
        for iseg in 0..grid.num_segments() {
            let [c0, c1] = col.segment_indices[iseg];
            let [d0, d1] = disc.segment_indices[iseg];
            for j in c0..c1 {
                for i in d0..d1 {
                    block_pairs.push((j, i));
                }
            }
        }

        let states = states
            .iter()
            .map(|s| InterpState {
                size: s.size(),
                state: format!("states:{}", s.name),
                staterate_disc: format!("staterate_disc:{}", s.name),
                state_col: format!("state_col:{}", s.name),
                staterate_col: format!("staterate_col:{}", s.name),
            })
            .collect();

        Ok(Self {
            grid,
            num_disc,
            num_col,
            block_pairs,
            states,
        })
    }

    /// Name of the rate estimate output for `state`, i.e. the defect engine's
    /// `f_approx` input.
    pub fn staterate_col_name(state: &str) -> String {
        format!("staterate_col:{state}")
    }

    fn is_hermite(&self) -> bool {
        matches!(self.grid.state_interp_matrices(), StateInterpMatrices::Hermite(_))
    }

    pub fn compute(&self, inputs: &NodeValues, outputs: &mut NodeValues) -> TranscriptionResult<()> {
        let dt = inputs.require_shaped("dt_dstau", self.num_col, 1)?;
        for s in &self.states {
            let x = inputs.require_shaped(&s.state, self.num_disc, s.size)?;
            match self.grid.state_interp_matrices() {
                StateInterpMatrices::Lagrange { differentiation } => {
                    let mut rate = differentiation * x;
                    scale_rows(&mut rate, dt, |d| 1.0 / d);
                    *outputs.output_mut(&s.staterate_col, self.num_col, s.size) = rate;
                }
                StateInterpMatrices::Hermite(h) => {
                    let f = inputs.require_shaped(&s.staterate_disc, self.num_disc, s.size)?;
                    let mut slope_part = &h.bi * f;
                    scale_rows(&mut slope_part, dt, |d| d);
                    let value = &h.ai * x + slope_part;

                    let mut value_part = &h.ad * x;
                    scale_rows(&mut value_part, dt, |d| 1.0 / d);
                    let rate = value_part + &h.bd * f;

                    *outputs.output_mut(&s.state_col, self.num_col, s.size) = value;
                    *outputs.output_mut(&s.staterate_col, self.num_col, s.size) = rate;
                }
            }
        }
        Ok(())
    }

    /// Partial pattern for `(output, input)` with node-block structure.
    fn block_pattern(&self, size: usize) -> (Vec<usize>, Vec<usize>) {
        let mut rows = Vec::with_capacity(self.block_pairs.len() * size);
        let mut cols = Vec::with_capacity(self.block_pairs.len() * size);
        for &(j, i) in &self.block_pairs {
            for k in 0..size {
                rows.push(j * size + k);
                cols.push(i * size + k);
            }
        }
        (rows, cols)
    }

    fn dt_pattern(&self, size: usize) -> (Vec<usize>, Vec<usize>) {
        let rows = (0..self.num_col * size).collect();
        let cols = (0..self.num_col).flat_map(|j| std::iter::repeat(j).take(size)).collect();
        (rows, cols)
    }

    pub fn declare_partials(&self) -> Jacobian {
        let mut jac = Jacobian::new();
        let hermite = self.is_hermite();
        for s in &self.states {
            let out_len = self.num_col * s.size;
            let in_len = self.num_disc * s.size;
            let (rows, cols) = self.block_pattern(s.size);
            let (dt_rows, dt_cols) = self.dt_pattern(s.size);
            let nnz = rows.len();

            let block = (out_len, in_len);
            let dt_block = (out_len, self.num_col);

            jac.declare(&s.staterate_col, &s.state, block, rows.clone(), cols.clone(), vec![0.0; nnz]);
            jac.declare(
                &s.staterate_col,
                "dt_dstau",
                dt_block,
                dt_rows.clone(),
                dt_cols.clone(),
                vec![0.0; out_len],
            );

            if hermite {
                jac.declare(&s.state_col, &s.state, block, rows.clone(), cols.clone(), vec![0.0; nnz]);
                jac.declare(
                    &s.state_col,
                    &s.staterate_disc,
                    block,
                    rows.clone(),
                    cols.clone(),
                    vec![0.0; nnz],
                );
                jac.declare(&s.state_col, "dt_dstau", dt_block, dt_rows, dt_cols, vec![0.0; out_len]);
                jac.declare(&s.staterate_col, &s.staterate_disc, block, rows, cols, vec![0.0; nnz]);
            }
        }
        jac
    }

    pub fn compute_partials(&self, inputs: &NodeValues, jac: &mut Jacobian) -> TranscriptionResult<()> {
        let dt = inputs.require_shaped("dt_dstau", self.num_col, 1)?;
        for s in &self.states {
            let size = s.size;
            let x = inputs.require_shaped(&s.state, self.num_disc, size)?;
            match self.grid.state_interp_matrices() {
                StateInterpMatrices::Lagrange { differentiation } => {
                    let values = jac.values_mut(&s.staterate_col, &s.state)?;
                    fill_block(values, &self.block_pairs, size, |j, i| {
                        differentiation[(j, i)] / dt[(j, 0)]
                    });
                    let dx = differentiation * x;
                    fill_dt(jac.values_mut(&s.staterate_col, "dt_dstau")?, &dx, |j| {
                        -1.0 / (dt[(j, 0)] * dt[(j, 0)])
                    });
                }
                StateInterpMatrices::Hermite(h) => {
                    let f = inputs.require_shaped(&s.staterate_disc, self.num_disc, size)?;
                    let pairs = &self.block_pairs;
                    fill_block(jac.values_mut(&s.state_col, &s.state)?, pairs, size, |j, i| {
                        h.ai[(j, i)]
                    });
                    fill_block(jac.values_mut(&s.state_col, &s.staterate_disc)?, pairs, size, |j, i| {
                        h.bi[(j, i)] * dt[(j, 0)]
                    });
                    fill_block(jac.values_mut(&s.staterate_col, &s.state)?, pairs, size, |j, i| {
                        h.ad[(j, i)] / dt[(j, 0)]
                    });
                    fill_block(jac.values_mut(&s.staterate_col, &s.staterate_disc)?, pairs, size, |j, i| {
                        h.bd[(j, i)]
                    });
                    let bf = &h.bi * f;
                    fill_dt(jac.values_mut(&s.state_col, "dt_dstau")?, &bf, |_| 1.0);
                    let ax = &h.ad * x;
                    fill_dt(jac.values_mut(&s.staterate_col, "dt_dstau")?, &ax, |j| {
                        -1.0 / (dt[(j, 0)] * dt[(j, 0)])
                    });
                }
            }
        }
        Ok(())
    }
}

fn scale_rows<F>(values: &mut DMatrix<f64>, dt: &DMatrix<f64>, factor: F)
where
    F: Fn(f64) -> f64,
{
    for j in 0..values.nrows() {
        let c = factor(dt[(j, 0)]);
        values.row_mut(j).scale_mut(c);
    }
}

fn fill_block<F>(values: &mut [f64], pairs: &[(usize, usize)], size: usize, entry: F)
where
    F: Fn(usize, usize) -> f64,
{
    let mut idx = 0;
    for &(j, i) in pairs {
        let v = entry(j, i);
        for _ in 0..size {
            values[idx] = v;
            idx += 1;
        }
    }
}

fn fill_dt<F>(values: &mut [f64], term: &DMatrix<f64>, factor: F)
where
    F: Fn(usize) -> f64,
{
    let size = term.ncols();
    for j in 0..term.nrows() {
        let c = factor(j);
        for k in 0..size {
            values[j * size + k] = term[(j, k)] * c;
        }
    }
}
