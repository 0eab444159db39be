//! Collocation defects.
//!
//! For each state the defect at every collocation node is
//! `(f_approx - f_computed) * dt_dstau`, which puts it back in the state's own
//! units. Nodes are independent of one another, so every partial is either
//! diagonal or one entry per row.

use std::sync::Arc;

use tracing::warn;

use crate::error::{NumericWarning, TranscriptionResult};
use crate::grid::{GridData, NodeSubset};
use crate::options::{ensure_unique, ConstraintSpec, ScalingValue, StateOptions};
use crate::sparsity::Jacobian;
use crate::values::NodeValues;

/// Reference value for a state's defect constraint, by priority:
/// `defect_ref`, `1/defect_scaler`, `ref`, `1/scaler`, then `1.0`.
pub fn resolve_defect_ref(state: &StateOptions) -> ScalingValue {
    if let Some(defect_ref) = &state.defect_ref {
        defect_ref.clone()
    } else if let Some(defect_scaler) = &state.defect_scaler {
        defect_scaler.reciprocal()
    } else if let Some(reference) = &state.reference {
        reference.clone()
    } else if let Some(scaler) = &state.scaler {
        scaler.reciprocal()
    } else {
        ScalingValue::Scalar(1.0)
    }
}

#[derive(Debug, Clone)]
struct DefectState {
    name: String,
    size: usize,
    f_approx: String,
    f_computed: String,
    defect: String,
}

#[derive(Debug, Clone)]
pub struct CollocationDefectEngine {
    grid: Arc<GridData>,
    num_col_nodes: usize,
    states: Vec<DefectState>,
    constraints: Vec<ConstraintSpec>,
    warnings: Vec<NumericWarning>,
}

impl CollocationDefectEngine {
    pub fn new(grid: Arc<GridData>, states: &[StateOptions]) -> TranscriptionResult<Self> {
        ensure_unique(states.iter().map(|s| s.name.as_str()))?;
        let num_col_nodes = grid.subset_num_nodes(NodeSubset::Col);
        let mut defect_states = Vec::with_capacity(states.len());
        let mut constraints = Vec::new();
        let mut warnings = Vec::new();

        for options in states {
            let size = options.size();
            let state = DefectState {
                name: options.name.clone(),
                size,
                f_approx: format!("f_approx:{}", options.name),
                f_computed: format!("f_computed:{}", options.name),
                defect: format!("defects:{}", options.name),
            };

            let reference = match resolve_defect_ref(options) {
                ScalingValue::Scalar(v) => ScalingValue::Scalar(v),
                array => {
                    let per_element = array.per_element(&options.name, size)?;
                    ScalingValue::Array(
                        std::iter::repeat(per_element)
                            .take(num_col_nodes)
                            .flatten()
                            .collect(),
                    )
                }
            };
            let degenerate = match &reference {
                ScalingValue::Scalar(v) => (*v == 0.0 || !v.is_finite()).then_some(*v),
                ScalingValue::Array(values) => values.iter().copied().find(|v| *v == 0.0 || !v.is_finite()),
            };
            if let Some(value) = degenerate {
                let warning = NumericWarning::DegenerateDefectRef {
                    state: options.name.clone(),
                    value,
                };
                warn!(state = %options.name, value, "{}", warning);
                warnings.push(warning);
            }

            if !options.solve_segments {
                constraints.push(ConstraintSpec {
                    name: state.defect.clone(),
                    size: num_col_nodes * size,
                    lower: None,
                    upper: None,
                    equals: Some(ScalingValue::Scalar(0.0)),
                    reference: Some(reference),
                    ref0: None,
                    adder: None,
                    scaler: None,
                    linear: false,
                });
            }
            defect_states.push(state);
        }

        Ok(Self {
            grid,
            num_col_nodes,
            states: defect_states,
            constraints,
            warnings,
        })
    }

    pub fn grid(&self) -> &GridData {
        &self.grid
    }

    pub fn num_col_nodes(&self) -> usize {
        self.num_col_nodes
    }

    /// Equality constraints for states not solved by segment solvers.
    pub fn constraints(&self) -> &[ConstraintSpec] {
        &self.constraints
    }

    pub fn warnings(&self) -> &[NumericWarning] {
        &self.warnings
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.name.as_str())
    }

    pub fn compute(&self, inputs: &NodeValues, outputs: &mut NodeValues) -> TranscriptionResult<()> {
        let n = self.num_col_nodes;
        let dt = inputs.require_shaped("dt_dstau", n, 1)?;
        for s in &self.states {
            let f_approx = inputs.require_shaped(&s.f_approx, n, s.size)?;
            let f_computed = inputs.require_shaped(&s.f_computed, n, s.size)?;
            let defect = outputs.output_mut(&s.defect, n, s.size);
            for j in 0..n {
                for k in 0..s.size {
                    defect[(j, k)] = (f_approx[(j, k)] - f_computed[(j, k)]) * dt[(j, 0)];
                }
            }
        }
        Ok(())
    }

    /// Declares the fixed partial pattern. Values are filled by
    /// [`compute_partials`](Self::compute_partials).
    pub fn declare_partials(&self) -> Jacobian {
        let n = self.num_col_nodes;
        let mut jac = Jacobian::new();
        for s in &self.states {
            let len = n * s.size;
            let r: Vec<usize> = (0..len).collect();
            let c: Vec<usize> = (0..n).flat_map(|j| std::iter::repeat(j).take(s.size)).collect();
            jac.declare(&s.defect, &s.f_approx, (len, len), r.clone(), r.clone(), vec![0.0; len]);
            jac.declare(&s.defect, &s.f_computed, (len, len), r.clone(), r.clone(), vec![0.0; len]);
            jac.declare(&s.defect, "dt_dstau", (len, n), r, c, vec![0.0; len]);
        }
        jac
    }

    pub fn compute_partials(&self, inputs: &NodeValues, jac: &mut Jacobian) -> TranscriptionResult<()> {
        let n = self.num_col_nodes;
        let dt = inputs.require_shaped("dt_dstau", n, 1)?;
        for s in &self.states {
            let f_approx = inputs.require_shaped(&s.f_approx, n, s.size)?;
            let f_computed = inputs.require_shaped(&s.f_computed, n, s.size)?;

            let d_approx = jac.values_mut(&s.defect, &s.f_approx)?;
            for j in 0..n {
                d_approx[j * s.size..(j + 1) * s.size].fill(dt[(j, 0)]);
            }
            let d_computed = jac.values_mut(&s.defect, &s.f_computed)?;
            for j in 0..n {
                d_computed[j * s.size..(j + 1) * s.size].fill(-dt[(j, 0)]);
            }
            let d_dt = jac.values_mut(&s.defect, "dt_dstau")?;
            for j in 0..n {
                for k in 0..s.size {
                    d_dt[j * s.size + k] = f_approx[(j, k)] - f_computed[(j, k)];
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;
    use crate::grid::{GridConfig, TranscriptionScheme};
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;

    fn grid() -> Arc<GridData> {
        Arc::new(GridData::new(GridConfig::new(3, 5, TranscriptionScheme::Radau)).unwrap())
    }

    fn vector_state() -> StateOptions {
        let mut state = StateOptions::new("r", "v");
        state.shape = vec![3];
        state
    }

    fn inputs(n: usize, size: usize, seed: f64) -> NodeValues {
        let mut values = NodeValues::new();
        values.insert(
            "f_approx:r",
            DMatrix::from_fn(n, size, |j, k| seed * (j as f64 + 1.0) - k as f64),
        );
        values.insert(
            "f_computed:r",
            DMatrix::from_fn(n, size, |j, k| 0.5 * (j * size + k) as f64),
        );
        values.insert("dt_dstau", DMatrix::from_fn(n, 1, |j, _| 0.25 + 0.1 * j as f64));
        values
    }

    #[test]
    fn reference_priority_follows_declaration_order() {
        let mut state = StateOptions::new("x", "xdot");
        assert_eq!(resolve_defect_ref(&state), ScalingValue::Scalar(1.0));
        state.scaler = Some(ScalingValue::Scalar(4.0));
        assert_eq!(resolve_defect_ref(&state), ScalingValue::Scalar(0.25));
        state.reference = Some(ScalingValue::Scalar(100.0));
        assert_eq!(resolve_defect_ref(&state), ScalingValue::Scalar(100.0));
        state.defect_scaler = Some(ScalingValue::Scalar(10.0));
        assert_eq!(resolve_defect_ref(&state), ScalingValue::Scalar(0.1));
        state.defect_ref = Some(ScalingValue::Scalar(7.0));
        assert_eq!(resolve_defect_ref(&state), ScalingValue::Scalar(7.0));
    }

    #[test]
    fn identical_rates_give_zero_defect_for_any_dt() {
        let grid = grid();
        let engine = CollocationDefectEngine::new(Arc::clone(&grid), &[vector_state()]).unwrap();
        let n = engine.num_col_nodes();
        let mut values = inputs(n, 3, 1.0);
        let same = values.get("f_approx:r").cloned().unwrap();
        values.insert("f_computed:r", same);
        for scale in [1e-6, 1.0, 1e6] {
            values.insert("dt_dstau", DMatrix::from_element(n, 1, scale));
            let mut out = NodeValues::new();
            engine.compute(&values, &mut out).unwrap();
            assert!(out.get("defects:r").unwrap().iter().all(|v| *v == 0.0));
        }
    }

    #[test]
    fn defect_scales_by_dt_dstau() {
        let grid = grid();
        let engine = CollocationDefectEngine::new(grid, &[vector_state()]).unwrap();
        let n = engine.num_col_nodes();
        let values = inputs(n, 3, 2.0);
        let mut out = NodeValues::new();
        engine.compute(&values, &mut out).unwrap();
        let defect = out.get("defects:r").unwrap();
        assert_eq!(defect.shape(), (n, 3));
        let fa = values.get("f_approx:r").unwrap();
        let fc = values.get("f_computed:r").unwrap();
        let dt = values.get("dt_dstau").unwrap();
        for j in 0..n {
            for k in 0..3 {
                assert_abs_diff_eq!(defect[(j, k)], (fa[(j, k)] - fc[(j, k)]) * dt[(j, 0)], epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn constraint_exposed_unless_solved_by_segments() {
        let mut solved = StateOptions::new("m", "mdot");
        solved.solve_segments = true;
        let mut scaled = vector_state();
        scaled.defect_scaler = Some(ScalingValue::Scalar(10.0));
        scaled.reference = Some(ScalingValue::Scalar(1000.0));
        let engine = CollocationDefectEngine::new(grid(), &[solved, scaled]).unwrap();
        let constraints = engine.constraints();
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].name, "defects:r");
        assert_eq!(constraints[0].equals, Some(ScalingValue::Scalar(0.0)));
        assert_eq!(constraints[0].reference, Some(ScalingValue::Scalar(0.1)));
        assert_eq!(constraints[0].size, engine.num_col_nodes() * 3);
    }

    #[test]
    fn array_reference_is_tiled_over_nodes() {
        let mut state = vector_state();
        state.reference = Some(ScalingValue::Array(vec![1.0, 2.0, 3.0]));
        let engine = CollocationDefectEngine::new(grid(), &[state]).unwrap();
        let Some(ScalingValue::Array(reference)) = &engine.constraints()[0].reference else {
            panic!("array reference expected");
        };
        assert_eq!(reference.len(), engine.num_col_nodes() * 3);
        assert_eq!(&reference[3..6], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn mismatched_array_reference_is_a_configuration_error() {
        let mut state = vector_state();
        state.scaler = Some(ScalingValue::Array(vec![1.0, 2.0]));
        assert!(matches!(
            CollocationDefectEngine::new(grid(), &[state]),
            Err(ConfigurationError::ReferenceShape { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn degenerate_reference_warns_without_failing() {
        let mut state = StateOptions::new("x", "xdot");
        state.defect_ref = Some(ScalingValue::Scalar(0.0));
        let engine = CollocationDefectEngine::new(grid(), &[state]).unwrap();
        assert_eq!(
            engine.warnings(),
            &[NumericWarning::DegenerateDefectRef {
                state: "x".to_string(),
                value: 0.0
            }]
        );
    }

    #[test]
    fn zero_defect_scaler_warns_with_infinite_reference() {
        let mut state = StateOptions::new("x", "xdot");
        state.defect_scaler = Some(ScalingValue::Scalar(0.0));
        let engine = CollocationDefectEngine::new(grid(), &[state]).unwrap();
        assert_eq!(
            engine.warnings(),
            &[NumericWarning::DegenerateDefectRef {
                state: "x".to_string(),
                value: f64::INFINITY
            }]
        );
        assert_eq!(
            engine.constraints()[0].reference,
            Some(ScalingValue::Scalar(f64::INFINITY))
        );

        let mut state = vector_state();
        state.defect_ref = Some(ScalingValue::Array(vec![1.0, f64::NAN, 2.0]));
        let engine = CollocationDefectEngine::new(grid(), &[state]).unwrap();
        assert_eq!(engine.warnings().len(), 1);
        let NumericWarning::DegenerateDefectRef { state, value } = &engine.warnings()[0];
        assert_eq!(state, "r");
        assert!(value.is_nan());
    }

    #[test]
    fn partials_have_fixed_pattern_and_expected_values() {
        let engine = CollocationDefectEngine::new(grid(), &[vector_state()]).unwrap();
        let n = engine.num_col_nodes();
        let values = inputs(n, 3, 1.5);
        let mut jac = engine.declare_partials();
        let pattern_before: Vec<_> = jac.blocks().iter().map(|b| (b.rows.clone(), b.cols.clone())).collect();
        engine.compute_partials(&values, &mut jac).unwrap();
        let pattern_after: Vec<_> = jac.blocks().iter().map(|b| (b.rows.clone(), b.cols.clone())).collect();
        assert_eq!(pattern_before, pattern_after);

        let dt = values.get("dt_dstau").unwrap();
        let d_approx = jac.get("defects:r", "f_approx:r").unwrap();
        let d_computed = jac.get("defects:r", "f_computed:r").unwrap();
        let d_dt = jac.get("defects:r", "dt_dstau").unwrap();
        assert_eq!(d_dt.cols[..6], [0, 0, 0, 1, 1, 1]);
        for j in 0..n {
            for k in 0..3 {
                let r = j * 3 + k;
                assert_eq!(d_approx.values[r], dt[(j, 0)]);
                assert_eq!(d_computed.values[r], -dt[(j, 0)]);
            }
        }

        // forward difference check on dt_dstau
        let h = 1e-7;
        let mut base = NodeValues::new();
        engine.compute(&values, &mut base).unwrap();
        let mut bumped_inputs = values.clone();
        bumped_inputs.get_mut("dt_dstau").unwrap()[(1, 0)] += h;
        let mut bumped = NodeValues::new();
        engine.compute(&bumped_inputs, &mut bumped).unwrap();
        for k in 0..3 {
            let fd = (bumped.get("defects:r").unwrap()[(1, k)] - base.get("defects:r").unwrap()[(1, k)]) / h;
            assert_abs_diff_eq!(d_dt.values[3 + k], fd, epsilon = 1e-6);
        }
    }

    #[test]
    fn shape_mismatch_is_reported_at_call_time() {
        let engine = CollocationDefectEngine::new(grid(), &[vector_state()]).unwrap();
        let mut values = inputs(engine.num_col_nodes(), 3, 1.0);
        values.insert("f_computed:r", DMatrix::zeros(2, 3));
        let mut out = NodeValues::new();
        assert!(matches!(
            engine.compute(&values, &mut out),
            Err(ConfigurationError::ShapeMismatch { .. })
        ));
    }
}
