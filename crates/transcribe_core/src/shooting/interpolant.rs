//! Barycentric Lagrange interpolation of control histories.

use nalgebra::DMatrix;

use crate::error::{ConfigurationError, TranscriptionResult};
use crate::grid::matrices::differentiation_matrix;

/// Value and first two derivatives of an interpolated variable at one point,
/// each flattened to the variable's size.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedValue {
    pub value: Vec<f64>,
    pub rate: Vec<f64>,
    pub rate2: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
enum Fit {
    Uninitialized,
    Fitted {
        x0: f64,
        xf: f64,
        values: DMatrix<f64>,
        /// Derivatives with respect to `tau`.
        rates: DMatrix<f64>,
        rates2: DMatrix<f64>,
    },
}

/// Lagrange interpolant over fixed nodes in `tau ∈ [-1, 1]`, mapped onto
/// `[x0, xf]` by [`setup`](Self::setup). Evaluation before `setup` fails.
#[derive(Debug, Clone, PartialEq)]
pub struct LagrangeBarycentricInterpolant {
    name: String,
    nodes: Vec<f64>,
    weights: Vec<f64>,
    diff: DMatrix<f64>,
    fit: Fit,
}

impl LagrangeBarycentricInterpolant {
    pub fn new(name: impl Into<String>, nodes: &[f64]) -> TranscriptionResult<Self> {
        if nodes.is_empty() || nodes.iter().any(|x| !x.is_finite()) {
            return Err(ConfigurationError::InvalidNodes);
        }
        let mut weights = Vec::with_capacity(nodes.len());
        for (j, &xj) in nodes.iter().enumerate() {
            let mut prod = 1.0;
            for (k, &xk) in nodes.iter().enumerate() {
                if k != j {
                    prod *= xj - xk;
                }
            }
            if prod == 0.0 {
                return Err(ConfigurationError::InvalidNodes);
            }
            weights.push(1.0 / prod);
        }
        Ok(Self {
            name: name.into(),
            nodes: nodes.to_vec(),
            weights,
            diff: differentiation_matrix(nodes),
            fit: Fit::Uninitialized,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.fit, Fit::Fitted { .. })
    }

    /// Fits node values (one row per node) over `[x0, xf]`, replacing any
    /// previous fit.
    pub fn setup(&mut self, x0: f64, xf: f64, values: &DMatrix<f64>) -> TranscriptionResult<()> {
        if !x0.is_finite() || !xf.is_finite() || xf <= x0 {
            return Err(ConfigurationError::InvalidSpan { x0, xf });
        }
        if values.nrows() != self.nodes.len() {
            return Err(ConfigurationError::ShapeMismatch {
                name: self.name.clone(),
                expected: self.nodes.len(),
                found: values.nrows(),
            });
        }
        let rates = &self.diff * values;
        let rates2 = &self.diff * &rates;
        self.fit = Fit::Fitted {
            x0,
            xf,
            values: values.clone(),
            rates,
            rates2,
        };
        Ok(())
    }

    /// Drops the current fit.
    pub fn reset(&mut self) {
        self.fit = Fit::Uninitialized;
    }

    /// Evaluates value, rate and second rate at `x`, all with respect to `x`.
    pub fn eval(&self, x: f64) -> TranscriptionResult<InterpolatedValue> {
        let Fit::Fitted {
            x0,
            xf,
            values,
            rates,
            rates2,
        } = &self.fit
        else {
            return Err(ConfigurationError::InterpolantNotFitted(self.name.clone()));
        };
        let tau = 2.0 * (x - x0) / (xf - x0) - 1.0;
        let dtau_dx = 2.0 / (xf - x0);
        let coeffs = self.basis(tau);
        let combine = |m: &DMatrix<f64>, scale: f64| -> Vec<f64> {
            (0..m.ncols())
                .map(|c| scale * coeffs.iter().enumerate().map(|(j, w)| w * m[(j, c)]).sum::<f64>())
                .collect()
        };
        Ok(InterpolatedValue {
            value: combine(values, 1.0),
            rate: combine(rates, dtau_dx),
            rate2: combine(rates2, dtau_dx * dtau_dx),
        })
    }

    /// Lagrange basis values at `tau` in barycentric form.
    fn basis(&self, tau: f64) -> Vec<f64> {
        if let Some(j) = self.nodes.iter().position(|&x| x == tau) {
            let mut exact = vec![0.0; self.nodes.len()];
            exact[j] = 1.0;
            return exact;
        }
        let terms: Vec<f64> = self
            .nodes
            .iter()
            .zip(&self.weights)
            .map(|(x, w)| w / (tau - x))
            .collect();
        let total: f64 = terms.iter().sum();
        terms.into_iter().map(|t| t / total).collect()
    }
}
