//! Fixed-step explicit Runge-Kutta integration.

use anyhow::{bail, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::{DynamicalSystem, Scalar, Steppable};

/// Explicit Butcher tableau. Row `i` of `a` holds the `i` coefficients
/// weighting the earlier stages.
#[derive(Debug)]
pub struct ButcherTableau {
    pub c: &'static [f64],
    pub a: &'static [&'static [f64]],
    pub b: &'static [f64],
}

impl ButcherTableau {
    pub fn stages(&self) -> usize {
        self.b.len()
    }
}

pub static RK4_TABLEAU: ButcherTableau = ButcherTableau {
    c: &[0.0, 0.5, 0.5, 1.0],
    a: &[&[], &[0.5], &[0.0, 0.5], &[0.0, 0.0, 1.0]],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
};

/// Tsitouras 5(4); only the fifth-order weights are used.
pub static TSIT5_TABLEAU: ButcherTableau = ButcherTableau {
    c: &[0.0, 0.161, 0.327, 0.9, 0.9800255409045097, 1.0],
    a: &[
        &[],
        &[0.161],
        &[-0.008480655492356989, 0.335480655492357],
        &[2.898, -6.359447987781783, 4.361447987781783],
        &[
            5.325864828439257,
            -11.748883564062828,
            7.4955393428898365,
            -0.09249506636175525,
        ],
        &[
            5.86145544294642,
            -12.92096931784711,
            8.159367898576159,
            -0.071584973281401,
            -0.028269050394068383,
        ],
    ],
    b: &[
        0.09646076681806523,
        0.01,
        0.4798896504144996,
        1.379008574103742,
        -3.290069515436099,
        2.324710524099774,
    ],
};

fn cast<T: Scalar>(v: f64) -> T {
    T::from_f64(v).unwrap_or_else(T::nan)
}

/// Explicit Runge-Kutta stepper with preallocated stage buffers.
pub struct ExplicitRungeKutta<T: Scalar> {
    tableau: &'static ButcherTableau,
    k: Vec<Vec<T>>,
    tmp: Vec<T>,
}

impl<T: Scalar> ExplicitRungeKutta<T> {
    pub fn new(tableau: &'static ButcherTableau, dim: usize) -> Self {
        Self {
            tableau,
            k: vec![vec![T::zero(); dim]; tableau.stages()],
            tmp: vec![T::zero(); dim],
        }
    }

    pub fn rk4(dim: usize) -> Self {
        Self::new(&RK4_TABLEAU, dim)
    }

    pub fn tsit5(dim: usize) -> Self {
        Self::new(&TSIT5_TABLEAU, dim)
    }
}

impl<T: Scalar> Steppable<T> for ExplicitRungeKutta<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let t0 = *t;
        let tableau = self.tableau;
        for stage in 0..tableau.stages() {
            for i in 0..state.len() {
                let mut acc = T::zero();
                for (j, &a) in tableau.a[stage].iter().enumerate() {
                    acc = acc + cast::<T>(a) * self.k[j][i];
                }
                self.tmp[i] = state[i] + dt * acc;
            }
            system.apply(t0 + cast::<T>(tableau.c[stage]) * dt, &self.tmp, &mut self.k[stage]);
        }
        for i in 0..state.len() {
            let mut acc = T::zero();
            for (j, &b) in tableau.b.iter().enumerate() {
                acc = acc + cast::<T>(b) * self.k[j][i];
            }
            state[i] = state[i] + dt * acc;
        }
        *t = t0 + dt;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationMethod {
    #[default]
    Rk4,
    Tsit5,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationSettings {
    #[serde(default)]
    pub method: PropagationMethod,
    /// Number of equal steps across the span.
    pub num_steps: usize,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            method: PropagationMethod::Rk4,
            num_steps: 100,
        }
    }
}

/// Sampled solution: `states` has one row per entry of `times`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: DMatrix<f64>,
}

impl Trajectory {
    pub fn final_state(&self) -> Vec<f64> {
        let last = self.states.nrows() - 1;
        self.states.row(last).iter().copied().collect()
    }
}

/// Integrates `system` from `t0` to `tf` in `settings.num_steps` equal steps.
pub fn integrate(
    system: &impl DynamicalSystem<f64>,
    t0: f64,
    tf: f64,
    x0: &[f64],
    settings: &PropagationSettings,
) -> Result<Trajectory> {
    if settings.num_steps == 0 {
        bail!("propagation needs at least one step");
    }
    if !t0.is_finite() || !tf.is_finite() || t0 == tf {
        bail!("invalid propagation span [{t0}, {tf}]");
    }
    if x0.len() != system.dimension() {
        bail!(
            "initial state has {} elements, system dimension is {}",
            x0.len(),
            system.dimension()
        );
    }

    let dim = x0.len();
    let dt = (tf - t0) / settings.num_steps as f64;
    let mut stepper = match settings.method {
        PropagationMethod::Rk4 => ExplicitRungeKutta::rk4(dim),
        PropagationMethod::Tsit5 => ExplicitRungeKutta::tsit5(dim),
    };
    debug!(method = ?settings.method, steps = settings.num_steps, dt, "propagating");

    let mut times = Vec::with_capacity(settings.num_steps + 1);
    let mut states = DMatrix::zeros(settings.num_steps + 1, dim);
    let mut t = t0;
    let mut x = x0.to_vec();
    times.push(t);
    states.row_mut(0).copy_from_slice(&x);
    for n in 1..=settings.num_steps {
        stepper.step(system, &mut t, &mut x, dt);
        times.push(t);
        states.row_mut(n).copy_from_slice(&x);
        if x.iter().any(|v| !v.is_finite()) {
            bail!("state became non-finite at t = {t}");
        }
    }
    Ok(Trajectory { times, states })
}
