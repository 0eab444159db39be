//! Legendre quadrature node sets on `[-1, 1]`.

use std::f64::consts::PI;

use crate::error::{ConfigurationError, TranscriptionResult};

const MAX_NEWTON_STEPS: usize = 100;
const NEWTON_TOL: f64 = 1e-15;

/// Abscissae and quadrature weights, ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSet {
    pub nodes: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Returns `(P_n(x), P_{n-1}(x))` using the three-term recurrence.
fn legendre_pair(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let mut p_prev = 1.0;
    let mut p = x;
    for k in 2..=n {
        let kf = k as f64;
        let next = ((2.0 * kf - 1.0) * x * p - (kf - 1.0) * p_prev) / kf;
        p_prev = p;
        p = next;
    }
    (p, p_prev)
}

/// Returns `(P_n(x), P_n'(x))`. Only valid away from `x = ±1`.
fn legendre_eval(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let (p, p_prev) = legendre_pair(n, x);
    let dp = (n as f64) * (x * p - p_prev) / (x * x - 1.0);
    (p, dp)
}

fn newton<F>(mut x: f64, f: F) -> f64
where
    F: Fn(f64) -> (f64, f64),
{
    for _ in 0..MAX_NEWTON_STEPS {
        let (g, dg) = f(x);
        let dx = -g / dg;
        x += dx;
        if dx.abs() < NEWTON_TOL {
            break;
        }
    }
    x
}

/// Mirrors the upper half of a symmetric node set onto the lower half so the
/// set is exactly antisymmetric about zero.
fn symmetrize(nodes: &mut [f64]) {
    let n = nodes.len();
    for i in 0..n / 2 {
        let x = 0.5 * (nodes[n - 1 - i] - nodes[i]);
        nodes[i] = -x;
        nodes[n - 1 - i] = x;
    }
    if n % 2 == 1 {
        nodes[n / 2] = 0.0;
    }
}

/// Legendre-Gauss-Lobatto nodes: both endpoints plus the roots of
/// `P'_{n-1}`.
pub fn lgl(n: usize) -> TranscriptionResult<NodeSet> {
    if n < 2 {
        return Err(ConfigurationError::InvalidNodes);
    }
    let deg = n - 1;
    let degf = deg as f64;
    let mut nodes = vec![0.0; n];
    nodes[0] = -1.0;
    nodes[n - 1] = 1.0;
    for (i, node) in nodes.iter_mut().enumerate().take(n - 1).skip(1) {
        let guess = -(PI * i as f64 / degf).cos();
        *node = newton(guess, |x| {
            let (p, dp) = legendre_eval(deg, x);
            let d2p = (2.0 * x * dp - degf * (degf + 1.0) * p) / (1.0 - x * x);
            (dp, d2p)
        });
    }
    symmetrize(&mut nodes);

    let weights = nodes
        .iter()
        .map(|&x| {
            let (p, _) = legendre_pair(deg, x);
            2.0 / (degf * (degf + 1.0) * p * p)
        })
        .collect();
    Ok(NodeSet { nodes, weights })
}

/// Legendre-Gauss-Radau nodes: `-1` plus the roots of `P_{n-1} + P_n`.
/// The right endpoint is not included.
pub fn lgr(n: usize) -> TranscriptionResult<NodeSet> {
    if n < 1 {
        return Err(ConfigurationError::InvalidNodes);
    }
    let nf = n as f64;
    let mut nodes = vec![-1.0; n];
    for (k, node) in nodes.iter_mut().enumerate().skip(1) {
        let guess = -(2.0 * PI * k as f64 / (2.0 * nf - 1.0)).cos();
        *node = newton(guess, |x| {
            let (p_lo, dp_lo) = legendre_eval(n - 1, x);
            let (p_hi, dp_hi) = legendre_eval(n, x);
            (p_lo + p_hi, dp_lo + dp_hi)
        });
    }
    nodes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let weights = nodes
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            if i == 0 {
                2.0 / (nf * nf)
            } else {
                let (p, _) = legendre_pair(n - 1, x);
                (1.0 - x) / (nf * nf * p * p)
            }
        })
        .collect();
    Ok(NodeSet { nodes, weights })
}
