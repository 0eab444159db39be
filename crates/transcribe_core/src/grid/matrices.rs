//! Lagrange and Hermite interpolation matrices between node sets.

use nalgebra::DMatrix;

/// `l_i(x)` and `l_i'(x)` for every basis polynomial of `nodes` at `x`.
fn lagrange_basis(nodes: &[f64], x: f64) -> (Vec<f64>, Vec<f64>) {
    let n = nodes.len();
    let mut values = vec![0.0; n];
    let mut slopes = vec![0.0; n];
    for i in 0..n {
        let mut value = 1.0;
        for k in 0..n {
            if k != i {
                value *= (x - nodes[k]) / (nodes[i] - nodes[k]);
            }
        }
        values[i] = value;

        let mut slope = 0.0;
        for m in 0..n {
            if m == i {
                continue;
            }
            let mut term = 1.0 / (nodes[i] - nodes[m]);
            for k in 0..n {
                if k != i && k != m {
                    term *= (x - nodes[k]) / (nodes[i] - nodes[k]);
                }
            }
            slope += term;
        }
        slopes[i] = slope;
    }
    (values, slopes)
}

/// Interpolation `L` and differentiation `D` matrices taking values at
/// `given` to values / first derivatives at `eval`. Both are
/// `eval.len() × given.len()`.
pub fn lagrange_matrices(given: &[f64], eval: &[f64]) -> (DMatrix<f64>, DMatrix<f64>) {
    let mut l = DMatrix::zeros(eval.len(), given.len());
    let mut d = DMatrix::zeros(eval.len(), given.len());
    for (j, &x) in eval.iter().enumerate() {
        let (values, slopes) = lagrange_basis(given, x);
        for i in 0..given.len() {
            l[(j, i)] = values[i];
            d[(j, i)] = slopes[i];
        }
    }
    (l, d)
}

/// Square differentiation matrix of a node set onto itself.
pub fn differentiation_matrix(nodes: &[f64]) -> DMatrix<f64> {
    lagrange_matrices(nodes, nodes).1
}

/// Hermite interpolation from values and slopes at the given nodes.
///
/// `value(eval) = ai · y + bi · y'` and `slope(eval) = ad · y + bd · y'`.
#[derive(Debug, Clone, PartialEq)]
pub struct HermiteMatrices {
    pub ai: DMatrix<f64>,
    pub bi: DMatrix<f64>,
    pub ad: DMatrix<f64>,
    pub bd: DMatrix<f64>,
}

pub fn hermite_matrices(given: &[f64], eval: &[f64]) -> HermiteMatrices {
    let n = given.len();
    let m = eval.len();
    // l_i'(x_i)
    let self_slopes: Vec<f64> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&k| k != i)
                .map(|k| 1.0 / (given[i] - given[k]))
                .sum()
        })
        .collect();

    let mut ai = DMatrix::zeros(m, n);
    let mut bi = DMatrix::zeros(m, n);
    let mut ad = DMatrix::zeros(m, n);
    let mut bd = DMatrix::zeros(m, n);

    for (j, &x) in eval.iter().enumerate() {
        let (l, dl) = lagrange_basis(given, x);
        for i in 0..n {
            let dx = x - given[i];
            let c = self_slopes[i];
            let l2 = l[i] * l[i];
            let dl2 = 2.0 * l[i] * dl[i];
            ai[(j, i)] = (1.0 - 2.0 * c * dx) * l2;
            ad[(j, i)] = -2.0 * c * l2 + (1.0 - 2.0 * c * dx) * dl2;
            bi[(j, i)] = dx * l2;
            bd[(j, i)] = l2 + dx * dl2;
        }
    }

    HermiteMatrices { ai, bi, ad, bd }
}
