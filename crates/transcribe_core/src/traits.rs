use std::collections::BTreeMap;
use std::fmt::Debug;

use num_traits::{Float, FromPrimitive};

use crate::values::NodeValues;

/// Numeric types the explicit integrators can step.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A first-order system `dx/dt = f(t, x)` over a flat state vector.
pub trait DynamicalSystem<T: Scalar> {
    fn dimension(&self) -> usize;

    /// Writes `f(t, x)` into `out`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// Fixed-step explicit integrator.
pub trait Steppable<T: Scalar> {
    /// Advances `state` and `t` by one step of size `dt`.
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

/// User dynamics evaluated on a batch of nodes.
///
/// Shapes are per node and must be available before any configuration is
/// built on top of the model. Every input and output in `compute` is a
/// [`NodeValues`] entry with one row per node and `shape_size(shape)`
/// columns.
pub trait OdeModel {
    fn input_shapes(&self) -> BTreeMap<String, Vec<usize>>;

    fn output_shapes(&self) -> BTreeMap<String, Vec<usize>>;

    fn compute(&self, inputs: &NodeValues, outputs: &mut NodeValues);
}
