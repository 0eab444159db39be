//! The `transcribe_core` crate is the numerical engine that turns a
//! continuous optimal-control phase into the pieces of a nonlinear program.
//!
//! Key components:
//! - **Grid**: segment and node layout, node subsets and interpolation
//!   matrices for Gauss-Lobatto and Radau transcriptions (`GridData`,
//!   memoized by `GridCache`).
//! - **State interpolation**: collocation-node state values and rate
//!   estimates from discretization-node values.
//! - **Collocation**: defect residuals and their sparse analytic partials.
//! - **Path constraints**: full time histories assembled from node subsets.
//! - **Shooting**: single-node ODE evaluation with interpolated controls and
//!   explicit propagation (RK4, Tsit5).

pub mod collocation;
pub mod error;
pub mod grid;
pub mod options;
pub mod path_constraint;
pub mod shooting;
pub mod solvers;
pub mod sparsity;
pub mod state_interp;
pub mod traits;
pub mod values;

pub use collocation::CollocationDefectEngine;
pub use error::{ConfigurationError, NumericWarning, TranscriptionResult};
pub use grid::cache::GridCache;
pub use grid::{GridConfig, GridData, NodeSubset, TranscriptionOrder, TranscriptionScheme};
pub use path_constraint::PathValueCompositor;
pub use shooting::{ExplicitIntegrationInterface, ShootingConfig};
pub use sparsity::{Jacobian, SubJacobian};
pub use state_interp::StateInterpolation;
pub use values::NodeValues;
