//! Error and warning types for transcription.
//!
//! Every failure in this crate is a malformed problem definition: nothing is
//! transient and nothing is retried. Numeric oddities that do not prevent
//! construction are reported as [`NumericWarning`]s instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal configuration errors raised while building or driving the engines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("A grid requires at least one segment")]
    NoSegments,

    #[error("Expected {expected} transcription orders (one per segment), got {found}")]
    OrderCount { expected: usize, found: usize },

    #[error("Invalid {scheme} order {order} in segment {segment}: {reason}")]
    InvalidOrder {
        scheme: &'static str,
        segment: usize,
        order: usize,
        reason: &'static str,
    },

    #[error("Invalid segment ends: {0}")]
    InvalidSegmentEnds(String),

    #[error("Unknown transcription scheme '{0}' (expected 'gauss-lobatto' or 'radau-ps')")]
    UnknownScheme(String),

    #[error("Shape mismatch for '{name}': expected {expected} values, got {found}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Array-valued scaler/ref for '{name}' must have length {expected} (state size), got {found}")]
    ReferenceShape {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Missing input '{0}'")]
    MissingInput(String),

    #[error("Rate source '{rate_source}' of state '{state}' is not a declared signal or ODE output")]
    UnknownRateSource { state: String, rate_source: String },

    #[error("Unknown control '{0}': not a declared control or polynomial control")]
    UnknownControl(String),

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("Target '{target}' of '{variable}' is not an input of the ODE model")]
    UnknownTarget { variable: String, target: String },

    #[error("Cannot map '{variable}' (size {size}) onto target '{target}' of shape {shape:?}")]
    TargetShape {
        variable: String,
        target: String,
        size: usize,
        shape: Vec<usize>,
    },

    #[error("Interpolant for '{0}' has not been set up")]
    InterpolantNotFitted(String),

    #[error("Invalid interpolation span [{x0}, {xf}]")]
    InvalidSpan { x0: f64, xf: f64 },

    #[error("Interpolant nodes must be distinct and at least one is required")]
    InvalidNodes,

    #[error("Duplicate variable name '{0}'")]
    DuplicateName(String),
}

/// Result alias used throughout the crate.
pub type TranscriptionResult<T> = std::result::Result<T, ConfigurationError>;

/// Non-fatal numeric condition detected during configuration.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum NumericWarning {
    /// A defect reference resolved to zero or a non-finite value.
    #[error("defect reference for state '{state}' resolved to {value}")]
    DegenerateDefectRef { state: String, value: f64 },
}
