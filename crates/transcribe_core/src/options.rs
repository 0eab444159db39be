//! Variable descriptors for a phase.
//!
//! These are plain serde structs so a problem definition can be loaded from
//! JSON or TOML by the caller. Shapes exclude the node axis.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, TranscriptionResult};
use crate::values::shape_size;

fn scalar_shape() -> Vec<usize> {
    vec![1]
}

/// A scaling quantity given either as one number or one number per element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalingValue {
    Scalar(f64),
    Array(Vec<f64>),
}

impl ScalingValue {
    /// Elementwise reciprocal, as used to turn a scaler into a reference.
    pub fn reciprocal(&self) -> ScalingValue {
        match self {
            ScalingValue::Scalar(v) => ScalingValue::Scalar(1.0 / v),
            ScalingValue::Array(values) => {
                ScalingValue::Array(values.iter().map(|v| 1.0 / v).collect())
            }
        }
    }

    /// Expands to one value per element of a variable of `size` elements.
    pub fn per_element(&self, name: &str, size: usize) -> TranscriptionResult<Vec<f64>> {
        match self {
            ScalingValue::Scalar(v) => Ok(vec![*v; size]),
            ScalingValue::Array(values) if values.len() == size => Ok(values.clone()),
            ScalingValue::Array(values) => Err(ConfigurationError::ReferenceShape {
                name: name.to_string(),
                expected: size,
                found: values.len(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateOptions {
    pub name: String,
    #[serde(default = "scalar_shape")]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub units: Option<String>,
    /// Name of the signal providing this state's time derivative.
    pub rate_source: String,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default, rename = "ref")]
    pub reference: Option<ScalingValue>,
    #[serde(default)]
    pub scaler: Option<ScalingValue>,
    #[serde(default)]
    pub defect_ref: Option<ScalingValue>,
    #[serde(default)]
    pub defect_scaler: Option<ScalingValue>,
    /// When set, defects are driven to zero by a segment solver instead of
    /// being handed to the optimizer as constraints.
    #[serde(default)]
    pub solve_segments: bool,
}

impl StateOptions {
    pub fn new(name: impl Into<String>, rate_source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: scalar_shape(),
            units: None,
            rate_source: rate_source.into(),
            targets: Vec::new(),
            reference: None,
            scaler: None,
            defect_ref: None,
            defect_scaler: None,
            solve_segments: false,
        }
    }

    pub fn size(&self) -> usize {
        shape_size(&self.shape)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlOptions {
    pub name: String,
    #[serde(default = "scalar_shape")]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub rate_targets: Vec<String>,
    #[serde(default)]
    pub rate2_targets: Vec<String>,
}

impl ControlOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: scalar_shape(),
            units: None,
            targets: Vec::new(),
            rate_targets: Vec::new(),
            rate2_targets: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        shape_size(&self.shape)
    }
}

/// A control described by a single polynomial over the whole phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialControlOptions {
    #[serde(flatten)]
    pub control: ControlOptions,
    pub order: usize,
}

impl PolynomialControlOptions {
    pub fn new(name: impl Into<String>, order: usize) -> Self {
        Self {
            control: ControlOptions::new(name),
            order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterOptions {
    pub name: String,
    #[serde(default = "scalar_shape")]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

impl ParameterOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: scalar_shape(),
            units: None,
            targets: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        shape_size(&self.shape)
    }
}

/// Where the phase's time signals are fed in the ODE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeOptions {
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub time_phase_targets: Vec<String>,
    #[serde(default)]
    pub t_initial_targets: Vec<String>,
    #[serde(default)]
    pub t_duration_targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConstraintOptions {
    pub name: String,
    #[serde(default = "scalar_shape")]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub lower: Option<ScalingValue>,
    #[serde(default)]
    pub upper: Option<ScalingValue>,
    #[serde(default)]
    pub equals: Option<ScalingValue>,
    #[serde(default, rename = "ref")]
    pub reference: Option<ScalingValue>,
    #[serde(default)]
    pub ref0: Option<ScalingValue>,
    #[serde(default)]
    pub adder: Option<ScalingValue>,
    #[serde(default)]
    pub scaler: Option<ScalingValue>,
    #[serde(default)]
    pub linear: bool,
}

impl PathConstraintOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: scalar_shape(),
            units: None,
            lower: None,
            upper: None,
            equals: None,
            reference: None,
            ref0: None,
            adder: None,
            scaler: None,
            linear: false,
        }
    }

    pub fn size(&self) -> usize {
        shape_size(&self.shape)
    }
}

/// Constraint metadata handed to the NLP driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub name: String,
    /// Total number of constrained elements (nodes × variable size).
    pub size: usize,
    pub lower: Option<ScalingValue>,
    pub upper: Option<ScalingValue>,
    pub equals: Option<ScalingValue>,
    pub reference: Option<ScalingValue>,
    pub ref0: Option<ScalingValue>,
    pub adder: Option<ScalingValue>,
    pub scaler: Option<ScalingValue>,
    pub linear: bool,
}

/// Rejects repeated names within one option collection.
pub(crate) fn ensure_unique<'a>(names: impl IntoIterator<Item = &'a str>) -> TranscriptionResult<()> {
    let mut seen = std::collections::BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigurationError::DuplicateName(name.to_string()));
        }
    }
    Ok(())
}
