//! Single-node evaluation of an ODE model for explicit shooting.
//!
//! The interface owns the model and the control interpolants. Each call to
//! [`ExplicitIntegrationInterface::compute_state_rates`] assembles one node of
//! model inputs from time, the flat state vector, interpolated controls and
//! parameters, evaluates the model, and gathers every state's rate.

pub mod collector;
pub mod interpolant;
pub mod rate_source;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigurationError, TranscriptionResult};
use crate::options::{
    ensure_unique, ControlOptions, ParameterOptions, PolynomialControlOptions, StateOptions, TimeOptions,
};
use crate::solvers::{integrate, PropagationSettings, Trajectory};
use crate::traits::{DynamicalSystem, OdeModel};
use crate::values::{shape_size, NodeValues};
use collector::StateRateCollector;
use interpolant::{InterpolatedValue, LagrangeBarycentricInterpolant};
use rate_source::{RateSource, RateSourceScope};

/// Everything the shooting interface needs besides the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShootingConfig {
    #[serde(default)]
    pub time: TimeOptions,
    #[serde(default)]
    pub states: Vec<StateOptions>,
    #[serde(default)]
    pub controls: Vec<ControlOptions>,
    #[serde(default)]
    pub polynomial_controls: Vec<PolynomialControlOptions>,
    #[serde(default)]
    pub parameters: Vec<ParameterOptions>,
}

/// Routes a source vector onto one model input: element `e` of the target
/// takes source element `indices[e]`.
#[derive(Debug, Clone, PartialEq)]
struct TargetMap {
    target: String,
    indices: Vec<usize>,
}

fn target_maps(
    variable: &str,
    size: usize,
    targets: &[String],
    model_inputs: &BTreeMap<String, Vec<usize>>,
) -> TranscriptionResult<Vec<TargetMap>> {
    targets
        .iter()
        .map(|target| {
            let shape = model_inputs
                .get(target)
                .ok_or_else(|| ConfigurationError::UnknownTarget {
                    variable: variable.to_string(),
                    target: target.clone(),
                })?;
            let target_size = shape_size(shape);
            let indices = if target_size == size {
                (0..size).collect()
            } else if size == 1 {
                vec![0; target_size]
            } else {
                return Err(ConfigurationError::TargetShape {
                    variable: variable.to_string(),
                    target: target.clone(),
                    size,
                    shape: shape.clone(),
                });
            };
            Ok(TargetMap {
                target: target.clone(),
                indices,
            })
        })
        .collect()
}

fn route(inputs: &mut NodeValues, maps: &[TargetMap], source: &[f64]) {
    for map in maps {
        if let Some(dest) = inputs.get_mut(&map.target) {
            for (e, &i) in map.indices.iter().enumerate() {
                dest[(0, e)] = source[i];
            }
        }
    }
}

/// Where a state's rate is read from during evaluation, fixed at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RateAddress {
    Time,
    PhaseTime,
    State { offset: usize },
    /// `derivative` is 0 for the value, 1 for the rate, 2 for the second rate.
    Control { index: usize, derivative: u8 },
    Parameter { index: usize },
    Output(String),
}

#[derive(Debug, Clone)]
struct ShootingState {
    name: String,
    size: usize,
    offset: usize,
    targets: Vec<TargetMap>,
    rate_source: RateSource,
    rate_address: RateAddress,
    rate_input: String,
}

#[derive(Debug, Clone)]
struct ShootingControl {
    /// Polynomial order, for polynomial controls only.
    polynomial_order: Option<usize>,
    name: String,
    size: usize,
    targets: Vec<TargetMap>,
    rate_targets: Vec<TargetMap>,
    rate2_targets: Vec<TargetMap>,
    interpolant: Option<LagrangeBarycentricInterpolant>,
}

#[derive(Debug, Clone)]
struct ShootingParameter {
    name: String,
    value: Vec<f64>,
    targets: Vec<TargetMap>,
}

#[derive(Debug, Clone)]
struct TimeTargets {
    time: Vec<TargetMap>,
    time_phase: Vec<TargetMap>,
    t_initial: Vec<TargetMap>,
    t_duration: Vec<TargetMap>,
}

pub struct ExplicitIntegrationInterface<M: OdeModel> {
    model: M,
    model_inputs: BTreeMap<String, Vec<usize>>,
    time: TimeTargets,
    states: Vec<ShootingState>,
    controls: Vec<ShootingControl>,
    parameters: Vec<ShootingParameter>,
    collector: StateRateCollector,
    t_initial: f64,
    t_duration: f64,
}

impl<M: OdeModel> ExplicitIntegrationInterface<M> {
    pub fn new(model: M, config: ShootingConfig) -> TranscriptionResult<Self> {
        ensure_unique(config.states.iter().map(|s| s.name.as_str()))?;
        // controls and polynomial controls share one namespace
        ensure_unique(
            config
                .controls
                .iter()
                .map(|c| c.name.as_str())
                .chain(config.polynomial_controls.iter().map(|c| c.control.name.as_str())),
        )?;
        ensure_unique(config.parameters.iter().map(|p| p.name.as_str()))?;

        let model_inputs = model.input_shapes();
        let model_outputs = model.output_shapes();

        let time = TimeTargets {
            time: target_maps("time", 1, &config.time.targets, &model_inputs)?,
            time_phase: target_maps("time_phase", 1, &config.time.time_phase_targets, &model_inputs)?,
            t_initial: target_maps("t_initial", 1, &config.time.t_initial_targets, &model_inputs)?,
            t_duration: target_maps("t_duration", 1, &config.time.t_duration_targets, &model_inputs)?,
        };

        let mut controls = Vec::new();
        let declared_controls = config
            .controls
            .iter()
            .map(|c| (None, c))
            .chain(
                config
                    .polynomial_controls
                    .iter()
                    .map(|p| (Some(p.order), &p.control)),
            );
        for (polynomial_order, c) in declared_controls {
            let size = c.size();
            controls.push(ShootingControl {
                polynomial_order,
                name: c.name.clone(),
                size,
                targets: target_maps(&c.name, size, &c.targets, &model_inputs)?,
                rate_targets: target_maps(&c.name, size, &c.rate_targets, &model_inputs)?,
                rate2_targets: target_maps(&c.name, size, &c.rate2_targets, &model_inputs)?,
                interpolant: None,
            });
        }

        let mut parameters = Vec::new();
        for p in &config.parameters {
            let size = p.size();
            parameters.push(ShootingParameter {
                name: p.name.clone(),
                value: vec![0.0; size],
                targets: target_maps(&p.name, size, &p.targets, &model_inputs)?,
            });
        }

        let state_names: Vec<&str> = config.states.iter().map(|s| s.name.as_str()).collect();
        let control_names: Vec<&str> = config.controls.iter().map(|c| c.name.as_str()).collect();
        let polynomial_names: Vec<&str> = config
            .polynomial_controls
            .iter()
            .map(|p| p.control.name.as_str())
            .collect();
        let parameter_names: Vec<&str> = config.parameters.iter().map(|p| p.name.as_str()).collect();
        let scope = RateSourceScope {
            states: &state_names,
            controls: &control_names,
            polynomial_controls: &polynomial_names,
            parameters: &parameter_names,
        };

        let mut state_offsets = Vec::with_capacity(config.states.len());
        let mut offset = 0;
        for s in &config.states {
            state_offsets.push(offset);
            offset += s.size();
        }

        let control_address = |name: &str, derivative: u8| {
            controls.iter().position(|c| c.name == name).map(|index| {
                (
                    RateAddress::Control { index, derivative },
                    controls[index].size,
                )
            })
        };

        let mut states = Vec::new();
        for (s, &offset) in config.states.iter().zip(&state_offsets) {
            let size = s.size();
            let rate_source = RateSource::resolve(&s.rate_source, &scope);
            let address = match &rate_source {
                RateSource::Time => Some((RateAddress::Time, 1)),
                RateSource::PhaseTime => Some((RateAddress::PhaseTime, 1)),
                RateSource::State(n) => config
                    .states
                    .iter()
                    .position(|o| &o.name == n)
                    .map(|i| (RateAddress::State { offset: state_offsets[i] }, config.states[i].size())),
                RateSource::Control(n) | RateSource::PolynomialControl(n) => control_address(n.as_str(), 0),
                RateSource::ControlRate { name, order } | RateSource::PolynomialControlRate { name, order } => {
                    control_address(name.as_str(), *order)
                }
                RateSource::Parameter(n) => config
                    .parameters
                    .iter()
                    .position(|p| &p.name == n)
                    .map(|index| (RateAddress::Parameter { index }, parameters[index].value.len())),
                RateSource::DirectOutput(n) => model_outputs
                    .get(n)
                    .map(|shape| (RateAddress::Output(n.clone()), shape_size(shape))),
            };
            let (rate_address, source_size) = address.ok_or_else(|| ConfigurationError::UnknownRateSource {
                state: s.name.clone(),
                rate_source: s.rate_source.clone(),
            })?;
            if source_size != size {
                return Err(ConfigurationError::ShapeMismatch {
                    name: format!("{} (rate source '{}')", s.name, rate_source.path()),
                    expected: size,
                    found: source_size,
                });
            }
            debug!(state = %s.name, source = %rate_source.path(), "resolved rate source");
            states.push(ShootingState {
                name: s.name.clone(),
                size,
                offset,
                targets: target_maps(&s.name, size, &s.targets, &model_inputs)?,
                rate_source,
                rate_address,
                rate_input: StateRateCollector::input_name(&s.name),
            });
        }

        let collector = StateRateCollector::new(&config.states);

        Ok(Self {
            model,
            model_inputs,
            time,
            states,
            controls,
            parameters,
            collector,
            t_initial: 0.0,
            t_duration: 1.0,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Length of the flat state vector.
    pub fn state_dimension(&self) -> usize {
        self.collector.total_size()
    }

    pub fn rate_source(&self, state: &str) -> Option<&RateSource> {
        self.states.iter().find(|s| s.name == state).map(|s| &s.rate_source)
    }

    pub fn set_phase_time(&mut self, t_initial: f64, t_duration: f64) {
        self.t_initial = t_initial;
        self.t_duration = t_duration;
    }

    pub fn set_parameter(&mut self, name: &str, value: &[f64]) -> TranscriptionResult<()> {
        let param = self
            .parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigurationError::UnknownParameter(name.to_string()))?;
        if value.len() != param.value.len() {
            return Err(ConfigurationError::ShapeMismatch {
                name: name.to_string(),
                expected: param.value.len(),
                found: value.len(),
            });
        }
        param.value.copy_from_slice(value);
        Ok(())
    }

    fn control_mut(&mut self, name: &str) -> TranscriptionResult<&mut ShootingControl> {
        self.controls
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| ConfigurationError::UnknownControl(name.to_string()))
    }

    /// Installs an unfitted interpolant over `nodes` (in `[-1, 1]`) for a
    /// control or polynomial control, replacing any previous one. A
    /// polynomial control of order `n` takes exactly `n + 1` nodes.
    pub fn set_interpolant(&mut self, name: &str, nodes: &[f64]) -> TranscriptionResult<()> {
        let control = self.control_mut(name)?;
        if let Some(order) = control.polynomial_order {
            if nodes.len() != order + 1 {
                return Err(ConfigurationError::ShapeMismatch {
                    name: format!("{name} (polynomial order {order} nodes)"),
                    expected: order + 1,
                    found: nodes.len(),
                });
            }
        }
        control.interpolant = Some(LagrangeBarycentricInterpolant::new(name, nodes)?);
        Ok(())
    }

    /// Fits the named interpolant to `values` (one row per node) over
    /// `[x0, xf]`: a segment span for controls, the phase span for
    /// polynomial controls.
    pub fn setup_interpolant(&mut self, name: &str, x0: f64, xf: f64, values: &DMatrix<f64>) -> TranscriptionResult<()> {
        let control = self.control_mut(name)?;
        if values.ncols() != control.size {
            return Err(ConfigurationError::ShapeMismatch {
                name: name.to_string(),
                expected: control.size,
                found: values.ncols(),
            });
        }
        let interpolant = control
            .interpolant
            .as_mut()
            .ok_or_else(|| ConfigurationError::InterpolantNotFitted(name.to_string()))?;
        interpolant.setup(x0, xf, values)
    }

    /// Fails unless every control has a fitted interpolant.
    pub fn ensure_ready(&self) -> TranscriptionResult<()> {
        for c in &self.controls {
            if !c.interpolant.as_ref().is_some_and(|i| i.is_fitted()) {
                return Err(ConfigurationError::InterpolantNotFitted(c.name.clone()));
            }
        }
        Ok(())
    }

    /// Evaluates the model at one node and returns the collected
    /// `state_rates:{state}_rate` values.
    pub fn evaluate(&self, t: f64, x: &[f64]) -> TranscriptionResult<NodeValues> {
        if x.len() != self.state_dimension() {
            return Err(ConfigurationError::ShapeMismatch {
                name: "states".to_string(),
                expected: self.state_dimension(),
                found: x.len(),
            });
        }

        let mut inputs = NodeValues::new();
        for (name, shape) in &self.model_inputs {
            inputs.insert(name.clone(), DMatrix::zeros(1, shape_size(shape)));
        }

        let time_phase = t - self.t_initial;
        route(&mut inputs, &self.time.time, &[t]);
        route(&mut inputs, &self.time.time_phase, &[time_phase]);
        route(&mut inputs, &self.time.t_initial, &[self.t_initial]);
        route(&mut inputs, &self.time.t_duration, &[self.t_duration]);

        for s in &self.states {
            route(&mut inputs, &s.targets, &x[s.offset..s.offset + s.size]);
        }

        let mut control_values: Vec<InterpolatedValue> = Vec::with_capacity(self.controls.len());
        for c in &self.controls {
            let value = c
                .interpolant
                .as_ref()
                .ok_or_else(|| ConfigurationError::InterpolantNotFitted(c.name.clone()))?
                .eval(t)?;
            route(&mut inputs, &c.targets, &value.value);
            route(&mut inputs, &c.rate_targets, &value.rate);
            route(&mut inputs, &c.rate2_targets, &value.rate2);
            control_values.push(value);
        }

        for p in &self.parameters {
            route(&mut inputs, &p.targets, &p.value);
        }

        let mut outputs = NodeValues::new();
        self.model.compute(&inputs, &mut outputs);

        let mut rates_in = NodeValues::new();
        for s in &self.states {
            let source: &[f64] = match &s.rate_address {
                RateAddress::Time => std::slice::from_ref(&t),
                RateAddress::PhaseTime => std::slice::from_ref(&time_phase),
                RateAddress::State { offset } => &x[*offset..*offset + s.size],
                RateAddress::Control { index, derivative } => {
                    let v = &control_values[*index];
                    match *derivative {
                        0 => v.value.as_slice(),
                        1 => v.rate.as_slice(),
                        _ => v.rate2.as_slice(),
                    }
                }
                RateAddress::Parameter { index } => self.parameters[*index].value.as_slice(),
                RateAddress::Output(n) => outputs.require_shaped(n, 1, s.size)?.as_slice(),
            };
            rates_in.insert_row(s.rate_input.clone(), source);
        }

        let mut collected = NodeValues::new();
        self.collector.collect(&rates_in, &mut collected)?;
        Ok(collected)
    }

    /// Flat state derivative at `(t, x)` in state declaration order.
    pub fn compute_state_rates(&self, t: f64, x: &[f64]) -> TranscriptionResult<Vec<f64>> {
        let collected = self.evaluate(t, x)?;
        let mut rates = vec![0.0; self.state_dimension()];
        self.collector.flatten(&collected, &mut rates)?;
        Ok(rates)
    }

    /// Checks readiness once and returns a view usable by the integrators.
    pub fn shooting_system(&self) -> TranscriptionResult<ShootingSystem<'_, M>> {
        self.ensure_ready()?;
        Ok(ShootingSystem { interface: self })
    }

    /// Integrates the states from `t0` to `tf`.
    pub fn propagate(&self, t0: f64, tf: f64, x0: &[f64], settings: &PropagationSettings) -> Result<Trajectory> {
        let system = self
            .shooting_system()
            .context("shooting interface is not ready to propagate")?;
        debug!(t0, tf, dimension = x0.len(), "starting shooting propagation");
        integrate(&system, t0, tf, x0, settings).with_context(|| format!("propagation over [{t0}, {tf}] failed"))
    }
}

/// Borrowed view of an interface as a [`DynamicalSystem`].
pub struct ShootingSystem<'a, M: OdeModel> {
    interface: &'a ExplicitIntegrationInterface<M>,
}

impl<M: OdeModel> DynamicalSystem<f64> for ShootingSystem<'_, M> {
    fn dimension(&self) -> usize {
        self.interface.state_dimension()
    }

    /// Writes NaN when evaluation fails so the integrator stops on the
    /// non-finite state.
    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        match self.interface.compute_state_rates(t, x) {
            Ok(rates) => out.copy_from_slice(&rates),
            Err(err) => {
                debug!(t, %err, "state rate evaluation failed");
                out.fill(f64::NAN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::PropagationMethod;
    use approx::assert_abs_diff_eq;

    /// `xdot = a * x + u`, `v` is a vector output `[2 * x, theta]`.
    struct Forced;

    impl OdeModel for Forced {
        fn input_shapes(&self) -> BTreeMap<String, Vec<usize>> {
            BTreeMap::from([
                ("x".to_string(), vec![1]),
                ("u".to_string(), vec![1]),
                ("a".to_string(), vec![1]),
                ("theta".to_string(), vec![1]),
                ("clock".to_string(), vec![2]),
            ])
        }

        fn output_shapes(&self) -> BTreeMap<String, Vec<usize>> {
            BTreeMap::from([("xdot".to_string(), vec![1]), ("v".to_string(), vec![2])])
        }

        fn compute(&self, inputs: &NodeValues, outputs: &mut NodeValues) {
            let x = inputs.get("x").map_or(0.0, |m| m[(0, 0)]);
            let u = inputs.get("u").map_or(0.0, |m| m[(0, 0)]);
            let a = inputs.get("a").map_or(0.0, |m| m[(0, 0)]);
            let theta = inputs.get("theta").map_or(0.0, |m| m[(0, 0)]);
            outputs.insert_row("xdot", &[a * x + u]);
            outputs.insert_row("v", &[2.0 * x, theta]);
        }
    }

    fn config() -> ShootingConfig {
        let mut x = StateOptions::new("x", "xdot");
        x.targets = vec!["x".into()];
        let mut u = ControlOptions::new("u");
        u.targets = vec!["u".into()];
        let mut a = ParameterOptions::new("a");
        a.targets = vec!["a".into()];
        ShootingConfig {
            time: TimeOptions {
                targets: vec!["clock".into()],
                ..TimeOptions::default()
            },
            states: vec![x],
            controls: vec![u],
            parameters: vec![a],
            ..ShootingConfig::default()
        }
    }

    fn ready(config: ShootingConfig) -> ExplicitIntegrationInterface<Forced> {
        let mut iface = ExplicitIntegrationInterface::new(Forced, config).unwrap();
        iface.set_interpolant("u", &[-1.0, 1.0]).unwrap();
        // u(t) = 1 + t on [0, 2]
        iface
            .setup_interpolant("u", 0.0, 2.0, &DMatrix::from_column_slice(2, 1, &[1.0, 3.0]))
            .unwrap();
        iface
    }

    #[test]
    fn evaluation_needs_fitted_controls() {
        let mut iface = ExplicitIntegrationInterface::new(Forced, config()).unwrap();
        assert_eq!(
            iface.compute_state_rates(0.0, &[1.0]),
            Err(ConfigurationError::InterpolantNotFitted("u".into()))
        );
        iface.set_interpolant("u", &[-1.0, 1.0]).unwrap();
        assert!(iface.shooting_system().is_err());
        assert_eq!(
            iface.set_interpolant("w", &[-1.0, 1.0]),
            Err(ConfigurationError::UnknownControl("w".into()))
        );
        assert!(matches!(
            iface.setup_interpolant("w", 0.0, 1.0, &DMatrix::zeros(2, 1)),
            Err(ConfigurationError::UnknownControl(_))
        ));
    }

    #[test]
    fn rates_combine_state_control_and_parameter() {
        let mut iface = ready(config());
        iface.set_parameter("a", &[-2.0]).unwrap();
        let rates = iface.compute_state_rates(0.5, &[3.0]).unwrap();
        assert_abs_diff_eq!(rates[0], -2.0 * 3.0 + 1.5, epsilon = 1e-14);

        let collected = iface.evaluate(0.5, &[3.0]).unwrap();
        assert!(collected.contains("state_rates:x_rate"));
        assert!(matches!(
            iface.set_parameter("a", &[1.0, 2.0]),
            Err(ConfigurationError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            iface.set_parameter("b", &[1.0]),
            Err(ConfigurationError::UnknownParameter(_))
        ));
    }

    #[test]
    fn control_rate_source_feeds_state_directly() {
        let mut cfg = config();
        cfg.states.push(StateOptions::new("y", "u_rate"));
        let iface = ready(cfg);
        assert_eq!(
            iface.rate_source("y"),
            Some(&RateSource::ControlRate {
                name: "u".into(),
                order: 1
            })
        );
        let rates = iface.compute_state_rates(1.0, &[0.0, 0.0]).unwrap();
        assert_abs_diff_eq!(rates[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn time_rate_sources_pass_time_values() {
        let mut cfg = config();
        cfg.states.push(StateOptions::new("tt", "time"));
        cfg.states.push(StateOptions::new("tp", "time_phase"));
        let mut iface = ready(cfg);
        iface.set_phase_time(0.25, 1.0);
        let rates = iface.compute_state_rates(0.75, &[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(rates[1], 0.75);
        assert_eq!(rates[2], 0.5);
    }

    #[test]
    fn configuration_errors_are_detected_up_front() {
        let mut cfg = config();
        cfg.states[0].rate_source = "missing".into();
        assert!(matches!(
            ExplicitIntegrationInterface::new(Forced, cfg),
            Err(ConfigurationError::UnknownRateSource { .. })
        ));

        let mut cfg = config();
        cfg.states[0].rate_source = "v".into();
        assert!(matches!(
            ExplicitIntegrationInterface::new(Forced, cfg),
            Err(ConfigurationError::ShapeMismatch { expected: 1, found: 2, .. })
        ));

        let mut cfg = config();
        cfg.controls[0].targets = vec!["nope".into()];
        assert!(matches!(
            ExplicitIntegrationInterface::new(Forced, cfg),
            Err(ConfigurationError::UnknownTarget { .. })
        ));

        let mut cfg = config();
        let mut w = StateOptions::new("w", "v");
        w.shape = vec![2];
        w.targets = vec!["x".into()];
        cfg.states.push(w);
        assert!(matches!(
            ExplicitIntegrationInterface::new(Forced, cfg),
            Err(ConfigurationError::TargetShape { size: 2, .. })
        ));
    }

    #[test]
    fn control_names_are_shared_with_polynomial_controls() {
        let mut cfg = config();
        cfg.polynomial_controls.push(PolynomialControlOptions::new("u", 2));
        assert_eq!(
            ExplicitIntegrationInterface::new(Forced, cfg).err(),
            Some(ConfigurationError::DuplicateName("u".into()))
        );
    }

    #[test]
    fn polynomial_control_takes_order_plus_one_nodes() {
        let mut cfg = config();
        cfg.polynomial_controls.push(PolynomialControlOptions::new("p", 2));
        let mut iface = ExplicitIntegrationInterface::new(Forced, cfg).unwrap();
        assert_eq!(
            iface.set_interpolant("p", &[-1.0, 1.0]),
            Err(ConfigurationError::ShapeMismatch {
                name: "p (polynomial order 2 nodes)".into(),
                expected: 3,
                found: 2,
            })
        );
        assert!(iface.set_interpolant("p", &[-1.0, 0.0, 1.0]).is_ok());
        // plain controls take any node count
        assert!(iface.set_interpolant("u", &[-1.0, -0.5, 0.5, 1.0]).is_ok());
    }

    #[test]
    fn rate_sources_resolve_to_fixed_addresses() {
        let mut cfg = config();
        cfg.polynomial_controls.push(PolynomialControlOptions::new("p", 2));
        cfg.states.push(StateOptions::new("y", "x"));
        cfg.states.push(StateOptions::new("z", "p_rate2"));
        cfg.states.push(StateOptions::new("w", "a"));
        let mut iface = ExplicitIntegrationInterface::new(Forced, cfg).unwrap();
        let addresses: Vec<_> = iface.states.iter().map(|s| s.rate_address.clone()).collect();
        assert_eq!(
            addresses,
            vec![
                RateAddress::Output("xdot".into()),
                RateAddress::State { offset: 0 },
                RateAddress::Control { index: 1, derivative: 2 },
                RateAddress::Parameter { index: 0 },
            ]
        );

        iface.set_interpolant("u", &[-1.0, 1.0]).unwrap();
        iface
            .setup_interpolant("u", 0.0, 2.0, &DMatrix::from_column_slice(2, 1, &[1.0, 3.0]))
            .unwrap();
        // p(t) = t^2 on [0, 2], so p'' = 2
        iface.set_interpolant("p", &[-1.0, 0.0, 1.0]).unwrap();
        iface
            .setup_interpolant("p", 0.0, 2.0, &DMatrix::from_column_slice(3, 1, &[0.0, 1.0, 4.0]))
            .unwrap();
        iface.set_parameter("a", &[0.5]).unwrap();
        let rates = iface.compute_state_rates(1.0, &[4.0, 0.0, 0.0, 0.0]).unwrap();
        assert_abs_diff_eq!(rates[0], 0.5 * 4.0 + 2.0, epsilon = 1e-12);
        assert_eq!(rates[1], 4.0);
        assert_abs_diff_eq!(rates[2], 2.0, epsilon = 1e-10);
        assert_eq!(rates[3], 0.5);
    }

    #[test]
    fn scalar_time_broadcasts_onto_vector_target() {
        let maps = target_maps("time", 1, &["clock".to_string()], &Forced.input_shapes()).unwrap();
        assert_eq!(maps[0].indices, vec![0, 0]);
    }

    #[test]
    fn propagation_matches_closed_form() {
        let mut iface = ready(config());
        iface.set_parameter("a", &[0.0]).unwrap();
        iface.set_phase_time(0.0, 2.0);
        let settings = PropagationSettings {
            method: PropagationMethod::Tsit5,
            num_steps: 20,
        };
        // xdot = 1 + t, x(0) = 0.5
        let traj = iface.propagate(0.0, 2.0, &[0.5], &settings).unwrap();
        assert_abs_diff_eq!(traj.final_state()[0], 0.5 + 2.0 + 2.0, epsilon = 1e-12);
    }

    #[test]
    fn propagation_reports_unready_interface() {
        let iface = ExplicitIntegrationInterface::new(Forced, config()).unwrap();
        let err = iface
            .propagate(0.0, 1.0, &[0.0], &PropagationSettings::default())
            .unwrap_err();
        assert!(err.to_string().contains("not ready"));
    }
}
