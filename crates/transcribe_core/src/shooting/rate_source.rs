//! Where each state's time derivative comes from.

use serde::{Deserialize, Serialize};

/// Resolved origin of a state's rate. Built once per state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Time,
    PhaseTime,
    State(String),
    Control(String),
    PolynomialControl(String),
    Parameter(String),
    /// `order` is 1 for `{name}_rate`, 2 for `{name}_rate2`.
    ControlRate { name: String, order: u8 },
    PolynomialControlRate { name: String, order: u8 },
    /// An output of the ODE model.
    DirectOutput(String),
}

/// Names visible to rate-source resolution.
pub struct RateSourceScope<'a> {
    pub states: &'a [&'a str],
    pub controls: &'a [&'a str],
    pub polynomial_controls: &'a [&'a str],
    pub parameters: &'a [&'a str],
}

/// Splits `name_rate` / `name_rate2` into the base name and derivative order.
fn rate_suffix(var: &str) -> Option<(&str, u8)> {
    if let Some(base) = var.strip_suffix("_rate2") {
        Some((base, 2))
    } else {
        var.strip_suffix("_rate").map(|base| (base, 1))
    }
}

fn declared(names: &[&str], var: &str) -> bool {
    names.iter().any(|n| *n == var)
}

impl RateSource {
    /// Resolves `var` in fixed priority order: time, phase time, states,
    /// controls, polynomial controls, parameters, control rates, polynomial
    /// control rates, and finally a direct ODE output.
    pub fn resolve(var: &str, scope: &RateSourceScope<'_>) -> RateSource {
        if var == "time" {
            return RateSource::Time;
        }
        if var == "time_phase" {
            return RateSource::PhaseTime;
        }
        if declared(scope.states, var) {
            return RateSource::State(var.to_string());
        }
        if declared(scope.controls, var) {
            return RateSource::Control(var.to_string());
        }
        if declared(scope.polynomial_controls, var) {
            return RateSource::PolynomialControl(var.to_string());
        }
        if declared(scope.parameters, var) {
            return RateSource::Parameter(var.to_string());
        }
        if let Some((base, order)) = rate_suffix(var) {
            if declared(scope.controls, base) {
                return RateSource::ControlRate {
                    name: base.to_string(),
                    order,
                };
            }
            if declared(scope.polynomial_controls, base) {
                return RateSource::PolynomialControlRate {
                    name: base.to_string(),
                    order,
                };
            }
        }
        RateSource::DirectOutput(var.to_string())
    }

    /// Promoted name of the signal feeding the rate.
    pub fn path(&self) -> String {
        match self {
            RateSource::Time => "time".to_string(),
            RateSource::PhaseTime => "time_phase".to_string(),
            RateSource::State(n) => format!("states:{n}"),
            RateSource::Control(n) => format!("controls:{n}"),
            RateSource::PolynomialControl(n) => format!("polynomial_controls:{n}"),
            RateSource::Parameter(n) => format!("parameters:{n}"),
            RateSource::ControlRate { name, order } => format!("control_rates:{name}{}", suffix(*order)),
            RateSource::PolynomialControlRate { name, order } => {
                format!("polynomial_control_rates:{name}{}", suffix(*order))
            }
            RateSource::DirectOutput(n) => format!("ode.{n}"),
        }
    }
}

fn suffix(order: u8) -> &'static str {
    if order == 2 {
        "_rate2"
    } else {
        "_rate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope<'a>(
        states: &'a [&'a str],
        controls: &'a [&'a str],
        polynomial_controls: &'a [&'a str],
        parameters: &'a [&'a str],
    ) -> RateSourceScope<'a> {
        RateSourceScope {
            states,
            controls,
            polynomial_controls,
            parameters,
        }
    }

    #[test]
    fn declared_names_resolve_by_category() {
        let s = scope(&["x"], &["u"], &["p"], &["m"]);
        assert_eq!(RateSource::resolve("time", &s), RateSource::Time);
        assert_eq!(RateSource::resolve("time_phase", &s), RateSource::PhaseTime);
        assert_eq!(RateSource::resolve("x", &s), RateSource::State("x".into()));
        assert_eq!(RateSource::resolve("u", &s), RateSource::Control("u".into()));
        assert_eq!(RateSource::resolve("p", &s), RateSource::PolynomialControl("p".into()));
        assert_eq!(RateSource::resolve("m", &s), RateSource::Parameter("m".into()));
        assert_eq!(RateSource::resolve("xdot", &s), RateSource::DirectOutput("xdot".into()));
    }

    #[test]
    fn rate_suffixes_resolve_to_derivatives() {
        let s = scope(&[], &["u"], &["p"], &[]);
        let u_rate = RateSource::resolve("u_rate", &s);
        assert_eq!(
            u_rate,
            RateSource::ControlRate {
                name: "u".into(),
                order: 1
            }
        );
        assert_eq!(u_rate.path(), "control_rates:u_rate");
        let p_rate2 = RateSource::resolve("p_rate2", &s);
        assert_eq!(
            p_rate2,
            RateSource::PolynomialControlRate {
                name: "p".into(),
                order: 2
            }
        );
        assert_eq!(p_rate2.path(), "polynomial_control_rates:p_rate2");
        // suffix on an undeclared base is an ODE output
        assert_eq!(
            RateSource::resolve("q_rate", &s),
            RateSource::DirectOutput("q_rate".into())
        );
    }

    #[test]
    fn state_named_like_a_control_rate_wins() {
        let s = scope(&["u_rate"], &["u"], &[], &[]);
        let source = RateSource::resolve("u_rate", &s);
        assert_eq!(source, RateSource::State("u_rate".into()));
        assert_eq!(source.path(), "states:u_rate");
    }

    #[test]
    fn controls_shadow_polynomial_controls() {
        let s = scope(&[], &["v"], &["v"], &[]);
        assert_eq!(RateSource::resolve("v", &s), RateSource::Control("v".into()));
        assert_eq!(
            RateSource::resolve("v_rate", &s),
            RateSource::ControlRate {
                name: "v".into(),
                order: 1
            }
        );
    }

    #[test]
    fn direct_output_path_is_on_the_model() {
        assert_eq!(RateSource::DirectOutput("h_dot".into()).path(), "ode.h_dot");
        assert_eq!(RateSource::Time.path(), "time");
    }
}
