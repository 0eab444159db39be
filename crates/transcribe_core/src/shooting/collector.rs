use crate::error::TranscriptionResult;
use crate::options::StateOptions;
use crate::values::NodeValues;

#[derive(Debug, Clone)]
struct CollectedRate {
    input: String,
    output: String,
    size: usize,
}

/// Gathers each state's resolved rate under `state_rates:{state}_rate`.
#[derive(Debug, Clone)]
pub struct StateRateCollector {
    rates: Vec<CollectedRate>,
    total_size: usize,
}

impl StateRateCollector {
    pub fn new(states: &[StateOptions]) -> Self {
        let rates: Vec<_> = states
            .iter()
            .map(|s| CollectedRate {
                input: Self::input_name(&s.name),
                output: Self::output_name(&s.name),
                size: s.size(),
            })
            .collect();
        let total_size = rates.iter().map(|r| r.size).sum();
        Self { rates, total_size }
    }

    pub fn input_name(state: &str) -> String {
        format!("state_rates_in:{state}_rate")
    }

    pub fn output_name(state: &str) -> String {
        format!("state_rates:{state}_rate")
    }

    /// Length of the flattened rate vector across all states.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn collect(&self, inputs: &NodeValues, outputs: &mut NodeValues) -> TranscriptionResult<()> {
        for r in &self.rates {
            let values = inputs.require_shaped(&r.input, 1, r.size)?;
            outputs.output_mut(&r.output, 1, r.size).copy_from(values);
        }
        Ok(())
    }

    /// Concatenates collected rates in state declaration order.
    pub fn flatten(&self, outputs: &NodeValues, out: &mut [f64]) -> TranscriptionResult<()> {
        let mut offset = 0;
        for r in &self.rates {
            let values = outputs.require_shaped(&r.output, 1, r.size)?;
            out[offset..offset + r.size].copy_from_slice(values.as_slice());
            offset += r.size;
        }
        Ok(())
    }
}
