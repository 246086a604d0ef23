//! Stop-loss × risk-reward parameter grid.

use crate::domain::error::FxError;

/// Stop-loss sizes in pips tested when none are configured.
pub const DEFAULT_STOP_LOSS_VALUES: [f64; 3] = [20.0, 25.0, 30.0];
/// Risk-reward ratios tested when none are configured.
pub const DEFAULT_RISK_REWARD_VALUES: [f64; 4] = [2.0, 3.0, 4.0, 5.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSet {
    pub id: usize,
    /// Stop distance in pips.
    pub stop_loss: f64,
    pub risk_reward: f64,
}

impl ParameterSet {
    pub fn label(&self) -> String {
        format!("SL{}/RR{}", self.stop_loss, self.risk_reward)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    sets: Vec<ParameterSet>,
    pip_size: f64,
}

impl Grid {
    /// Cartesian product with stop-loss as the outer loop. Duplicate values
    /// are dropped, keeping first-seen order.
    pub fn new(
        stop_loss_values: &[f64],
        risk_reward_values: &[f64],
        pip_size: f64,
    ) -> Result<Self, FxError> {
        check_positive("stop_loss_values", stop_loss_values)?;
        check_positive("risk_reward_values", risk_reward_values)?;
        if !pip_size.is_finite() || pip_size <= 0.0 {
            return Err(FxError::invalid_parameter(
                "pip_size",
                format!("must be a positive number, got {}", pip_size),
            ));
        }

        let stops = dedup(stop_loss_values);
        let ratios = dedup(risk_reward_values);
        let sets = stops
            .iter()
            .flat_map(|&stop_loss| ratios.iter().map(move |&risk_reward| (stop_loss, risk_reward)))
            .enumerate()
            .map(|(id, (stop_loss, risk_reward))| ParameterSet {
                id,
                stop_loss,
                risk_reward,
            })
            .collect();

        Ok(Self { sets, pip_size })
    }

    pub fn sets(&self) -> &[ParameterSet] {
        &self.sets
    }

    pub fn get(&self, id: usize) -> Option<&ParameterSet> {
        self.sets.get(id)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn pip_size(&self) -> f64 {
        self.pip_size
    }

    /// Stop distance in price units.
    pub fn stop_distance(&self, set: &ParameterSet) -> f64 {
        set.stop_loss * self.pip_size
    }
}

/// Price value of one pip for a pair code.
pub fn default_pip_size(pair: &str) -> f64 {
    let pair = pair.to_uppercase();
    if pair.starts_with("XAU") {
        0.1
    } else if pair.contains("JPY") {
        0.01
    } else {
        0.0001
    }
}

fn check_positive(name: &str, values: &[f64]) -> Result<(), FxError> {
    if values.is_empty() {
        return Err(FxError::invalid_parameter(name, "at least one value is required"));
    }
    if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
        return Err(FxError::invalid_parameter(
            name,
            format!("values must be positive, got {}", bad),
        ));
    }
    Ok(())
}

fn dedup(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(values.len());
    for &v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}
