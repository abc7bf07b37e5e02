//! Simulation parameters.

use thiserror::Error;

/// Error type for parameter validation.
#[derive(Debug, Error)]
pub enum ParameterError {
    /// Viscosity must be positive.
    #[error("viscosity must be positive, got {0}")]
    InvalidViscosity(f64),

    /// Fill tolerance must lie in [0, 0.5).
    #[error("fill tolerance must be in [0, 0.5), got {0}")]
    InvalidFillTolerance(f64),
}

/// Global simulation parameters.
#[derive(Clone, Copy, Debug)]
pub struct SimulationParameters {
    /// Resin viscosity μ [Pa·s].
    pub mu: f64,
    /// Write-out cadence [s]; a non-positive value writes every step.
    pub wo_delta_time: f64,
    /// ε_fill: fill factors at or above 1 − ε_fill count as full.
    pub fill_tolerance: f64,
    /// End the current solve interval when a sensor first wets.
    pub end_step_when_sensor_triggered: bool,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            mu: 0.1,
            wo_delta_time: -1.0,
            fill_tolerance: 0.01,
            end_step_when_sensor_triggered: false,
        }
    }
}

impl SimulationParameters {
    /// Validate ranges: μ > 0 and ε_fill ∈ [0, 0.5).
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(self.mu > 0.0) {
            return Err(ParameterError::InvalidViscosity(self.mu));
        }
        if !(0.0..0.5).contains(&self.fill_tolerance) {
            return Err(ParameterError::InvalidFillTolerance(self.fill_tolerance));
        }
        Ok(())
    }

    /// The wet threshold 1 − ε_fill.
    #[inline]
    pub fn wet_threshold(&self) -> f64 {
        1.0 - self.fill_tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        SimulationParameters::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut p = SimulationParameters::default();
        p.mu = 0.0;
        assert!(matches!(
            p.validate(),
            Err(ParameterError::InvalidViscosity(_))
        ));

        let mut p = SimulationParameters::default();
        p.fill_tolerance = 0.5;
        assert!(matches!(
            p.validate(),
            Err(ParameterError::InvalidFillTolerance(_))
        ));

        // Zero tolerance is allowed (exact filling).
        let mut p = SimulationParameters::default();
        p.fill_tolerance = 0.0;
        p.validate().unwrap();
    }
}
