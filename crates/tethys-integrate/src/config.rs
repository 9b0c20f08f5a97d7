//! Integrator configuration.

use serde::{Deserialize, Serialize};
use tethys_types::constants::DEFAULT_CONSTRAINT_TOLERANCE;
use tethys_types::{PrecisionMode, TethysError, TethysResult};

/// Fixed or adaptive stepping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StepMode {
    /// Constant step size.
    Fixed { step_size: f64 },
    /// Error-controlled step size, re-selected from the forces at the
    /// start of every step.
    Variable {
        /// Target integration error per step.
        error_tolerance: f64,
        /// Hard ceiling on the selected size.
        max_step_size: f64,
        /// Size attempted on the first step.
        initial_step_size: f64,
    },
}

/// Configuration for the integration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratorConfig {
    /// Stepping mode.
    pub step_mode: StepMode,

    /// Relative tolerance for constraint projection.
    pub constraint_tolerance: f64,

    /// Numeric precision mode, resolved once at integrator creation.
    pub precision: PrecisionMode,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            step_mode: StepMode::Fixed { step_size: 1.0e-3 },
            constraint_tolerance: DEFAULT_CONSTRAINT_TOLERANCE,
            precision: PrecisionMode::Mixed,
        }
    }
}

impl IntegratorConfig {
    /// Validates the configuration before any state is touched.
    pub fn validate(&self) -> TethysResult<()> {
        match self.step_mode {
            StepMode::Fixed { step_size } => {
                if !(step_size > 0.0) || !step_size.is_finite() {
                    return Err(TethysError::InvalidConfig(format!(
                        "fixed step size must be positive and finite, got {step_size}"
                    )));
                }
            }
            StepMode::Variable {
                error_tolerance,
                max_step_size,
                initial_step_size,
            } => {
                if !(error_tolerance > 0.0) {
                    return Err(TethysError::InvalidConfig(format!(
                        "error tolerance must be positive, got {error_tolerance}"
                    )));
                }
                if !(max_step_size > 0.0) || !max_step_size.is_finite() {
                    return Err(TethysError::InvalidConfig(format!(
                        "max step size must be positive and finite, got {max_step_size}"
                    )));
                }
                if !(initial_step_size > 0.0) || initial_step_size > max_step_size {
                    return Err(TethysError::InvalidConfig(format!(
                        "initial step size {initial_step_size} must lie in (0, {max_step_size}]"
                    )));
                }
            }
        }
        if !(self.constraint_tolerance > 0.0) {
            return Err(TethysError::InvalidConfig(format!(
                "constraint tolerance must be positive, got {}",
                self.constraint_tolerance
            )));
        }
        Ok(())
    }

    /// The step size the first step will attempt.
    pub fn initial_step_size(&self) -> f64 {
        match self.step_mode {
            StepMode::Fixed { step_size } => step_size,
            StepMode::Variable {
                initial_step_size, ..
            } => initial_step_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(IntegratorConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_nonpositive_fixed_step() {
        let config = IntegratorConfig {
            step_mode: StepMode::Fixed { step_size: 0.0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_initial_step_above_ceiling() {
        let config = IntegratorConfig {
            step_mode: StepMode::Variable {
                error_tolerance: 1e-8,
                max_step_size: 0.002,
                initial_step_size: 0.01,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let config = IntegratorConfig {
            step_mode: StepMode::Variable {
                error_tolerance: 1e-6,
                max_step_size: 0.004,
                initial_step_size: 0.001,
            },
            constraint_tolerance: 1e-8,
            precision: PrecisionMode::Single,
        };
        let text = toml::to_string(&config).unwrap();
        let back: IntegratorConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.step_mode, config.step_mode);
        assert_eq!(back.constraint_tolerance, config.constraint_tolerance);
        assert_eq!(back.precision, config.precision);
    }
}
