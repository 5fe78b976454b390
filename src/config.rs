//! Run configuration.
//!
//! A [`SimulationConfig`] is a plain value record. It can be loaded from a JSON file, in which
//! case any field left out takes its default:
//!
//! ```json
//! {
//!     "runs": 10,
//!     "population_size": 50,
//!     "generations": 20,
//!     "contagion_factor": 0.7,
//!     "social_distance": true,
//!     "report_state": 3,
//!     "transition_matrix": [
//!         [0.62, 0.30, 0.05, 0.00, 0.03],
//!         [0.05, 0.64, 0.10, 0.01, 0.20],
//!         [0.00, 0.10, 0.65, 0.10, 0.15],
//!         [0.00, 0.00, 0.00, 1.00, 0.00],
//!         [0.00, 0.05, 0.02, 0.00, 0.93]
//!     ]
//! }
//! ```

use std::fs;
use std::path::Path;

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::engine::ExecutionStrategy;
use crate::error::SimError;
use crate::hardware::HardwareProbe;
use crate::health_state::HealthState;
use crate::transition::{ContagionParameters, TransitionMatrix};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of independent simulations; each prints one count.
    pub runs: usize,
    /// Side length `N` of the `N`x`N` population grid.
    pub population_size: usize,
    pub generations: usize,
    pub contagion_factor: f64,
    pub social_distance: bool,
    /// One means the sequential engine, more splits rows across that many workers.
    pub threads: usize,
    /// Ordinal of the state whose count is reported after each run.
    pub report_state: usize,
    pub initial_infections: usize,
    /// Base random seed. When absent, one is drawn from the operating system.
    pub seed: Option<u64>,
    pub transition_matrix: TransitionMatrix,
    /// Render the final grid of the last run as a PNG.
    pub generate_image: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            runs: 100,
            population_size: 100,
            generations: 10,
            contagion_factor: 0.5,
            social_distance: false,
            threads: 1,
            report_state: HealthState::Dead.ordinal(),
            initial_infections: 1,
            seed: None,
            transition_matrix: TransitionMatrix::default(),
            generate_image: false,
        }
    }
}

impl SimulationConfig {
    /// Reads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns a `SimError` if the file cannot be read or is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        trace!("loading configuration from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Checks the configuration against the given hardware.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigurationError` describing the first invalid field.
    pub fn validate(&self, probe: &dyn HardwareProbe) -> Result<(), SimError> {
        if self.runs == 0 {
            return Err(SimError::config("number of runs must be at least 1"));
        }
        if self.population_size == 0 {
            return Err(SimError::config(
                "population side length must be at least 1",
            ));
        }
        validate_contagion_factor(self.contagion_factor)?;
        validate_thread_count(self.threads, probe)?;
        self.report_state()?;

        let cell_count = self
            .population_size
            .checked_mul(self.population_size)
            .ok_or_else(|| {
                SimError::config(format!(
                    "population side length {} is too large",
                    self.population_size
                ))
            })?;
        if self.initial_infections == 0 || self.initial_infections > cell_count {
            return Err(SimError::config(format!(
                "initial infections must be between 1 and {cell_count}, got {}",
                self.initial_infections
            )));
        }

        let invalid_rows = self.transition_matrix.invalid_rows();
        if !invalid_rows.is_empty() {
            warn!(
                "transition matrix rows {:?} are not probability distributions",
                invalid_rows
            );
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SimError::ConfigurationError` if `report_state` is not a valid ordinal.
    pub fn report_state(&self) -> Result<HealthState, SimError> {
        HealthState::try_from(self.report_state)
    }

    #[must_use]
    pub fn contagion_parameters(&self) -> ContagionParameters {
        ContagionParameters {
            contagion_factor: self.contagion_factor,
            apply_social_distance_effect: self.social_distance,
        }
    }

    #[must_use]
    pub fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::from_thread_count(self.threads)
    }
}

/// # Errors
///
/// Returns `SimError::ConfigurationError` unless `contagion_factor` is in `[0, 1]`.
pub fn validate_contagion_factor(contagion_factor: f64) -> Result<(), SimError> {
    if !(0.0..=1.0).contains(&contagion_factor) {
        return Err(SimError::config(format!(
            "contagion factor must be within [0, 1], got {contagion_factor}"
        )));
    }
    Ok(())
}

/// A thread count of zero, or one exceeding the hardware threads, is a configuration error; it is
/// never clamped.
///
/// # Errors
///
/// Returns `SimError::ConfigurationError` if `threads` is outside `1..=available`.
pub fn validate_thread_count(threads: usize, probe: &dyn HardwareProbe) -> Result<(), SimError> {
    if threads == 0 {
        return Err(SimError::config("thread count must be at least 1"));
    }
    let available = probe.available_threads();
    if threads > available {
        return Err(SimError::config(format!(
            "requested {threads} threads but the processor only has {available} available"
        )));
    }
    Ok(())
}
