//! A stochastic simulator of an epidemic spreading through a population laid out on a square
//! grid.
//!
//! Every individual is in one of five health states: healthy, isolated, sick, dead or immune.
//! Each generation (a week), every individual moves to a new state drawn from a per-state
//! probability distribution. The distribution of a healthy individual is biased toward
//! infection by the share of sick and isolated individuals among its eight neighbors, scaled by
//! the disease contagion factor.
//!
//! A simulation consists of:
//! * A `SimulationGrid` holding the state of every individual, double buffered so each
//!   generation reads only the previous one.
//! * A `TransitionModel` combining the base transition matrix with the contagion parameters.
//! * A `SimulationEngine` that advances the grid either sequentially or with a fixed number of
//!   worker threads. Both strategies produce the same grid for the same seed.
//!
//! The `runner` module wires these together into the command line program, which executes a
//! batch of independent runs and prints the final count of one state per run.
pub mod config;
pub mod engine;
pub mod error;
pub mod execution_stats;
pub mod grid;
pub mod hardware;
pub mod health_state;
pub mod log;
pub mod numeric;
pub mod progress;
pub mod render;
pub mod report;
pub mod runner;
pub mod transition;

pub use config::SimulationConfig;
pub use engine::{ExecutionStrategy, SimulationEngine};
pub use error::SimError;
pub use grid::{GridView, SimulationGrid};
pub use hardware::{FixedHardwareProbe, HardwareProbe, SystemHardwareProbe};
pub use health_state::HealthState;
pub use transition::{ContagionParameters, TransitionMatrix, TransitionModel};
