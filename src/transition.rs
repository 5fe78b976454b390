//! Per-individual state transitions.
//!
//! Each generation an individual's next state is drawn from a distribution over the five health
//! states. The distribution starts from the row of the base [`TransitionMatrix`] for the
//! individual's current state. For a susceptible (healthy) individual, contagious neighbors then
//! shift part of the healthy-to-healthy mass toward `Sick` and `Isolated`:
//!
//! ```text
//! influence = (sick neighbors + 0.5 * isolated neighbors) / neighbor count
//! pressure  = effective contagion factor * influence
//! moved     = pressure * row[Healthy]
//! ```
//!
//! `moved` is split between `Sick` and `Isolated` in proportion to their base probabilities, so
//! the row keeps its sum. With the social distance effect applied, the effective contagion factor
//! is the configured factor scaled by [`SOCIAL_DISTANCE_FACTOR`].

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::grid::GridView;
use crate::health_state::{HealthState, STATE_COUNT};
use crate::numeric::is_probability_row;

/// Multiplier applied to the contagion factor when the social distance effect is active.
pub const SOCIAL_DISTANCE_FACTOR: f64 = 0.5;

/// A probability distribution over the five health states, indexed by ordinal.
pub type StateDistribution = [f64; STATE_COUNT];

/// Base Markov transition probabilities. Row `s` holds the probabilities of moving from state `s`
/// to each state. Rows are expected to sum to one; this is not enforced.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionMatrix(pub [StateDistribution; STATE_COUNT]);

impl TransitionMatrix {
    #[must_use]
    pub fn row(&self, state: HealthState) -> &StateDistribution {
        &self.0[state.ordinal()]
    }

    /// Returns the states whose rows are not valid probability distributions.
    #[must_use]
    pub fn invalid_rows(&self) -> Vec<HealthState> {
        HealthState::all()
            .filter(|state| !is_probability_row(self.row(*state)))
            .collect()
    }
}

impl Default for TransitionMatrix {
    fn default() -> Self {
        TransitionMatrix([
            [0.62, 0.30, 0.05, 0.00, 0.03], // healthy
            [0.05, 0.64, 0.10, 0.01, 0.20], // isolated
            [0.00, 0.10, 0.65, 0.10, 0.15], // sick
            [0.00, 0.00, 0.00, 1.00, 0.00], // dead
            [0.00, 0.05, 0.02, 0.00, 0.93], // immune
        ])
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContagionParameters {
    /// In `[0, 1]`.
    pub contagion_factor: f64,
    pub apply_social_distance_effect: bool,
}

impl ContagionParameters {
    /// The contagion factor after the social distance effect, if any, is applied.
    #[must_use]
    pub fn effective_contagion_factor(&self) -> f64 {
        if self.apply_social_distance_effect {
            self.contagion_factor * SOCIAL_DISTANCE_FACTOR
        } else {
            self.contagion_factor
        }
    }
}

impl Default for ContagionParameters {
    fn default() -> Self {
        ContagionParameters {
            contagion_factor: 0.5,
            apply_social_distance_effect: false,
        }
    }
}

/// The weighted fraction of contagious neighbors around `(row, col)` in `view`, in `[0, 1]`. A
/// cell without neighbors has no influence.
#[must_use]
pub fn neighborhood_influence(view: &GridView<'_>, row: usize, col: usize) -> f64 {
    let (weight, count) = view
        .neighbors(row, col)
        .fold((0.0, 0_usize), |(weight, count), state| {
            (weight + state.contagion_weight(), count + 1)
        });
    if count == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let count = count as f64;
        weight / count
    }
}

/// Inverse-CDF sampling: returns the state whose cumulative probability bracket contains `u`.
/// If rounding leaves the total below `u`, the last state with non-zero probability is returned.
#[must_use]
pub fn select_state(distribution: &StateDistribution, u: f64) -> HealthState {
    let mut cumulative = 0.0_f64;
    let mut fallback = HealthState::Immune;
    for (state, probability) in HealthState::all().zip(distribution) {
        cumulative += probability;
        if *probability > 0.0 {
            if u < cumulative {
                return state;
            }
            fallback = state;
        }
    }
    fallback
}

#[derive(Clone, Debug, Default)]
pub struct TransitionModel {
    matrix: TransitionMatrix,
    contagion: ContagionParameters,
}

impl TransitionModel {
    #[must_use]
    pub fn new(matrix: TransitionMatrix, contagion: ContagionParameters) -> Self {
        TransitionModel { matrix, contagion }
    }

    /// Replaces the base matrix.
    pub fn set_transition_probabilities(&mut self, matrix: TransitionMatrix) {
        self.matrix = matrix;
    }

    #[must_use]
    pub fn matrix(&self) -> &TransitionMatrix {
        &self.matrix
    }

    #[must_use]
    pub fn contagion(&self) -> &ContagionParameters {
        &self.contagion
    }

    /// The distribution of the next state of an individual in `current` whose neighborhood has
    /// the given influence.
    #[must_use]
    pub fn distribution(&self, current: HealthState, influence: f64) -> StateDistribution {
        let mut row = *self.matrix.row(current);
        if !current.is_susceptible() || influence <= 0.0 {
            return row;
        }

        let pressure = (self.contagion.effective_contagion_factor() * influence).clamp(0.0, 1.0);
        let healthy = HealthState::Healthy.ordinal();
        let sick = HealthState::Sick.ordinal();
        let isolated = HealthState::Isolated.ordinal();

        let moved = row[healthy] * pressure;
        row[healthy] -= moved;
        let sick_weight = row[sick];
        let isolated_weight = row[isolated];
        let total = sick_weight + isolated_weight;
        if total > 0.0 {
            row[sick] += moved * sick_weight / total;
            row[isolated] += moved * isolated_weight / total;
        } else {
            row[sick] += moved;
        }
        row
    }

    /// Draws the next state of an individual.
    pub fn next_state<R: Rng>(
        &self,
        current: HealthState,
        influence: f64,
        rng: &mut R,
    ) -> HealthState {
        let u: f64 = rng.random();
        select_state(&self.distribution(current, influence), u)
    }
}
