//! The five health states an individual can be in. The ordinal values are stable: they are used
//! to select the reported state on the command line and index rows of the transition matrix.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

use crate::error::SimError;

/// Number of health states, and the side length of the transition matrix.
pub const STATE_COUNT: usize = 5;

#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum HealthState {
    #[default]
    Healthy = 0,
    Isolated = 1,
    Sick = 2,
    Dead = 3,
    Immune = 4,
}

impl HealthState {
    /// All states in ordinal order.
    pub fn all() -> impl Iterator<Item = HealthState> {
        HealthState::iter()
    }

    #[must_use]
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// The fixed color used when rendering a grid.
    #[must_use]
    pub fn rgb(self) -> [u8; 3] {
        match self {
            HealthState::Healthy => [0, 255, 0],
            HealthState::Isolated => [0, 0, 0],
            HealthState::Sick => [255, 255, 0],
            HealthState::Dead => [255, 0, 0],
            HealthState::Immune => [0, 0, 255],
        }
    }

    /// Whether an individual in this state passes the disease on to its neighbors, and with what
    /// weight relative to a sick neighbor.
    #[must_use]
    pub fn contagion_weight(self) -> f64 {
        match self {
            HealthState::Sick => 1.0,
            HealthState::Isolated => 0.5,
            HealthState::Healthy | HealthState::Dead | HealthState::Immune => 0.0,
        }
    }

    #[must_use]
    pub fn is_susceptible(self) -> bool {
        self == HealthState::Healthy
    }
}

impl TryFrom<usize> for HealthState {
    type Error = SimError;

    fn try_from(ordinal: usize) -> Result<Self, Self::Error> {
        HealthState::iter().nth(ordinal).ok_or_else(|| {
            SimError::config(format!(
                "state ordinal {ordinal} is outside the valid range 0..{STATE_COUNT}"
            ))
        })
    }
}

impl FromStr for HealthState {
    type Err = SimError;

    /// Accepts a state name (case-insensitive) or its ordinal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(ordinal) = s.parse::<usize>() {
            return HealthState::try_from(ordinal);
        }
        HealthState::iter()
            .find(|state| state.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| SimError::config(format!("unknown health state '{s}'")))
    }
}

impl Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthState::Healthy => "healthy",
            HealthState::Isolated => "isolated",
            HealthState::Sick => "sick",
            HealthState::Dead => "dead",
            HealthState::Immune => "immune",
        };
        f.write_str(name)
    }
}
