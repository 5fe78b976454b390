//! The simulation engine advances a [`SimulationGrid`] generation by generation.
//!
//! Every generation reads the current buffer and writes every cell of the scratch buffer, then
//! swaps the two. The sequential strategy visits rows in order on the calling thread. The parallel
//! strategy splits the rows into contiguous chunks and spawns one scoped worker per chunk; each
//! worker owns a disjoint mutable slice of the scratch buffer, and all workers are joined before
//! the swap.
//!
//! Random draws come from one `SmallRng` per (generation, row), seeded by hashing the generation
//! and row with the engine's base seed. Draws therefore do not depend on how rows are assigned to
//! workers, and both strategies produce the same grid from the same seed.

use std::ops::Range;
use std::thread;

use log::{debug, trace};
use rand::rngs::SmallRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::{validate_contagion_factor, validate_thread_count, SimulationConfig};
use crate::error::SimError;
use crate::grid::{GridView, SimulationGrid};
use crate::hardware::HardwareProbe;
use crate::health_state::HealthState;
use crate::transition::{neighborhood_influence, TransitionModel};

/// Stream name hashed into the seed of the initial-infection RNG.
const SEEDING_STREAM: &[u8] = b"initial-infections";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Sequential,
    Parallel { threads: usize },
}

impl ExecutionStrategy {
    /// A single thread runs sequentially.
    #[must_use]
    pub fn from_thread_count(threads: usize) -> Self {
        if threads == 1 {
            ExecutionStrategy::Sequential
        } else {
            ExecutionStrategy::Parallel { threads }
        }
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        match self {
            ExecutionStrategy::Sequential => 1,
            ExecutionStrategy::Parallel { threads } => *threads,
        }
    }
}

/// Splits `rows` into `chunks` contiguous ranges covering `0..rows`. Sizes differ by at most one:
/// the first `rows % chunks` ranges get one extra row. Ranges are empty when `chunks > rows`.
#[must_use]
pub fn partition_rows(rows: usize, chunks: usize) -> Vec<Range<usize>> {
    if chunks == 0 {
        return Vec::new();
    }
    let base = rows / chunks;
    let remainder = rows % chunks;
    let mut start = 0;
    (0..chunks)
        .map(|chunk| {
            let len = base + usize::from(chunk < remainder);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Seed of the RNG used for `row` in `generation`.
fn row_seed(base_seed: u64, generation: usize, row: usize) -> u64 {
    let mut key = [0_u8; 16];
    key[..8].copy_from_slice(&(generation as u64).to_le_bytes());
    key[8..].copy_from_slice(&(row as u64).to_le_bytes());
    xxh3_64_with_seed(&key, base_seed)
}

/// Computes the next state of every cell in the rows starting at `first_row`, writing them to
/// `out`, which holds exactly those rows of the scratch buffer.
fn compute_rows(
    current: GridView<'_>,
    model: &TransitionModel,
    base_seed: u64,
    generation: usize,
    first_row: usize,
    out: &mut [HealthState],
) {
    let size = current.size();
    for (offset, out_row) in out.chunks_mut(size).enumerate() {
        let row = first_row + offset;
        let mut rng = SmallRng::seed_from_u64(row_seed(base_seed, generation, row));
        for (col, (cell, next)) in current.row(row).iter().zip(out_row).enumerate() {
            let influence = neighborhood_influence(&current, row, col);
            *next = model.next_state(*cell, influence, &mut rng);
        }
    }
}

#[derive(Clone, Debug)]
pub struct SimulationEngine {
    grid: SimulationGrid,
    model: TransitionModel,
    strategy: ExecutionStrategy,
    base_seed: u64,
    generation: usize,
}

impl SimulationEngine {
    /// Creates an engine over an all-healthy `size`x`size` grid.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigurationError` if `size` is zero, the contagion factor is outside
    /// `[0, 1]`, or a parallel strategy asks for zero threads or more than `probe` reports.
    pub fn new(
        size: usize,
        model: TransitionModel,
        strategy: ExecutionStrategy,
        base_seed: u64,
        probe: &dyn HardwareProbe,
    ) -> Result<Self, SimError> {
        validate_contagion_factor(model.contagion().contagion_factor)?;
        if let ExecutionStrategy::Parallel { threads } = strategy {
            validate_thread_count(threads, probe)?;
        }
        let grid = SimulationGrid::new(size)?;
        debug!(
            "created {size}x{size} engine with strategy {:?} and seed {base_seed}",
            strategy
        );
        Ok(SimulationEngine {
            grid,
            model,
            strategy,
            base_seed,
            generation: 0,
        })
    }

    /// Creates an engine for one run of `config` and seeds its initial infections.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigurationError` if `config` is invalid.
    pub fn from_config(
        config: &SimulationConfig,
        base_seed: u64,
        probe: &dyn HardwareProbe,
    ) -> Result<Self, SimError> {
        let model = TransitionModel::new(config.transition_matrix, config.contagion_parameters());
        let mut engine = SimulationEngine::new(
            config.population_size,
            model,
            config.strategy(),
            base_seed,
            probe,
        )?;
        engine.seed_infections(config.initial_infections)?;
        Ok(engine)
    }

    /// Makes `count` healthy individuals sick. The first is the center cell, the rest are drawn
    /// uniformly without replacement from the remaining cells.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigurationError` if `count` exceeds the population.
    pub fn seed_infections(&mut self, count: usize) -> Result<(), SimError> {
        let size = self.grid.size();
        let cell_count = self.grid.cell_count();
        if count > cell_count {
            return Err(SimError::config(format!(
                "cannot seed {count} infections in a population of {cell_count}"
            )));
        }
        if count == 0 {
            return Ok(());
        }

        let center = (size / 2) * size + size / 2;
        self.grid.set_current(size / 2, size / 2, HealthState::Sick)?;

        let mut rng = SmallRng::seed_from_u64(xxh3_64_with_seed(SEEDING_STREAM, self.base_seed));
        for index in sample(&mut rng, cell_count - 1, count - 1) {
            // Skip over the center, which is already sick.
            let index = if index >= center { index + 1 } else { index };
            self.grid
                .set_current(index / size, index % size, HealthState::Sick)?;
        }
        trace!("seeded {count} initial infections");
        Ok(())
    }

    /// Advances the population by one generation.
    pub fn step(&mut self) {
        let generation = self.generation;
        let base_seed = self.base_seed;
        let model = &self.model;
        let (current, next) = self.grid.split_buffers();
        let size = current.size();

        match self.strategy {
            ExecutionStrategy::Sequential => {
                compute_rows(current, model, base_seed, generation, 0, next);
            }
            ExecutionStrategy::Parallel { threads } => {
                thread::scope(|scope| {
                    let mut remaining = next;
                    for rows in partition_rows(size, threads) {
                        let (chunk, rest) =
                            std::mem::take(&mut remaining).split_at_mut(rows.len() * size);
                        remaining = rest;
                        if rows.is_empty() {
                            continue;
                        }
                        scope.spawn(move || {
                            compute_rows(current, model, base_seed, generation, rows.start, chunk);
                        });
                    }
                });
            }
        }

        self.grid.swap_buffers();
        self.generation += 1;
        trace!("completed generation {}", self.generation);
    }

    /// Advances the population by `generations` generations.
    pub fn run(&mut self, generations: usize) {
        for _ in 0..generations {
            self.step();
        }
        debug!(
            "finished {generations} generations, state counts {:?}",
            self.grid.state_counts()
        );
    }

    /// Number of individuals currently in `state`.
    #[must_use]
    pub fn count_state(&self, state: HealthState) -> usize {
        self.grid.count_state(state)
    }

    #[must_use]
    pub fn grid(&self) -> &SimulationGrid {
        &self.grid
    }

    /// Mutable access to the grid, for setting up a custom initial population.
    pub fn grid_mut(&mut self) -> &mut SimulationGrid {
        &mut self.grid
    }

    #[must_use]
    pub fn model(&self) -> &TransitionModel {
        &self.model
    }

    #[must_use]
    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// Number of generations computed so far.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::FixedHardwareProbe;
    use crate::transition::{ContagionParameters, TransitionMatrix};

    fn default_model(contagion_factor: f64, apply_social_distance_effect: bool) -> TransitionModel {
        TransitionModel::new(
            TransitionMatrix::default(),
            ContagionParameters {
                contagion_factor,
                apply_social_distance_effect,
            },
        )
    }

    fn engine(size: usize, strategy: ExecutionStrategy, seed: u64) -> SimulationEngine {
        let mut engine = SimulationEngine::new(
            size,
            default_model(0.5, false),
            strategy,
            seed,
            &FixedHardwareProbe(8),
        )
        .unwrap();
        engine.seed_infections(1).unwrap();
        engine
    }

    #[test]
    fn partition_covers_rows_exactly_once() {
        for rows in 0..40 {
            for chunks in 1..12 {
                let ranges = partition_rows(rows, chunks);
                assert_eq!(ranges.len(), chunks);
                let mut expected_start = 0;
                for range in &ranges {
                    assert_eq!(range.start, expected_start);
                    expected_start = range.end;
                }
                assert_eq!(expected_start, rows);

                let max = ranges.iter().map(ExactSizeIterator::len).max().unwrap();
                let min = ranges.iter().map(ExactSizeIterator::len).min().unwrap();
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn partition_gives_extra_rows_to_first_chunks() {
        assert_eq!(partition_rows(10, 3), vec![0..4, 4..7, 7..10]);
        assert_eq!(partition_rows(2, 4), vec![0..1, 1..2, 2..2, 2..2]);
        assert!(partition_rows(5, 0).is_empty());
    }

    #[test]
    fn thread_count_is_validated() {
        let probe = FixedHardwareProbe(4);
        for threads in [0, 5] {
            let result = SimulationEngine::new(
                10,
                default_model(0.5, false),
                ExecutionStrategy::Parallel { threads },
                0,
                &probe,
            );
            assert!(matches!(result, Err(SimError::ConfigurationError(_))));
        }
        assert!(SimulationEngine::new(
            10,
            default_model(0.5, false),
            ExecutionStrategy::Parallel { threads: 4 },
            0,
            &probe,
        )
        .is_ok());
    }

    #[test]
    fn invalid_construction() {
        let probe = FixedHardwareProbe(1);
        assert!(matches!(
            SimulationEngine::new(
                0,
                default_model(0.5, false),
                ExecutionStrategy::Sequential,
                0,
                &probe
            ),
            Err(SimError::ConfigurationError(_))
        ));
        assert!(matches!(
            SimulationEngine::new(
                5,
                default_model(1.5, false),
                ExecutionStrategy::Sequential,
                0,
                &probe
            ),
            Err(SimError::ConfigurationError(_))
        ));
    }

    #[test]
    fn initial_counts() {
        let engine = engine(10, ExecutionStrategy::Sequential, 1);
        assert_eq!(engine.generation(), 0);
        assert_eq!(engine.count_state(HealthState::Sick), 1);
        assert_eq!(engine.count_state(HealthState::Healthy), 99);
        assert_eq!(engine.grid().get(5, 5).unwrap(), HealthState::Sick);
    }

    #[test]
    fn seeding_many_infections() {
        let mut engine = SimulationEngine::new(
            6,
            default_model(0.5, false),
            ExecutionStrategy::Sequential,
            3,
            &FixedHardwareProbe(1),
        )
        .unwrap();
        engine.seed_infections(36).unwrap();
        assert_eq!(engine.count_state(HealthState::Sick), 36);
        assert!(engine.seed_infections(37).is_err());
    }

    #[test]
    fn seeding_is_deterministic() {
        let seed = |base_seed| {
            let mut engine = SimulationEngine::new(
                20,
                default_model(0.5, false),
                ExecutionStrategy::Sequential,
                base_seed,
                &FixedHardwareProbe(1),
            )
            .unwrap();
            engine.seed_infections(15).unwrap();
            assert_eq!(engine.count_state(HealthState::Sick), 15);
            engine.grid().view().cells().to_vec()
        };
        assert_eq!(seed(11), seed(11));
    }

    #[test]
    fn population_is_conserved() {
        for size in [1, 2, 7, 16] {
            let mut engine = engine(size, ExecutionStrategy::Sequential, 5);
            for _ in 0..8 {
                engine.step();
                let total: usize = HealthState::all().map(|s| engine.count_state(s)).sum();
                assert_eq!(total, size * size);
            }
            assert_eq!(engine.generation(), 8);
        }
    }

    #[test]
    fn zero_generations_leaves_grid_unchanged() {
        let mut engine = engine(9, ExecutionStrategy::Sequential, 5);
        let before = engine.grid().view().cells().to_vec();
        engine.run(0);
        assert_eq!(engine.grid().view().cells(), before.as_slice());
        assert_eq!(engine.generation(), 0);
    }

    #[test]
    fn dead_individuals_stay_dead() {
        let mut engine = engine(20, ExecutionStrategy::Sequential, 17);
        let mut dead_cells: Vec<usize> = Vec::new();
        for _ in 0..15 {
            engine.step();
            let cells = engine.grid().view().cells();
            for index in &dead_cells {
                assert_eq!(cells[*index], HealthState::Dead);
            }
            dead_cells = cells
                .iter()
                .enumerate()
                .filter(|(_, state)| **state == HealthState::Dead)
                .map(|(index, _)| index)
                .collect();
        }
    }

    #[test]
    fn parallel_matches_sequential() {
        for threads in [2, 3, 4, 8] {
            let mut sequential = engine(23, ExecutionStrategy::Sequential, 99);
            let mut parallel = engine(23, ExecutionStrategy::Parallel { threads }, 99);
            for _ in 0..6 {
                sequential.step();
                parallel.step();
                assert_eq!(
                    sequential.grid().view().cells(),
                    parallel.grid().view().cells()
                );
            }
        }
    }

    #[test]
    fn parallel_with_more_threads_than_rows() {
        let mut sequential = engine(3, ExecutionStrategy::Sequential, 4);
        let mut parallel = engine(3, ExecutionStrategy::Parallel { threads: 8 }, 4);
        sequential.run(4);
        parallel.run(4);
        assert_eq!(
            sequential.grid().view().cells(),
            parallel.grid().view().cells()
        );
    }

    #[test]
    fn different_seeds_diverge() {
        let mut first = engine(30, ExecutionStrategy::Sequential, 1);
        let mut second = engine(30, ExecutionStrategy::Sequential, 2);
        first.run(5);
        second.run(5);
        assert_ne!(first.grid().view().cells(), second.grid().view().cells());
    }

    #[test]
    fn row_seeds_differ() {
        assert_ne!(row_seed(0, 0, 0), row_seed(0, 0, 1));
        assert_ne!(row_seed(0, 0, 1), row_seed(0, 1, 0));
        assert_ne!(row_seed(0, 3, 3), row_seed(1, 3, 3));
        assert_eq!(row_seed(7, 3, 3), row_seed(7, 3, 3));
    }

    #[test]
    fn from_config_seeds_and_runs() {
        let config = SimulationConfig {
            population_size: 10,
            generations: 5,
            initial_infections: 4,
            threads: 2,
            ..SimulationConfig::default()
        };
        let mut engine = SimulationEngine::from_config(&config, 8, &FixedHardwareProbe(2)).unwrap();
        assert_eq!(engine.strategy(), ExecutionStrategy::Parallel { threads: 2 });
        assert_eq!(engine.count_state(HealthState::Sick), 4);
        engine.run(config.generations);
        let dead = engine.count_state(HealthState::Dead);
        assert!(dead <= 100);
    }

    #[test]
    fn social_distancing_lowers_expected_deaths() {
        // Infection only spreads through neighbors, and the sick either stay sick or die.
        let matrix = TransitionMatrix([
            [1.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.6, 0.4, 0.0],
            [0.0, 0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 1.0],
        ]);
        let total_dead = |apply_social_distance_effect: bool| -> usize {
            (0..300)
                .map(|seed| {
                    let model = TransitionModel::new(
                        matrix,
                        ContagionParameters {
                            contagion_factor: 1.0,
                            apply_social_distance_effect,
                        },
                    );
                    let mut engine = SimulationEngine::new(
                        10,
                        model,
                        ExecutionStrategy::Sequential,
                        seed,
                        &FixedHardwareProbe(1),
                    )
                    .unwrap();
                    engine.seed_infections(1).unwrap();
                    engine.run(5);
                    engine.count_state(HealthState::Dead)
                })
                .sum()
        };
        assert!(total_dead(true) < total_dead(false));
    }

    #[test]
    fn social_distancing_does_not_raise_default_scenario_deaths() {
        // N=10, G=5, default matrix, contagion factor 0.5. Both arms share seeds.
        const SEEDS: u64 = 4000;
        let mean_dead = |apply_social_distance_effect: bool| -> f64 {
            let total: usize = (0..SEEDS)
                .map(|seed| {
                    let mut engine = SimulationEngine::new(
                        10,
                        default_model(0.5, apply_social_distance_effect),
                        ExecutionStrategy::Sequential,
                        seed,
                        &FixedHardwareProbe(1),
                    )
                    .unwrap();
                    engine.seed_infections(1).unwrap();
                    engine.run(5);
                    engine.count_state(HealthState::Dead)
                })
                .sum();
            total as f64 / SEEDS as f64
        };
        let open = mean_dead(false);
        let distanced = mean_dead(true);
        assert!(
            distanced <= open,
            "mean dead with distancing {distanced} exceeds {open} without"
        );
    }

    #[test]
    fn default_scenario_reports_dead_count() {
        for apply_social_distance_effect in [false, true] {
            let mut engine = SimulationEngine::new(
                10,
                default_model(0.5, apply_social_distance_effect),
                ExecutionStrategy::Sequential,
                2024,
                &FixedHardwareProbe(1),
            )
            .unwrap();
            engine.seed_infections(1).unwrap();
            engine.run(5);
            assert!(engine.count_state(HealthState::Dead) <= 100);
            assert_eq!(engine.generation(), 5);
        }
    }
}
