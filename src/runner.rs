//! Command line entry point and the batch loop.
//!
//! A batch executes `runs` independent simulations. Each run builds a fresh engine from the
//! configuration, advances it `generations` times and prints the count of the reported state on
//! its own line of stdout.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use log::{debug, info};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::config::SimulationConfig;
use crate::engine::SimulationEngine;
use crate::error::SimError;
use crate::execution_stats::{log_execution_statistics, ExecutionProfilingCollector};
use crate::hardware::{HardwareProbe, SystemHardwareProbe};
use crate::health_state::HealthState;
use crate::log::{apply_log_spec, LogSpec};
use crate::progress::RunProgress;
use crate::render::{render_grid, IMAGE_FILE};
use crate::report::{RunRecord, RunReport, RUN_REPORT_FILE};

/// Command line arguments. Flags that are not given fall back to the configuration file, if
/// any, and then to the defaults.
#[derive(Parser, Debug, Default)]
#[command(name = "pandemic-sim", version, about = "Stochastic grid epidemic simulator")]
pub struct SimArgs {
    /// Number of times the model is executed; each run prints one result
    #[arg(short, long)]
    pub runs: Option<usize>,

    /// Population matrix side length, e.g. 100 for 10,000 individuals
    #[arg(short, long)]
    pub population: Option<usize>,

    /// Number of generations (weeks)
    #[arg(short, long)]
    pub generations: Option<usize>,

    /// Apply the social distancing effect, reducing the contagion factor
    #[arg(short, long)]
    pub social_distance: bool,

    /// Number of worker threads, at most the number of hardware threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Disease contagion factor in [0, 1]
    #[arg(short, long)]
    pub contagion_factor: Option<f64>,

    /// Render the final grid of the last run as a PNG
    #[arg(short, long)]
    pub image: bool,

    /// State whose count is reported: a name or an ordinal 0-4
    #[arg(long, value_parser = parse_state)]
    pub state: Option<HealthState>,

    /// Number of individuals infected at the start of each run
    #[arg(long)]
    pub initial_infections: Option<usize>,

    /// Base random seed; drawn from the operating system when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Optional path to a JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for the run report and image
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Log level, e.g. `info` or `info,pandemic_sim::engine=trace`
    #[arg(long)]
    pub log_level: Option<String>,

    /// Do not log execution statistics
    #[arg(long)]
    pub no_stats: bool,

    /// Show a progress bar over the runs
    #[arg(long)]
    pub progress: bool,
}

fn parse_state(s: &str) -> Result<HealthState, String> {
    s.parse().map_err(|error: SimError| error.to_string())
}

impl SimArgs {
    /// Builds the run configuration: the config file (or defaults) overridden by explicit flags.
    ///
    /// # Errors
    ///
    /// Returns a `SimError` if the configuration file cannot be loaded.
    pub fn to_config(&self) -> Result<SimulationConfig, SimError> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                SimulationConfig::load(path)?
            }
            None => SimulationConfig::default(),
        };

        if let Some(runs) = self.runs {
            config.runs = runs;
        }
        if let Some(population) = self.population {
            config.population_size = population;
        }
        if let Some(generations) = self.generations {
            config.generations = generations;
        }
        if self.social_distance {
            config.social_distance = true;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(contagion_factor) = self.contagion_factor {
            config.contagion_factor = contagion_factor;
        }
        if self.image {
            config.generate_image = true;
        }
        if let Some(state) = self.state {
            config.report_state = state.ordinal();
        }
        if let Some(initial_infections) = self.initial_infections {
            config.initial_infections = initial_infections;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }

    #[must_use]
    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            output_dir: self.output_dir.clone(),
            progress: self.progress,
            stats: !self.no_stats,
        }
    }
}

/// Settings of a batch that do not affect simulation results.
#[derive(Clone, Debug, Default)]
pub struct BatchOptions {
    pub output_dir: Option<PathBuf>,
    pub progress: bool,
    pub stats: bool,
}

#[derive(Debug)]
pub struct BatchResult {
    pub base_seed: u64,
    pub records: Vec<RunRecord>,
}

/// Seed of the engine for run `run`.
fn run_seed(base_seed: u64, run: usize) -> u64 {
    xxh3_64_with_seed(&(run as u64).to_le_bytes(), base_seed)
}

/// Describes the requested thread count against what the hardware offers.
fn threads_summary(threads: usize, probe: &dyn HardwareProbe) -> String {
    let capability = if probe.supports_multithreading() {
        "multithreading supported"
    } else {
        "single-threaded hardware"
    };
    format!(
        "{threads} ({} available, {capability})",
        probe.available_threads()
    )
}

fn log_configuration(config: &SimulationConfig, probe: &dyn HardwareProbe) {
    info!("Number of runs: {}", config.runs);
    info!(
        "Population matrix size: {} ({} individuals)",
        config.population_size,
        config.population_size.saturating_mul(config.population_size)
    );
    info!("Number of generations: {}", config.generations);
    info!("Disease contagion factor: {}", config.contagion_factor);
    info!("Social distance effect applied: {}", config.social_distance);
    info!("Threads: {}", threads_summary(config.threads, probe));
    info!("Generate image on finish: {}", config.generate_image);
}

/// Executes every run of `config`, writing one count per line to `out`.
///
/// # Errors
///
/// Returns `SimError::ConfigurationError` before any run starts if the configuration is invalid,
/// or the error of a failed report, image or output write.
pub fn run_simulations(
    config: &SimulationConfig,
    options: &BatchOptions,
    probe: &dyn HardwareProbe,
    out: &mut dyn Write,
) -> Result<BatchResult, SimError> {
    config.validate(probe)?;
    let report_state = config.report_state()?;
    log_configuration(config, probe);

    let base_seed = config.seed.unwrap_or_else(rand::random);
    debug!("base seed {}", base_seed);

    let mut report = match &options.output_dir {
        Some(dir) => Some(RunReport::create(&dir.join(RUN_REPORT_FILE))?),
        None => None,
    };
    let mut collector = options.stats.then(ExecutionProfilingCollector::new);
    let progress = RunProgress::new(options.progress, config.runs);

    let mut records = Vec::with_capacity(config.runs);
    let mut last_engine = None;
    for run in 0..config.runs {
        let mut engine = SimulationEngine::from_config(config, run_seed(base_seed, run), probe)?;
        engine.run(config.generations);

        let record = RunRecord::new(
            run,
            config.generations,
            engine.grid().state_counts(),
            report_state,
        );
        progress.write_count(out, record.reported_count)?;
        if let Some(report) = report.as_mut() {
            report.send(&record)?;
        }
        records.push(record);

        progress.increment();
        if let Some(collector) = collector.as_mut() {
            collector.refresh();
        }
        last_engine = Some(engine);
    }
    progress.finish();
    out.flush()?;

    if config.generate_image {
        if let Some(engine) = &last_engine {
            let dir = options.output_dir.as_deref().unwrap_or(Path::new("."));
            render_grid(&engine.grid().view(), &dir.join(IMAGE_FILE))?;
        }
    }

    if let Some(mut collector) = collector {
        let cell_updates = (config.runs as u64)
            .saturating_mul(config.generations as u64)
            .saturating_mul(config.population_size.saturating_mul(config.population_size) as u64);
        log_execution_statistics(&collector.compute_final_statistics(cell_updates));
    }

    Ok(BatchResult { base_seed, records })
}

/// Runs a batch described by already parsed arguments.
///
/// # Errors
///
/// Returns an error if the log level, configuration or any run fails.
pub fn run_with_parsed_args(
    args: &SimArgs,
    probe: &dyn HardwareProbe,
    out: &mut dyn Write,
) -> Result<BatchResult, SimError> {
    if let Some(log_level) = &args.log_level {
        apply_log_spec(&log_level.parse::<LogSpec>()?);
    }
    let config = args.to_config()?;
    run_simulations(&config, &args.options(), probe, out)
}

/// Parses the process arguments and runs the batch, printing results to stdout.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a run fails.
pub fn run_with_args() -> anyhow::Result<BatchResult> {
    let args = SimArgs::parse();
    let stdout = io::stdout();
    let result = run_with_parsed_args(&args, &SystemHardwareProbe, &mut stdout.lock())?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::FixedHardwareProbe;
    use tempfile::{tempdir, NamedTempFile};

    fn quiet_args() -> SimArgs {
        SimArgs {
            no_stats: true,
            ..SimArgs::default()
        }
    }

    fn output_lines(out: &[u8]) -> Vec<usize> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .lines()
            .map(|line| line.parse().unwrap())
            .collect()
    }

    #[test]
    fn parse_flags() {
        let args = SimArgs::try_parse_from([
            "pandemic-sim",
            "-r",
            "3",
            "-p",
            "20",
            "-g",
            "7",
            "-s",
            "-t",
            "2",
            "-c",
            "0.8",
            "-i",
            "--state",
            "sick",
            "--seed",
            "5",
        ])
        .unwrap();
        let config = args.to_config().unwrap();
        assert_eq!(config.runs, 3);
        assert_eq!(config.population_size, 20);
        assert_eq!(config.generations, 7);
        assert!(config.social_distance);
        assert_eq!(config.threads, 2);
        assert_eq!(config.contagion_factor, 0.8);
        assert!(config.generate_image);
        assert_eq!(config.report_state, HealthState::Sick.ordinal());
        assert_eq!(config.seed, Some(5));
    }

    #[test]
    fn parse_rejects_unknown_state() {
        assert!(SimArgs::try_parse_from(["pandemic-sim", "--state", "7"]).is_err());
        assert!(SimArgs::try_parse_from(["pandemic-sim", "--state", "zombie"]).is_err());
    }

    #[test]
    fn defaults_without_flags() {
        let config = SimArgs::try_parse_from(["pandemic-sim"])
            .unwrap()
            .to_config()
            .unwrap();
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "runs": 4, "population_size": 15, "generations": 2 }}"#
        )
        .unwrap();
        let args = SimArgs {
            config: Some(file.path().to_path_buf()),
            generations: Some(9),
            ..quiet_args()
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.runs, 4);
        assert_eq!(config.population_size, 15);
        assert_eq!(config.generations, 9);
    }

    #[test]
    fn one_line_per_run() {
        let args = SimArgs {
            runs: Some(4),
            population: Some(10),
            generations: Some(5),
            seed: Some(1),
            ..quiet_args()
        };
        let mut out = Vec::new();
        let result = run_with_parsed_args(&args, &FixedHardwareProbe(1), &mut out).unwrap();
        let counts = output_lines(&out);
        assert_eq!(counts.len(), 4);
        assert!(counts.iter().all(|count| *count <= 100));
        let reported: Vec<usize> = result.records.iter().map(|r| r.reported_count).collect();
        assert_eq!(counts, reported);
        assert!(result.records.iter().all(|r| r.population == 100));
    }

    #[test]
    fn seeded_batches_repeat() {
        let config = SimulationConfig {
            runs: 5,
            population_size: 12,
            seed: Some(77),
            ..SimulationConfig::default()
        };
        let options = BatchOptions::default();
        let mut first = Vec::new();
        let mut second = Vec::new();
        run_simulations(&config, &options, &FixedHardwareProbe(1), &mut first).unwrap();
        run_simulations(&config, &options, &FixedHardwareProbe(1), &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn parallel_batch_matches_sequential_batch() {
        let sequential = SimulationConfig {
            runs: 3,
            population_size: 17,
            seed: Some(12),
            ..SimulationConfig::default()
        };
        let parallel = SimulationConfig {
            threads: 3,
            ..sequential.clone()
        };
        let options = BatchOptions::default();
        let probe = FixedHardwareProbe(4);
        let sequential = run_simulations(&sequential, &options, &probe, &mut Vec::new()).unwrap();
        let parallel = run_simulations(&parallel, &options, &probe, &mut Vec::new()).unwrap();
        assert_eq!(sequential.records, parallel.records);
    }

    #[test]
    fn invalid_configuration_prints_nothing() {
        let args = SimArgs {
            threads: Some(3),
            ..quiet_args()
        };
        let mut out = Vec::new();
        let result = run_with_parsed_args(&args, &FixedHardwareProbe(2), &mut out);
        assert!(matches!(result, Err(SimError::ConfigurationError(_))));
        assert!(out.is_empty());
    }

    #[test]
    fn invalid_log_level() {
        let args = SimArgs {
            log_level: Some("chatty".to_string()),
            ..quiet_args()
        };
        let result = run_with_parsed_args(&args, &FixedHardwareProbe(1), &mut Vec::new());
        assert!(matches!(result, Err(SimError::ConfigurationError(_))));
    }

    #[test]
    fn writes_report_and_image() {
        let temp_dir = tempdir().unwrap();
        let output_dir = temp_dir.path().join("out");
        let args = SimArgs {
            runs: Some(2),
            population: Some(8),
            generations: Some(3),
            image: true,
            seed: Some(3),
            output_dir: Some(output_dir.clone()),
            ..quiet_args()
        };
        let result = run_with_parsed_args(&args, &FixedHardwareProbe(1), &mut Vec::new()).unwrap();

        let mut reader = csv::Reader::from_path(output_dir.join(RUN_REPORT_FILE)).unwrap();
        let records: Vec<RunRecord> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(records, result.records);
        assert!(output_dir.join(IMAGE_FILE).exists());
    }

    #[test]
    fn threads_summary_reports_capability() {
        assert_eq!(
            threads_summary(2, &FixedHardwareProbe(4)),
            "2 (4 available, multithreading supported)"
        );
        assert_eq!(
            threads_summary(1, &FixedHardwareProbe(1)),
            "1 (1 available, single-threaded hardware)"
        );
    }

    #[test]
    fn run_seeds_differ() {
        assert_ne!(run_seed(1, 0), run_seed(1, 1));
        assert_eq!(run_seed(1, 4), run_seed(1, 4));
    }
}
