//! CSV report with one row per run.

use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use csv::Writer;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::health_state::{HealthState, STATE_COUNT};

/// File name of the run report inside the output directory.
pub const RUN_REPORT_FILE: &str = "runs.csv";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run: usize,
    pub generations: usize,
    pub population: usize,
    pub healthy: usize,
    pub isolated: usize,
    pub sick: usize,
    pub dead: usize,
    pub immune: usize,
    pub reported_state: HealthState,
    pub reported_count: usize,
}

impl RunRecord {
    #[must_use]
    pub fn new(
        run: usize,
        generations: usize,
        counts: [usize; STATE_COUNT],
        reported_state: HealthState,
    ) -> Self {
        let [healthy, isolated, sick, dead, immune] = counts;
        RunRecord {
            run,
            generations,
            population: counts.iter().sum(),
            healthy,
            isolated,
            sick,
            dead,
            immune,
            reported_state,
            reported_count: counts[reported_state.ordinal()],
        }
    }
}

// Checks that the path is valid. Creates the file and all parent directories if
// they do not exist.
fn generate_validate_filepath(path: &Path) -> Result<File, SimError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            Ok(File::create(path)?)
        }
        _ => Err(SimError::config(format!(
            "report output files must be CSVs, got {}",
            path.display()
        ))),
    }
}

pub struct RunReport {
    writer: Writer<File>,
}

impl RunReport {
    /// Creates the report file, and its parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns a `SimError` if the path is not a `.csv` file or cannot be created.
    pub fn create(path: &Path) -> Result<Self, SimError> {
        trace!("creating run report at {}", path.display());
        let file = generate_validate_filepath(path)?;
        Ok(RunReport {
            writer: Writer::from_writer(file),
        })
    }

    /// Writes and flushes one row.
    ///
    /// # Errors
    ///
    /// Returns a `SimError` if the row cannot be written.
    pub fn send(&mut self, record: &RunRecord) -> Result<(), SimError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }
}
