// Loss of precision is allowable in this module's use cases.
#![allow(clippy::cast_precision_loss)]

use std::time::{Duration, Instant};

use bytesize::ByteSize;
use humantime::format_duration;
use log::{debug, error, info};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// How frequently we update the max memory used value.
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Computed final statistics. A cell update is one individual advanced by one generation; if no
/// cells were updated the per-update statistics are zero.
#[derive(Debug)]
pub struct ExecutionStatistics {
    pub max_memory_usage: u64,
    pub cpu_time: Duration,
    pub wall_time: Duration,

    pub cell_updates: u64,
    pub wall_time_per_cell_update: Duration,
    pub cell_updates_per_second: f64,
}

pub struct ExecutionProfilingCollector {
    /// Start time, used to compute elapsed wall time
    start_time: Instant,
    /// Lets callers invoke `refresh` every run without polling more often than
    /// `REFRESH_INTERVAL`.
    last_refresh: Instant,
    /// Accumulated CPU time of the process in CPU-milliseconds at start
    start_cpu_time: u64,
    /// The maximum resident memory of the process seen so far
    max_memory_usage: u64,
    system: System,
    /// Current process, `None` on unsupported platforms
    process_id: Option<Pid>,
}

impl Default for ExecutionProfilingCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionProfilingCollector {
    #[must_use]
    pub fn new() -> ExecutionProfilingCollector {
        let process_id = sysinfo::get_current_pid().ok();
        let now = Instant::now();

        let mut collector = ExecutionProfilingCollector {
            start_time: now,
            last_refresh: now,
            start_cpu_time: 0,
            max_memory_usage: 0,
            system: System::new(),
            process_id,
        };
        if let Some(process_id) = process_id {
            debug!("Process ID: {}", process_id);
            collector.update_system_info(ProcessRefreshKind::nothing().with_cpu().with_memory());
            if let Some(process) = collector.system.process(process_id) {
                collector.max_memory_usage = process.memory();
                collector.start_cpu_time = process.accumulated_cpu_time();
            }
        }

        collector
    }

    /// Polls memory usage if at least `REFRESH_INTERVAL` has passed since the previous poll.
    #[inline]
    pub fn refresh(&mut self) {
        if self.last_refresh.elapsed() >= REFRESH_INTERVAL {
            self.poll_memory();
            self.last_refresh = Instant::now();
        }
    }

    fn poll_memory(&mut self) {
        if let Some(pid) = self.process_id {
            self.update_system_info(ProcessRefreshKind::nothing().with_memory());
            if let Some(process) = self.system.process(pid) {
                self.max_memory_usage = self.max_memory_usage.max(process.memory());
            }
        }
    }

    #[inline]
    fn update_system_info(&mut self, process_refresh_kind: ProcessRefreshKind) {
        if let Some(pid) = self.process_id {
            if self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                process_refresh_kind,
            ) < 1
            {
                error!("could not refresh process statistics");
            }
        }
    }

    /// Computes the final summary statistics for `cell_updates` individual-generations.
    pub fn compute_final_statistics(&mut self, cell_updates: u64) -> ExecutionStatistics {
        let mut cpu_time_millis = 0;

        if let Some(pid) = self.process_id {
            self.update_system_info(ProcessRefreshKind::nothing().with_cpu().with_memory());
            if let Some(process) = self.system.process(pid) {
                self.max_memory_usage = self.max_memory_usage.max(process.memory());
                cpu_time_millis = process
                    .accumulated_cpu_time()
                    .saturating_sub(self.start_cpu_time);
            }
        }

        let cpu_time = Duration::from_millis(cpu_time_millis);
        let wall_time = self.start_time.elapsed();

        let (wall_time_per_cell_update, cell_updates_per_second) = if cell_updates > 0 {
            let seconds = wall_time.as_secs_f64();
            let throughput = if seconds > 0.0 {
                cell_updates as f64 / seconds
            } else {
                0.0
            };
            (
                Duration::from_secs_f64(seconds / cell_updates as f64),
                throughput,
            )
        } else {
            (Duration::ZERO, 0.0)
        };

        ExecutionStatistics {
            max_memory_usage: self.max_memory_usage,
            cpu_time,
            wall_time,
            cell_updates,
            wall_time_per_cell_update,
            cell_updates_per_second,
        }
    }
}

/// Logs execution statistics with the logging system.
pub fn log_execution_statistics(stats: &ExecutionStatistics) {
    info!("Execution complete.");
    if stats.max_memory_usage == 0 {
        info!("Memory and CPU statistics are not available on your platform.");
    } else {
        info!("Max memory usage: {}", ByteSize::b(stats.max_memory_usage));
        info!("CPU time: {}", format_duration(stats.cpu_time));
    }
    info!("Wall time: {}", format_duration(stats.wall_time));

    if stats.cell_updates > 0 {
        info!("Cell updates: {}", stats.cell_updates);
        info!(
            "Wall time per cell update: {}",
            format_duration(stats.wall_time_per_cell_update)
        );
        info!("Cell updates per second: {:.0}", stats.cell_updates_per_second);
    }
}
