//! A progress bar over the runs of a batch, shown with `--progress`.
//!
//! The bar is drawn on stdout, which also carries the per-run counts. It is only shown when
//! stdout is a terminal, and every count written while it is shown first clears the bar's line,
//! so a redirected stdout holds nothing but the counts.

use std::io::{self, IsTerminal, Write};

use log::{debug, trace};
#[cfg(feature = "progress_bar")]
use progress_bar::{
    finalize_progress_bar, inc_progress_bar, init_progress_bar, set_progress_bar_action, Color,
    Style,
};

/// Clears the entire line and returns the cursor to the beginning.
const CLEAR_LINE: &[u8] = b"\x1B[2K\r";

/// Tracks completed runs. Does nothing unless enabled, built with the `progress_bar` feature and
/// writing to a terminal.
#[derive(Debug)]
pub struct RunProgress {
    enabled: bool,
}

impl RunProgress {
    #[must_use]
    pub fn new(requested: bool, runs: usize) -> Self {
        Self::with_terminal(requested, runs, io::stdout().is_terminal())
    }

    fn with_terminal(requested: bool, runs: usize, is_terminal: bool) -> Self {
        let enabled = requested && is_terminal && cfg!(feature = "progress_bar");
        if requested && !is_terminal {
            debug!("stdout is not a terminal, progress bar disabled");
        }
        if enabled {
            trace!("initializing run progress bar with {} runs", runs);
            #[cfg(feature = "progress_bar")]
            {
                init_progress_bar(runs);
                set_progress_bar_action("Runs", Color::Blue, Style::Bold);
            }
        }
        RunProgress { enabled }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Writes the count of one run on its own line of `out`, over the bar if it is shown.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying write.
    pub fn write_count(&self, out: &mut dyn Write, count: usize) -> io::Result<()> {
        if self.enabled {
            out.write_all(CLEAR_LINE)?;
        }
        writeln!(out, "{count}")
    }

    /// Marks one more run as complete.
    pub fn increment(&self) {
        #[cfg(feature = "progress_bar")]
        if self.enabled {
            inc_progress_bar();
        }
    }

    pub fn finish(self) {
        #[cfg(feature = "progress_bar")]
        if self.enabled {
            finalize_progress_bar();
        }
    }
}
