//! The population grid. Cells are stored row-major in a flat `Vec`. Two buffers exist: `current`
//! is read while a generation is computed, `next` is the scratch buffer that every generation
//! fully overwrites before the two are swapped.

use log::trace;

use crate::error::SimError;
use crate::health_state::{HealthState, STATE_COUNT};

/// Moore neighborhood offsets (row, col).
const NEIGHBOR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// A read-only view of one buffer of an `N`x`N` grid.
#[derive(Copy, Clone, Debug)]
pub struct GridView<'a> {
    cells: &'a [HealthState],
    size: usize,
}

impl<'a> GridView<'a> {
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// # Errors
    ///
    /// Returns `SimError::IndexError` if `row` or `col` is outside `[0, size)`.
    pub fn get(&self, row: usize, col: usize) -> Result<HealthState, SimError> {
        check_bounds(row, col, self.size)?;
        Ok(self.cells[row * self.size + col])
    }

    /// All cells, row-major.
    #[must_use]
    pub fn cells(&self) -> &'a [HealthState] {
        self.cells
    }

    /// The cells of row `row`.
    #[must_use]
    pub fn row(&self, row: usize) -> &'a [HealthState] {
        &self.cells[row * self.size..(row + 1) * self.size]
    }

    /// The in-grid Moore neighbors of `(row, col)`. There is no wrap-around, so edge cells have
    /// five neighbors and corner cells three.
    pub fn neighbors(&self, row: usize, col: usize) -> impl Iterator<Item = HealthState> + 'a {
        let cells = self.cells;
        let size = self.size;
        NEIGHBOR_OFFSETS.iter().filter_map(move |&(dr, dc)| {
            let r = row.checked_add_signed(dr)?;
            let c = col.checked_add_signed(dc)?;
            (r < size && c < size).then(|| cells[r * size + c])
        })
    }

    #[must_use]
    pub fn count_state(&self, state: HealthState) -> usize {
        self.cells.iter().filter(|cell| **cell == state).count()
    }
}

fn check_bounds(row: usize, col: usize, size: usize) -> Result<(), SimError> {
    if row >= size || col >= size {
        return Err(SimError::IndexError { row, col, size });
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct SimulationGrid {
    size: usize,
    current: Vec<HealthState>,
    next: Vec<HealthState>,
}

impl SimulationGrid {
    /// Creates an `size`x`size` grid of healthy individuals.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigurationError` if `size` is zero or `size * size` overflows.
    pub fn new(size: usize) -> Result<Self, SimError> {
        if size == 0 {
            return Err(SimError::config("population side length must be at least 1"));
        }
        let cell_count = size.checked_mul(size).ok_or_else(|| {
            SimError::config(format!("population side length {size} is too large"))
        })?;
        trace!("allocating {size}x{size} grid");
        Ok(SimulationGrid {
            size,
            current: vec![HealthState::Healthy; cell_count],
            next: vec![HealthState::Healthy; cell_count],
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.current.len()
    }

    /// A view of the current generation.
    #[must_use]
    pub fn view(&self) -> GridView<'_> {
        GridView {
            cells: &self.current,
            size: self.size,
        }
    }

    /// Returns the state of a cell in the current generation.
    ///
    /// # Errors
    ///
    /// Returns `SimError::IndexError` if `row` or `col` is outside `[0, size)`.
    pub fn get(&self, row: usize, col: usize) -> Result<HealthState, SimError> {
        self.view().get(row, col)
    }

    /// Writes a cell of the scratch buffer. The value becomes visible after `swap_buffers`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::IndexError` if `row` or `col` is outside `[0, size)`.
    pub fn set(&mut self, row: usize, col: usize, state: HealthState) -> Result<(), SimError> {
        check_bounds(row, col, self.size)?;
        self.next[row * self.size + col] = state;
        Ok(())
    }

    /// Writes a cell of the current generation directly. Used to seed the initial infections.
    ///
    /// # Errors
    ///
    /// Returns `SimError::IndexError` if `row` or `col` is outside `[0, size)`.
    pub fn set_current(
        &mut self,
        row: usize,
        col: usize,
        state: HealthState,
    ) -> Result<(), SimError> {
        check_bounds(row, col, self.size)?;
        self.current[row * self.size + col] = state;
        Ok(())
    }

    /// Number of cells of the current generation in `state`. O(N²).
    #[must_use]
    pub fn count_state(&self, state: HealthState) -> usize {
        self.view().count_state(state)
    }

    /// Counts of every state in the current generation, indexed by ordinal.
    #[must_use]
    pub fn state_counts(&self) -> [usize; STATE_COUNT] {
        let mut counts = [0; STATE_COUNT];
        for cell in &self.current {
            counts[cell.ordinal()] += 1;
        }
        counts
    }

    /// Makes the scratch buffer the current generation. The old current buffer is reused as the
    /// next scratch target.
    pub fn swap_buffers(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }

    /// Splits the grid into a read-only view of the current generation and the writable scratch
    /// buffer, so both can be borrowed at once during a generation step.
    pub(crate) fn split_buffers(&mut self) -> (GridView<'_>, &mut [HealthState]) {
        (
            GridView {
                cells: &self.current,
                size: self.size,
            },
            &mut self.next,
        )
    }
}
