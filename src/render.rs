//! Renders a grid as a PNG image, one pixel per individual.

use std::path::Path;

use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use log::info;

use crate::error::SimError;
use crate::grid::GridView;

/// File name of the rendered grid inside the output directory.
pub const IMAGE_FILE: &str = "simulation.png";

/// Converts a grid to an RGB image using each state's fixed color.
///
/// # Errors
///
/// Returns `SimError::ConfigurationError` if the grid is too large for an image.
pub fn grid_to_image(grid: &GridView<'_>) -> Result<RgbImage, SimError> {
    let size = u32::try_from(grid.size()).map_err(|_| {
        SimError::config(format!(
            "a {0}x{0} grid is too large to render",
            grid.size()
        ))
    })?;
    let cells = grid.cells();
    Ok(ImageBuffer::from_fn(size, size, |x, y| {
        Rgb(cells[y as usize * grid.size() + x as usize].rgb())
    }))
}

/// Writes the grid to `path` as a PNG.
///
/// # Errors
///
/// Returns a `SimError` if the image cannot be encoded or written.
pub fn render_grid(grid: &GridView<'_>, path: &Path) -> Result<(), SimError> {
    let image = grid_to_image(grid)?;
    image.save_with_format(path, ImageFormat::Png)?;
    info!("image saved as {}", path.display());
    Ok(())
}
