//! Stop-frequency plots.
//!
//! Renders the distribution of stops per driver as a PNG bar chart using
//! the plotters library.

use std::collections::BTreeMap;
use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("No drivers to plot")]
    NoDrivers,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1280;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 720;

const BAR_COLOR: RGBColor = RGBColor(55, 126, 184);

/// Number of drivers for each stop count within `[min, max]`.
///
/// Every count in the range gets a bin, including empty ones.
pub fn stop_frequencies(counts: &[usize], min: usize, max: usize) -> BTreeMap<usize, usize> {
    let mut bins: BTreeMap<usize, usize> = (min..=max).map(|k| (k, 0)).collect();
    for &c in counts {
        if let Some(n) = bins.get_mut(&c) {
            *n += 1;
        }
    }
    bins
}

/// Plot the histogram of stops per driver and save as PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `counts` - Stop count of every driver
/// * `range` - Inclusive stop-count window; defaults to the observed range
pub fn plot_stop_histogram(
    output_path: &Path,
    counts: &[usize],
    range: Option<(usize, usize)>,
) -> Result<()> {
    let (lo, hi) = match range {
        Some(r) => r,
        None => {
            let lo = counts.iter().copied().min().ok_or(VisualizationError::NoDrivers)?;
            let hi = counts.iter().copied().max().ok_or(VisualizationError::NoDrivers)?;
            (lo, hi)
        }
    };
    let bins = stop_frequencies(counts, lo, hi);
    if bins.values().all(|&n| n == 0) {
        return Err(VisualizationError::NoDrivers);
    }
    let tallest = bins.values().copied().max().unwrap_or(0) as u32;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();

    root.fill(&WHITE)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(lo as u32..(hi as u32 + 1), 0u32..(tallest + tallest / 10 + 1))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(bins.iter().map(|(&stops, &drivers)| {
            let x = stops as u32;
            Rectangle::new([(x, 0), (x + 1, drivers as u32)], BAR_COLOR.filled())
        }))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}
