//! Test fixtures for model assembly.

use crate::errors::ResamplingError;
use crate::geo::{GeoTransform, Raster};
use serde_json::{json, Value};

/// Configuration for an explicit `nrow` x `ncol` grid of square cells with
/// its origin at (0, 0) and no DEM.
#[must_use]
pub fn explicit_grid_config(nrow: usize, ncol: usize, cell_size: f64) -> Value {
    json!({
        "grid": {
            "nrow": nrow,
            "ncol": ncol,
            "delr": cell_size,
            "delc": cell_size,
        }
    })
}

/// Configuration for a grid derived from the extent of `dem`, with the model
/// top regridded from the same raster.
#[must_use]
pub fn dem_grid_config(dem: &str, cell_size: f64) -> Value {
    json!({
        "grid": {
            "dem": dem,
            "delr": cell_size,
            "delc": cell_size,
        },
        "dis": {
            "regrid_top_from_dem": true,
        }
    })
}

/// A north-up raster of constant `value` with its lower-left corner at
/// `origin`.
///
/// # Errors
///
/// Returns an error for an empty shape or a non-positive cell size.
pub fn uniform_raster(
    nrows: usize,
    ncols: usize,
    cell_size: f64,
    origin: (f64, f64),
    value: f64,
) -> Result<Raster, ResamplingError> {
    let (x_min, y_min) = origin;
    let transform = GeoTransform::north_up(x_min, y_min + nrows as f64 * cell_size, cell_size, cell_size);
    Raster::uniform(nrows, ncols, transform, value)
}

/// Writes an executable shell script standing in for a solver. The script
/// runs `body` in the model workspace and exits with `exit_code`.
///
/// # Errors
///
/// Returns an IO error if the script cannot be written.
#[cfg(unix)]
pub fn write_stub_solver(
    dir: &std::path::Path,
    name: &str,
    body: &str,
    exit_code: i32,
) -> std::io::Result<std::path::PathBuf> {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "#!/bin/sh\n{body}\nexit {exit_code}")?;
    file.sync_all()?;
    drop(file);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_raster_extent() {
        let raster = uniform_raster(4, 5, 10.0, (100.0, 200.0), 3.0).unwrap();
        assert_eq!(raster.bounds(), (100.0, 200.0, 150.0, 240.0));
        assert_eq!(raster.value_at(3, 4), Some(3.0));
    }

    #[test]
    fn test_configs() {
        let config = explicit_grid_config(10, 10, 100.0);
        assert_eq!(config["grid"]["nrow"], 10);
        let config = dem_grid_config("dem.asc", 50.0);
        assert_eq!(config["dis"]["regrid_top_from_dem"], true);
    }
}
