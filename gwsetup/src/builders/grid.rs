//! Grid stage.

use super::{BuildContext, PackageBuilder};
use crate::config::{GridOptions, MaskArray, MaskOptions, MaskPropagation, Values};
use crate::core::{Grid, GridGeometry, Package};
use crate::errors::{ConfigurationError, ErrorInfo, ErrorSuggestions, Result};
use crate::geo::polygon::{self, Vertex};
use ndarray::{Array2, Array3};
use std::sync::Arc;

/// Tolerance when rounding a DEM extent up to whole cells.
const EXTENT_TOLERANCE: f64 = 1e-9;

/// Upper bound on rows or columns derived from a DEM extent.
const MAX_DERIVED_CELLS: usize = 1_000_000;

/// Builds the spatial grid from explicit geometry or a DEM extent.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridBuilder;

impl PackageBuilder for GridBuilder {
    fn name(&self) -> &str {
        "grid"
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Package> {
        let opts: GridOptions = ctx.options()?;
        check_grid_options(&opts)?;

        let geometry = if opts.has_explicit_geometry() {
            explicit_geometry(&opts, ctx.stage())?
        } else {
            dem_geometry(&opts, ctx)?
        };

        let mut grid = Grid::new(geometry)?;
        if let Some(dem) = &opts.dem {
            grid = grid.with_dem(dem.clone());
        }
        if let Some(mask) = &opts.active {
            let active = build_mask(&grid, mask)?;
            grid = grid.with_active(active)?;
        }

        tracing::debug!(
            stage = ctx.stage(),
            nlay = grid.nlay(),
            nrow = grid.nrow(),
            ncol = grid.ncol(),
            active = grid.active_count(),
            "Grid built"
        );
        Ok(Package::Grid(Arc::new(grid)))
    }
}

/// Checks that the grid block names a usable geometry source and that mask
/// options are unambiguous. Runs before any array work.
///
/// # Errors
///
/// Returns a configuration error without a stage scope when no grid source
/// exists, since that makes the whole model unbuildable.
pub fn check_grid_options(opts: &GridOptions) -> std::result::Result<(), ConfigurationError> {
    if !opts.has_explicit_geometry() && !opts.has_dem_source() {
        let code = "SETUP-001-NO_GRID_SOURCE";
        let mut info = ErrorInfo::new(code, "No grid geometry source").with_context_entry("stage", "grid");
        if let Some(hint) = ErrorSuggestions::get(code) {
            info = info.with_fix_hint(hint);
        }
        return Err(ConfigurationError::new(
            "grid needs explicit geometry (nrow, ncol, delr, delc) or a dem with delr and delc",
        )
        .with_error_info(info));
    }

    for (option, spacing) in [("delr", &opts.delr), ("delc", &opts.delc)] {
        let values: &[f64] = match spacing {
            Some(Values::Scalar(v)) => std::slice::from_ref(v),
            Some(Values::PerIndex(values)) => values,
            None => &[],
        };
        if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(ConfigurationError::new(format!("{option} must be positive and finite, got {bad}"))
                .for_stage("grid")
                .with_option(option));
        }
    }

    if let Some(mask) = &opts.active {
        if mask.array.is_some() && mask.polygon.is_some() {
            return Err(ConfigurationError::new("active mask takes either an array or a polygon, not both")
                .for_stage("grid")
                .with_option("active"));
        }
        let two_dimensional = matches!(mask.array, Some(MaskArray::Single(_))) || mask.polygon.is_some();
        if two_dimensional && mask.propagation.is_none() {
            let code = "SETUP-004-MASK_PROPAGATION";
            let mut info = ErrorInfo::new(code, "2-D mask without a propagation rule");
            if let Some(hint) = ErrorSuggestions::get(code) {
                info = info.with_fix_hint(hint);
            }
            return Err(ConfigurationError::new(
                "a 2-D active mask needs propagation: replicate or top_layer_only",
            )
            .for_stage("grid")
            .with_option("active.propagation")
            .with_error_info(info));
        }
    }
    Ok(())
}

fn explicit_geometry(opts: &GridOptions, stage: &str) -> Result<GridGeometry> {
    let (Some(nrow), Some(ncol), Some(delr), Some(delc)) = (opts.nrow, opts.ncol, &opts.delr, &opts.delc) else {
        return Err(ConfigurationError::new("incomplete grid geometry").for_stage(stage).into());
    };
    Ok(GridGeometry {
        nlay: opts.nlay,
        delr: delr.resolve(ncol, stage, "delr")?,
        delc: delc.resolve(nrow, stage, "delc")?,
        xoff: opts.xoff,
        yoff: opts.yoff,
        rotation: opts.rotation,
        crs: opts.crs,
    })
}

fn dem_geometry(opts: &GridOptions, ctx: &BuildContext<'_>) -> Result<GridGeometry> {
    let stage = ctx.stage();
    let (Some(dem), Some(delr), Some(delc)) = (&opts.dem, &opts.delr, &opts.delc) else {
        return Err(ConfigurationError::new("dem-derived grid needs dem, delr and delc")
            .for_stage(stage)
            .into());
    };
    let raster = ctx.raster(dem)?;
    let (x_min, y_min, x_max, y_max) = raster.bounds();

    let count = |spacing: &Values, extent: f64, explicit: Option<usize>, option: &str| -> Result<usize> {
        match (explicit, spacing) {
            (Some(n), _) => Ok(n),
            (None, Values::PerIndex(values)) => Ok(values.len()),
            (None, Values::Scalar(d)) => {
                let cells = ((extent / d) - EXTENT_TOLERANCE).ceil().max(1.0);
                if !cells.is_finite() || cells > MAX_DERIVED_CELLS as f64 {
                    return Err(ctx.error(
                        option,
                        format!("{option} of {d} gives {cells} cells across the dem extent of {extent}"),
                    ));
                }
                Ok(cells as usize)
            }
        }
    };
    let ncol = count(delr, x_max - x_min, opts.ncol, "delr")?;
    let nrow = count(delc, y_max - y_min, opts.nrow, "delc")?;

    Ok(GridGeometry {
        nlay: opts.nlay,
        delr: delr.resolve(ncol, stage, "delr")?,
        delc: delc.resolve(nrow, stage, "delc")?,
        xoff: x_min,
        yoff: y_min,
        rotation: 0.0,
        crs: opts.crs.or(raster.crs()),
    })
}

fn build_mask(grid: &Grid, mask: &MaskOptions) -> Result<Array3<bool>> {
    let (nlay, nrow, ncol) = grid.shape();
    let shape_error = |found: String, expected: String| -> crate::errors::SetupError {
        ConfigurationError::new(format!("active mask shape {found} does not match grid {expected}"))
            .for_stage("grid")
            .with_option("active.array")
            .into()
    };

    let layer0: Array2<bool> = match (&mask.array, &mask.polygon) {
        (Some(MaskArray::Layered(layers)), _) => {
            if layers.len() != nlay
                || layers.iter().any(|l| l.len() != nrow || l.iter().any(|r| r.len() != ncol))
            {
                return Err(shape_error(
                    format!("{}x?x?", layers.len()),
                    format!("{nlay}x{nrow}x{ncol}"),
                ));
            }
            return Ok(Array3::from_shape_fn((nlay, nrow, ncol), |(k, i, j)| layers[k][i][j] != 0));
        }
        (Some(MaskArray::Single(rows)), _) => {
            if rows.len() != nrow || rows.iter().any(|r| r.len() != ncol) {
                return Err(shape_error(format!("{}x?", rows.len()), format!("{nrow}x{ncol}")));
            }
            Array2::from_shape_fn((nrow, ncol), |(i, j)| rows[i][j] != 0)
        }
        (None, Some(points)) => {
            let poly: Vec<Vertex> = points.iter().map(|p| (p[0], p[1])).collect();
            if poly.len() < 3 {
                return Err(ConfigurationError::new("active polygon needs at least 3 vertices")
                    .for_stage("grid")
                    .with_option("active.polygon")
                    .into());
            }
            Array2::from_shape_fn((nrow, ncol), |(i, j)| {
                let (x, y) = grid.cell_center(i, j);
                polygon::contains_point(&poly, x, y)
            })
        }
        (None, None) => return Ok(Array3::from_elem((nlay, nrow, ncol), true)),
    };

    let Some(propagation) = mask.propagation else {
        return Err(ConfigurationError::new("a 2-D active mask needs propagation")
            .for_stage("grid")
            .with_option("active.propagation")
            .into());
    };
    Ok(Array3::from_shape_fn((nlay, nrow, ncol), |(k, i, j)| match propagation {
        MaskPropagation::Replicate => layer0[[i, j]],
        MaskPropagation::TopLayerOnly => k > 0 || layer0[[i, j]],
    }))
}
