//! Spatial discretization stage: model top, layer bottoms and idomain.

use super::{BuildContext, PackageBuilder};
use crate::config::{DisOptions, Values};
use crate::core::{Grid, Package, SpatialDiscretization};
use crate::errors::Result;
use crate::geo::RasterResampler;
use ndarray::{Array2, Array3};

/// Layer thickness used when neither `botm` nor `thickness` is configured.
const DEFAULT_THICKNESS: f64 = 10.0;

/// Builds DIS arrays on the grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisBuilder;

impl PackageBuilder for DisBuilder {
    fn name(&self) -> &str {
        "dis"
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Package> {
        let opts: DisOptions = ctx.options()?;
        let grid = ctx.grid()?;

        let top = model_top(&opts, &grid, ctx)?;
        let botm = layer_bottoms(&opts, &grid, top.as_ref(), ctx)?;
        check_thickness(&grid, top.as_ref(), &botm, ctx)?;

        let idomain = grid.active().mapv(i32::from);
        Ok(Package::Dis(SpatialDiscretization {
            grid,
            top,
            botm,
            idomain,
            length_units: opts.length_units,
        }))
    }
}

fn model_top(opts: &DisOptions, grid: &Grid, ctx: &BuildContext<'_>) -> Result<Option<Array2<f64>>> {
    let sources = usize::from(opts.top.is_some())
        + usize::from(opts.regrid_top_from_dem)
        + usize::from(opts.top_raster.is_some());
    if sources > 1 {
        return Err(ctx.error("top", "set only one of top, regrid_top_from_dem and top_raster"));
    }

    let (path, method, fill) = if let Some(r) = &opts.top_raster {
        (r.path.as_str(), r.method, r.fill)
    } else if opts.regrid_top_from_dem {
        let Some(dem) = grid.dem() else {
            return Err(ctx.error("regrid_top_from_dem", "the grid has no dem to regrid"));
        };
        (dem, opts.dem_method, None)
    } else {
        return Ok(opts
            .top
            .map(|value| Array2::from_elem((grid.nrow(), grid.ncol()), value)));
    };

    let raster = ctx.raster(path)?;
    let mut resampler = RasterResampler::new(method);
    if let Some(fill) = fill {
        resampler = resampler.with_fill_value(fill);
    }
    let top = resampler.resample_grid(&raster, grid)?;
    tracing::debug!(
        stage = ctx.stage(),
        raster = path,
        method = ?method,
        "Resampled model top"
    );
    Ok(Some(top))
}

fn layer_bottoms(
    opts: &DisOptions,
    grid: &Grid,
    top: Option<&Array2<f64>>,
    ctx: &BuildContext<'_>,
) -> Result<Array3<f64>> {
    let (nlay, nrow, ncol) = grid.shape();

    match (&opts.botm, &opts.thickness) {
        (Some(_), Some(_)) => Err(ctx.error("botm", "set either botm or thickness, not both")),
        (Some(botm), None) => {
            if botm.len() != nlay {
                return Err(ctx.error("botm", format!("botm has {} values, expected {nlay}", botm.len())));
            }
            Ok(Array3::from_shape_fn((nlay, nrow, ncol), |(k, _, _)| botm[k]))
        }
        (None, thickness) => {
            let thickness = thickness
                .clone()
                .unwrap_or(Values::Scalar(DEFAULT_THICKNESS))
                .resolve(nlay, ctx.stage(), "thickness")?;
            // Without a top the layer stack hangs below elevation zero.
            let reference = |i: usize, j: usize| top.map_or(0.0, |t| t[[i, j]]);
            Ok(Array3::from_shape_fn((nlay, nrow, ncol), |(k, i, j)| {
                reference(i, j) - thickness[..=k].iter().sum::<f64>()
            }))
        }
    }
}

fn check_thickness(
    grid: &Grid,
    top: Option<&Array2<f64>>,
    botm: &Array3<f64>,
    ctx: &BuildContext<'_>,
) -> Result<()> {
    for ((k, i, j), bottom) in botm.indexed_iter() {
        if !grid.is_active(k, i, j) {
            continue;
        }
        let upper = if k == 0 {
            match top {
                Some(t) => t[[i, j]],
                None => continue,
            }
        } else {
            botm[[k - 1, i, j]]
        };
        if upper.is_nan() {
            return Err(ctx.error(
                "top",
                format!("model top is undefined at active cell (row {i}, column {j})"),
            ));
        }
        let thickness = upper - bottom;
        if !(thickness > 0.0) {
            return Err(ctx.error(
                "botm",
                format!(
                    "layer {k} has non-positive thickness {thickness} at active cell (row {i}, column {j})"
                ),
            ));
        }
    }
    Ok(())
}
