//! Resampling rasters onto model grid cells.
//!
//! Target geometries are always reprojected into the raster's CRS, never the
//! other way round, so raster values are sampled exactly as stored.

use super::crs::{builtin_transform, CoordinateTransform};
use super::polygon::{self, Vertex};
use super::{Crs, Raster};
use crate::core::Grid;
use crate::errors::ResamplingError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Minimum pixel-space area for a target polygon to be sampled.
const MIN_PIXEL_AREA: f64 = 1e-12;

/// How values are taken from the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    /// Area-weighted mean of the raster cells covered by each cell polygon.
    #[default]
    #[serde(alias = "mean")]
    AreaWeighted,
    /// Value of the raster cell containing each cell center.
    Nearest,
    /// Bilinear interpolation between raster cell centers at each cell center.
    #[serde(alias = "linear")]
    Bilinear,
}

/// The geometry sampled for one target.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetGeometry {
    /// A cell outline; sampled by area-weighted mean.
    Polygon(Vec<Vertex>),
    /// A point; sampled by nearest or bilinear per the resampler's method.
    Point(f64, f64),
}

/// One target with the cell identity used in error reports.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTarget {
    /// Grid row.
    pub row: usize,
    /// Grid column.
    pub column: usize,
    /// Geometry in the target CRS.
    pub geometry: TargetGeometry,
}

/// Samples a raster onto arbitrary target geometries.
///
/// The resampler holds no cache; the same inputs always give the same output.
#[derive(Debug, Clone)]
pub struct RasterResampler {
    method: ResampleMethod,
    fill_value: f64,
    transform: Option<Arc<dyn CoordinateTransform>>,
}

impl Default for RasterResampler {
    fn default() -> Self {
        Self::new(ResampleMethod::default())
    }
}

impl RasterResampler {
    /// Creates a resampler with NaN as the fill value.
    #[must_use]
    pub fn new(method: ResampleMethod) -> Self {
        Self {
            method,
            fill_value: f64::NAN,
            transform: None,
        }
    }

    /// Sets the value given to targets outside the raster or over nodata.
    #[must_use]
    pub fn with_fill_value(mut self, fill_value: f64) -> Self {
        self.fill_value = fill_value;
        self
    }

    /// Overrides the built-in reprojection with a caller-supplied transform
    /// from the target CRS into the raster CRS.
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn CoordinateTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// The sampling method.
    #[must_use]
    pub fn method(&self) -> ResampleMethod {
        self.method
    }

    /// Samples one value per target.
    ///
    /// # Errors
    ///
    /// Returns an error if the CRS pair cannot be reprojected, or if a target
    /// geometry is degenerate (the error names the cell).
    pub fn resample(
        &self,
        raster: &Raster,
        targets: &[SampleTarget],
        target_crs: Option<Crs>,
    ) -> Result<Vec<f64>, ResamplingError> {
        let builtin;
        let transform: &dyn CoordinateTransform = match &self.transform {
            Some(t) => t.as_ref(),
            None => {
                builtin = builtin_transform(target_crs, raster.crs())?;
                builtin.as_ref()
            }
        };

        targets
            .iter()
            .map(|target| self.sample_one(raster, target, transform))
            .collect()
    }

    /// Samples the raster onto every cell of a grid.
    ///
    /// Area-weighted sampling uses cell polygons; the point methods use cell
    /// centers.
    ///
    /// # Errors
    ///
    /// See [`RasterResampler::resample`].
    pub fn resample_grid(&self, raster: &Raster, grid: &Grid) -> Result<Array2<f64>, ResamplingError> {
        let mut targets = Vec::with_capacity(grid.nrow() * grid.ncol());
        for row in 0..grid.nrow() {
            for column in 0..grid.ncol() {
                let geometry = match self.method {
                    ResampleMethod::AreaWeighted => {
                        TargetGeometry::Polygon(grid.cell_polygon(row, column).to_vec())
                    }
                    ResampleMethod::Nearest | ResampleMethod::Bilinear => {
                        let (x, y) = grid.cell_center(row, column);
                        TargetGeometry::Point(x, y)
                    }
                };
                targets.push(SampleTarget { row, column, geometry });
            }
        }

        let values = self.resample(raster, &targets, grid.crs())?;
        Array2::from_shape_vec((grid.nrow(), grid.ncol()), values)
            .map_err(|e| ResamplingError::new(format!("output shape mismatch: {e}")))
    }

    fn sample_one(
        &self,
        raster: &Raster,
        target: &SampleTarget,
        transform: &dyn CoordinateTransform,
    ) -> Result<f64, ResamplingError> {
        let to_pixel = |x: f64, y: f64| -> Result<Vertex, ResamplingError> {
            if !(x.is_finite() && y.is_finite()) {
                return Err(ResamplingError::new(format!("non-finite coordinate ({x}, {y})"))
                    .at_cell(target.row, target.column));
            }
            let (rx, ry) = transform
                .transform(x, y)
                .map_err(|e| ResamplingError { cell: Some((target.row, target.column)), ..e })?;
            raster
                .transform()
                .world_to_pixel(rx, ry)
                .ok_or_else(|| ResamplingError::new("raster geotransform is singular"))
        };

        match &target.geometry {
            TargetGeometry::Polygon(vertices) => {
                let pixel_polygon = vertices
                    .iter()
                    .map(|&(x, y)| to_pixel(x, y))
                    .collect::<Result<Vec<_>, _>>()?;
                if polygon::polygon_area(&pixel_polygon) < MIN_PIXEL_AREA {
                    return Err(ResamplingError::new("target polygon has zero area")
                        .at_cell(target.row, target.column));
                }
                Ok(self.area_weighted(raster, &pixel_polygon))
            }
            TargetGeometry::Point(x, y) => {
                let (col, row) = to_pixel(*x, *y)?;
                Ok(match self.method {
                    ResampleMethod::Bilinear => self.bilinear(raster, col, row),
                    ResampleMethod::AreaWeighted | ResampleMethod::Nearest => {
                        self.nearest(raster, col, row)
                    }
                })
            }
        }
    }

    fn area_weighted(&self, raster: &Raster, pixel_polygon: &[Vertex]) -> f64 {
        let (c_min, r_min, c_max, r_max) = polygon::bounding_box(pixel_polygon);
        let (nrows, ncols) = (raster.nrows() as f64, raster.ncols() as f64);
        if c_max <= 0.0 || r_max <= 0.0 || c_min >= ncols || r_min >= nrows {
            return self.fill_value;
        }

        let c0 = c_min.floor().max(0.0) as usize;
        let c1 = c_max.ceil().min(ncols) as usize;
        let r0 = r_min.floor().max(0.0) as usize;
        let r1 = r_max.ceil().min(nrows) as usize;

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for row in r0..r1 {
            for col in c0..c1 {
                let Some(value) = raster.value_at(row, col) else {
                    continue;
                };
                let (x, y) = (col as f64, row as f64);
                let overlap = polygon::polygon_area(&polygon::clip_to_rect(
                    pixel_polygon,
                    x,
                    y,
                    x + 1.0,
                    y + 1.0,
                ));
                if overlap > 0.0 {
                    weighted_sum += overlap * value;
                    total_weight += overlap;
                }
            }
        }

        if total_weight > 0.0 {
            weighted_sum / total_weight
        } else {
            self.fill_value
        }
    }

    fn nearest(&self, raster: &Raster, col: f64, row: f64) -> f64 {
        if col < 0.0 || row < 0.0 {
            return self.fill_value;
        }
        raster
            .value_at(row.floor() as usize, col.floor() as usize)
            .unwrap_or(self.fill_value)
    }

    fn bilinear(&self, raster: &Raster, col: f64, row: f64) -> f64 {
        let (nrows, ncols) = (raster.nrows(), raster.ncols());
        if col < 0.0 || row < 0.0 || col > ncols as f64 || row > nrows as f64 {
            return self.fill_value;
        }

        // Pixel centers sit at half-integer coordinates.
        let u = (col - 0.5).clamp(0.0, (ncols - 1) as f64);
        let v = (row - 0.5).clamp(0.0, (nrows - 1) as f64);
        let c0 = u.floor() as usize;
        let r0 = v.floor() as usize;
        let c1 = (c0 + 1).min(ncols - 1);
        let r1 = (r0 + 1).min(nrows - 1);
        let fu = u - c0 as f64;
        let fv = v - r0 as f64;

        let corners = [
            (r0, c0, (1.0 - fu) * (1.0 - fv)),
            (r0, c1, fu * (1.0 - fv)),
            (r1, c0, (1.0 - fu) * fv),
            (r1, c1, fu * fv),
        ];
        let (sum, weight) = corners.iter().fold((0.0, 0.0), |(s, w), &(r, c, wt)| {
            match raster.value_at(r, c) {
                Some(value) if wt > 0.0 => (s + wt * value, w + wt),
                _ => (s, w),
            }
        });

        if weight > 0.0 {
            sum / weight
        } else {
            self.fill_value
        }
    }
}
