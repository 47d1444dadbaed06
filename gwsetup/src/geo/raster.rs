//! Georeferenced raster values.

use super::Crs;
use crate::errors::ResamplingError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Affine pixel-to-world transform in GDAL coefficient order.
///
/// `x = c[0] + col * c[1] + row * c[2]`, `y = c[3] + col * c[4] + row * c[5]`,
/// where `(col, row)` are continuous pixel coordinates with `(0, 0)` at the
/// outer corner of the first pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    coefficients: [f64; 6],
}

impl GeoTransform {
    /// Creates a transform from GDAL's six coefficients.
    #[must_use]
    pub const fn from_gdal(coefficients: [f64; 6]) -> Self {
        Self { coefficients }
    }

    /// A north-up transform with the upper-left corner at `(x_min, y_max)`.
    #[must_use]
    pub const fn north_up(x_min: f64, y_max: f64, cell_width: f64, cell_height: f64) -> Self {
        Self::from_gdal([x_min, cell_width, 0.0, y_max, 0.0, -cell_height])
    }

    /// The GDAL coefficients.
    #[must_use]
    pub const fn coefficients(&self) -> [f64; 6] {
        self.coefficients
    }

    fn determinant(&self) -> f64 {
        let c = &self.coefficients;
        c[1] * c[5] - c[2] * c[4]
    }

    /// Returns true if the transform can be inverted.
    #[must_use]
    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det.abs() > f64::EPSILON
    }

    /// Maps continuous pixel coordinates to world coordinates.
    #[must_use]
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let c = &self.coefficients;
        (c[0] + col * c[1] + row * c[2], c[3] + col * c[4] + row * c[5])
    }

    /// Maps world coordinates to continuous pixel coordinates.
    ///
    /// Returns `None` when the transform is singular.
    #[must_use]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !self.is_invertible() {
            return None;
        }
        let c = &self.coefficients;
        let det = self.determinant();
        let dx = x - c[0];
        let dy = y - c[3];
        let col = (c[5] * dx - c[2] * dy) / det;
        let row = (c[1] * dy - c[4] * dx) / det;
        Some((col, row))
    }
}

/// A read-only 2-D raster with its georeference.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    values: Array2<f64>,
    transform: GeoTransform,
    crs: Option<Crs>,
    nodata: Option<f64>,
}

impl Raster {
    /// Creates a raster from row-major values.
    ///
    /// # Errors
    ///
    /// Returns an error if the raster is empty or the transform is singular.
    pub fn new(values: Array2<f64>, transform: GeoTransform) -> Result<Self, ResamplingError> {
        if values.is_empty() {
            return Err(ResamplingError::new("raster has no cells"));
        }
        if !transform.is_invertible() {
            return Err(ResamplingError::new("raster geotransform is singular"));
        }
        Ok(Self {
            values,
            transform,
            crs: None,
            nodata: None,
        })
    }

    /// Creates a raster filled with a single value.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is empty or the transform is singular.
    pub fn uniform(
        nrows: usize,
        ncols: usize,
        transform: GeoTransform,
        value: f64,
    ) -> Result<Self, ResamplingError> {
        Self::new(Array2::from_elem((nrows, ncols), value), transform)
    }

    /// Sets the coordinate reference.
    #[must_use]
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    /// Sets the nodata sentinel.
    #[must_use]
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// The raw values.
    #[must_use]
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// The geotransform.
    #[must_use]
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// The coordinate reference, if known.
    #[must_use]
    pub fn crs(&self) -> Option<Crs> {
        self.crs
    }

    /// The nodata sentinel, if any.
    #[must_use]
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Number of raster rows.
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of raster columns.
    #[must_use]
    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// Returns true if `value` is the nodata sentinel or NaN.
    #[must_use]
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nd| (value - nd).abs() < 1e-10)
    }

    /// The value at a pixel, or `None` if out of range or nodata.
    #[must_use]
    pub fn value_at(&self, row: usize, col: usize) -> Option<f64> {
        let value = *self.values.get((row, col))?;
        (!self.is_nodata(value)).then_some(value)
    }

    /// World bounding box as `(x_min, y_min, x_max, y_max)`.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (nr, nc) = (self.nrows() as f64, self.ncols() as f64);
        let corners = [
            self.transform.pixel_to_world(0.0, 0.0),
            self.transform.pixel_to_world(nc, 0.0),
            self.transform.pixel_to_world(0.0, nr),
            self.transform.pixel_to_world(nc, nr),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_north_up_roundtrip() {
        let gt = GeoTransform::north_up(1000.0, 5000.0, 30.0, 30.0);
        let (x, y) = gt.pixel_to_world(2.5, 4.0);
        assert_eq!((x, y), (1075.0, 4880.0));

        let (col, row) = gt.world_to_pixel(x, y).unwrap();
        assert!((col - 2.5).abs() < 1e-12);
        assert!((row - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_transform() {
        let gt = GeoTransform::from_gdal([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(gt.world_to_pixel(1.0, 1.0).is_none());
        assert!(Raster::uniform(2, 2, gt, 1.0).is_err());
    }

    #[test]
    fn test_value_at_respects_nodata() {
        let gt = GeoTransform::north_up(0.0, 2.0, 1.0, 1.0);
        let values = Array2::from_shape_vec((2, 2), vec![1.0, -9999.0, f64::NAN, 4.0]).unwrap();
        let raster = Raster::new(values, gt).unwrap().with_nodata(-9999.0);

        assert_eq!(raster.value_at(0, 0), Some(1.0));
        assert_eq!(raster.value_at(0, 1), None);
        assert_eq!(raster.value_at(1, 0), None);
        assert_eq!(raster.value_at(5, 5), None);
    }

    #[test]
    fn test_bounds() {
        let raster = Raster::uniform(3, 4, GeoTransform::north_up(10.0, 50.0, 5.0, 5.0), 0.0).unwrap();
        assert_eq!(raster.bounds(), (10.0, 35.0, 30.0, 50.0));
    }
}
