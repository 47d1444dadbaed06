//! The structured model grid.

use crate::errors::ConfigurationError;
use crate::geo::{polygon::Vertex, Crs};
use ndarray::Array3;

/// Geometry inputs for a structured grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    /// Number of layers.
    pub nlay: usize,
    /// Column widths along a row (length = ncol).
    pub delr: Vec<f64>,
    /// Row heights along a column (length = nrow).
    pub delc: Vec<f64>,
    /// World x of the lower-left grid corner.
    pub xoff: f64,
    /// World y of the lower-left grid corner.
    pub yoff: f64,
    /// Counter-clockwise rotation in degrees about the lower-left corner.
    pub rotation: f64,
    /// Coordinate reference of the world coordinates.
    pub crs: Option<Crs>,
}

/// An immutable structured grid with its active-cell mask.
///
/// Rows count from the top (north edge in an unrotated grid); columns count
/// from the left.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    geometry: GridGeometry,
    dem: Option<String>,
    active: Array3<bool>,
    x_edges: Vec<f64>,
    y_edges: Vec<f64>,
}

impl Grid {
    /// Creates a grid with every cell active.
    ///
    /// # Errors
    ///
    /// Returns an error for empty dimensions or non-positive spacing.
    pub fn new(geometry: GridGeometry) -> Result<Self, ConfigurationError> {
        validate_geometry(&geometry)?;

        let nrow = geometry.delc.len();
        let ncol = geometry.delr.len();
        let active = Array3::from_elem((geometry.nlay, nrow, ncol), true);

        let mut x_edges = Vec::with_capacity(ncol + 1);
        x_edges.push(0.0);
        for width in &geometry.delr {
            x_edges.push(x_edges[x_edges.len() - 1] + width);
        }

        // Local y measured upward from the lower-left corner, indexed by row edge from the top.
        let height: f64 = geometry.delc.iter().sum();
        let mut y_edges = Vec::with_capacity(nrow + 1);
        y_edges.push(height);
        for h in &geometry.delc {
            y_edges.push(y_edges[y_edges.len() - 1] - h);
        }

        Ok(Self {
            geometry,
            dem: None,
            active,
            x_edges,
            y_edges,
        })
    }

    /// Records the DEM this grid was derived from or will regrid from.
    #[must_use]
    pub fn with_dem(mut self, dem: impl Into<String>) -> Self {
        self.dem = Some(dem.into());
        self
    }

    /// Replaces the active mask.
    ///
    /// # Errors
    ///
    /// Returns an error if the mask shape differs from (nlay, nrow, ncol).
    pub fn with_active(mut self, active: Array3<bool>) -> Result<Self, ConfigurationError> {
        if active.dim() != self.shape() {
            return Err(ConfigurationError::new(format!(
                "active mask shape {:?} does not match grid shape {:?}",
                active.dim(),
                self.shape()
            ))
            .for_stage("grid")
            .with_option("active"));
        }
        self.active = active;
        Ok(self)
    }

    /// The geometry inputs.
    #[must_use]
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Number of layers.
    #[must_use]
    pub fn nlay(&self) -> usize {
        self.geometry.nlay
    }

    /// Number of rows.
    #[must_use]
    pub fn nrow(&self) -> usize {
        self.geometry.delc.len()
    }

    /// Number of columns.
    #[must_use]
    pub fn ncol(&self) -> usize {
        self.geometry.delr.len()
    }

    /// (nlay, nrow, ncol).
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.nlay(), self.nrow(), self.ncol())
    }

    /// Column widths.
    #[must_use]
    pub fn delr(&self) -> &[f64] {
        &self.geometry.delr
    }

    /// Row heights.
    #[must_use]
    pub fn delc(&self) -> &[f64] {
        &self.geometry.delc
    }

    /// Rotation in degrees.
    #[must_use]
    pub fn rotation(&self) -> f64 {
        self.geometry.rotation
    }

    /// Lower-left corner in world coordinates.
    #[must_use]
    pub fn origin(&self) -> (f64, f64) {
        (self.geometry.xoff, self.geometry.yoff)
    }

    /// Coordinate reference.
    #[must_use]
    pub fn crs(&self) -> Option<Crs> {
        self.geometry.crs
    }

    /// DEM source path, if any.
    #[must_use]
    pub fn dem(&self) -> Option<&str> {
        self.dem.as_deref()
    }

    /// Active-cell mask of shape (nlay, nrow, ncol).
    #[must_use]
    pub fn active(&self) -> &Array3<bool> {
        &self.active
    }

    /// Returns true if the cell participates in the simulation.
    #[must_use]
    pub fn is_active(&self, layer: usize, row: usize, col: usize) -> bool {
        self.active.get((layer, row, col)).copied().unwrap_or(false)
    }

    /// Number of active cells over all layers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }

    /// Total width along rows.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.x_edges[self.x_edges.len() - 1]
    }

    /// Total height along columns.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.y_edges[0]
    }

    /// Returns true if all rows and columns share one spacing.
    #[must_use]
    pub fn is_uniform(&self) -> bool {
        let same = |v: &[f64]| v.windows(2).all(|w| (w[0] - w[1]).abs() < 1e-12);
        same(&self.geometry.delr) && same(&self.geometry.delc)
    }

    /// Maps local grid coordinates to world coordinates.
    #[must_use]
    pub fn local_to_world(&self, lx: f64, ly: f64) -> (f64, f64) {
        let theta = self.geometry.rotation.to_radians();
        let (sin, cos) = theta.sin_cos();
        (
            self.geometry.xoff + lx * cos - ly * sin,
            self.geometry.yoff + lx * sin + ly * cos,
        )
    }

    /// Maps world coordinates to local grid coordinates.
    #[must_use]
    pub fn world_to_local(&self, x: f64, y: f64) -> (f64, f64) {
        let theta = self.geometry.rotation.to_radians();
        let (sin, cos) = theta.sin_cos();
        let dx = x - self.geometry.xoff;
        let dy = y - self.geometry.yoff;
        (dx * cos + dy * sin, -dx * sin + dy * cos)
    }

    /// Cell center in world coordinates.
    #[must_use]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let lx = (self.x_edges[col] + self.x_edges[col + 1]) / 2.0;
        let ly = (self.y_edges[row] + self.y_edges[row + 1]) / 2.0;
        self.local_to_world(lx, ly)
    }

    /// Cell corners in world coordinates, counter-clockwise from lower-left.
    #[must_use]
    pub fn cell_polygon(&self, row: usize, col: usize) -> [Vertex; 4] {
        let (x0, x1) = (self.x_edges[col], self.x_edges[col + 1]);
        let (y_top, y_bottom) = (self.y_edges[row], self.y_edges[row + 1]);
        [
            self.local_to_world(x0, y_bottom),
            self.local_to_world(x1, y_bottom),
            self.local_to_world(x1, y_top),
            self.local_to_world(x0, y_top),
        ]
    }

    /// World bounding box as `(x_min, y_min, x_max, y_max)`.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let corners = [
            self.local_to_world(0.0, 0.0),
            self.local_to_world(self.width(), 0.0),
            self.local_to_world(self.width(), self.height()),
            self.local_to_world(0.0, self.height()),
        ];
        crate::geo::polygon::bounding_box(&corners)
    }
}

fn validate_geometry(geometry: &GridGeometry) -> Result<(), ConfigurationError> {
    let err = |option: &str, message: String| {
        ConfigurationError::new(message).for_stage("grid").with_option(option)
    };

    if geometry.nlay == 0 {
        return Err(err("nlay", "nlay must be at least 1".to_string()));
    }
    if geometry.delr.is_empty() || geometry.delc.is_empty() {
        return Err(err("nrow", "grid must have at least one row and one column".to_string()));
    }
    for (option, spacing) in [("delr", &geometry.delr), ("delc", &geometry.delc)] {
        if let Some((i, v)) = spacing.iter().enumerate().find(|(_, v)| !(v.is_finite() && **v > 0.0)) {
            return Err(err(option, format!("{option}[{i}] must be positive and finite, got {v}")));
        }
    }
    for (option, value) in [
        ("xoff", geometry.xoff),
        ("yoff", geometry.yoff),
        ("rotation", geometry.rotation),
    ] {
        if !value.is_finite() {
            return Err(err(option, format!("{option} must be finite")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(rotation: f64) -> GridGeometry {
        GridGeometry {
            nlay: 2,
            delr: vec![100.0; 4],
            delc: vec![50.0; 3],
            xoff: 1000.0,
            yoff: 2000.0,
            rotation,
            crs: None,
        }
    }

    #[test]
    fn test_unrotated_centers() {
        let grid = Grid::new(geometry(0.0)).unwrap();
        assert_eq!(grid.shape(), (2, 3, 4));
        // Row 0 is the top row.
        assert_eq!(grid.cell_center(0, 0), (1050.0, 2125.0));
        assert_eq!(grid.cell_center(2, 3), (1350.0, 2025.0));
        assert_eq!(grid.bounds(), (1000.0, 2000.0, 1400.0, 2150.0));
    }

    #[test]
    fn test_rotated_corner() {
        let grid = Grid::new(geometry(90.0)).unwrap();
        let polygon = grid.cell_polygon(2, 0);
        // Lower-left corner of the bottom-left cell stays at the origin.
        assert!((polygon[0].0 - 1000.0).abs() < 1e-9);
        assert!((polygon[0].1 - 2000.0).abs() < 1e-9);
        // Local +x points to world +y after a 90 degree rotation.
        assert!((polygon[1].0 - 1000.0).abs() < 1e-9);
        assert!((polygon[1].1 - 2100.0).abs() < 1e-9);
    }

    #[test]
    fn test_world_local_roundtrip() {
        let grid = Grid::new(geometry(33.0)).unwrap();
        let (x, y) = grid.local_to_world(123.0, 45.0);
        let (lx, ly) = grid.world_to_local(x, y);
        assert!((lx - 123.0).abs() < 1e-9);
        assert!((ly - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_bad_spacing() {
        let mut g = geometry(0.0);
        g.delr[1] = -5.0;
        let err = Grid::new(g).unwrap_err();
        assert_eq!(err.option.as_deref(), Some("delr"));

        let mut g = geometry(0.0);
        g.nlay = 0;
        assert!(Grid::new(g).is_err());
    }

    #[test]
    fn test_with_active_shape_mismatch() {
        let grid = Grid::new(geometry(0.0)).unwrap();
        assert!(grid.with_active(Array3::from_elem((1, 3, 4), true)).is_err());
    }

    #[test]
    fn test_all_active_by_default() {
        let grid = Grid::new(geometry(0.0)).unwrap();
        assert_eq!(grid.active_count(), 24);
        assert!(grid.is_uniform());
    }
}
