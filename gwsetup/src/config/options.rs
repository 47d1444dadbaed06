//! Typed option blocks, one per stage.
//!
//! Every struct tolerates unknown keys so remake flags and pass-through
//! settings can live in the same block.

use crate::errors::ConfigurationError;
use crate::geo::{Crs, ResampleMethod};
use crate::core::SaveFrequency;
use serde::{Deserialize, Serialize};

/// A scalar applied to every index, or one value per index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    /// Same value everywhere.
    Scalar(f64),
    /// One value per index.
    PerIndex(Vec<f64>),
}

impl Values {
    /// Expands to exactly `n` values.
    ///
    /// # Errors
    ///
    /// Returns an error if a list has the wrong length.
    pub fn resolve(&self, n: usize, stage: &str, option: &str) -> Result<Vec<f64>, ConfigurationError> {
        match self {
            Self::Scalar(v) => Ok(vec![*v; n]),
            Self::PerIndex(values) if values.len() == n => Ok(values.clone()),
            Self::PerIndex(values) => Err(ConfigurationError::new(format!(
                "{option} has {} values, expected {n}",
                values.len()
            ))
            .for_stage(stage)
            .with_option(option)),
        }
    }
}

/// Grid construction options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    /// Number of rows; derived from the DEM extent when absent.
    pub nrow: Option<usize>,
    /// Number of columns; derived from the DEM extent when absent.
    pub ncol: Option<usize>,
    /// Number of layers.
    pub nlay: usize,
    /// Column widths.
    pub delr: Option<Values>,
    /// Row heights.
    pub delc: Option<Values>,
    /// Lower-left x.
    pub xoff: f64,
    /// Lower-left y.
    pub yoff: f64,
    /// Rotation in degrees counter-clockwise.
    pub rotation: f64,
    /// Coordinate reference of the grid.
    pub crs: Option<Crs>,
    /// DEM raster path.
    pub dem: Option<String>,
    /// Active-cell mask source.
    pub active: Option<MaskOptions>,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            nrow: None,
            ncol: None,
            nlay: 1,
            delr: None,
            delc: None,
            xoff: 0.0,
            yoff: 0.0,
            rotation: 0.0,
            crs: None,
            dem: None,
            active: None,
        }
    }
}

impl GridOptions {
    /// Returns true if the block fully specifies the grid shape.
    #[must_use]
    pub fn has_explicit_geometry(&self) -> bool {
        self.nrow.is_some() && self.ncol.is_some() && self.delr.is_some() && self.delc.is_some()
    }

    /// Returns true if the grid can be derived from a DEM extent.
    #[must_use]
    pub fn has_dem_source(&self) -> bool {
        self.dem.is_some() && self.delr.is_some() && self.delc.is_some()
    }
}

/// A mask array as read from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskArray {
    /// One 0/1 array per layer.
    Layered(Vec<Vec<Vec<i64>>>),
    /// A single 0/1 array that needs a propagation rule.
    Single(Vec<Vec<i64>>),
}

/// How a 2-D mask applies to deeper layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPropagation {
    /// Every layer gets the same mask.
    Replicate,
    /// Only layer 0 is masked; deeper layers stay active.
    TopLayerOnly,
}

/// Active-cell mask source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskOptions {
    /// Inline mask array.
    pub array: Option<MaskArray>,
    /// Polygon in model CRS; cells with centers inside are active.
    pub polygon: Option<Vec<[f64; 2]>>,
    /// Required when the source is two-dimensional.
    pub propagation: Option<MaskPropagation>,
}

/// Temporal discretization options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TdisOptions {
    /// Time units name.
    pub time_units: String,
    /// Stress periods.
    pub periods: Vec<PeriodOptions>,
}

impl Default for TdisOptions {
    fn default() -> Self {
        Self {
            time_units: "days".to_string(),
            periods: vec![PeriodOptions {
                perlen: 1.0,
                nstp: 1,
                tsmult: 1.0,
                steady: Some(true),
            }],
        }
    }
}

/// One stress period as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodOptions {
    /// Period length.
    pub perlen: f64,
    /// Time steps.
    #[serde(default = "default_nstp")]
    pub nstp: usize,
    /// Time-step multiplier.
    #[serde(default = "default_tsmult")]
    pub tsmult: f64,
    /// Steady state; defaults to true for the first period only.
    #[serde(default)]
    pub steady: Option<bool>,
}

fn default_nstp() -> usize {
    1
}

fn default_tsmult() -> f64 {
    1.0
}

/// A raster reference inside an option block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterRef {
    /// Path as known to the raster store.
    pub path: String,
    /// Resampling method.
    #[serde(default)]
    pub method: ResampleMethod,
    /// Value for cells outside the raster.
    #[serde(default)]
    pub fill: Option<f64>,
}

/// Spatial discretization options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisOptions {
    /// Constant model top.
    pub top: Option<f64>,
    /// Resample the grid's DEM for the top.
    pub regrid_top_from_dem: bool,
    /// Resample an explicit raster for the top.
    pub top_raster: Option<RasterRef>,
    /// Resampling method used with `regrid_top_from_dem`.
    pub dem_method: ResampleMethod,
    /// Constant bottom per layer.
    pub botm: Option<Vec<f64>>,
    /// Thickness per layer, stacked below the top.
    pub thickness: Option<Values>,
    /// Length units name.
    pub length_units: String,
}

impl Default for DisOptions {
    fn default() -> Self {
        Self {
            top: None,
            regrid_top_from_dem: false,
            top_raster: None,
            dem_method: ResampleMethod::default(),
            botm: None,
            thickness: None,
            length_units: "meters".to_string(),
        }
    }
}

/// Starting-head source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartingHead {
    /// Same head everywhere.
    Constant(f64),
    /// A keyword; only `from_top` is recognized.
    Keyword(String),
}

impl Default for StartingHead {
    fn default() -> Self {
        Self::Keyword("from_top".to_string())
    }
}

/// Initial condition (IC / BAS6) options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialConditionOptions {
    /// Starting heads.
    pub strt: StartingHead,
    /// Head assigned to inactive cells (BAS6).
    pub hnoflo: f64,
}

impl Default for InitialConditionOptions {
    fn default() -> Self {
        Self {
            strt: StartingHead::default(),
            hnoflo: -9999.0,
        }
    }
}

/// Hydraulic property (NPF / UPW) options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyOptions {
    /// Horizontal conductivity.
    #[serde(alias = "hk")]
    pub k: Values,
    /// Vertical conductivity.
    #[serde(alias = "vka")]
    pub k33: Values,
    /// Cell type per layer; layer 0 convertible, the rest confined when absent.
    #[serde(alias = "laytyp")]
    pub icelltype: Option<Vec<i32>>,
    /// Specific storage.
    pub ss: Values,
    /// Specific yield.
    pub sy: Values,
}

impl Default for PropertyOptions {
    fn default() -> Self {
        Self {
            k: Values::Scalar(1.0),
            k33: Values::Scalar(0.1),
            icelltype: None,
            ss: Values::Scalar(1e-5),
            sy: Values::Scalar(0.1),
        }
    }
}

/// Constant-head boundary options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChdOptions {
    /// Explicit cells.
    pub cells: Vec<ChdCellOptions>,
    /// Head applied to every active layer-0 perimeter cell.
    pub perimeter_head: Option<f64>,
}

/// One configured constant-head cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChdCellOptions {
    /// Zero-based layer.
    pub layer: usize,
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column.
    pub column: usize,
    /// Head.
    pub head: f64,
}

/// Output control options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OcOptions {
    /// Head save frequency.
    pub save_head: SaveFrequency,
    /// Budget save frequency.
    pub save_budget: SaveFrequency,
}

/// Solver (IMS / NWT) options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Head-change closure.
    #[serde(alias = "outer_dvclose", alias = "headtol")]
    pub dvclose: f64,
    /// Residual closure.
    #[serde(alias = "inner_rclose", alias = "fluxtol")]
    pub rclose: f64,
    /// Maximum outer iterations.
    #[serde(alias = "maxiterout")]
    pub outer_maximum: usize,
    /// Maximum inner iterations.
    pub inner_maximum: usize,
    /// Complexity preset.
    #[serde(alias = "options")]
    pub complexity: String,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            dvclose: 1e-2,
            rclose: 1.0,
            outer_maximum: 100,
            inner_maximum: 50,
            complexity: "moderate".to_string(),
        }
    }
}

/// Model-level options (`model` block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Model name used for file names.
    #[serde(alias = "modelname")]
    pub name: String,
    /// Workspace directory.
    #[serde(alias = "model_ws", alias = "sim_ws")]
    pub workspace: String,
    /// Solver executable override.
    #[serde(alias = "exe_name")]
    pub executable: Option<String>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            name: "model".to_string(),
            workspace: ".".to_string(),
            executable: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_resolve() {
        assert_eq!(Values::Scalar(2.0).resolve(3, "grid", "delr").unwrap(), vec![2.0; 3]);
        let err = Values::PerIndex(vec![1.0, 2.0]).resolve(3, "grid", "delr").unwrap_err();
        assert_eq!(err.option.as_deref(), Some("delr"));
    }

    #[test]
    fn test_grid_options_from_json() {
        let opts: GridOptions = serde_json::from_value(json!({
            "nrow": 10, "ncol": 10, "delr": 100.0, "delc": [100.0, 50.0],
            "crs": "EPSG:26915", "remake": true
        }))
        .unwrap();
        assert_eq!(opts.nlay, 1);
        assert!(opts.has_explicit_geometry());
        assert_eq!(opts.delc, Some(Values::PerIndex(vec![100.0, 50.0])));
    }

    #[test]
    fn test_mask_array_dimensions() {
        let two_d: MaskArray = serde_json::from_value(json!([[1, 0], [0, 1]])).unwrap();
        assert!(matches!(two_d, MaskArray::Single(_)));
        let three_d: MaskArray = serde_json::from_value(json!([[[1, 0]], [[0, 1]]])).unwrap();
        assert!(matches!(three_d, MaskArray::Layered(_)));
    }

    #[test]
    fn test_period_defaults() {
        let opts: TdisOptions = serde_json::from_value(json!({"periods": [{"perlen": 10.0}]})).unwrap();
        assert_eq!(opts.time_units, "days");
        assert_eq!(opts.periods[0].nstp, 1);
        assert_eq!(opts.periods[0].steady, None);
    }

    #[test]
    fn test_solver_aliases() {
        let opts: SolverOptions = serde_json::from_value(json!({"headtol": 0.001, "maxiterout": 200})).unwrap();
        assert_eq!(opts.dvclose, 0.001);
        assert_eq!(opts.outer_maximum, 200);
        assert_eq!(opts.inner_maximum, 50);
    }

    #[test]
    fn test_starting_head_forms() {
        let c: InitialConditionOptions = serde_json::from_value(json!({"strt": 12.5})).unwrap();
        assert_eq!(c.strt, StartingHead::Constant(12.5));
        let k: InitialConditionOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(k.strt, StartingHead::Keyword("from_top".to_string()));
    }
}
