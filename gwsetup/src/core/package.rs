//! Package types produced by builder stages.
//!
//! A package is created once by its stage and never mutated; the model
//! stores each one behind an `Arc` so later stages and callers share it.

use super::Grid;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One stress period of the temporal discretization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressPeriod {
    /// Period length in model time units.
    pub perlen: f64,
    /// Number of time steps.
    pub nstp: usize,
    /// Time-step multiplier.
    pub tsmult: f64,
    /// Steady-state period.
    pub steady: bool,
}

/// Temporal discretization (TDIS).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalDiscretization {
    /// Time units name (e.g. "days").
    pub time_units: String,
    /// Stress periods in order.
    pub periods: Vec<StressPeriod>,
}

impl TemporalDiscretization {
    /// Number of stress periods.
    #[must_use]
    pub fn nper(&self) -> usize {
        self.periods.len()
    }

    /// Total simulated time.
    #[must_use]
    pub fn total_time(&self) -> f64 {
        self.periods.iter().map(|p| p.perlen).sum()
    }

    /// Returns true if any period is transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.periods.iter().any(|p| !p.steady)
    }
}

/// Spatial discretization (DIS) arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialDiscretization {
    /// The grid these arrays are defined on.
    pub grid: Arc<Grid>,
    /// Model top; `None` when no top source was configured.
    pub top: Option<Array2<f64>>,
    /// Layer bottoms (nlay, nrow, ncol).
    pub botm: Array3<f64>,
    /// 1 for active cells, 0 for inactive.
    pub idomain: Array3<i32>,
    /// Length units name (e.g. "meters").
    pub length_units: String,
}

/// Starting heads (IC).
#[derive(Debug, Clone, PartialEq)]
pub struct InitialConditions {
    /// Starting head per cell.
    pub strt: Array3<f64>,
}

/// The MODFLOW-2005 basic package (BAS6): boundary array plus starting heads.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicPackage {
    /// 1 active, 0 inactive.
    pub ibound: Array3<i32>,
    /// Starting head per cell.
    pub strt: Array3<f64>,
    /// Head assigned to inactive cells.
    pub hnoflo: f64,
}

/// Per-layer hydraulic properties (NPF / UPW).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydraulicProperties {
    /// Horizontal hydraulic conductivity per layer.
    pub k: Vec<f64>,
    /// Vertical hydraulic conductivity per layer.
    pub k33: Vec<f64>,
    /// Cell type per layer (0 confined, 1 convertible).
    pub icelltype: Vec<i32>,
    /// Specific storage per layer.
    pub ss: Vec<f64>,
    /// Specific yield per layer.
    pub sy: Vec<f64>,
}

/// A single constant-head cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadCell {
    /// Zero-based layer.
    pub layer: usize,
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column.
    pub column: usize,
    /// Specified head.
    pub head: f64,
}

/// Constant-head boundary (CHD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantHead {
    /// Cells in the first stress period; later periods reuse them.
    pub cells: Vec<HeadCell>,
    /// Number of stress periods the boundary spans.
    pub nper: usize,
}

/// How often output is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveFrequency {
    /// Last time step of each period.
    #[default]
    Last,
    /// Every time step.
    All,
    /// Never.
    None,
}

/// Output control (OC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputControl {
    /// Binary head file name.
    pub head_file: String,
    /// Binary budget file name.
    pub budget_file: String,
    /// Head save frequency.
    pub save_head: SaveFrequency,
    /// Budget save frequency.
    pub save_budget: SaveFrequency,
    /// Time steps per period, from TDIS.
    pub steps_per_period: Vec<usize>,
}

/// Nonlinear/linear solver settings (IMS / NWT).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Head-change closure criterion.
    pub dvclose: f64,
    /// Residual closure criterion.
    pub rclose: f64,
    /// Maximum outer iterations.
    pub outer_maximum: usize,
    /// Maximum inner iterations.
    pub inner_maximum: usize,
    /// Complexity preset ("simple", "moderate", "complex").
    pub complexity: String,
}

/// The output of one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Package {
    /// The spatial grid.
    Grid(Arc<Grid>),
    /// Temporal discretization.
    Tdis(TemporalDiscretization),
    /// Spatial discretization.
    Dis(SpatialDiscretization),
    /// MF6 initial conditions.
    Ic(InitialConditions),
    /// MODFLOW-2005 basic package.
    Bas6(BasicPackage),
    /// Hydraulic properties.
    Properties(HydraulicProperties),
    /// Constant-head boundary.
    Chd(ConstantHead),
    /// Output control.
    Oc(OutputControl),
    /// Solver settings.
    Solver(SolverSettings),
}

impl Package {
    /// A short name for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Grid(_) => "grid",
            Self::Tdis(_) => "tdis",
            Self::Dis(_) => "dis",
            Self::Ic(_) => "ic",
            Self::Bas6(_) => "bas6",
            Self::Properties(_) => "properties",
            Self::Chd(_) => "chd",
            Self::Oc(_) => "oc",
            Self::Solver(_) => "solver",
        }
    }

    /// The grid, if this is a grid package.
    #[must_use]
    pub fn as_grid(&self) -> Option<&Arc<Grid>> {
        match self {
            Self::Grid(g) => Some(g),
            _ => None,
        }
    }

    /// The temporal discretization, if this is a TDIS package.
    #[must_use]
    pub fn as_tdis(&self) -> Option<&TemporalDiscretization> {
        match self {
            Self::Tdis(t) => Some(t),
            _ => None,
        }
    }

    /// The spatial discretization, if this is a DIS package.
    #[must_use]
    pub fn as_dis(&self) -> Option<&SpatialDiscretization> {
        match self {
            Self::Dis(d) => Some(d),
            _ => None,
        }
    }

    /// Starting heads, from either IC or BAS6.
    #[must_use]
    pub fn starting_heads(&self) -> Option<&Array3<f64>> {
        match self {
            Self::Ic(ic) => Some(&ic.strt),
            Self::Bas6(bas) => Some(&bas.strt),
            _ => None,
        }
    }

    /// Hydraulic properties, if this is an NPF/UPW package.
    #[must_use]
    pub fn as_properties(&self) -> Option<&HydraulicProperties> {
        match self {
            Self::Properties(p) => Some(p),
            _ => None,
        }
    }

    /// Constant-head cells, if this is a CHD package.
    #[must_use]
    pub fn as_chd(&self) -> Option<&ConstantHead> {
        match self {
            Self::Chd(c) => Some(c),
            _ => None,
        }
    }

    /// Output control, if this is an OC package.
    #[must_use]
    pub fn as_oc(&self) -> Option<&OutputControl> {
        match self {
            Self::Oc(o) => Some(o),
            _ => None,
        }
    }

    /// Solver settings, if this is an IMS/NWT package.
    #[must_use]
    pub fn as_solver(&self) -> Option<&SolverSettings> {
        match self {
            Self::Solver(s) => Some(s),
            _ => None,
        }
    }
}
