//! Stage status and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of a stage, used to break ties between independent stages.
///
/// Variants are declared in build priority order: when two stages are both
/// ready, the one whose kind sorts first is built first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// The spatial grid.
    Grid,
    /// Temporal discretization (stress periods and time steps).
    Temporal,
    /// Spatial discretization and property arrays.
    Spatial,
    /// Initial and boundary conditions.
    Condition,
    /// Output control, solver settings and other auxiliary packages.
    Auxiliary,
}

impl StageKind {
    /// Returns the tie-break priority (lower builds first).
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::Grid => 0,
            Self::Temporal => 1,
            Self::Spatial => 2,
            Self::Condition => 3,
            Self::Auxiliary => 4,
        }
    }
}

impl Default for StageKind {
    fn default() -> Self {
        Self::Auxiliary
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid => write!(f, "grid"),
            Self::Temporal => write!(f, "temporal"),
            Self::Spatial => write!(f, "spatial"),
            Self::Condition => write!(f, "condition"),
            Self::Auxiliary => write!(f, "auxiliary"),
        }
    }
}

/// The build status of a stage within one model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Never built.
    Pending,
    /// Built and current; requests return the cached package.
    Built,
    /// Built, but marked for remake; the next request recomputes it.
    Stale,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Built => write!(f, "built"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

impl StageStatus {
    /// Returns true if a request for the stage can be served from cache.
    #[must_use]
    pub fn is_current(&self) -> bool {
        matches!(self, Self::Built)
    }
}
