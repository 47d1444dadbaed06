//! Core domain model types.
//!
//! This module contains the fundamental types shared by every stage:
//! - Stage status and kind enums
//! - The structured grid
//! - Package types produced by builders

mod grid;
mod package;
mod status;

pub use grid::{Grid, GridGeometry};
pub use package::{
    BasicPackage, ConstantHead, HeadCell, HydraulicProperties, InitialConditions, OutputControl,
    Package, SaveFrequency, SolverSettings, SpatialDiscretization, StressPeriod,
    TemporalDiscretization,
};
pub use status::{StageKind, StageStatus};
