//! # gwsetup
//!
//! Staged assembly of MODFLOW 6 and MODFLOW-NWT groundwater models.
//!
//! A model is described by a nested configuration with one block per
//! package stage. Stages form a dependency graph; each one is built lazily
//! on first request, memoized, and rebuilt only when it or an upstream stage
//! is marked for remake.
//!
//! - **Grid construction**: explicit geometry or the extent of a DEM, with
//!   active masks from arrays or polygons
//! - **Raster resampling**: area-weighted, nearest and bilinear sampling onto
//!   rotated grids, with CRS reprojection
//! - **Package stages**: time and spatial discretization, properties,
//!   starting heads, boundary conditions, output control, solver settings
//! - **Solver runs**: input file writing and a monitored solver subprocess
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gwsetup::prelude::*;
//!
//! let config = serde_json::json!({
//!     "model": { "name": "valley", "workspace": "out/valley" },
//!     "grid": { "nrow": 40, "ncol": 60, "delr": 100.0, "delc": 100.0 },
//!     "dis": { "top": 250.0, "botm": [200.0, 150.0] },
//! });
//! let mut model = Model::new(config, ModelFamily::mf6())?;
//! let dis = model.build_stage("dis", false)?;
//! model.write()?;
//! let result = model.run(None, None).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

pub mod builders;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod family;
pub mod geo;
pub mod observability;
pub mod pipeline;
pub mod run;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builders::{BuildContext, PackageBuilder, StageInputs};
    pub use crate::config::ConfigStore;
    pub use crate::core::{Grid, GridGeometry, Package, StageKind, StageStatus};
    pub use crate::errors::{
        ConfigurationError, DependencyCycleError, RasterLoadError, ResamplingError, Result, SetupError,
        SolverError, UndeclaredDependencyError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::family::{FamilyKind, ModelFamily};
    pub use crate::geo::{Crs, GeoTransform, Raster, RasterResampler, RasterSource, ResampleMethod};
    pub use crate::pipeline::{assemble_batch, Model, PackageCache, StageGraph, StageSpec};
    pub use crate::run::{RunController, RunOptions, RunResult, RunStatus};
}
