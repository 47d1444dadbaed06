//! Package builders.
//!
//! A builder is a pure function of the grid, its declared upstream packages
//! and its own option block. Builders never see the model itself.

mod conditions;
mod dis;
mod grid;
mod inputs;
mod output_control;
mod properties;
mod solver;
mod tdis;

pub use conditions::{ConstantHeadBuilder, InitialConditionsBuilder};
pub use dis::DisBuilder;
pub use grid::{check_grid_options, GridBuilder};
pub use inputs::StageInputs;
pub use output_control::OutputControlBuilder;
pub use properties::PropertiesBuilder;
pub use solver::SolverBuilder;
pub use tdis::TdisBuilder;

use crate::config::parse_block;
use crate::core::{Grid, Package, SpatialDiscretization, TemporalDiscretization};
use crate::errors::Result;
use crate::geo::{Raster, RasterStore};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Builds the package of one stage.
pub trait PackageBuilder: Send + Sync + Debug {
    /// A short identifier for diagnostics.
    fn name(&self) -> &str;

    /// Builds the package.
    ///
    /// # Errors
    ///
    /// Returns a configuration, resampling or dependency error. The caller
    /// leaves the stage unbuilt on error.
    fn build(&self, ctx: &BuildContext<'_>) -> Result<Package>;
}

/// Everything a builder may read.
#[derive(Debug)]
pub struct BuildContext<'a> {
    stage: &'a str,
    model_name: &'a str,
    options: Option<&'a Value>,
    inputs: StageInputs,
    rasters: &'a RasterStore,
}

impl<'a> BuildContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(
        stage: &'a str,
        model_name: &'a str,
        options: Option<&'a Value>,
        inputs: StageInputs,
        rasters: &'a RasterStore,
    ) -> Self {
        Self {
            stage,
            model_name,
            options,
            inputs,
            rasters,
        }
    }

    /// The stage being built.
    #[must_use]
    pub fn stage(&self) -> &str {
        self.stage
    }

    /// The model name.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model_name
    }

    /// The stage's typed option block.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the block has the wrong shape.
    pub fn options<T: DeserializeOwned + Default>(&self) -> Result<T> {
        parse_block(self.stage, self.options)
    }

    /// Upstream packages.
    #[must_use]
    pub fn inputs(&self) -> &StageInputs {
        &self.inputs
    }

    /// The model grid, from a grid dependency or a DIS dependency.
    ///
    /// # Errors
    ///
    /// Returns an undeclared-dependency error if neither is declared.
    pub fn grid(&self) -> Result<Arc<Grid>> {
        if let Ok(grid) = self.inputs.find("grid", Package::as_grid) {
            return Ok(Arc::clone(grid));
        }
        let dis = self.inputs.find("grid", Package::as_dis)?;
        Ok(Arc::clone(&dis.grid))
    }

    /// The temporal discretization.
    ///
    /// # Errors
    ///
    /// Returns an undeclared-dependency error if no TDIS dependency exists.
    pub fn tdis(&self) -> Result<&TemporalDiscretization> {
        Ok(self.inputs.find("tdis", Package::as_tdis)?)
    }

    /// The spatial discretization.
    ///
    /// # Errors
    ///
    /// Returns an undeclared-dependency error if no DIS dependency exists.
    pub fn dis(&self) -> Result<&SpatialDiscretization> {
        Ok(self.inputs.find("dis", Package::as_dis)?)
    }

    /// A raster loaded into the model.
    ///
    /// # Errors
    ///
    /// Returns a raster-load error if the path was never loaded.
    pub fn raster(&self, path: &str) -> Result<Arc<Raster>> {
        Ok(self.rasters.get(path)?)
    }

    /// Shorthand for a configuration error in this stage.
    #[must_use]
    pub fn error(&self, option: &str, message: impl Into<String>) -> crate::errors::SetupError {
        crate::errors::ConfigurationError::new(message)
            .for_stage(self.stage)
            .with_option(option)
            .into()
    }
}
