//! Fixtures and assertions for tests of model assembly.

mod assertions;
mod fixtures;

pub use assertions::{assert_all_close, assert_same_output, assert_stage_built, assert_stage_not_built};
#[cfg(unix)]
pub use fixtures::write_stub_solver;
pub use fixtures::{dem_grid_config, explicit_grid_config, uniform_raster};
