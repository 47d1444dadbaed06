//! Solver file output and monitored solver runs.

mod controller;
mod result;
mod writer;

pub use controller::{RunController, RunOptions};
pub use result::{RunResult, RunStatus};
pub use writer::{write_model, PackageSet, INACTIVE_FILL};
