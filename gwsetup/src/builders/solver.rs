//! Solver settings stage (IMS for MF6, NWT for MODFLOW-NWT).

use super::{BuildContext, PackageBuilder};
use crate::config::SolverOptions;
use crate::core::{Package, SolverSettings};
use crate::errors::Result;

const COMPLEXITY_PRESETS: [&str; 3] = ["simple", "moderate", "complex"];

/// Builds solver settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverBuilder;

impl PackageBuilder for SolverBuilder {
    fn name(&self) -> &str {
        "solver"
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Package> {
        let opts: SolverOptions = ctx.options()?;

        for (option, value) in [("dvclose", opts.dvclose), ("rclose", opts.rclose)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ctx.error(option, format!("{option} must be positive, got {value}")));
            }
        }
        if opts.outer_maximum == 0 || opts.inner_maximum == 0 {
            return Err(ctx.error("outer_maximum", "iteration limits must be at least 1"));
        }

        let complexity = opts.complexity.to_ascii_lowercase();
        if !COMPLEXITY_PRESETS.contains(&complexity.as_str()) {
            return Err(ctx.error(
                "complexity",
                format!("complexity must be one of {COMPLEXITY_PRESETS:?}, got '{}'", opts.complexity),
            ));
        }

        Ok(Package::Solver(SolverSettings {
            dvclose: opts.dvclose,
            rclose: opts.rclose,
            outer_maximum: opts.outer_maximum,
            inner_maximum: opts.inner_maximum,
            complexity,
        }))
    }
}
