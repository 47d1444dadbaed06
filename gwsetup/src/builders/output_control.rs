//! Output control stage.

use super::{BuildContext, PackageBuilder};
use crate::config::OcOptions;
use crate::core::{OutputControl, Package};
use crate::errors::Result;

/// Builds output control; file names follow the model name.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputControlBuilder;

impl PackageBuilder for OutputControlBuilder {
    fn name(&self) -> &str {
        "oc"
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Package> {
        let opts: OcOptions = ctx.options()?;
        let tdis = ctx.tdis()?;
        let name = ctx.model_name();
        Ok(Package::Oc(OutputControl {
            head_file: format!("{name}.hds"),
            budget_file: format!("{name}.cbc"),
            save_head: opts.save_head,
            save_budget: opts.save_budget,
            steps_per_period: tdis.periods.iter().map(|p| p.nstp).collect(),
        }))
    }
}
