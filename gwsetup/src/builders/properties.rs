//! Hydraulic property stage (NPF for MF6, UPW for NWT).

use super::{BuildContext, PackageBuilder};
use crate::config::PropertyOptions;
use crate::core::{HydraulicProperties, Package};
use crate::errors::Result;

/// Builds per-layer hydraulic properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertiesBuilder;

impl PackageBuilder for PropertiesBuilder {
    fn name(&self) -> &str {
        "properties"
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Package> {
        let opts: PropertyOptions = ctx.options()?;
        let nlay = ctx.grid()?.nlay();
        let stage = ctx.stage();

        let k = opts.k.resolve(nlay, stage, "k")?;
        let k33 = opts.k33.resolve(nlay, stage, "k33")?;
        let ss = opts.ss.resolve(nlay, stage, "ss")?;
        let sy = opts.sy.resolve(nlay, stage, "sy")?;

        for (option, values) in [("k", &k), ("k33", &k33)] {
            if let Some((layer, v)) = values.iter().enumerate().find(|(_, v)| !(v.is_finite() && **v > 0.0)) {
                return Err(ctx.error(option, format!("{option} must be positive, layer {layer} has {v}")));
            }
        }
        for (option, values) in [("ss", &ss), ("sy", &sy)] {
            if let Some((layer, v)) = values.iter().enumerate().find(|(_, v)| !(v.is_finite() && **v >= 0.0)) {
                return Err(ctx.error(option, format!("{option} must be non-negative, layer {layer} has {v}")));
            }
        }

        let icelltype = match opts.icelltype {
            Some(types) if types.len() == nlay => types,
            Some(types) => {
                return Err(ctx.error(
                    "icelltype",
                    format!("icelltype has {} values, expected {nlay}", types.len()),
                ));
            }
            None => (0..nlay).map(|layer| i32::from(layer == 0)).collect(),
        };

        Ok(Package::Properties(HydraulicProperties { k, k33, icelltype, ss, sy }))
    }
}
