//! Temporal discretization stage.

use super::{BuildContext, PackageBuilder};
use crate::config::TdisOptions;
use crate::core::{Package, StressPeriod, TemporalDiscretization};
use crate::errors::Result;

/// Builds stress periods from the `periods` list.
#[derive(Debug, Clone, Copy, Default)]
pub struct TdisBuilder;

impl PackageBuilder for TdisBuilder {
    fn name(&self) -> &str {
        "tdis"
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Package> {
        let opts: TdisOptions = ctx.options()?;
        if opts.periods.is_empty() {
            return Err(ctx.error("periods", "at least one stress period is required"));
        }

        let mut periods = Vec::with_capacity(opts.periods.len());
        for (i, p) in opts.periods.iter().enumerate() {
            if !(p.perlen.is_finite() && p.perlen > 0.0) {
                return Err(ctx.error("perlen", format!("period {i}: perlen must be positive, got {}", p.perlen)));
            }
            if p.nstp == 0 {
                return Err(ctx.error("nstp", format!("period {i}: nstp must be at least 1")));
            }
            if !(p.tsmult.is_finite() && p.tsmult > 0.0) {
                return Err(ctx.error("tsmult", format!("period {i}: tsmult must be positive, got {}", p.tsmult)));
            }
            periods.push(StressPeriod {
                perlen: p.perlen,
                nstp: p.nstp,
                tsmult: p.tsmult,
                steady: p.steady.unwrap_or(i == 0),
            });
        }

        Ok(Package::Tdis(TemporalDiscretization {
            time_units: opts.time_units,
            periods,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::test_support::build_with;
    use crate::geo::RasterStore;
    use serde_json::json;

    fn build(options: serde_json::Value) -> Result<Package> {
        build_with(&TdisBuilder, "tdis", &options, vec![], &RasterStore::new())
    }

    #[test]
    fn test_default_single_steady_period() {
        let pkg = build(json!({})).unwrap();
        let tdis = pkg.as_tdis().unwrap();
        assert_eq!(tdis.nper(), 1);
        assert!(tdis.periods[0].steady);
        assert_eq!(tdis.periods[0].perlen, 1.0);
    }

    #[test]
    fn test_first_period_steady_rest_transient() {
        let pkg = build(json!({"periods": [{"perlen": 1.0}, {"perlen": 30.0, "nstp": 5}]})).unwrap();
        let tdis = pkg.as_tdis().unwrap();
        assert!(tdis.periods[0].steady);
        assert!(!tdis.periods[1].steady);
        assert_eq!(tdis.periods[1].nstp, 5);
    }

    #[test]
    fn test_rejects_bad_periods() {
        assert!(build(json!({"periods": []})).is_err());
        assert!(build(json!({"periods": [{"perlen": 0.0}]})).is_err());
        assert!(build(json!({"periods": [{"perlen": 1.0, "nstp": 0}]})).is_err());
        assert!(build(json!({"periods": [{"perlen": 1.0, "tsmult": -1.0}]})).is_err());
    }
}
