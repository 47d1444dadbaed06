//! Initial and boundary condition stages.

use super::{BuildContext, PackageBuilder};
use crate::config::{ChdOptions, InitialConditionOptions, StartingHead};
use crate::core::{BasicPackage, ConstantHead, HeadCell, InitialConditions, Package};
use crate::errors::Result;
use ndarray::Array3;
use std::collections::BTreeMap;

/// Builds starting heads as MF6 IC or, with `ibound`, MODFLOW-2005 BAS6.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitialConditionsBuilder {
    with_ibound: bool,
}

impl InitialConditionsBuilder {
    /// Builds an IC package.
    #[must_use]
    pub const fn ic() -> Self {
        Self { with_ibound: false }
    }

    /// Builds a BAS6 package carrying ibound and hnoflo.
    #[must_use]
    pub const fn bas6() -> Self {
        Self { with_ibound: true }
    }
}

impl PackageBuilder for InitialConditionsBuilder {
    fn name(&self) -> &str {
        if self.with_ibound {
            "bas6"
        } else {
            "ic"
        }
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Package> {
        let opts: InitialConditionOptions = ctx.options()?;
        let dis = ctx.dis()?;
        let shape = dis.botm.dim();

        let mut strt = match &opts.strt {
            StartingHead::Constant(head) => Array3::from_elem(shape, *head),
            StartingHead::Keyword(k) if k == "from_top" => {
                let Some(top) = &dis.top else {
                    return Err(ctx.error("strt", "strt: from_top requires a model top"));
                };
                Array3::from_shape_fn(shape, |(_, i, j)| top[[i, j]])
            }
            StartingHead::Keyword(other) => {
                return Err(ctx.error("strt", format!("unknown strt keyword '{other}'")));
            }
        };

        // Inactive cells carry hnoflo so no NaN reaches the solver files.
        ndarray::Zip::from(&mut strt)
            .and(&dis.idomain)
            .for_each(|head, domain| {
                if *domain == 0 {
                    *head = opts.hnoflo;
                }
            });

        if self.with_ibound {
            Ok(Package::Bas6(BasicPackage {
                ibound: dis.idomain.clone(),
                strt,
                hnoflo: opts.hnoflo,
            }))
        } else {
            Ok(Package::Ic(InitialConditions { strt }))
        }
    }
}

/// Builds the constant-head boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantHeadBuilder;

impl PackageBuilder for ConstantHeadBuilder {
    fn name(&self) -> &str {
        "chd"
    }

    fn build(&self, ctx: &BuildContext<'_>) -> Result<Package> {
        let opts: ChdOptions = ctx.options()?;
        let grid = ctx.grid()?;
        let nper = ctx.tdis()?.nper();
        let (nlay, nrow, ncol) = grid.shape();

        let mut cells: BTreeMap<(usize, usize, usize), f64> = BTreeMap::new();
        if let Some(head) = opts.perimeter_head {
            for i in 0..nrow {
                for j in 0..ncol {
                    let on_edge = i == 0 || j == 0 || i + 1 == nrow || j + 1 == ncol;
                    if on_edge && grid.is_active(0, i, j) {
                        cells.insert((0, i, j), head);
                    }
                }
            }
        }

        for cell in &opts.cells {
            if cell.layer >= nlay || cell.row >= nrow || cell.column >= ncol {
                return Err(ctx.error(
                    "cells",
                    format!(
                        "cell ({}, {}, {}) is outside the {nlay}x{nrow}x{ncol} grid",
                        cell.layer, cell.row, cell.column
                    ),
                ));
            }
            if !grid.is_active(cell.layer, cell.row, cell.column) {
                return Err(ctx.error(
                    "cells",
                    format!("cell ({}, {}, {}) is inactive", cell.layer, cell.row, cell.column),
                ));
            }
            cells.insert((cell.layer, cell.row, cell.column), cell.head);
        }

        let cells = cells
            .into_iter()
            .map(|((layer, row, column), head)| HeadCell { layer, row, column, head })
            .collect();
        Ok(Package::Chd(ConstantHead { cells, nper }))
    }
}
