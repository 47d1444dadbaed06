//! Solver input files for both families.
//!
//! Arrays are written as `CONSTANT` when every value is equal and as
//! `INTERNAL` free-format blocks otherwise. Non-finite values, which only
//! occur in inactive cells, are written as [`INACTIVE_FILL`].

use crate::core::{
    BasicPackage, ConstantHead, HydraulicProperties, OutputControl, Package, SaveFrequency, SolverSettings,
    SpatialDiscretization, TemporalDiscretization,
};
use crate::errors::{ConfigurationError, Result, SetupError};
use crate::family::FamilyKind;
use ndarray::{Array2, Array3};
use std::fmt::{self, Display, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Value written in place of NaN or infinite array entries.
pub const INACTIVE_FILL: f64 = -9999.0;

/// Unit numbers for the MODFLOW-2005 name file.
const NWT_UNITS: [(&str, u32); 8] = [
    ("LIST", 2),
    ("DIS", 11),
    ("BAS6", 13),
    ("CHD", 14),
    ("OC", 15),
    ("UPW", 31),
    ("NWT", 32),
    ("DATA(BINARY)", 51),
];
const NWT_BUDGET_UNIT: u32 = 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Mf6,
    Mf2005,
}

/// Built packages of one model, looked up by content rather than stage name.
#[derive(Debug, Clone, Copy)]
pub struct PackageSet<'a> {
    packages: &'a [Arc<Package>],
}

impl<'a> PackageSet<'a> {
    /// Wraps the packages of a model.
    #[must_use]
    pub const fn new(packages: &'a [Arc<Package>]) -> Self {
        Self { packages }
    }

    fn find<T>(&self, pick: impl Fn(&'a Package) -> Option<&'a T>) -> Option<&'a T> {
        self.packages.iter().find_map(|p| pick(p.as_ref()))
    }

    fn require<T>(&self, stage: &str, pick: impl Fn(&'a Package) -> Option<&'a T>) -> Result<&'a T> {
        self.find(pick)
            .ok_or_else(|| SetupError::config(stage, format!("no {stage} package has been built")))
    }

    fn bas6(&self) -> Option<&'a BasicPackage> {
        self.find(|p| match p {
            Package::Bas6(b) => Some(b),
            _ => None,
        })
    }
}

/// Writes every solver input file into `workspace` and returns their paths.
///
/// # Errors
///
/// Returns a configuration error if a required package is missing or the
/// model has no top, and an IO error if a file cannot be written.
pub fn write_model(
    workspace: &Path,
    kind: FamilyKind,
    model_name: &str,
    packages: PackageSet<'_>,
) -> Result<Vec<PathBuf>> {
    let files = match kind {
        FamilyKind::Mf6 => render_mf6(model_name, packages)?,
        FamilyKind::Mfnwt => render_nwt(model_name, packages)?,
    };

    std::fs::create_dir_all(workspace)?;
    let mut written = Vec::with_capacity(files.len());
    for (name, text) in files {
        let path = workspace.join(name);
        std::fs::write(&path, text)?;
        written.push(path);
    }
    tracing::debug!(
        workspace = %workspace.display(),
        files = written.len(),
        "Wrote solver input files"
    );
    Ok(written)
}

fn render_error(err: fmt::Error) -> SetupError {
    SetupError::Serialization(err.to_string())
}

fn model_top<'a>(dis: &'a SpatialDiscretization) -> Result<&'a Array2<f64>> {
    dis.top.as_ref().ok_or_else(|| {
        ConfigurationError::new("solver files need a model top; set top, top_raster or regrid_top_from_dem")
            .for_stage("dis")
            .with_option("top")
            .into()
    })
}

fn render_mf6(name: &str, set: PackageSet<'_>) -> Result<Vec<(String, String)>> {
    let tdis = set.require("tdis", Package::as_tdis)?;
    let dis = set.require("dis", Package::as_dis)?;
    let strt = set.require("ic", Package::starting_heads)?;
    let props = set.require("npf", Package::as_properties)?;
    let oc = set.require("oc", Package::as_oc)?;
    let ims = set.require("ims", Package::as_solver)?;
    let chd = set.find(Package::as_chd).filter(|c| !c.cells.is_empty());
    let top = model_top(dis)?;

    let mut files = vec![
        ("mfsim.nam".to_string(), mf6_simulation(name).map_err(render_error)?),
        (format!("{name}.tdis"), mf6_tdis(tdis).map_err(render_error)?),
        (format!("{name}.ims"), mf6_ims(ims).map_err(render_error)?),
        (format!("{name}.nam"), mf6_model_nam(name, chd.is_some()).map_err(render_error)?),
        (format!("{name}.dis"), mf6_dis(dis, top).map_err(render_error)?),
        (format!("{name}.ic"), mf6_ic(strt).map_err(render_error)?),
        (format!("{name}.npf"), mf6_npf(props).map_err(render_error)?),
        (format!("{name}.sto"), mf6_sto(props, tdis).map_err(render_error)?),
    ];
    if let Some(chd) = chd {
        files.push((format!("{name}.chd"), mf6_chd(chd).map_err(render_error)?));
    }
    files.push((format!("{name}.oc"), mf6_oc(oc).map_err(render_error)?));
    Ok(files)
}

fn render_nwt(name: &str, set: PackageSet<'_>) -> Result<Vec<(String, String)>> {
    let tdis = set.require("tdis", Package::as_tdis)?;
    let dis = set.require("dis", Package::as_dis)?;
    let bas = set.bas6().ok_or_else(|| SetupError::config("bas6", "no bas6 package has been built"))?;
    let props = set.require("upw", Package::as_properties)?;
    let oc = set.require("oc", Package::as_oc)?;
    let solver = set.require("nwt", Package::as_solver)?;
    let chd = set.find(Package::as_chd).filter(|c| !c.cells.is_empty());
    let top = model_top(dis)?;

    let mut files = vec![
        (format!("{name}.nam"), nwt_nam(name, oc, chd.is_some()).map_err(render_error)?),
        (format!("{name}.dis"), nwt_dis(dis, top, tdis).map_err(render_error)?),
        (format!("{name}.bas"), nwt_bas(bas).map_err(render_error)?),
        (format!("{name}.upw"), nwt_upw(props, tdis.is_transient()).map_err(render_error)?),
    ];
    if let Some(chd) = chd {
        files.push((format!("{name}.chd"), nwt_chd(chd).map_err(render_error)?));
    }
    files.push((format!("{name}.oc"), nwt_oc(oc).map_err(render_error)?));
    files.push((format!("{name}.nwt"), nwt_solver(solver).map_err(render_error)?));
    Ok(files)
}

fn finite(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        INACTIVE_FILL
    }
}

/// Writes one array with its control record. `width` is the row length.
fn write_array<T: Copy + PartialEq + Display>(
    out: &mut String,
    dialect: Dialect,
    label: &str,
    values: &[T],
    width: usize,
) -> fmt::Result {
    let uniform = values
        .split_first()
        .map_or(true, |(first, rest)| rest.iter().all(|v| v == first));
    let constant = values.first().filter(|_| uniform);

    match (dialect, constant) {
        (Dialect::Mf6, Some(v)) => writeln!(out, "    CONSTANT  {v}"),
        (Dialect::Mf2005, Some(v)) => writeln!(out, "CONSTANT  {v}  # {label}"),
        (Dialect::Mf6, None) => {
            writeln!(out, "    INTERNAL  FACTOR  1.0")?;
            write_rows(out, "      ", values, width)
        }
        (Dialect::Mf2005, None) => {
            writeln!(out, "INTERNAL  1.0  (FREE)  -1  # {label}")?;
            write_rows(out, "", values, width)
        }
    }
}

fn write_rows<T: Display>(out: &mut String, indent: &str, values: &[T], width: usize) -> fmt::Result {
    for row in values.chunks(width.max(1)) {
        out.push_str(indent);
        for (i, v) in row.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            write!(out, "{v}")?;
        }
        out.push('\n');
    }
    Ok(())
}

fn layer_values<T: Copy>(array: &Array3<T>, layer: usize) -> Vec<T> {
    array.index_axis(ndarray::Axis(0), layer).iter().copied().collect()
}

fn mf6_layered(out: &mut String, label: &str, array: &Array3<f64>) -> fmt::Result {
    writeln!(out, "  {label}  LAYERED")?;
    let ncol = array.dim().2;
    for k in 0..array.dim().0 {
        let values: Vec<f64> = layer_values(array, k).into_iter().map(finite).collect();
        write_array(out, Dialect::Mf6, label, &values, ncol)?;
    }
    Ok(())
}

fn mf6_simulation(name: &str) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "BEGIN options\nEND options\n")?;
    writeln!(out, "BEGIN timing\n  TDIS6  {name}.tdis\nEND timing\n")?;
    writeln!(out, "BEGIN models\n  gwf6  {name}.nam  {name}\nEND models\n")?;
    writeln!(out, "BEGIN exchanges\nEND exchanges\n")?;
    writeln!(out, "BEGIN solutiongroup  1\n  ims6  {name}.ims  {name}\nEND solutiongroup  1")?;
    Ok(out)
}

fn mf6_tdis(tdis: &TemporalDiscretization) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "BEGIN options\n  TIME_UNITS  {}\nEND options\n", tdis.time_units)?;
    writeln!(out, "BEGIN dimensions\n  NPER  {}\nEND dimensions\n", tdis.nper())?;
    writeln!(out, "BEGIN perioddata")?;
    for p in &tdis.periods {
        writeln!(out, "  {}  {}  {}", p.perlen, p.nstp, p.tsmult)?;
    }
    writeln!(out, "END perioddata")?;
    Ok(out)
}

fn mf6_ims(ims: &SolverSettings) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "BEGIN options\n  COMPLEXITY  {}\nEND options\n", ims.complexity.to_uppercase())?;
    writeln!(out, "BEGIN nonlinear")?;
    writeln!(out, "  OUTER_DVCLOSE  {}", ims.dvclose)?;
    writeln!(out, "  OUTER_MAXIMUM  {}", ims.outer_maximum)?;
    writeln!(out, "END nonlinear\n")?;
    writeln!(out, "BEGIN linear")?;
    writeln!(out, "  INNER_MAXIMUM  {}", ims.inner_maximum)?;
    writeln!(out, "  INNER_DVCLOSE  {}", ims.dvclose)?;
    writeln!(out, "  INNER_RCLOSE  {}", ims.rclose)?;
    writeln!(out, "END linear")?;
    Ok(out)
}

fn mf6_model_nam(name: &str, with_chd: bool) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "BEGIN options\n  SAVE_FLOWS\nEND options\n")?;
    writeln!(out, "BEGIN packages")?;
    writeln!(out, "  DIS6  {name}.dis  dis")?;
    writeln!(out, "  IC6  {name}.ic  ic")?;
    writeln!(out, "  NPF6  {name}.npf  npf")?;
    writeln!(out, "  STO6  {name}.sto  sto")?;
    if with_chd {
        writeln!(out, "  CHD6  {name}.chd  chd")?;
    }
    writeln!(out, "  OC6  {name}.oc  oc")?;
    writeln!(out, "END packages")?;
    Ok(out)
}

fn mf6_dis(dis: &SpatialDiscretization, top: &Array2<f64>) -> Result<String, fmt::Error> {
    let grid = &dis.grid;
    let (nlay, nrow, ncol) = grid.shape();
    let (xoff, yoff) = grid.origin();
    let mut out = String::new();
    writeln!(out, "BEGIN options")?;
    writeln!(out, "  LENGTH_UNITS  {}", dis.length_units)?;
    writeln!(out, "  XORIGIN  {xoff}\n  YORIGIN  {yoff}\n  ANGROT  {}", grid.rotation())?;
    writeln!(out, "END options\n")?;
    writeln!(out, "BEGIN dimensions\n  NLAY  {nlay}\n  NROW  {nrow}\n  NCOL  {ncol}\nEND dimensions\n")?;
    writeln!(out, "BEGIN griddata")?;
    writeln!(out, "  delr")?;
    write_array(&mut out, Dialect::Mf6, "delr", grid.delr(), ncol)?;
    writeln!(out, "  delc")?;
    write_array(&mut out, Dialect::Mf6, "delc", grid.delc(), nrow)?;
    writeln!(out, "  top")?;
    let top: Vec<f64> = top.iter().copied().map(finite).collect();
    write_array(&mut out, Dialect::Mf6, "top", &top, ncol)?;
    mf6_layered(&mut out, "botm", &dis.botm)?;
    writeln!(out, "  idomain  LAYERED")?;
    for k in 0..nlay {
        write_array(&mut out, Dialect::Mf6, "idomain", &layer_values(&dis.idomain, k), ncol)?;
    }
    writeln!(out, "END griddata")?;
    Ok(out)
}

fn mf6_ic(strt: &Array3<f64>) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "BEGIN options\nEND options\n")?;
    writeln!(out, "BEGIN griddata")?;
    mf6_layered(&mut out, "strt", strt)?;
    writeln!(out, "END griddata")?;
    Ok(out)
}

fn mf6_npf(props: &HydraulicProperties) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "BEGIN options\n  SAVE_SPECIFIC_DISCHARGE\nEND options\n")?;
    writeln!(out, "BEGIN griddata")?;
    writeln!(out, "  icelltype  LAYERED")?;
    for v in &props.icelltype {
        writeln!(out, "    CONSTANT  {v}")?;
    }
    for (label, values) in [("k", &props.k), ("k33", &props.k33)] {
        writeln!(out, "  {label}  LAYERED")?;
        for v in values {
            writeln!(out, "    CONSTANT  {v}")?;
        }
    }
    writeln!(out, "END griddata")?;
    Ok(out)
}

/// Storage and the steady-state or transient setting of every period.
fn mf6_sto(props: &HydraulicProperties, tdis: &TemporalDiscretization) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "BEGIN options\n  SAVE_FLOWS\nEND options\n")?;
    writeln!(out, "BEGIN griddata")?;
    writeln!(out, "  iconvert  LAYERED")?;
    for v in &props.icelltype {
        writeln!(out, "    CONSTANT  {}", i32::from(*v != 0))?;
    }
    for (label, values) in [("ss", &props.ss), ("sy", &props.sy)] {
        writeln!(out, "  {label}  LAYERED")?;
        for v in values {
            writeln!(out, "    CONSTANT  {v}")?;
        }
    }
    writeln!(out, "END griddata")?;
    for (i, period) in tdis.periods.iter().enumerate() {
        let setting = if period.steady { "STEADY-STATE" } else { "TRANSIENT" };
        writeln!(out, "\nBEGIN period  {}\n  {setting}\nEND period  {}", i + 1, i + 1)?;
    }
    Ok(out)
}

fn mf6_chd(chd: &ConstantHead) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "BEGIN options\nEND options\n")?;
    writeln!(out, "BEGIN dimensions\n  MAXBOUND  {}\nEND dimensions\n", chd.cells.len())?;
    writeln!(out, "BEGIN period  1")?;
    for c in &chd.cells {
        writeln!(out, "  {}  {}  {}  {}", c.layer + 1, c.row + 1, c.column + 1, c.head)?;
    }
    writeln!(out, "END period  1")?;
    Ok(out)
}

fn mf6_oc(oc: &OutputControl) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "BEGIN options")?;
    writeln!(out, "  BUDGET  FILEOUT  {}", oc.budget_file)?;
    writeln!(out, "  HEAD  FILEOUT  {}", oc.head_file)?;
    writeln!(out, "END options\n")?;
    writeln!(out, "BEGIN period  1")?;
    for (label, frequency) in [("HEAD", oc.save_head), ("BUDGET", oc.save_budget)] {
        match frequency {
            SaveFrequency::Last => writeln!(out, "  SAVE  {label}  LAST")?,
            SaveFrequency::All => writeln!(out, "  SAVE  {label}  ALL")?,
            SaveFrequency::None => {}
        }
    }
    writeln!(out, "END period  1")?;
    Ok(out)
}

fn nwt_nam(name: &str, oc: &OutputControl, with_chd: bool) -> Result<String, fmt::Error> {
    let mut out = String::new();
    for (ftype, unit) in NWT_UNITS {
        let file = match ftype {
            "LIST" => format!("{name}.list"),
            "DIS" => format!("{name}.dis"),
            "BAS6" => format!("{name}.bas"),
            "CHD" if !with_chd => continue,
            "CHD" => format!("{name}.chd"),
            "OC" => format!("{name}.oc"),
            "UPW" => format!("{name}.upw"),
            "NWT" => format!("{name}.nwt"),
            _ => format!("{}  REPLACE", oc.head_file),
        };
        writeln!(out, "{ftype:<14}{unit:>4}  {file}")?;
    }
    writeln!(out, "{:<14}{NWT_BUDGET_UNIT:>4}  {}  REPLACE", "DATA(BINARY)", oc.budget_file)?;
    Ok(out)
}

fn time_unit_code(units: &str) -> u8 {
    match units.to_ascii_lowercase().as_str() {
        "seconds" | "s" => 1,
        "minutes" => 2,
        "hours" => 3,
        "days" | "d" => 4,
        "years" => 5,
        _ => 0,
    }
}

fn length_unit_code(units: &str) -> u8 {
    match units.to_ascii_lowercase().as_str() {
        "feet" | "ft" => 1,
        "meters" | "m" => 2,
        "centimeters" | "cm" => 3,
        _ => 0,
    }
}

fn nwt_dis(dis: &SpatialDiscretization, top: &Array2<f64>, tdis: &TemporalDiscretization) -> Result<String, fmt::Error> {
    let grid = &dis.grid;
    let (nlay, nrow, ncol) = grid.shape();
    let mut out = String::new();
    writeln!(out, "# DIS package")?;
    writeln!(
        out,
        "{nlay} {nrow} {ncol} {} {} {}",
        tdis.nper(),
        time_unit_code(&tdis.time_units),
        length_unit_code(&dis.length_units)
    )?;
    writeln!(out, "{}", vec!["0"; nlay].join(" "))?;
    write_array(&mut out, Dialect::Mf2005, "delr", grid.delr(), ncol)?;
    write_array(&mut out, Dialect::Mf2005, "delc", grid.delc(), nrow)?;
    let top: Vec<f64> = top.iter().copied().map(finite).collect();
    write_array(&mut out, Dialect::Mf2005, "model_top", &top, ncol)?;
    for k in 0..nlay {
        let botm: Vec<f64> = layer_values(&dis.botm, k).into_iter().map(finite).collect();
        write_array(&mut out, Dialect::Mf2005, &format!("botm layer {}", k + 1), &botm, ncol)?;
    }
    for p in &tdis.periods {
        let kind = if p.steady { "SS" } else { "TR" };
        writeln!(out, "{} {} {} {kind}", p.perlen, p.nstp, p.tsmult)?;
    }
    Ok(out)
}

fn nwt_bas(bas: &BasicPackage) -> Result<String, fmt::Error> {
    let (nlay, _, ncol) = bas.ibound.dim();
    let mut out = String::new();
    writeln!(out, "# BAS6 package\nFREE")?;
    for k in 0..nlay {
        write_array(&mut out, Dialect::Mf2005, &format!("ibound layer {}", k + 1), &layer_values(&bas.ibound, k), ncol)?;
    }
    writeln!(out, "{}", bas.hnoflo)?;
    for k in 0..nlay {
        let strt: Vec<f64> = layer_values(&bas.strt, k).into_iter().map(finite).collect();
        write_array(&mut out, Dialect::Mf2005, &format!("strt layer {}", k + 1), &strt, ncol)?;
    }
    Ok(out)
}

fn nwt_upw(props: &HydraulicProperties, transient: bool) -> Result<String, fmt::Error> {
    let nlay = props.k.len();
    let line = |values: Vec<String>| values.join(" ");
    let mut out = String::new();
    writeln!(out, "# UPW package")?;
    writeln!(out, "{NWT_BUDGET_UNIT} -1e30 0 0")?;
    writeln!(out, "{}", line(props.icelltype.iter().map(ToString::to_string).collect()))?;
    writeln!(out, "{}", line(vec!["0".to_string(); nlay]))?;
    writeln!(out, "{}", line(vec!["1.0".to_string(); nlay]))?;
    writeln!(out, "{}", line(vec!["0".to_string(); nlay]))?;
    writeln!(out, "{}", line(vec!["0".to_string(); nlay]))?;
    for k in 0..nlay {
        writeln!(out, "CONSTANT  {}  # hk layer {}", props.k[k], k + 1)?;
        writeln!(out, "CONSTANT  {}  # vka layer {}", props.k33[k], k + 1)?;
        if transient {
            writeln!(out, "CONSTANT  {}  # ss layer {}", props.ss[k], k + 1)?;
            if props.icelltype.get(k).is_some_and(|t| *t != 0) {
                writeln!(out, "CONSTANT  {}  # sy layer {}", props.sy[k], k + 1)?;
            }
        }
    }
    Ok(out)
}

fn nwt_chd(chd: &ConstantHead) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# CHD package")?;
    writeln!(out, "{}", chd.cells.len())?;
    for period in 0..chd.nper.max(1) {
        if period == 0 {
            writeln!(out, "{} 0", chd.cells.len())?;
            for c in &chd.cells {
                writeln!(out, "{} {} {} {} {}", c.layer + 1, c.row + 1, c.column + 1, c.head, c.head)?;
            }
        } else {
            writeln!(out, "-1 0")?;
        }
    }
    Ok(out)
}

fn nwt_oc(oc: &OutputControl) -> Result<String, fmt::Error> {
    let head_unit = NWT_UNITS.iter().find(|(t, _)| *t == "DATA(BINARY)").map_or(51, |(_, u)| *u);
    let mut out = String::new();
    writeln!(out, "HEAD SAVE UNIT {head_unit}")?;
    for (i, nstp) in oc.steps_per_period.iter().enumerate() {
        for step in 1..=*nstp {
            let last = step == *nstp;
            let mut words = Vec::new();
            for (label, frequency) in [("HEAD", oc.save_head), ("BUDGET", oc.save_budget)] {
                let save = match frequency {
                    SaveFrequency::All => true,
                    SaveFrequency::Last => last,
                    SaveFrequency::None => false,
                };
                if save {
                    words.push(label);
                }
            }
            if words.is_empty() {
                continue;
            }
            writeln!(out, "PERIOD {} STEP {step}", i + 1)?;
            for word in words {
                writeln!(out, "  SAVE {word}")?;
            }
        }
    }
    Ok(out)
}

fn nwt_solver(solver: &SolverSettings) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# NWT package")?;
    writeln!(
        out,
        "{} {} {} 1e-5 1 0 0 {}",
        solver.dvclose,
        solver.rclose,
        solver.outer_maximum,
        solver.complexity.to_uppercase()
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Grid, GridGeometry, HeadCell, InitialConditions, StressPeriod};
    use pretty_assertions::assert_eq;

    fn dis(top: Option<f64>) -> SpatialDiscretization {
        let grid = Grid::new(GridGeometry {
            nlay: 2,
            delr: vec![100.0; 3],
            delc: vec![50.0, 60.0],
            xoff: 10.0,
            yoff: 20.0,
            rotation: 15.0,
            crs: None,
        })
        .unwrap();
        SpatialDiscretization {
            grid: Arc::new(grid),
            top: top.map(|t| Array2::from_elem((2, 3), t)),
            botm: Array3::from_shape_fn((2, 2, 3), |(k, _, _)| -10.0 * (k as f64 + 1.0)),
            idomain: Array3::from_elem((2, 2, 3), 1),
            length_units: "meters".to_string(),
        }
    }

    fn tdis() -> TemporalDiscretization {
        TemporalDiscretization {
            time_units: "days".to_string(),
            periods: vec![
                StressPeriod { perlen: 1.0, nstp: 1, tsmult: 1.0, steady: true },
                StressPeriod { perlen: 30.0, nstp: 3, tsmult: 1.2, steady: false },
            ],
        }
    }

    fn oc() -> OutputControl {
        OutputControl {
            head_file: "m.hds".to_string(),
            budget_file: "m.cbc".to_string(),
            save_head: SaveFrequency::Last,
            save_budget: SaveFrequency::Last,
            steps_per_period: vec![1, 3],
        }
    }

    fn props() -> HydraulicProperties {
        HydraulicProperties {
            k: vec![5.0, 1.0],
            k33: vec![0.5, 0.1],
            icelltype: vec![1, 0],
            ss: vec![1e-5; 2],
            sy: vec![0.2; 2],
        }
    }

    fn solver() -> SolverSettings {
        SolverSettings {
            dvclose: 0.01,
            rclose: 1.0,
            outer_maximum: 100,
            inner_maximum: 50,
            complexity: "moderate".to_string(),
        }
    }

    fn mf6_packages(top: Option<f64>, chd_cells: Vec<HeadCell>) -> Vec<Arc<Package>> {
        vec![
            Arc::new(Package::Tdis(tdis())),
            Arc::new(Package::Dis(dis(top))),
            Arc::new(Package::Ic(InitialConditions { strt: Array3::from_elem((2, 2, 3), 5.0) })),
            Arc::new(Package::Properties(props())),
            Arc::new(Package::Chd(ConstantHead { cells: chd_cells, nper: 2 })),
            Arc::new(Package::Oc(oc())),
            Arc::new(Package::Solver(solver())),
        ]
    }

    #[test]
    fn test_constant_and_internal_arrays() {
        let mut out = String::new();
        write_array(&mut out, Dialect::Mf6, "top", &[1.0, 1.0, 1.0], 3).unwrap();
        assert_eq!(out, "    CONSTANT  1\n");

        let mut out = String::new();
        write_array(&mut out, Dialect::Mf6, "top", &[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(out, "    INTERNAL  FACTOR  1.0\n      1 2\n      3 4\n");

        let mut out = String::new();
        write_array(&mut out, Dialect::Mf2005, "delr", &[2.5, 3.0], 2).unwrap();
        assert_eq!(out, "INTERNAL  1.0  (FREE)  -1  # delr\n2.5 3\n");
    }

    #[test]
    fn test_mf6_layout() {
        let workspace = tempfile::tempdir().unwrap();
        let packages = mf6_packages(Some(12.0), vec![HeadCell { layer: 0, row: 0, column: 0, head: 4.0 }]);
        let files = write_model(workspace.path(), FamilyKind::Mf6, "m", PackageSet::new(&packages)).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["mfsim.nam", "m.tdis", "m.ims", "m.nam", "m.dis", "m.ic", "m.npf", "m.sto", "m.chd", "m.oc"]
        );

        let dis_text = std::fs::read_to_string(workspace.path().join("m.dis")).unwrap();
        assert!(dis_text.contains("ANGROT  15"));
        assert!(dis_text.contains("  delc\n    INTERNAL  FACTOR  1.0\n      50 60\n"));
        let chd_text = std::fs::read_to_string(workspace.path().join("m.chd")).unwrap();
        assert!(chd_text.contains("  1  1  1  4\n"));
    }

    #[test]
    fn test_mf6_storage_follows_periods() {
        let workspace = tempfile::tempdir().unwrap();
        let packages = mf6_packages(Some(12.0), vec![]);
        write_model(workspace.path(), FamilyKind::Mf6, "m", PackageSet::new(&packages)).unwrap();

        let nam = std::fs::read_to_string(workspace.path().join("m.nam")).unwrap();
        assert!(nam.contains("  STO6  m.sto  sto\n"));

        let sto = std::fs::read_to_string(workspace.path().join("m.sto")).unwrap();
        assert!(sto.contains("  iconvert  LAYERED\n    CONSTANT  1\n    CONSTANT  0\n"));
        assert!(sto.contains("  ss  LAYERED\n    CONSTANT  0.00001\n"));
        assert!(sto.contains("  sy  LAYERED\n    CONSTANT  0.2\n"));
        assert!(sto.contains("BEGIN period  1\n  STEADY-STATE\nEND period  1"));
        assert!(sto.contains("BEGIN period  2\n  TRANSIENT\nEND period  2"));
    }

    #[test]
    fn test_mf6_skips_empty_chd() {
        let workspace = tempfile::tempdir().unwrap();
        let packages = mf6_packages(Some(12.0), vec![]);
        let files = write_model(workspace.path(), FamilyKind::Mf6, "m", PackageSet::new(&packages)).unwrap();
        assert!(!files.iter().any(|p| p.ends_with("m.chd")));
        let nam = std::fs::read_to_string(workspace.path().join("m.nam")).unwrap();
        assert!(!nam.contains("CHD6"));
    }

    #[test]
    fn test_missing_top_is_an_error() {
        let workspace = tempfile::tempdir().unwrap();
        let packages = mf6_packages(None, vec![]);
        let err = write_model(workspace.path(), FamilyKind::Mf6, "m", PackageSet::new(&packages)).unwrap_err();
        assert!(err.to_string().contains("model top"));
    }

    #[test]
    fn test_nwt_layout() {
        let workspace = tempfile::tempdir().unwrap();
        let packages = vec![
            Arc::new(Package::Tdis(tdis())),
            Arc::new(Package::Dis(dis(Some(12.0)))),
            Arc::new(Package::Bas6(BasicPackage {
                ibound: Array3::from_elem((2, 2, 3), 1),
                strt: Array3::from_elem((2, 2, 3), 5.0),
                hnoflo: -9999.0,
            })),
            Arc::new(Package::Properties(props())),
            Arc::new(Package::Oc(oc())),
            Arc::new(Package::Solver(solver())),
        ];
        let files = write_model(workspace.path(), FamilyKind::Mfnwt, "m", PackageSet::new(&packages)).unwrap();
        assert_eq!(files.len(), 6);

        let dis_text = std::fs::read_to_string(workspace.path().join("m.dis")).unwrap();
        let mut lines = dis_text.lines().skip(1);
        assert_eq!(lines.next(), Some("2 2 3 2 4 2"));
        assert!(dis_text.ends_with("1 1 1 SS\n30 3 1.2 TR\n"));

        let upw = std::fs::read_to_string(workspace.path().join("m.upw")).unwrap();
        assert!(upw.contains("# sy layer 1"));
        assert!(!upw.contains("# sy layer 2"));

        let oc_text = std::fs::read_to_string(workspace.path().join("m.oc")).unwrap();
        assert!(oc_text.contains("PERIOD 2 STEP 3"));
        assert!(!oc_text.contains("PERIOD 2 STEP 1"));
    }
}
