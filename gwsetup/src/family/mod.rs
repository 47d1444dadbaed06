//! Model families: the stage schema and solver conventions of one MODFLOW
//! variant, expressed as data.

use crate::builders::{
    ConstantHeadBuilder, DisBuilder, GridBuilder, InitialConditionsBuilder, OutputControlBuilder,
    PropertiesBuilder, SolverBuilder, TdisBuilder,
};
use crate::config::MODEL_BLOCK;
use crate::core::StageKind;
use crate::pipeline::StageSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Default success marker written by both solvers on completion.
pub const DEFAULT_SUCCESS_MARKER: &str = "normal termination";

/// The supported solver families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyKind {
    /// MODFLOW 6.
    Mf6,
    /// MODFLOW-NWT.
    Mfnwt,
}

impl fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mf6 => write!(f, "mf6"),
            Self::Mfnwt => write!(f, "mfnwt"),
        }
    }
}

/// Where grid geometry may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridSourceKind {
    /// nrow, ncol, delr and delc given directly.
    Explicit,
    /// Extent taken from a DEM raster.
    Dem,
}

/// A model family.
#[derive(Debug, Clone)]
pub struct ModelFamily {
    /// The family.
    pub kind: FamilyKind,
    /// Stage schema in declaration order.
    pub stages: Vec<StageSpec>,
    /// Supported grid sources.
    pub grid_sources: Vec<GridSourceKind>,
    /// Text whose presence in the solver log marks a successful run.
    pub success_marker: String,
    /// Executable looked up on PATH when none is configured.
    pub default_executable: String,
}

impl ModelFamily {
    /// The MODFLOW 6 family.
    #[must_use]
    pub fn mf6() -> Self {
        let stages = vec![
            StageSpec::new("grid", StageKind::Grid, Arc::new(GridBuilder)),
            StageSpec::new("tdis", StageKind::Temporal, Arc::new(TdisBuilder)),
            StageSpec::new("dis", StageKind::Spatial, Arc::new(DisBuilder)).with_dependency("grid"),
            StageSpec::new("npf", StageKind::Spatial, Arc::new(PropertiesBuilder)).with_dependency("dis"),
            StageSpec::new("ic", StageKind::Condition, Arc::new(InitialConditionsBuilder::ic()))
                .with_dependency("dis"),
            StageSpec::new("chd", StageKind::Condition, Arc::new(ConstantHeadBuilder))
                .with_dependencies(["dis", "tdis"]),
            StageSpec::new("oc", StageKind::Auxiliary, Arc::new(OutputControlBuilder)).with_dependency("tdis"),
            StageSpec::new("ims", StageKind::Auxiliary, Arc::new(SolverBuilder)),
        ];
        Self::custom(FamilyKind::Mf6, stages)
    }

    /// The MODFLOW-NWT family. TDIS is its own stage but is written into the
    /// DIS file, so DIS depends on it.
    #[must_use]
    pub fn mfnwt() -> Self {
        let stages = vec![
            StageSpec::new("grid", StageKind::Grid, Arc::new(GridBuilder)),
            StageSpec::new("tdis", StageKind::Temporal, Arc::new(TdisBuilder)),
            StageSpec::new("dis", StageKind::Spatial, Arc::new(DisBuilder)).with_dependencies(["grid", "tdis"]),
            StageSpec::new("upw", StageKind::Spatial, Arc::new(PropertiesBuilder)).with_dependency("dis"),
            StageSpec::new("bas6", StageKind::Condition, Arc::new(InitialConditionsBuilder::bas6()))
                .with_dependency("dis"),
            StageSpec::new("chd", StageKind::Condition, Arc::new(ConstantHeadBuilder))
                .with_dependencies(["dis", "tdis"]),
            StageSpec::new("oc", StageKind::Auxiliary, Arc::new(OutputControlBuilder)).with_dependency("tdis"),
            StageSpec::new("nwt", StageKind::Auxiliary, Arc::new(SolverBuilder)),
        ];
        Self::custom(FamilyKind::Mfnwt, stages)
    }

    /// A family with a custom stage schema and the kind's solver conventions.
    #[must_use]
    pub fn custom(kind: FamilyKind, stages: Vec<StageSpec>) -> Self {
        Self {
            kind,
            stages,
            grid_sources: vec![GridSourceKind::Explicit, GridSourceKind::Dem],
            success_marker: DEFAULT_SUCCESS_MARKER.to_string(),
            default_executable: kind.to_string(),
        }
    }

    /// Restricts the grid sources the family accepts.
    #[must_use]
    pub fn with_grid_sources(mut self, sources: impl IntoIterator<Item = GridSourceKind>) -> Self {
        self.grid_sources = sources.into_iter().collect();
        self
    }

    /// Overrides the success marker.
    #[must_use]
    pub fn with_success_marker(mut self, marker: impl Into<String>) -> Self {
        self.success_marker = marker.into();
        self
    }

    /// Stage names in declaration order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name.as_str())
    }

    /// The name of the grid stage, if the schema has one.
    #[must_use]
    pub fn grid_stage(&self) -> Option<&str> {
        self.stages
            .iter()
            .find(|s| s.kind == StageKind::Grid)
            .map(|s| s.name.as_str())
    }

    /// The solver's listing file.
    #[must_use]
    pub fn listing_file(&self, model_name: &str) -> String {
        match self.kind {
            FamilyKind::Mf6 => "mfsim.lst".to_string(),
            FamilyKind::Mfnwt => format!("{model_name}.list"),
        }
    }

    /// The name file the solver reads first.
    #[must_use]
    pub fn name_file(&self, model_name: &str) -> String {
        match self.kind {
            FamilyKind::Mf6 => "mfsim.nam".to_string(),
            FamilyKind::Mfnwt => format!("{model_name}.nam"),
        }
    }

    /// Command-line arguments for the solver.
    #[must_use]
    pub fn run_args(&self, model_name: &str) -> Vec<String> {
        match self.kind {
            FamilyKind::Mf6 => Vec::new(),
            FamilyKind::Mfnwt => vec![self.name_file(model_name)],
        }
    }

    /// Defaults merged beneath user configuration: an empty model block and
    /// an empty block per stage. Model settings fall back to their defaults
    /// when read, so aliases in user blocks are not shadowed.
    #[must_use]
    pub fn default_config(&self) -> Value {
        let mut tree = Map::new();
        tree.insert(MODEL_BLOCK.to_string(), Value::Object(Map::new()));
        for name in self.stage_names() {
            tree.insert(name.to_string(), Value::Object(Map::new()));
        }
        Value::Object(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageGraph;

    #[test]
    fn test_mf6_schema() {
        let family = ModelFamily::mf6();
        let graph = StageGraph::new(family.stages.clone()).unwrap();
        assert_eq!(
            graph.execution_order(),
            &["grid", "tdis", "dis", "npf", "ic", "chd", "oc", "ims"]
        );
        assert_eq!(family.grid_stage(), Some("grid"));
        assert_eq!(family.listing_file("m"), "mfsim.lst");
        assert!(family.run_args("m").is_empty());
        assert_eq!(family.default_executable, "mf6");
    }

    #[test]
    fn test_nwt_schema() {
        let family = ModelFamily::mfnwt();
        let graph = StageGraph::new(family.stages.clone()).unwrap();
        assert_eq!(
            graph.execution_order(),
            &["grid", "tdis", "dis", "upw", "bas6", "chd", "oc", "nwt"]
        );
        assert_eq!(family.listing_file("m"), "m.list");
        assert_eq!(family.run_args("m"), vec!["m.nam"]);
        assert_eq!(family.default_executable, "mfnwt");
    }

    #[test]
    fn test_default_config_has_every_block() {
        let family = ModelFamily::mf6().with_success_marker("done");
        let config = family.default_config();
        for name in family.stage_names() {
            assert!(config[name].is_object(), "missing block {name}");
        }
        assert!(config["model"].as_object().unwrap().is_empty());
        assert_eq!(family.success_marker, "done");
    }
}
