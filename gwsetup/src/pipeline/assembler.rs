//! The model: configuration, stage graph and memoized stage outputs.

use super::cache::{cache_key, PackageCache};
use super::StageGraph;
use crate::builders::{check_grid_options, BuildContext, StageInputs};
use crate::config::{ConfigStore, GridOptions, ModelOptions, MODEL_BLOCK};
use crate::core::{Grid, Package, StageStatus};
use crate::errors::{ConfigurationError, Result, SetupError};
use crate::events::{
    EventSink, NoOpEventSink, RUN_COMPLETED, RUN_SKIPPED, STAGE_CACHED, STAGE_COMPLETED, STAGE_FAILED,
    STAGE_INVALIDATED, STAGE_STARTED,
};
use crate::family::{GridSourceKind, ModelFamily};
use crate::geo::{load_with_timeout, Raster, RasterSource, RasterStore};
use crate::observability::{SpanTimer, StageSpanAttributes};
use crate::run::{RunController, RunOptions, RunResult, RunStatus};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct StageRecord {
    status: StageStatus,
    remake: bool,
    output: Option<Arc<Package>>,
}

/// One groundwater model under assembly.
///
/// Stages are built lazily: requesting a stage builds its unbuilt
/// prerequisites once each, in execution order, and memoizes every output.
/// A stage that fails leaves its record as it was before the attempt.
pub struct Model {
    id: Uuid,
    family: ModelFamily,
    config: ConfigStore,
    graph: StageGraph,
    records: HashMap<String, StageRecord>,
    rasters: RasterStore,
    cache: Option<Arc<PackageCache>>,
    events: Arc<dyn EventSink>,
    run_options: RunOptions,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.id)
            .field("family", &self.family.kind)
            .field("name", &self.config.model_name())
            .field("stages", &self.graph.execution_order())
            .field("rasters", &self.rasters.len())
            .field("shared_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Creates a model from an already-parsed configuration tree.
    ///
    /// # Errors
    ///
    /// Returns a structural error if the family's schema is invalid, the
    /// configuration is not a mapping, or the grid has no geometry source.
    pub fn new(config: Value, family: ModelFamily) -> Result<Self> {
        Self::from_store(ConfigStore::new(config)?, family)
    }

    /// Creates a model from a configuration store.
    ///
    /// # Errors
    ///
    /// See [`Model::new`].
    pub fn from_store(config: ConfigStore, family: ModelFamily) -> Result<Self> {
        let graph = StageGraph::new(family.stages.clone())?;
        let mut config = config.with_defaults(&family.default_config());
        config.ensure_blocks(graph.stage_names())?;
        config.options::<ModelOptions>(MODEL_BLOCK)?;

        if let Some(grid_stage) = family.grid_stage() {
            let opts: GridOptions = config.options(grid_stage)?;
            check_grid_options(&opts)?;
            let (source, option, description) = if opts.has_explicit_geometry() {
                (GridSourceKind::Explicit, "nrow", "explicit geometry")
            } else {
                (GridSourceKind::Dem, "dem", "a dem")
            };
            if !family.grid_sources.contains(&source) {
                return Err(ConfigurationError::new(format!(
                    "the {} family does not build grids from {description}",
                    family.kind
                ))
                .for_stage(grid_stage)
                .with_option(option)
                .into());
            }
        }

        let records = graph
            .stage_names()
            .map(|name| (name.to_string(), StageRecord::default()))
            .collect();
        let run_options = RunOptions::new().with_success_marker(family.success_marker.clone());

        let model = Self {
            id: Uuid::new_v4(),
            family,
            config,
            graph,
            records,
            rasters: RasterStore::new(),
            cache: None,
            events: Arc::new(NoOpEventSink),
            run_options,
        };
        tracing::debug!(
            model = %model.id,
            family = %model.family.kind,
            stages = model.graph.len(),
            "Model created"
        );
        Ok(model)
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Shares a package cache with other models.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<PackageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the run options. The timeout given to [`Model::run`] overrides
    /// the one set here.
    #[must_use]
    pub fn with_run_options(mut self, options: RunOptions) -> Self {
        self.run_options = options;
        self
    }

    /// Adds a raster under the path stages refer to it by.
    #[must_use]
    pub fn with_raster(mut self, path: impl Into<String>, raster: Raster) -> Self {
        self.insert_raster(path, raster);
        self
    }

    /// Adds or replaces a raster.
    pub fn insert_raster(&mut self, path: impl Into<String>, raster: Raster) {
        self.rasters.insert(path, raster);
    }

    /// Raster paths referenced by the configuration: the grid's `dem` and
    /// every `*_raster` option.
    #[must_use]
    pub fn raster_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        for name in self.graph.stage_names() {
            let Some(Value::Object(block)) = self.config.block(name) else {
                continue;
            };
            for (key, value) in block {
                if key != "dem" && !key.ends_with("_raster") {
                    continue;
                }
                let path = match value {
                    Value::String(path) => Some(path.as_str()),
                    Value::Object(spec) => spec.get("path").and_then(Value::as_str),
                    _ => None,
                };
                if let Some(path) = path {
                    paths.insert(path.to_string());
                }
            }
        }
        paths
    }

    /// Loads every referenced raster that is not loaded yet.
    ///
    /// # Errors
    ///
    /// Returns the first raster-load error, including timeouts. Rasters
    /// loaded before the failure stay loaded.
    pub async fn load_rasters(&mut self, source: &dyn RasterSource, timeout: Option<Duration>) -> Result<Vec<String>> {
        let mut loaded = Vec::new();
        for path in self.raster_paths() {
            if self.rasters.contains(&path) {
                continue;
            }
            let raster = load_with_timeout(source, &path, timeout).await?;
            tracing::debug!(model = %self.id, raster = %path, rows = raster.nrows(), cols = raster.ncols(), "Raster loaded");
            self.rasters.insert(path.clone(), raster);
            loaded.push(path);
        }
        Ok(loaded)
    }

    /// The model instance id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The model family.
    #[must_use]
    pub fn family(&self) -> &ModelFamily {
        &self.family
    }

    /// The model name.
    #[must_use]
    pub fn name(&self) -> String {
        self.config.model_name()
    }

    /// The workspace directory solver files are written to.
    #[must_use]
    pub fn workspace(&self) -> PathBuf {
        PathBuf::from(self.config.workspace())
    }

    /// The stage graph.
    #[must_use]
    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Mutable configuration. Changes take effect for stages built after the
    /// change; set a remake flag or call [`Model::mark_remake`] to rebuild.
    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    /// Top-level configuration keys the pipeline does not use.
    #[must_use]
    pub fn passthrough(&self) -> Map<String, Value> {
        let known: Vec<&str> = self.graph.stage_names().collect();
        self.config.passthrough(&known)
    }

    /// The rasters loaded into the model.
    #[must_use]
    pub fn rasters(&self) -> &RasterStore {
        &self.rasters
    }

    /// Builds a stage and any prerequisites that are not built.
    ///
    /// With `force_remake`, the stage and everything depending on it are
    /// invalidated first.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStage` for names outside the schema, or the error of
    /// the first stage that fails to build.
    pub fn build_stage(&mut self, name: &str, force_remake: bool) -> Result<Arc<Package>> {
        if !self.graph.contains(name) {
            return Err(SetupError::UnknownStage(name.to_string()));
        }
        self.apply_config_remakes();
        if force_remake {
            self.mark_remake(name)?;
        }

        let key = self.cache.as_ref().map(|_| self.cache_key());
        for stage in self.graph.prerequisites_closure(name) {
            if !self.is_built(&stage) {
                self.build_one(&stage, key.as_deref())?;
            }
        }
        self.output(name)
            .ok_or_else(|| SetupError::Internal(format!("stage '{name}' has no output after building")))
    }

    /// Builds every stage in execution order.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails.
    pub fn build_all(&mut self) -> Result<()> {
        let order = self.graph.execution_order().to_vec();
        for stage in order {
            self.build_stage(&stage, false)?;
        }
        Ok(())
    }

    /// Invalidates a stage and everything reachable from it. Returns the
    /// invalidated stages in execution order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStage` for names outside the schema.
    pub fn mark_remake(&mut self, name: &str) -> Result<Vec<String>> {
        if !self.graph.contains(name) {
            return Err(SetupError::UnknownStage(name.to_string()));
        }
        Ok(self.invalidate(name))
    }

    fn invalidate(&mut self, name: &str) -> Vec<String> {
        let invalidated = self.graph.dependents_closure(name);
        for stage in &invalidated {
            if let Some(record) = self.records.get_mut(stage) {
                record.remake = true;
                if record.status == StageStatus::Built {
                    record.status = StageStatus::Stale;
                }
                record.output = None;
            }
            self.events.emit(
                STAGE_INVALIDATED,
                Some(serde_json::json!({ "stage": stage, "cause": name, "model_id": self.id.to_string() })),
            );
        }
        tracing::debug!(model = %self.id, stage = name, invalidated = ?invalidated, "Stages marked for remake");
        invalidated
    }

    /// The status of a stage.
    #[must_use]
    pub fn stage_status(&self, name: &str) -> Option<StageStatus> {
        self.records.get(name).map(|r| r.status)
    }

    /// Returns true if the stage is built and current.
    #[must_use]
    pub fn is_built(&self, name: &str) -> bool {
        self.stage_status(name).is_some_and(|s| s.is_current())
    }

    /// The output of a built stage.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<Arc<Package>> {
        self.records
            .get(name)
            .filter(|r| r.status.is_current())
            .and_then(|r| r.output.clone())
    }

    /// The grid, if the grid stage is built.
    #[must_use]
    pub fn grid(&self) -> Option<Arc<Grid>> {
        let stage = self.family.grid_stage()?;
        self.output(stage)?.as_grid().cloned()
    }

    /// Outputs of every built stage, in execution order.
    #[must_use]
    pub fn built_packages(&self) -> Vec<Arc<Package>> {
        self.graph
            .execution_order()
            .iter()
            .filter_map(|stage| self.output(stage))
            .collect()
    }

    /// A run controller for this model's workspace and family.
    #[must_use]
    pub fn controller(&self) -> RunController {
        let name = self.name();
        RunController::new(self.workspace(), self.family.kind, name.clone())
            .with_listing_file(self.family.listing_file(&name))
            .with_options(self.run_options.clone().with_args(self.family.run_args(&name)))
    }

    /// Builds every stage and writes the solver input files.
    ///
    /// # Errors
    ///
    /// Returns the first build error, or a write error.
    pub fn write(&mut self) -> Result<Vec<PathBuf>> {
        self.build_all()?;
        let files = self.controller().write(&self.built_packages())?;
        tracing::info!(model = %self.id, files = files.len(), "Solver input files written");
        Ok(files)
    }

    /// Runs the solver in the workspace. `executable` defaults to the model
    /// block's `executable`, then to the family's default. A missing
    /// executable is reported as a result that was not attempted.
    pub async fn run(&self, executable: Option<&str>, timeout: Option<Duration>) -> RunResult {
        let configured = self
            .config
            .options::<ModelOptions>(MODEL_BLOCK)
            .ok()
            .and_then(|opts| opts.executable);
        let executable = executable
            .map(str::to_string)
            .or(configured)
            .unwrap_or_else(|| self.family.default_executable.clone());

        let mut options = self.run_options.clone().with_args(self.family.run_args(&self.name()));
        if let Some(limit) = timeout {
            options = options.with_timeout(limit);
        }
        let result = self.controller().with_options(options).run(&executable).await;
        let mut data = result.to_event_data();
        if let Value::Object(map) = &mut data {
            map.insert("model_id".to_string(), Value::String(self.id.to_string()));
            map.insert("executable".to_string(), Value::String(executable));
        }
        let event = if result.status == RunStatus::NotAttempted {
            RUN_SKIPPED
        } else {
            RUN_COMPLETED
        };
        self.events.emit(event, Some(data));
        result
    }

    fn cache_key(&self) -> String {
        format!("{}:{}", self.family.kind, cache_key(&self.config, &self.rasters))
    }

    /// Turns config remake flags into invalidations and consumes them.
    fn apply_config_remakes(&mut self) {
        let requested: Vec<String> = self
            .graph
            .execution_order()
            .iter()
            .filter(|stage| self.config.remake_requested(stage))
            .cloned()
            .collect();
        for stage in requested {
            self.invalidate(&stage);
            self.config.clear_remake(&stage);
        }
    }

    fn build_one(&mut self, stage: &str, key: Option<&str>) -> Result<()> {
        let Some(spec) = self.graph.spec(stage) else {
            return Err(SetupError::UnknownStage(stage.to_string()));
        };
        let builder = Arc::clone(&spec.builder);
        let dependencies = spec.dependencies.clone();
        let attrs = StageSpanAttributes::new(self.id.to_string(), stage).with_kind(spec.kind);
        let remake = self.records.get(stage).is_some_and(|r| r.remake);

        // A remake bypasses the shared cache and overwrites the entry.
        let cached = match (&self.cache, key) {
            (Some(cache), Some(key)) if !remake => cache.get(key, stage),
            _ => None,
        };
        if let Some(package) = cached {
            tracing::debug!(model = %self.id, stage, "Stage output taken from cache");
            self.events.emit(STAGE_CACHED, Some(attrs.cached().to_event_data()));
            self.store(stage, package);
            return Ok(());
        }

        tracing::debug!(model = %self.id, stage, builder = builder.name(), "Building stage");
        self.events.emit(STAGE_STARTED, Some(attrs.to_event_data()));
        let timer = SpanTimer::start(stage);

        let upstream = dependencies
            .iter()
            .filter_map(|dep| self.output(dep).map(|output| (dep.clone(), output)))
            .collect::<Vec<_>>();
        let inputs = StageInputs::new(upstream, dependencies, stage);
        let model_name = self.config.model_name();
        let ctx = BuildContext::new(stage, &model_name, self.config.block(stage), inputs, &self.rasters);
        let built = builder.build(&ctx);
        let duration_ms = timer.finish();

        match built {
            Ok(package) => {
                let package = Arc::new(package);
                if let (Some(cache), Some(key)) = (&self.cache, key) {
                    cache.insert(key, stage, Arc::clone(&package));
                }
                self.store(stage, package);
                tracing::info!(model = %self.id, stage, duration_ms, "Stage built");
                self.events.emit(STAGE_COMPLETED, Some(attrs.with_duration_ms(duration_ms).to_event_data()));
                Ok(())
            }
            Err(e) => {
                tracing::error!(model = %self.id, stage, duration_ms, error = %e, "Stage failed");
                self.events.emit(
                    STAGE_FAILED,
                    Some(attrs.with_duration_ms(duration_ms).with_error(e.to_string()).to_event_data()),
                );
                Err(e)
            }
        }
    }

    fn store(&mut self, stage: &str, package: Arc<Package>) {
        if let Some(record) = self.records.get_mut(stage) {
            record.status = StageStatus::Built;
            record.remake = false;
            record.output = Some(package);
        }
    }
}
