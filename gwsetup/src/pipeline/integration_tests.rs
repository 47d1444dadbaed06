//! End-to-end scenarios for model assembly, invalidation and solver runs.

#[cfg(test)]
mod tests {
    use crate::core::{Package, StageStatus};
    use crate::errors::SetupError;
    use crate::events::{
        CollectingEventSink, RUN_SKIPPED, STAGE_CACHED, STAGE_COMPLETED, STAGE_INVALIDATED, STAGE_STARTED,
    };
    use crate::family::{GridSourceKind, ModelFamily};
    use crate::geo::InMemoryRasterSource;
    use crate::pipeline::{Model, PackageCache};
    use crate::run::RunStatus;
    use crate::testing::{
        assert_all_close, assert_same_output, assert_stage_built, assert_stage_not_built, dem_grid_config,
        explicit_grid_config, uniform_raster,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn with_top(mut config: Value, top: f64) -> Value {
        config["dis"] = json!({ "top": top, "thickness": 10.0 });
        config
    }

    fn collecting_model(config: Value, family: ModelFamily) -> (Model, Arc<CollectingEventSink>) {
        let sink = Arc::new(CollectingEventSink::new());
        let model = Model::new(config, family).unwrap().with_event_sink(sink.clone());
        (model, sink)
    }

    #[test]
    fn test_explicit_grid_without_dem() {
        let mut model = Model::new(explicit_grid_config(10, 10, 100.0), ModelFamily::mf6()).unwrap();

        let grid = model.build_stage("grid", false).unwrap();
        let grid = grid.as_grid().unwrap();
        assert_eq!(grid.shape(), (1, 10, 10));
        assert!(grid.active().iter().all(|a| *a));
        assert!(grid.dem().is_none());

        let dis = model.build_stage("dis", false).unwrap();
        let dis = dis.as_dis().unwrap();
        assert!(dis.top.is_none());
        assert_eq!(dis.botm.dim(), (1, 10, 10));
        assert_stage_built(&model, "grid");
        assert_stage_built(&model, "dis");
        assert_stage_not_built(&model, "tdis");
    }

    #[test]
    fn test_explicit_grid_rebuild_is_identical() {
        let config = explicit_grid_config(7, 9, 25.0);
        let mut a = Model::new(config.clone(), ModelFamily::mf6()).unwrap();
        let mut b = Model::new(config, ModelFamily::mf6()).unwrap();
        let ga = a.build_stage("grid", false).unwrap();
        let gb = b.build_stage("grid", false).unwrap();
        assert_eq!(*ga, *gb);

        let again = a.build_stage("grid", true).unwrap();
        assert!(!Arc::ptr_eq(&ga, &again));
        assert_eq!(*ga, *again);
    }

    #[test]
    fn test_dem_regrid_uniform_raster_any_cell_size() {
        for raster_cell in [8.0, 25.0, 40.0, 125.0, 250.0] {
            let n = (1000.0_f64 / raster_cell).round() as usize;
            let raster = uniform_raster(n, n, raster_cell, (500.0, 2000.0), 250.0).unwrap();
            let mut model = Model::new(dem_grid_config("dem.asc", 100.0), ModelFamily::mf6())
                .unwrap()
                .with_raster("dem.asc", raster);

            let dis = model.build_stage("dis", false).unwrap();
            let dis = dis.as_dis().unwrap();
            assert_eq!(dis.grid.shape(), (1, 10, 10));
            assert_eq!(dis.grid.origin(), (500.0, 2000.0));
            let top = dis.top.as_ref().unwrap();
            assert_all_close(top.iter(), 250.0, 1e-9);
        }
    }

    #[test]
    fn test_resampling_twice_is_identical() {
        let raster = uniform_raster(40, 40, 25.0, (0.0, 0.0), 120.0).unwrap();
        let mut config = dem_grid_config("dem.asc", 50.0);
        config["grid"]["rotation"] = json!(0.0);
        let mut model = Model::new(config, ModelFamily::mf6())
            .unwrap()
            .with_raster("dem.asc", raster);

        let first = model.build_stage("dis", false).unwrap();
        let second = model.build_stage("dis", true).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.as_dis().unwrap().top, second.as_dis().unwrap().top);
    }

    #[test]
    fn test_mark_remake_invalidates_reachable_set_only() {
        let (mut model, sink) = collecting_model(with_top(explicit_grid_config(5, 5, 10.0), 20.0), ModelFamily::mf6());
        model.build_all().unwrap();
        let before: Vec<(String, Arc<Package>)> = model
            .graph()
            .execution_order()
            .iter()
            .map(|s| (s.clone(), model.output(s).unwrap()))
            .collect();

        let invalidated = model.mark_remake("dis").unwrap();
        assert_eq!(invalidated, vec!["dis", "npf", "ic", "chd"]);
        assert_eq!(sink.stages_for(STAGE_INVALIDATED), invalidated);

        for (stage, output) in &before {
            if invalidated.contains(stage) {
                assert_eq!(model.stage_status(stage), Some(StageStatus::Stale));
                assert!(model.output(stage).is_none());
            } else {
                assert_same_output(output, &model.output(stage).unwrap());
            }
        }

        sink.clear();
        model.build_all().unwrap();
        assert_eq!(sink.stages_for(STAGE_STARTED), vec!["dis", "npf", "ic", "chd"]);
    }

    #[test]
    fn test_minimal_prerequisites_in_priority_order() {
        let (mut model, sink) = collecting_model(with_top(explicit_grid_config(4, 4, 10.0), 5.0), ModelFamily::mf6());

        model.build_stage("chd", false).unwrap();
        assert_eq!(sink.stages_for(STAGE_STARTED), vec!["grid", "tdis", "dis", "chd"]);
        assert_eq!(sink.stages_for(STAGE_COMPLETED), vec!["grid", "tdis", "dis", "chd"]);

        sink.clear();
        model.build_stage("ic", false).unwrap();
        model.build_stage("ic", false).unwrap();
        assert_eq!(sink.stages_for(STAGE_STARTED), vec!["ic"]);
        assert_stage_not_built(&model, "npf");
        assert_stage_not_built(&model, "ims");
    }

    #[test]
    fn test_request_order_does_not_change_build_order() {
        let (mut model, sink) = collecting_model(with_top(explicit_grid_config(4, 4, 10.0), 5.0), ModelFamily::mfnwt());
        model.build_stage("oc", false).unwrap();
        model.build_stage("bas6", false).unwrap();
        assert_eq!(sink.stages_for(STAGE_STARTED), vec!["tdis", "oc", "grid", "dis", "bas6"]);

        let (mut other, other_sink) =
            collecting_model(with_top(explicit_grid_config(4, 4, 10.0), 5.0), ModelFamily::mfnwt());
        other.build_stage("bas6", false).unwrap();
        assert_eq!(other_sink.stages_for(STAGE_STARTED), vec!["grid", "tdis", "dis", "bas6"]);
    }

    #[test]
    fn test_remake_grid_with_new_rotation() {
        let mut model = Model::new(with_top(explicit_grid_config(3, 3, 10.0), 1.0), ModelFamily::mf6()).unwrap();
        let dis = model.build_stage("dis", false).unwrap();
        assert_eq!(dis.as_dis().unwrap().grid.rotation(), 0.0);

        model.config_mut().set_option("grid", "rotation", json!(30.0));
        // Without a remake the memoized output is served.
        let unchanged = model.build_stage("dis", false).unwrap();
        assert_same_output(&dis, &unchanged);

        model.mark_remake("grid").unwrap();
        let rebuilt = model.build_stage("dis", false).unwrap();
        assert_eq!(rebuilt.as_dis().unwrap().grid.rotation(), 30.0);
        assert_eq!(model.grid().unwrap().rotation(), 30.0);
    }

    #[test]
    fn test_config_remake_flag_is_consumed() {
        let (mut model, sink) = collecting_model(with_top(explicit_grid_config(3, 3, 10.0), 1.0), ModelFamily::mf6());
        model.build_stage("ic", false).unwrap();
        sink.clear();

        model.config_mut().set_option("dis", "remake_top", json!(true));
        model.config_mut().set_option("dis", "top", json!(4.0));
        let ic = model.build_stage("ic", false).unwrap();
        assert_eq!(sink.stages_for(STAGE_STARTED), vec!["dis", "ic"]);
        assert!(ic.starting_heads().unwrap().iter().all(|h| *h == 4.0));
        assert!(!model.config().remake_requested("dis"));

        sink.clear();
        model.build_stage("ic", false).unwrap();
        assert!(sink.stages_for(STAGE_STARTED).is_empty());
    }

    #[test]
    fn test_shared_cache_between_models() {
        let cache = Arc::new(PackageCache::new());
        let config = with_top(explicit_grid_config(6, 6, 10.0), 3.0);

        let mut first = Model::new(config.clone(), ModelFamily::mf6())
            .unwrap()
            .with_cache(Arc::clone(&cache));
        first.build_all().unwrap();
        assert_eq!(cache.len(), 8);

        let (second, sink) = collecting_model(config, ModelFamily::mf6());
        let mut second = second.with_cache(Arc::clone(&cache));
        let dis = second.build_stage("dis", false).unwrap();
        assert_eq!(sink.stages_for(STAGE_CACHED), vec!["grid", "dis"]);
        assert!(sink.stages_for(STAGE_STARTED).is_empty());
        assert_same_output(&dis, &first.output("dis").unwrap());

        // A forced remake bypasses the cache and replaces the entry.
        sink.clear();
        let rebuilt = second.build_stage("dis", true).unwrap();
        assert_eq!(sink.stages_for(STAGE_STARTED), vec!["dis"]);
        assert!(!Arc::ptr_eq(&dis, &rebuilt));
    }

    #[test]
    fn test_cache_separates_configs_and_families() {
        let cache = Arc::new(PackageCache::new());
        let mut a = Model::new(with_top(explicit_grid_config(2, 2, 1.0), 3.0), ModelFamily::mf6())
            .unwrap()
            .with_cache(Arc::clone(&cache));
        let mut b = Model::new(with_top(explicit_grid_config(3, 3, 1.0), 3.0), ModelFamily::mf6())
            .unwrap()
            .with_cache(Arc::clone(&cache));
        let mut c = Model::new(with_top(explicit_grid_config(2, 2, 1.0), 3.0), ModelFamily::mfnwt())
            .unwrap()
            .with_cache(Arc::clone(&cache));
        let ga = a.build_stage("grid", false).unwrap();
        let gb = b.build_stage("grid", false).unwrap();
        let gc = c.build_stage("grid", false).unwrap();
        assert!(!Arc::ptr_eq(&ga, &gb));
        assert!(!Arc::ptr_eq(&ga, &gc));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_missing_grid_source_is_structural() {
        let err = Model::new(json!({"dis": {"top": 1.0}}), ModelFamily::mf6()).unwrap_err();
        assert!(err.is_structural());
        match err {
            SetupError::Configuration(e) => {
                assert_eq!(e.error_info.unwrap().code, "SETUP-001-NO_GRID_SOURCE");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dem_grid_with_zero_spacing_is_rejected() {
        let mut config = dem_grid_config("dem.asc", 100.0);
        config["grid"]["delr"] = json!(0.0);
        match Model::new(config, ModelFamily::mf6()) {
            Err(SetupError::Configuration(e)) => assert_eq!(e.option.as_deref(), Some("delr")),
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_family_grid_sources_are_enforced() {
        let dem_only = ModelFamily::mf6().with_grid_sources([GridSourceKind::Dem]);
        let err = Model::new(explicit_grid_config(2, 2, 1.0), dem_only.clone()).unwrap_err();
        assert!(err.to_string().contains("explicit geometry"), "{err}");
        assert!(Model::new(dem_grid_config("dem.asc", 10.0), dem_only).is_ok());

        let explicit_only = ModelFamily::mf6().with_grid_sources([GridSourceKind::Explicit]);
        let err = Model::new(dem_grid_config("dem.asc", 10.0), explicit_only.clone()).unwrap_err();
        assert!(err.to_string().contains("a dem"), "{err}");
        assert!(Model::new(explicit_grid_config(2, 2, 1.0), explicit_only).is_ok());
    }

    #[test]
    fn test_unknown_stage() {
        let mut model = Model::new(explicit_grid_config(2, 2, 1.0), ModelFamily::mf6()).unwrap();
        assert!(matches!(model.build_stage("sfr", false), Err(SetupError::UnknownStage(_))));
        assert!(matches!(model.mark_remake("sfr"), Err(SetupError::UnknownStage(_))));
    }

    #[test]
    fn test_failed_stage_leaves_graph_untouched() {
        let mut config = explicit_grid_config(3, 3, 10.0);
        config["tdis"] = json!({"periods": [{"perlen": 0.0}]});
        let (mut model, sink) = collecting_model(config, ModelFamily::mf6());

        let err = model.build_stage("chd", false).unwrap_err();
        assert!(!err.is_structural());
        assert_stage_built(&model, "grid");
        assert_eq!(model.stage_status("tdis"), Some(StageStatus::Pending));
        assert_stage_not_built(&model, "dis");
        assert_stage_not_built(&model, "chd");
        assert_eq!(sink.stages_for("stage.failed"), vec!["tdis"]);

        model.config_mut().set_option("tdis", "periods", json!([{"perlen": 1.0}]));
        model.build_stage("chd", false).unwrap();
        assert_stage_built(&model, "chd");
    }

    #[test]
    fn test_passthrough_keys_are_preserved() {
        let mut config = explicit_grid_config(2, 2, 1.0);
        config["postprocessing"] = json!({"plots": true});
        let model = Model::new(config, ModelFamily::mf6()).unwrap();
        let passthrough = model.passthrough();
        assert_eq!(passthrough.len(), 1);
        assert_eq!(passthrough["postprocessing"]["plots"], true);
    }

    #[tokio::test]
    async fn test_load_rasters_then_build() {
        let raster = uniform_raster(20, 20, 50.0, (0.0, 0.0), 42.0).unwrap();
        let source = InMemoryRasterSource::new().with_raster("dem.asc", raster);
        let mut model = Model::new(dem_grid_config("dem.asc", 100.0), ModelFamily::mf6()).unwrap();

        let loaded = model.load_rasters(&source, None).await.unwrap();
        assert_eq!(loaded, vec!["dem.asc"]);
        assert!(model.load_rasters(&source, None).await.unwrap().is_empty());

        let dis = model.build_stage("dis", false).unwrap();
        assert_all_close(dis.as_dis().unwrap().top.as_ref().unwrap().iter(), 42.0, 1e-9);
    }

    #[tokio::test]
    async fn test_missing_executable_not_attempted() {
        let (model, sink) = collecting_model(explicit_grid_config(2, 2, 1.0), ModelFamily::mf6());
        let result = model.run(Some("/definitely/not/a/solver/mf6"), None).await;
        assert!(!result.success);
        assert_eq!(result.status, RunStatus::NotAttempted);
        assert_eq!(sink.event_types(), vec![RUN_SKIPPED]);
    }

    #[test]
    fn test_write_nwt_from_yaml() {
        let workspace = tempfile::tempdir().unwrap();
        let yaml = format!(
            "model:\n  modelname: lake\n  model_ws: {}\ngrid:\n  nrow: 3\n  ncol: 4\n  nlay: 2\n  delr: 50\n  delc: 50\ndis:\n  top: 100\n  botm: [90, 70]\nchd:\n  perimeter_head: 95\n",
            workspace.path().display()
        );
        let store = crate::config::ConfigStore::from_yaml_str(&yaml).unwrap();
        let mut model = Model::from_store(store, ModelFamily::mfnwt()).unwrap();

        let files = model.write().unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["lake.nam", "lake.dis", "lake.bas", "lake.upw", "lake.chd", "lake.oc", "lake.nwt"]);
        for stage in model.graph().execution_order() {
            assert_stage_built(&model, stage);
        }
    }

    #[test]
    fn test_write_mf6_transient_periods() {
        let workspace = tempfile::tempdir().unwrap();
        let mut config = with_top(explicit_grid_config(3, 3, 10.0), 50.0);
        config["model"] = json!({ "name": "basin", "workspace": workspace.path().display().to_string() });
        config["tdis"] = json!({ "periods": [{ "perlen": 1.0 }, { "perlen": 30.0, "nstp": 3 }] });
        config["npf"] = json!({ "ss": 1e-4, "sy": 0.15 });
        let mut model = Model::new(config, ModelFamily::mf6()).unwrap();

        let files = model.write().unwrap();
        assert!(files.iter().any(|p| p.ends_with("basin.sto")));
        let sto = std::fs::read_to_string(workspace.path().join("basin.sto")).unwrap();
        assert!(sto.contains("BEGIN period  1\n  STEADY-STATE\nEND period  1"));
        assert!(sto.contains("BEGIN period  2\n  TRANSIENT\nEND period  2"));
        assert!(sto.contains("  sy  LAYERED\n    CONSTANT  0.15\n"));
    }

    #[cfg(unix)]
    mod solver_runs {
        use super::*;
        use crate::testing::write_stub_solver;
        use pretty_assertions::assert_eq;

        fn model_in(workspace: &std::path::Path) -> Model {
            let mut config = with_top(explicit_grid_config(3, 3, 10.0), 10.0);
            config["model"] = json!({ "name": "stub", "workspace": workspace.display().to_string() });
            Model::new(config, ModelFamily::mf6()).unwrap()
        }

        #[tokio::test]
        async fn test_stub_solver_with_marker_succeeds() {
            let workspace = tempfile::tempdir().unwrap();
            let mut model = model_in(workspace.path());
            model.write().unwrap();
            let stub = write_stub_solver(
                workspace.path(),
                "mf6-stub",
                "test -f mfsim.nam && echo ' Normal termination of simulation.'",
                0,
            )
            .unwrap();

            let result = model.run(stub.to_str(), None).await;
            assert!(result.success, "log: {}", result.log);
            assert_eq!(result.status, RunStatus::Succeeded);
        }

        #[tokio::test]
        async fn test_stub_solver_without_marker_fails_with_log() {
            let workspace = tempfile::tempdir().unwrap();
            let model = model_in(workspace.path());
            let stub = write_stub_solver(workspace.path(), "mf6-stub", "echo 'convergence failure'", 0).unwrap();

            let result = model.run(stub.to_str(), None).await;
            assert!(!result.success);
            assert_eq!(result.status, RunStatus::Failed);
            assert!(result.log.contains("convergence failure"));
            assert!(result.reason.unwrap().contains("normal termination"));
        }

        #[tokio::test]
        async fn test_stub_solver_timeout() {
            let workspace = tempfile::tempdir().unwrap();
            let model = model_in(workspace.path());
            let stub = write_stub_solver(workspace.path(), "mf6-slow", "echo 'Solving: Stress period: 1'\nsleep 10", 0)
                .unwrap();

            let result = model
                .run(stub.to_str(), Some(std::time::Duration::from_millis(500)))
                .await;
            assert_eq!(result.status, RunStatus::TimedOut);
            assert!(result.log.contains("Stress period: 1"), "log: {}", result.log);
        }

        #[tokio::test]
        async fn test_rerun_ignores_previous_listing() {
            let workspace = tempfile::tempdir().unwrap();
            let mut model = model_in(workspace.path());
            model.write().unwrap();

            let good = write_stub_solver(
                workspace.path(),
                "mf6-good",
                "echo ' Normal termination of simulation.' > mfsim.lst",
                0,
            )
            .unwrap();
            assert!(model.run(good.to_str(), None).await.success);
            assert!(workspace.path().join("mfsim.lst").exists());

            let broken = write_stub_solver(workspace.path(), "mf6-broken", "echo 'ERROR: name file not found'", 0).unwrap();
            let result = model.run(broken.to_str(), None).await;
            assert!(!result.success);
            assert_eq!(result.status, RunStatus::Failed);
            assert!(result.log.contains("name file not found"));
        }
    }
}
