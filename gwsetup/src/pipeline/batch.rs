//! Parallel assembly of independent models.

use super::Model;
use crate::errors::SetupError;
use futures::future::join_all;
use uuid::Uuid;

/// A model that failed to assemble.
#[derive(Debug)]
pub struct BatchFailure {
    /// The failing model.
    pub model_id: Uuid,
    /// What went wrong.
    pub error: SetupError,
}

/// Result of [`assemble_batch`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Models in input order, including ones that failed to build. A model is
    /// only missing if its worker thread panicked.
    pub models: Vec<Model>,
    /// One entry per failed model.
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    /// Returns true if every model assembled.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builds every stage of every model, one blocking worker per model.
///
/// Models share nothing unless the caller gave them the same
/// [`PackageCache`](super::PackageCache).
pub async fn assemble_batch(models: Vec<Model>) -> BatchOutcome {
    let ids: Vec<Uuid> = models.iter().map(Model::id).collect();
    let handles = models.into_iter().map(|mut model| {
        tokio::task::spawn_blocking(move || {
            let result = model.build_all();
            (model, result)
        })
    });

    let mut outcome = BatchOutcome::default();
    for (model_id, joined) in ids.into_iter().zip(join_all(handles).await) {
        match joined {
            Ok((model, result)) => {
                if let Err(error) = result {
                    tracing::error!(model = %model_id, error = %error, "Model assembly failed");
                    outcome.failures.push(BatchFailure { model_id, error });
                }
                outcome.models.push(model);
            }
            Err(e) => {
                tracing::error!(model = %model_id, error = %e, "Model assembly worker failed");
                outcome.failures.push(BatchFailure {
                    model_id,
                    error: SetupError::Internal(format!("Task join error: {e}")),
                });
            }
        }
    }
    tracing::info!(
        models = outcome.models.len(),
        failures = outcome.failures.len(),
        "Batch assembly finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::ModelFamily;
    use crate::testing::explicit_grid_config;
    use serde_json::json;

    #[tokio::test]
    async fn test_batch_assembles_independent_models() {
        let mut configs = Vec::new();
        for n in 2..5 {
            let mut config = explicit_grid_config(n, n, 10.0);
            config["dis"] = json!({"top": 5.0});
            configs.push(config);
        }
        let models: Vec<Model> = configs
            .into_iter()
            .map(|c| Model::new(c, ModelFamily::mf6()).unwrap())
            .collect();

        let outcome = assemble_batch(models).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.models.len(), 3);
        for (i, model) in outcome.models.iter().enumerate() {
            assert_eq!(model.grid().unwrap().nrow(), i + 2);
            assert!(model.is_built("ims"));
        }
    }

    #[tokio::test]
    async fn test_batch_reports_failures_and_keeps_models() {
        let mut good_config = explicit_grid_config(3, 3, 10.0);
        good_config["dis"] = json!({"top": 5.0});
        let good = Model::new(good_config, ModelFamily::mf6()).unwrap();
        let mut bad_config = explicit_grid_config(3, 3, 10.0);
        bad_config["tdis"] = json!({"periods": [{"perlen": -1.0}]});
        let bad = Model::new(bad_config, ModelFamily::mf6()).unwrap();
        let bad_id = bad.id();

        let outcome = assemble_batch(vec![good, bad]).await;
        assert_eq!(outcome.models.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].model_id, bad_id);
        assert!(outcome.models[1].is_built("grid"));
        assert!(!outcome.models[1].is_built("tdis"));
    }
}
