//! Span timing, stage span attributes and subscriber installation.

use crate::core::StageKind;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Attributes recorded for one stage build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Model instance id.
    pub model_id: String,
    /// Stage name.
    pub stage: String,
    /// Stage kind.
    pub kind: Option<StageKind>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Whether the output came from the shared cache.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
}

impl StageSpanAttributes {
    /// Creates attributes for a stage of a model.
    #[must_use]
    pub fn new(model_id: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            stage: stage.into(),
            ..Default::default()
        }
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Marks the output as served from cache.
    #[must_use]
    pub fn cached(mut self) -> Self {
        self.cached = true;
        self
    }

    /// Event payload form; unset fields are omitted.
    #[must_use]
    pub fn to_event_data(&self) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        data.insert("model_id".to_string(), serde_json::json!(self.model_id));
        data.insert("stage".to_string(), serde_json::json!(self.stage));
        if let Some(kind) = self.kind {
            data.insert("kind".to_string(), serde_json::json!(kind.to_string()));
        }
        if let Some(ms) = self.duration_ms {
            data.insert("duration_ms".to_string(), serde_json::json!(ms));
        }
        if let Some(ref e) = self.error {
            data.insert("error".to_string(), serde_json::json!(e));
        }
        if self.cached {
            data.insert("cached".to_string(), serde_json::json!(true));
        }
        serde_json::Value::Object(data)
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

/// Installs a global `fmt` subscriber.
///
/// `filter` uses `EnvFilter` syntax (e.g. `"gwsetup=debug"`); `RUST_LOG`
/// wins when set. Returns false if a subscriber was already installed.
pub fn init_tracing(filter: &str, json: bool) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true);
    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
