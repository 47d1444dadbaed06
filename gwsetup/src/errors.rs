//! Error types for model assembly.
//!
//! Structural errors (configuration, dependency cycles) abort the whole
//! assembly. Stage-local errors (resampling, per-builder numeric checks)
//! abort only the stage that raised them. Solver outcomes are never raised:
//! they travel as [`SolverError`] values attached to a run result.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = SetupError> = std::result::Result<T, E>;

/// The main error type for model setup operations.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Missing or contradictory configuration.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A raster could not be sampled onto the target geometry.
    #[error("{0}")]
    Resampling(#[from] ResamplingError),

    /// The stage graph contains a cycle.
    #[error("{0}")]
    DependencyCycle(#[from] DependencyCycleError),

    /// A builder read a stage it did not declare as a dependency.
    #[error("{0}")]
    UndeclaredDependency(#[from] UndeclaredDependencyError),

    /// A stage name that is not part of the model family's schema.
    #[error("Unknown stage: '{0}'")]
    UnknownStage(String),

    /// A raster could not be loaded by the raster source.
    #[error("{0}")]
    RasterLoad(#[from] RasterLoadError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker thread failed outside of any stage.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SetupError {
    /// Returns true if the error aborts the whole assembly rather than a
    /// single stage.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::DependencyCycle(_) | Self::UnknownStage(_))
            || matches!(self, Self::Configuration(e) if e.stage.is_none())
    }

    /// Shorthand for a configuration error scoped to a stage.
    #[must_use]
    pub fn config(stage: &str, message: impl Into<String>) -> Self {
        Self::Configuration(ConfigurationError::new(message).for_stage(stage))
    }
}

impl From<serde_json::Error> for SetupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SetupError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Diagnostic metadata attached to structural errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "SETUP-002-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }
        map
    }
}

/// Error raised when required options are missing or contradictory.
#[derive(Debug, Clone, Error)]
#[error("Configuration error{}: {message}", stage.as_ref().map(|s| format!(" in '{s}'")).unwrap_or_default())]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// The stage whose option block is at fault, if any.
    pub stage: Option<String>,
    /// The offending option name, if known.
    pub option: Option<String>,
    /// Optional diagnostic info.
    pub error_info: Option<ErrorInfo>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: None,
            option: None,
            error_info: None,
        }
    }

    /// Scopes the error to a stage.
    #[must_use]
    pub fn for_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Names the offending option.
    #[must_use]
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.option = Some(option.into());
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(ref stage) = self.stage {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }
        if let Some(ref option) = self.option {
            map.insert("option".to_string(), serde_json::json!(option));
        }
        if let Some(ref info) = self.error_info {
            let info_map: serde_json::Map<String, serde_json::Value> =
                info.to_dict().into_iter().collect();
            map.insert("error_info".to_string(), serde_json::Value::Object(info_map));
        }
        map
    }
}

/// Error raised when a raster cannot be sampled onto a target geometry.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Resampling failed{}: {message}", cell.map(|(r, c)| format!(" at cell (row {r}, column {c})")).unwrap_or_default())]
pub struct ResamplingError {
    /// The error message.
    pub message: String,
    /// The offending target cell as (row, column).
    pub cell: Option<(usize, usize)>,
}

impl ResamplingError {
    /// Creates a new resampling error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cell: None,
        }
    }

    /// Attaches the offending cell.
    #[must_use]
    pub fn at_cell(mut self, row: usize, column: usize) -> Self {
        self.cell = Some((row, column));
        self
    }
}

/// Error raised when a cycle is detected in the stage graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in stage graph: {}", cycle_path.join(" -> "))]
pub struct DependencyCycleError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Diagnostic info.
    pub error_info: ErrorInfo,
}

impl DependencyCycleError {
    /// Creates a new dependency cycle error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ErrorInfo::new(
            "SETUP-002-CYCLE",
            format!("Stage schema contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when a builder reads a stage it did not declare.
#[derive(Debug, Clone, Error)]
#[error("Undeclared dependency: stage '{stage}' attempted to read '{key}' which was not declared as a dependency")]
pub struct UndeclaredDependencyError {
    /// The stage attempting access.
    pub stage: String,
    /// The undeclared stage name.
    pub key: String,
}

impl UndeclaredDependencyError {
    /// Creates a new undeclared dependency error.
    #[must_use]
    pub fn new(stage: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            key: key.into(),
        }
    }
}

/// Errors raised by raster sources.
#[derive(Debug, Error)]
pub enum RasterLoadError {
    /// The raster file does not exist or the source does not know it.
    #[error("Raster not found: {path}")]
    NotFound {
        /// The raster path.
        path: String,
    },

    /// The raster was referenced by a stage but never loaded into the model.
    #[error("Raster '{path}' has not been loaded into the model")]
    NotLoaded {
        /// The raster path.
        path: String,
    },

    /// Loading exceeded the caller's deadline.
    #[error("Raster load timed out after {timeout_ms} ms: {path}")]
    Timeout {
        /// The raster path.
        path: String,
        /// The deadline in milliseconds.
        timeout_ms: u128,
    },

    /// The raster file could not be decoded.
    #[error("Malformed raster {path}: {message}")]
    Malformed {
        /// The raster path.
        path: String,
        /// What was wrong.
        message: String,
    },

    /// Underlying IO failure.
    #[error("IO error reading raster {path}: {source}")]
    Io {
        /// The raster path.
        path: String,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Solver conditions, reported as data on a run result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolverError {
    /// The configured executable does not exist; the run was not attempted.
    #[error("Solver executable not found: {path}")]
    NotFound {
        /// The executable path.
        path: String,
    },

    /// The process could not be started.
    #[error("Failed to start solver {path}: {reason}")]
    Spawn {
        /// The executable path.
        path: String,
        /// The reason.
        reason: String,
    },

    /// The process terminated abnormally or the success marker was absent.
    #[error("Solver run failed: {reason}")]
    Failure {
        /// The exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// The reason for failure.
        reason: String,
    },

    /// The process exceeded its deadline and was killed.
    #[error("Solver timed out after {timeout_seconds}s")]
    Timeout {
        /// The deadline in seconds.
        timeout_seconds: f64,
    },
}

impl SolverError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a failure error.
    #[must_use]
    pub fn failure(exit_code: Option<i32>, reason: impl Into<String>) -> Self {
        Self::Failure {
            exit_code,
            reason: reason.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::NotFound { path } => {
                map.insert("type".to_string(), serde_json::json!("SolverNotFound"));
                map.insert("path".to_string(), serde_json::json!(path));
            }
            Self::Spawn { path, reason } => {
                map.insert("type".to_string(), serde_json::json!("SolverSpawnError"));
                map.insert("path".to_string(), serde_json::json!(path));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Failure { exit_code, reason } => {
                map.insert("type".to_string(), serde_json::json!("SolverFailure"));
                map.insert("exit_code".to_string(), serde_json::json!(exit_code));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::Timeout { timeout_seconds } => {
                map.insert("type".to_string(), serde_json::json!("SolverTimeout"));
                map.insert("timeout_seconds".to_string(), serde_json::json!(timeout_seconds));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Default fix suggestions for structural error codes.
pub struct ErrorSuggestions;

impl ErrorSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "SETUP-001-NO_GRID_SOURCE" => Some(
                "Give the grid block nrow/ncol/delr/delc, or a dem path to derive \
                 the grid from the raster extent.",
            ),
            "SETUP-002-CYCLE" => Some(
                "Check the family's stage schema for circular dependencies.",
            ),
            "SETUP-003-MISSING_DEP" => Some(
                "Ensure every dependency names a stage declared earlier in the schema.",
            ),
            "SETUP-004-MASK_PROPAGATION" => Some(
                "Set grid.active.propagation to 'replicate' or 'top_layer_only'.",
            ),
            _ => None,
        }
    }
}
