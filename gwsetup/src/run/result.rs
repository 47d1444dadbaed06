//! Solver run outcomes.

use crate::errors::SolverError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Exited normally and the success marker was found.
    Succeeded,
    /// Exited abnormally, failed to start, or the marker was absent.
    Failed,
    /// The executable was missing.
    NotAttempted,
    /// Killed after exceeding the timeout.
    TimedOut,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::NotAttempted => "not attempted",
            Self::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// The immutable result of one solver invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// True only for [`RunStatus::Succeeded`].
    pub success: bool,
    /// How the run ended.
    pub status: RunStatus,
    /// Combined stdout, stderr and listing file text.
    pub log: String,
    /// Why the run did not succeed.
    pub reason: Option<String>,
    /// Process exit code, when it exited normally.
    pub exit_code: Option<i32>,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    error: Option<SolverError>,
}

impl RunResult {
    /// A successful run.
    #[must_use]
    pub fn succeeded(log: String, exit_code: Option<i32>, duration_ms: f64, started_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            status: RunStatus::Succeeded,
            log,
            reason: None,
            exit_code,
            duration_ms,
            started_at,
            error: None,
        }
    }

    /// A run that did not succeed; the status follows from the error.
    #[must_use]
    pub fn from_error(error: SolverError, log: String, duration_ms: f64, started_at: DateTime<Utc>) -> Self {
        let (status, exit_code) = match &error {
            SolverError::NotFound { .. } => (RunStatus::NotAttempted, None),
            SolverError::Timeout { .. } => (RunStatus::TimedOut, None),
            SolverError::Failure { exit_code, .. } => (RunStatus::Failed, *exit_code),
            SolverError::Spawn { .. } => (RunStatus::Failed, None),
        };
        Self {
            success: false,
            status,
            log,
            reason: Some(error.to_string()),
            exit_code,
            duration_ms,
            started_at,
            error: Some(error),
        }
    }

    /// A run skipped because the executable does not exist.
    #[must_use]
    pub fn not_attempted(path: impl Into<String>) -> Self {
        Self::from_error(SolverError::not_found(path), String::new(), 0.0, Utc::now())
    }

    /// The solver condition behind a failed run.
    #[must_use]
    pub fn error(&self) -> Option<&SolverError> {
        self.error.as_ref()
    }

    /// Converts to event data.
    #[must_use]
    pub fn to_event_data(&self) -> serde_json::Value {
        serde_json::json!({
            "success": self.success,
            "status": self.status,
            "reason": self.reason,
            "exit_code": self.exit_code,
            "duration_ms": self.duration_ms,
            "started_at": self.started_at.to_rfc3339(),
        })
    }
}
