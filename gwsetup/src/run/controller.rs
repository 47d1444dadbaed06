//! Writes solver inputs and runs the solver as a monitored subprocess.

use super::writer::{write_model, PackageSet};
use super::RunResult;
use crate::core::Package;
use crate::errors::{Result, SolverError};
use crate::family::{FamilyKind, DEFAULT_SUCCESS_MARKER};
use chrono::Utc;
use parking_lot::Mutex;
use regex::RegexBuilder;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Attempts to spawn an executable that is still being written (`ETXTBSY`).
const SPAWN_ATTEMPTS: usize = 5;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Injectable run settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Text whose presence in the log marks success (case-insensitive).
    pub success_marker: String,
    /// Kill the solver after this long.
    pub timeout: Option<Duration>,
    /// Arguments passed to the solver.
    pub args: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            success_marker: DEFAULT_SUCCESS_MARKER.to_string(),
            timeout: None,
            args: Vec::new(),
        }
    }
}

impl RunOptions {
    /// Creates default run options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the success marker.
    #[must_use]
    pub fn with_success_marker(mut self, marker: impl Into<String>) -> Self {
        self.success_marker = marker.into();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the solver arguments.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Writes and runs one model in its workspace.
///
/// The controller reports what happened; it never decides whether a failed
/// run is fatal.
#[derive(Debug, Clone)]
pub struct RunController {
    workspace: PathBuf,
    kind: FamilyKind,
    model_name: String,
    listing_file: Option<String>,
    options: RunOptions,
}

impl RunController {
    /// Creates a controller for a model workspace.
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>, kind: FamilyKind, model_name: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            kind,
            model_name: model_name.into(),
            listing_file: None,
            options: RunOptions::default(),
        }
    }

    /// Sets the run options.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the listing file scanned for the success marker.
    #[must_use]
    pub fn with_listing_file(mut self, name: impl Into<String>) -> Self {
        self.listing_file = Some(name.into());
        self
    }

    /// The model workspace.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Writes the solver input files for the given packages.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for missing packages or an IO error.
    pub fn write(&self, packages: &[Arc<Package>]) -> Result<Vec<PathBuf>> {
        write_model(&self.workspace, self.kind, &self.model_name, PackageSet::new(packages))
    }

    /// Runs the solver. Every outcome, including a missing executable, is
    /// reported in the result rather than as an error.
    ///
    /// A listing file left by an earlier run is removed before the solver
    /// starts, so only output of this run can carry the success marker.
    pub async fn run(&self, executable: &str) -> RunResult {
        let Some(program) = resolve_executable(executable) else {
            tracing::warn!(executable, "Solver executable not found; run not attempted");
            return RunResult::not_attempted(executable);
        };

        let started_at = Utc::now();
        let start = Instant::now();
        let elapsed_ms = || start.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = self.clear_listing().await {
            let error = SolverError::Spawn {
                path: program.display().to_string(),
                reason: format!("could not remove the previous listing file: {e}"),
            };
            tracing::error!(executable, error = %e, "Failed to clear stale listing file");
            return RunResult::from_error(error, String::new(), elapsed_ms(), started_at);
        }

        let mut child = match self.spawn(&program).await {
            Ok(child) => child,
            Err(e) => {
                let error = SolverError::Spawn {
                    path: program.display().to_string(),
                    reason: e.to_string(),
                };
                tracing::error!(executable, error = %e, "Failed to start solver");
                return RunResult::from_error(error, String::new(), elapsed_ms(), started_at);
            }
        };
        let stdout = OutputCapture::start(child.stdout.take());
        let stderr = OutputCapture::start(child.stderr.take());

        let status = match self.options.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(executable, error = %e, "Failed to kill timed out solver");
                    }
                    tracing::warn!(executable, timeout_s = limit.as_secs_f64(), "Solver timed out and was killed");
                    let error = SolverError::Timeout {
                        timeout_seconds: limit.as_secs_f64(),
                    };
                    let log = self.collect_log(stdout.abort(), stderr.abort()).await;
                    return RunResult::from_error(error, log, elapsed_ms(), started_at);
                }
            },
            None => child.wait().await,
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                let error = SolverError::failure(None, format!("failed to wait for the solver: {e}"));
                let log = self.collect_log(stdout.abort(), stderr.abort()).await;
                return RunResult::from_error(error, log, elapsed_ms(), started_at);
            }
        };

        let log = self.collect_log(stdout.finish().await, stderr.finish().await).await;
        let exit_code = status.code();
        let duration_ms = elapsed_ms();
        if !status.success() {
            let reason = exit_code.map_or_else(
                || "solver terminated by a signal".to_string(),
                |code| format!("solver exited with code {code}"),
            );
            tracing::error!(executable, exit_code = ?exit_code, "Solver run failed");
            return RunResult::from_error(SolverError::failure(exit_code, reason), log, duration_ms, started_at);
        }
        if !contains_marker(&log, &self.options.success_marker) {
            let reason = format!("success marker '{}' not found in solver log", self.options.success_marker);
            tracing::error!(executable, "Solver finished without the success marker");
            return RunResult::from_error(SolverError::failure(exit_code, reason), log, duration_ms, started_at);
        }

        tracing::info!(executable, duration_ms, "Solver run succeeded");
        RunResult::succeeded(log, exit_code, duration_ms, started_at)
    }

    async fn spawn(&self, program: &Path) -> std::io::Result<tokio::process::Child> {
        let mut attempt = 1;
        loop {
            let spawned = Command::new(program)
                .args(&self.options.args)
                .current_dir(&self.workspace)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn();
            match spawned {
                Err(e) if is_text_file_busy(&e) && attempt < SPAWN_ATTEMPTS => {
                    attempt += 1;
                    tokio::time::sleep(SPAWN_RETRY_DELAY).await;
                }
                other => return other,
            }
        }
    }

    async fn clear_listing(&self) -> std::io::Result<()> {
        let Some(name) = &self.listing_file else {
            return Ok(());
        };
        match tokio::fs::remove_file(self.workspace.join(name)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    async fn read_listing(&self) -> Option<String> {
        let name = self.listing_file.as_ref()?;
        tokio::fs::read_to_string(self.workspace.join(name)).await.ok()
    }

    /// Joins stdout, stderr and the listing file written by this run.
    async fn collect_log(&self, stdout: String, stderr: String) -> String {
        let mut log = stdout;
        log.push_str(&stderr);
        if let Some(listing) = self.read_listing().await {
            log.push_str(&listing);
        }
        log
    }
}

/// Drains one output pipe into a shared buffer as data arrives, so a killed
/// solver still leaves the output it produced.
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputCapture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let sink = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0_u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
                        Err(e) => {
                            tracing::debug!(error = %e, "Solver output pipe closed with an error");
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Waits for the pipe to close and returns everything read.
    async fn finish(mut self) -> String {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Solver output reader failed");
            }
        }
        self.text()
    }

    /// Stops reading and returns what was read so far.
    fn abort(mut self) -> String {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.text()
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }
}

#[cfg(unix)]
fn is_text_file_busy(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(26)
}

#[cfg(not(unix))]
fn is_text_file_busy(_err: &std::io::Error) -> bool {
    false
}

/// Case-insensitive literal search for the success marker.
fn contains_marker(log: &str, marker: &str) -> bool {
    RegexBuilder::new(&regex::escape(marker))
        .case_insensitive(true)
        .build()
        .is_ok_and(|re| re.is_match(log))
}

/// Resolves a path or a bare program name on `PATH` to an absolute path.
///
/// Paths are resolved against the caller's directory, never the workspace
/// the solver runs in.
fn resolve_executable(executable: &str) -> Option<PathBuf> {
    let candidate = Path::new(executable);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| absolute(candidate)).flatten();
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(executable))
            .find(|path| path.is_file())
            .and_then(|path| absolute(&path))
    })
}

/// Anchors a relative path at the current directory, keeping symlinks.
fn absolute(path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return Some(path.to_path_buf());
    }
    std::env::current_dir().ok().map(|dir| dir.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_marker_case_insensitive() {
        assert!(contains_marker("...\n Normal Termination of simulation\n", "normal termination"));
        assert!(!contains_marker("failure", "normal termination"));
        assert!(contains_marker("a (b) c", "(b)"));
    }

    #[test]
    fn test_resolve_executable() {
        assert!(resolve_executable("/definitely/not/here/mf6").is_none());
        assert!(resolve_executable("gwsetup-no-such-solver").is_none());
    }

    #[test]
    fn test_relative_executable_resolves_against_caller_directory() {
        // Tests run from the package root.
        let resolved = resolve_executable("src/lib.rs").unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, std::env::current_dir().unwrap().join("src/lib.rs"));
    }

    #[tokio::test]
    async fn test_missing_executable_not_attempted() {
        let dir = tempfile::tempdir().unwrap();
        let controller = RunController::new(dir.path(), FamilyKind::Mf6, "m");
        let result = controller.run("/definitely/not/here/mf6").await;
        assert!(!result.success);
        assert_eq!(result.status, super::super::RunStatus::NotAttempted);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::run::RunStatus;
        use crate::testing::write_stub_solver;

        #[tokio::test]
        async fn test_stub_success_and_failure() {
            let dir = tempfile::tempdir().unwrap();
            let good = write_stub_solver(dir.path(), "good", "echo 'Normal termination of simulation'", 0).unwrap();
            let bad = write_stub_solver(dir.path(), "bad", "echo 'solver diverged'", 0).unwrap();
            let controller = RunController::new(dir.path(), FamilyKind::Mf6, "m");

            let ok = controller.run(good.to_str().unwrap()).await;
            assert!(ok.success, "log: {}", ok.log);
            assert_eq!(ok.exit_code, Some(0));

            let failed = controller.run(bad.to_str().unwrap()).await;
            assert_eq!(failed.status, RunStatus::Failed);
            assert!(failed.log.contains("solver diverged"));
        }

        #[tokio::test]
        async fn test_marker_in_listing_file() {
            let dir = tempfile::tempdir().unwrap();
            let stub = write_stub_solver(dir.path(), "lst", "echo 'Normal termination' > m.list", 0).unwrap();
            let controller = RunController::new(dir.path(), FamilyKind::Mfnwt, "m").with_listing_file("m.list");
            let result = controller.run(stub.to_str().unwrap()).await;
            assert!(result.success, "log: {}", result.log);
        }

        #[tokio::test]
        async fn test_exit_code_failure() {
            let dir = tempfile::tempdir().unwrap();
            let stub = write_stub_solver(dir.path(), "exit3", "echo 'normal termination'", 3).unwrap();
            let result = RunController::new(dir.path(), FamilyKind::Mf6, "m")
                .run(stub.to_str().unwrap())
                .await;
            assert_eq!(result.status, RunStatus::Failed);
            assert_eq!(result.exit_code, Some(3));
        }

        #[tokio::test]
        async fn test_timeout_kills_solver() {
            let dir = tempfile::tempdir().unwrap();
            let stub = write_stub_solver(dir.path(), "slow", "echo 'solving outer iteration 1'\nsleep 5", 0).unwrap();
            let controller = RunController::new(dir.path(), FamilyKind::Mf6, "m")
                .with_options(RunOptions::new().with_timeout(Duration::from_millis(500)));
            let result = controller.run(stub.to_str().unwrap()).await;
            assert_eq!(result.status, RunStatus::TimedOut);
            assert!(result.duration_ms < 5000.0);
            assert!(result.log.contains("solving outer iteration 1"), "log: {}", result.log);
        }

        #[tokio::test]
        async fn test_stale_listing_does_not_count() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("mfsim.lst"), " Normal termination of simulation.\n").unwrap();
            let stub = write_stub_solver(dir.path(), "broken", "echo 'ERROR: name file not found'", 0).unwrap();
            let controller = RunController::new(dir.path(), FamilyKind::Mf6, "m").with_listing_file("mfsim.lst");

            let result = controller.run(stub.to_str().unwrap()).await;
            assert_eq!(result.status, RunStatus::Failed);
            assert!(!result.log.contains("Normal termination"));
            assert!(!dir.path().join("mfsim.lst").exists());
        }

        #[tokio::test]
        async fn test_listing_written_by_this_run_counts() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("m.list"), "stale content\n").unwrap();
            let stub = write_stub_solver(dir.path(), "fresh", "echo 'Normal termination' > m.list", 0).unwrap();
            let controller = RunController::new(dir.path(), FamilyKind::Mfnwt, "m").with_listing_file("m.list");

            let result = controller.run(stub.to_str().unwrap()).await;
            assert!(result.success, "log: {}", result.log);
            assert!(!result.log.contains("stale content"));
        }
    }
}
