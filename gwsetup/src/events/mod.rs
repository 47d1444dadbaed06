//! Pipeline events.
//!
//! Every model owns one sink; events carry the model id and, for stage
//! events, the stage name.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A stage build began.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage build produced a package.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage output was taken from the shared cache.
pub const STAGE_CACHED: &str = "stage.cached";
/// A stage build failed.
pub const STAGE_FAILED: &str = "stage.failed";
/// A built stage was marked for remake.
pub const STAGE_INVALIDATED: &str = "stage.invalidated";
/// The solver run was not attempted.
pub const RUN_SKIPPED: &str = "run.skipped";
/// The solver run finished, successfully or not.
pub const RUN_COMPLETED: &str = "run.completed";
