//! Stage graph, lazy model assembly and the shared package cache.

mod assembler;
mod batch;
mod cache;
mod graph;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use assembler::Model;
pub use batch::{assemble_batch, BatchFailure, BatchOutcome};
pub use cache::{cache_key, PackageCache};
pub use graph::StageGraph;
pub use spec::StageSpec;
