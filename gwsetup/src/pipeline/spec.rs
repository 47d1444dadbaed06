//! Stage specifications.

use crate::builders::PackageBuilder;
use crate::core::StageKind;
use crate::errors::DependencyCycleError;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One stage of a model family's schema.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage; also the name of its option block.
    pub name: String,
    /// The builder producing the stage's package.
    pub builder: Arc<dyn PackageBuilder>,
    /// Names of stages this stage depends on.
    pub dependencies: BTreeSet<String>,
    /// The kind of stage, used for tie-breaking.
    pub kind: StageKind,
}

impl StageSpec {
    /// Creates a new stage specification.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind, builder: Arc<dyn PackageBuilder>) -> Self {
        Self {
            name: name.into(),
            builder,
            dependencies: BTreeSet::new(),
            kind,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns a cycle error if the stage depends on itself.
    pub fn validate(&self) -> Result<(), DependencyCycleError> {
        if self.dependencies.contains(&self.name) {
            return Err(DependencyCycleError::new(vec![self.name.clone(), self.name.clone()]));
        }
        Ok(())
    }
}
