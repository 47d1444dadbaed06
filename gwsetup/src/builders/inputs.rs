//! Upstream packages visible to a builder.

use crate::core::Package;
use crate::errors::UndeclaredDependencyError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// An immutable view of the outputs of a stage's declared dependencies.
///
/// Reading a stage that was not declared is an error, even if the model has
/// already built it.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    outputs: BTreeMap<String, Arc<Package>>,
    declared_dependencies: BTreeSet<String>,
    stage_name: String,
}

impl StageInputs {
    /// Creates inputs for `stage_name`. Outputs of undeclared stages are dropped.
    #[must_use]
    pub fn new(
        outputs: impl IntoIterator<Item = (String, Arc<Package>)>,
        declared_dependencies: BTreeSet<String>,
        stage_name: impl Into<String>,
    ) -> Self {
        let outputs = outputs
            .into_iter()
            .filter(|(name, _)| declared_dependencies.contains(name))
            .collect();
        Self {
            outputs,
            declared_dependencies,
            stage_name: stage_name.into(),
        }
    }

    /// The output of a declared dependency, or `None` if it is not built.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependencyError` if `stage` is not declared.
    pub fn get(&self, stage: &str) -> Result<Option<&Arc<Package>>, UndeclaredDependencyError> {
        if !self.declared_dependencies.contains(stage) {
            return Err(UndeclaredDependencyError::new(&self.stage_name, stage));
        }
        Ok(self.outputs.get(stage))
    }

    /// Finds the first declared output that `pick` accepts.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependencyError` naming `what` if no declared
    /// dependency provides it.
    pub fn find<'a, T: ?Sized>(
        &'a self,
        what: &str,
        pick: impl Fn(&'a Package) -> Option<&'a T>,
    ) -> Result<&'a T, UndeclaredDependencyError> {
        self.outputs
            .values()
            .find_map(|pkg| pick(pkg.as_ref()))
            .ok_or_else(|| UndeclaredDependencyError::new(&self.stage_name, what))
    }

    /// The stage these inputs belong to.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Declared dependency names.
    #[must_use]
    pub fn declared_dependencies(&self) -> &BTreeSet<String> {
        &self.declared_dependencies
    }

    /// Returns true if a declared dependency has output.
    #[must_use]
    pub fn contains(&self, stage: &str) -> bool {
        self.outputs.contains_key(stage)
    }
}
