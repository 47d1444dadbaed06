//! The validated stage dependency graph.

use super::StageSpec;
use crate::errors::{ConfigurationError, DependencyCycleError, ErrorInfo, Result, SetupError};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

/// A directed acyclic graph of stages with a fixed execution order.
///
/// The order is topological; among stages that are ready at the same time,
/// lower [`StageKind`](crate::core::StageKind) priority goes first, then
/// declaration order.
#[derive(Debug, Clone)]
pub struct StageGraph {
    specs: Vec<StageSpec>,
    index: HashMap<String, usize>,
    execution_order: Vec<String>,
    dependents: HashMap<String, BTreeSet<String>>,
}

impl StageGraph {
    /// Validates the schema and computes the execution order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for duplicate or unknown stage names and
    /// a cycle error for self-dependencies or cycles.
    pub fn new(specs: Vec<StageSpec>) -> Result<Self> {
        let mut index = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            spec.validate()?;
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(ConfigurationError::new(format!("Stage '{}' is declared twice", spec.name)).into());
            }
        }

        let mut dependents: HashMap<String, BTreeSet<String>> =
            specs.iter().map(|s| (s.name.clone(), BTreeSet::new())).collect();
        for spec in &specs {
            for dep in &spec.dependencies {
                let Some(children) = dependents.get_mut(dep) else {
                    return Err(missing_dependency(&spec.name, dep));
                };
                children.insert(spec.name.clone());
            }
        }

        let mut graph = Self {
            specs,
            index,
            execution_order: Vec::new(),
            dependents,
        };
        graph.detect_cycles()?;
        graph.execution_order = graph.priority_order();
        Ok(graph)
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// The spec of a stage.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&StageSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    /// Returns true if the stage exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if the graph has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Stage names in declaration order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    /// `name` plus every stage reachable from it through dependents, in
    /// execution order.
    #[must_use]
    pub fn dependents_closure(&self, name: &str) -> Vec<String> {
        let reach = self.reach(name, |n| self.dependents.get(n).into_iter().flatten());
        self.in_order(&reach)
    }

    /// `name` plus all of its transitive dependencies, in execution order.
    #[must_use]
    pub fn prerequisites_closure(&self, name: &str) -> Vec<String> {
        let reach = self.reach(name, |n| self.spec(n).into_iter().flat_map(|s| s.dependencies.iter()));
        self.in_order(&reach)
    }

    fn reach<'a, I>(&'a self, start: &str, next: impl Fn(&str) -> I) -> HashSet<String>
    where
        I: Iterator<Item = &'a String>,
    {
        let mut seen = HashSet::new();
        if !self.contains(start) {
            return seen;
        }
        let mut stack = vec![start.to_string()];
        while let Some(node) = stack.pop() {
            if seen.insert(node.clone()) {
                stack.extend(next(&node).cloned());
            }
        }
        seen
    }

    fn in_order(&self, set: &HashSet<String>) -> Vec<String> {
        self.execution_order
            .iter()
            .filter(|n| set.contains(*n))
            .cloned()
            .collect()
    }

    /// Kahn's algorithm with a (kind, declaration index) ready queue.
    fn priority_order(&self) -> Vec<String> {
        let mut in_degree: Vec<usize> = self.specs.iter().map(|s| s.dependencies.len()).collect();
        let mut ready: BinaryHeap<Reverse<(u8, usize)>> = self
            .specs
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] == 0)
            .map(|(i, s)| Reverse((s.kind.priority(), i)))
            .collect();

        let mut order = Vec::with_capacity(self.specs.len());
        while let Some(Reverse((_, i))) = ready.pop() {
            let name = &self.specs[i].name;
            order.push(name.clone());
            for child in self.dependents.get(name).into_iter().flatten() {
                let c = self.index[child];
                in_degree[c] -= 1;
                if in_degree[c] == 0 {
                    ready.push(Reverse((self.specs[c].kind.priority(), c)));
                }
            }
        }
        order
    }

    fn detect_cycles(&self) -> std::result::Result<(), DependencyCycleError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for spec in &self.specs {
            if !visited.contains(&spec.name) {
                if let Some(cycle) = self.dfs_cycle(&spec.name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(DependencyCycleError::new(cycle));
                }
            }
        }
        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(spec) = self.spec(node) {
            for dep in &spec.dependencies {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }
}

fn missing_dependency(stage: &str, dep: &str) -> SetupError {
    ConfigurationError::new(format!("Stage '{stage}' depends on unknown stage '{dep}'"))
        .with_error_info(
            ErrorInfo::new("SETUP-003-MISSING_DEP", format!("Dependency '{dep}' not found"))
                .with_context_entry("stage", stage)
                .with_fix_hint("Ensure every dependency names a stage declared in the schema."),
        )
        .into()
}
